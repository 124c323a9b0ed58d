//! RabbitMQ broker layer for Orderline.
//!
//! Implements the pipeline's broker-facing pieces over `lapin`:
//!
//! - [`ConnectionManager`] owns the single transport connection, issues
//!   short-lived logical channels, and lazily re-dials a dead transport.
//! - [`AmqpPublisher`] serializes an event and publishes it persistently
//!   to a named queue under a fixed time budget, one channel per publish.
//! - [`AmqpConsumer`] subscribes with manual acknowledgment and hands
//!   each delivery to a bounded, independently scheduled worker.
//!
//! # Delivery Semantics
//!
//! At-least-once. The queue is durable and messages are persistent, so an
//! unacknowledged delivery survives a broker restart and is redelivered.
//! Processing failures nack with requeue; consumers of this crate must
//! tolerate duplicates.

#![forbid(unsafe_code)]

pub mod connection;
pub mod consumer;
pub mod publisher;

pub use connection::{BrokerConfig, BrokerError, ConnectionManager};
pub use consumer::{AmqpConsumer, ConsumeError, DEFAULT_MAX_IN_FLIGHT};
pub use publisher::{AmqpPublisher, PUBLISH_TIMEOUT};
