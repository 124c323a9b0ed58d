//! Core types for the Orderline pipeline.
//!
//! Orderline accepts a unit of work (an order), asynchronously advances it
//! through a small set of processing stages using a durable queue as the
//! coordination medium, and notifies an interested live client when a stage
//! completes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐        ┌───────────────┐
//! │ HTTP handler │──────> │   Publisher   │────┐
//! └──────────────┘        └───────────────┘    │
//!                                 ▲            ▼
//!                                 │      ┌───────────┐
//!                          re-publish    │   queue   │  (durable, at-least-once)
//!                                 │      └─────┬─────┘
//!                         ┌───────┴──────┐     │
//!                         │  Processor   │<────┘  Consumer (manual ack)
//!                         └───────┬──────┘
//!                                 │ terminal notification
//!                                 ▼
//!                         ┌──────────────┐      ┌────────────┐
//!                         │   Registry   │────> │ live client│
//!                         └──────────────┘      └────────────┘
//! ```
//!
//! The pipeline is a closed loop: the processor's own output re-enters the
//! same queue until a terminal status (`DELIVERED` or `CANCELLED`) is
//! reached.
//!
//! This crate holds the pieces with no broker or HTTP dependency: the event
//! model, the state machine, the publisher/processor traits, and the
//! live-connection registry. The AMQP implementation lives in
//! `orderline-amqp`, the web boundary in `orderline-web`.

pub mod event;
pub mod notification;
pub mod processor;
pub mod publisher;
pub mod registry;

pub use event::{EventError, OrderEvent, OrderStatus};
pub use notification::Notification;
pub use processor::{EventProcessor, OrderProcessor, ProcessError};
pub use publisher::{EventPublisher, PublishError};
pub use registry::{ClientConnection, ConnectionRegistry, SendError};
