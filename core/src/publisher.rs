//! Publisher abstraction for the broker queue.
//!
//! The pipeline publishes through this trait so the state machine can be
//! exercised against an in-memory double as well as the real AMQP layer.
//!
//! # Dyn Compatibility
//!
//! The trait returns explicit `Pin<Box<dyn Future>>` instead of `async fn`
//! so it can be used as a trait object (`Arc<dyn EventPublisher>`); the
//! processor captures the publisher behind exactly that type.

use crate::event::OrderEvent;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a publish attempt.
///
/// Encoding failures are deliberately distinct from transport failures: a
/// payload that cannot be serialized never reaches the broker, and callers
/// can tell the two apart.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The event could not be serialized to its wire payload.
    #[error("failed to encode event payload: {0}")]
    Encode(String),

    /// No usable broker connection/channel could be obtained.
    #[error("broker unavailable: {0}")]
    Broker(String),

    /// The broker rejected or failed the publish.
    #[error("publish to queue '{queue}' failed: {reason}")]
    Transport {
        /// Target queue.
        queue: String,
        /// Underlying cause.
        reason: String,
    },

    /// The publish did not complete within its time budget.
    #[error("publish to queue '{queue}' timed out after {budget:?}")]
    Timeout {
        /// Target queue.
        queue: String,
        /// The exceeded budget.
        budget: Duration,
    },
}

/// Publishes domain events to a named queue.
///
/// An empty queue name instructs the implementation to fall back to its
/// configured default queue.
pub trait EventPublisher: Send + Sync {
    /// Serialize `event` and publish it to `queue`.
    ///
    /// # Errors
    ///
    /// Returns a [`PublishError`] on serialization failure, broker
    /// unavailability, transport failure, or budget exhaustion. The call
    /// never retries internally; the caller decides whether to retry the
    /// whole event.
    fn publish(
        &self,
        queue: &str,
        event: &OrderEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + '_>>;
}
