//! Queue consumer and per-delivery dispatch.
//!
//! The subscription loop is one long-lived worker that never processes a
//! delivery inline: every delivery is handed to its own spawned task, so a
//! slow order never stalls the stream. Spawning is bounded by a semaphore.
//! The loop waits for a permit before dispatching, which gives explicit
//! backpressure instead of unbounded task growth under load.
//!
//! Acknowledgment is manual and decided exactly once per delivery from the
//! processor's result: success acks, any failure nacks with requeue. That
//! yields at-least-once delivery, unordered with respect to retries.

use crate::connection::{BrokerError, ConnectionManager};
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions};
use lapin::types::FieldTable;
use orderline_core::EventProcessor;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// Default cap on concurrently processed deliveries.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;

/// Errors that terminate a consumer run.
#[derive(Error, Debug)]
pub enum ConsumeError {
    /// Queue declaration or channel acquisition failed.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// The broker refused the subscription.
    #[error("failed to start consuming from '{queue}': {source}")]
    Subscribe {
        /// Queue name.
        queue: String,
        /// Underlying cause.
        #[source]
        source: lapin::Error,
    },

    /// The delivery stream closed. Terminal for this subscription; the
    /// caller decides whether to resubscribe.
    #[error("delivery stream for '{queue}' closed")]
    StreamClosed {
        /// Queue name.
        queue: String,
    },
}

/// Subscribes to a queue and dispatches each delivery to a processor.
pub struct AmqpConsumer {
    manager: Arc<ConnectionManager>,
    max_in_flight: usize,
}

impl AmqpConsumer {
    /// Create a consumer with the given concurrency cap.
    #[must_use]
    pub const fn new(manager: Arc<ConnectionManager>, max_in_flight: usize) -> Self {
        Self {
            manager,
            max_in_flight,
        }
    }

    /// Declare `queue` and consume from it until the delivery stream
    /// closes. Does not return while the subscription is healthy.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumeError`] on setup failure or when the stream closes.
    /// Per-delivery failures never surface here; they are contained at the
    /// acknowledgment boundary.
    pub async fn run(
        &self,
        queue: &str,
        processor: Arc<dyn EventProcessor>,
    ) -> Result<(), ConsumeError> {
        self.manager.declare_queue(queue).await?;

        let channel = self.manager.channel().await?;
        let mut deliveries = channel
            .basic_consume(
                queue,
                "orderline-consumer",
                BasicConsumeOptions {
                    no_ack: false, // manual acknowledgment
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|source| ConsumeError::Subscribe {
                queue: queue.to_string(),
                source,
            })?;

        info!(
            queue,
            max_in_flight = self.max_in_flight,
            "consuming deliveries"
        );

        let permits = Arc::new(Semaphore::new(self.max_in_flight));

        while let Some(delivery) = deliveries.next().await {
            match delivery {
                Ok(delivery) => {
                    // The semaphore is never closed, so acquisition can only
                    // fail if the runtime is tearing down.
                    let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                        break;
                    };
                    let processor = Arc::clone(&processor);
                    tokio::spawn(async move {
                        let _permit = permit;
                        handle_delivery(delivery, processor.as_ref()).await;
                    });
                }
                Err(err) => {
                    error!(queue, error = %err, "delivery stream error");
                    break;
                }
            }
        }

        warn!(queue, "delivery stream closed");
        Err(ConsumeError::StreamClosed {
            queue: queue.to_string(),
        })
    }
}

/// Process one delivery and make its single acknowledgment decision.
/// Ack/nack transport failures are logged, never escalated: the broker will
/// redeliver an unacknowledged message on its own.
async fn handle_delivery(delivery: Delivery, processor: &dyn EventProcessor) {
    let redelivered = delivery.redelivered;
    match processor.process(&delivery.data).await {
        Ok(()) => {
            if let Err(err) = delivery.ack(BasicAckOptions::default()).await {
                warn!(error = %err, "failed to ack delivery");
            }
        }
        Err(err) => {
            warn!(error = %err, redelivered, "processing failed, requeueing delivery");
            let nack = BasicNackOptions {
                requeue: true,
                ..BasicNackOptions::default()
            };
            if let Err(err) = delivery.nack(nack).await {
                warn!(error = %err, "failed to nack delivery");
            }
        }
    }
}
