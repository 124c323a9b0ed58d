//! Queue publisher over one-shot channels.
//!
//! Each publish acquires its own channel and releases it afterwards. This
//! trades connection overhead for simplicity: a channel is never shared
//! between concurrent publishes, so single-writer discipline holds without
//! any locking. Messages are persistent and routed directly to the queue
//! (default exchange, queue name as routing key).

use crate::connection::ConnectionManager;
use lapin::options::BasicPublishOptions;
use lapin::BasicProperties;
use orderline_core::{EventPublisher, OrderEvent, PublishError};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Fixed time budget for one publish, including broker confirmation.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(15);

/// [`EventPublisher`] backed by the AMQP broker.
pub struct AmqpPublisher {
    manager: Arc<ConnectionManager>,
}

impl AmqpPublisher {
    /// Create a publisher over the shared connection manager.
    #[must_use]
    pub const fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    async fn publish_inner(&self, queue: String, payload: Vec<u8>) -> Result<(), PublishError> {
        let channel = self
            .manager
            .channel()
            .await
            .map_err(|e| PublishError::Broker(e.to_string()))?;

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2); // persistent

        let publish = async {
            let confirm = channel
                .basic_publish(
                    "", // default exchange: routing key is the queue name
                    &queue,
                    BasicPublishOptions::default(),
                    &payload,
                    properties,
                )
                .await
                .map_err(|e| PublishError::Transport {
                    queue: queue.clone(),
                    reason: e.to_string(),
                })?;
            confirm.await.map_err(|e| PublishError::Transport {
                queue: queue.clone(),
                reason: e.to_string(),
            })?;
            Ok::<(), PublishError>(())
        };

        tokio::time::timeout(PUBLISH_TIMEOUT, publish)
            .await
            .map_err(|_| PublishError::Timeout {
                queue: queue.clone(),
                budget: PUBLISH_TIMEOUT,
            })??;

        debug!(queue, bytes = payload.len(), "event published");

        // One-shot channel: released right after the publish.
        if let Err(err) = channel.close(200, "publish complete").await {
            debug!(error = %err, "failed to close publish channel");
        }
        Ok(())
    }
}

impl EventPublisher for AmqpPublisher {
    fn publish(
        &self,
        queue: &str,
        event: &OrderEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + '_>> {
        let queue = if queue.is_empty() {
            self.manager.default_queue().to_string()
        } else {
            queue.to_string()
        };
        // Serialize before touching the broker so an encode failure never
        // opens a channel and stays distinct from transport errors.
        let payload = event.to_bytes();

        Box::pin(async move {
            let payload = payload.map_err(|e| PublishError::Encode(e.to_string()))?;
            self.publish_inner(queue, payload).await
        })
    }
}
