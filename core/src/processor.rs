//! The order state machine.
//!
//! The processor is re-entered on every queue delivery, including echoes of
//! its own re-published output. Given one decoded event it performs exactly
//! one action:
//!
//! | Current status | Action | Next status |
//! |---|---|---|
//! | `ORDERED`   | re-publish to the same queue       | `PREPARING` |
//! | `PREPARING` | hold for a bounded random delay, re-publish | `PREPARED` |
//! | `PREPARED`  | broadcast completion notification  | `DELIVERED` (terminal) |
//! | terminal    | log and drop                       | unchanged |
//!
//! A publish failure on the first two arms broadcasts an error notification
//! (status `CANCELLED`) to the order's client and reports the failure, which
//! makes the consumer nack the delivery with requeue. Exactly one
//! acknowledgment decision is derived from each `process` call.

use crate::event::{OrderEvent, OrderStatus};
use crate::notification::Notification;
use crate::publisher::{EventPublisher, PublishError};
use crate::registry::ConnectionRegistry;
use rand::Rng;
use std::future::Future;
use std::ops::RangeInclusive;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors reported back to the consumer for its acknowledgment decision.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The delivery payload was not a valid order event. The delivery is
    /// requeued, so a permanently malformed payload is redelivered
    /// indefinitely (known limitation; no dead-letter routing).
    #[error("failed to decode delivery payload: {0}")]
    Decode(String),

    /// Re-publication of the advanced event failed.
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// The terminal notification could not be written to the client.
    #[error("broadcast to client '{client_id}' failed: {reason}")]
    Broadcast {
        /// The client the notification was addressed to.
        client_id: String,
        /// Underlying cause.
        reason: String,
    },
}

/// Processes one delivery payload and reports the acknowledgment decision.
///
/// `Ok` means the delivery may be permanently removed from the queue; `Err`
/// means it must be negatively acknowledged with requeue.
pub trait EventProcessor: Send + Sync {
    /// Decode and act on one delivery payload.
    ///
    /// # Errors
    ///
    /// Returns a [`ProcessError`] when the payload cannot be decoded or the
    /// stage action fails; the caller must requeue the delivery.
    fn process(
        &self,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), ProcessError>> + Send + '_>>;
}

/// The pipeline's state machine over a publisher and the live-connection
/// registry.
pub struct OrderProcessor {
    publisher: Arc<dyn EventPublisher>,
    registry: Arc<ConnectionRegistry>,
    queue: String,
    prep_delay_secs: RangeInclusive<u64>,
}

impl OrderProcessor {
    /// Default inclusive range, in whole seconds, for the simulated
    /// preparation delay.
    pub const DEFAULT_PREP_DELAY_SECS: RangeInclusive<u64> = 1..=6;

    /// Create a processor that re-publishes to `queue`.
    #[must_use]
    pub fn new(
        publisher: Arc<dyn EventPublisher>,
        registry: Arc<ConnectionRegistry>,
        queue: impl Into<String>,
        prep_delay_secs: RangeInclusive<u64>,
    ) -> Self {
        Self {
            publisher,
            registry,
            queue: queue.into(),
            prep_delay_secs,
        }
    }

    async fn run(&self, event: OrderEvent) -> Result<(), ProcessError> {
        match event.order_status {
            OrderStatus::Ordered => self.advance(event, OrderStatus::Preparing).await,
            OrderStatus::Preparing => {
                self.hold_for_preparation().await;
                self.advance(event, OrderStatus::Prepared).await
            }
            OrderStatus::Prepared => self.deliver(event).await,
            status => {
                debug!(%status, "terminal status, dropping event");
                Ok(())
            }
        }
    }

    /// Overwrite the status and re-publish. On failure the client is told
    /// the order is cancelled before the error propagates.
    async fn advance(&self, mut event: OrderEvent, next: OrderStatus) -> Result<(), ProcessError> {
        let previous = event.order_status;
        event.order_status = next;

        if let Err(err) = self.publisher.publish(&self.queue, &event).await {
            error!(from = %previous, to = %next, error = %err, "failed to re-publish order");
            self.broadcast_cancellation(event, &err).await;
            return Err(err.into());
        }

        info!(from = %previous, to = %next, "order advanced");
        Ok(())
    }

    /// Suspend this worker for a uniformly random whole-second duration.
    /// No shared lock is held across the suspension, and there is no
    /// cancellation path: the delay always runs to completion.
    async fn hold_for_preparation(&self) {
        let secs = rand::thread_rng().gen_range(self.prep_delay_secs.clone());
        debug!(secs, "holding order for preparation");
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    /// Terminal success: no re-publish, broadcast the completed event to the
    /// client that owns the order.
    async fn deliver(&self, mut event: OrderEvent) -> Result<(), ProcessError> {
        event.order_status = OrderStatus::Delivered;

        let Some(client_id) = event.client_id.clone() else {
            warn!("delivered order carries no client id, dropping notification");
            return Ok(());
        };

        let payload = Notification::OrderDelivered { order: event }
            .to_bytes()
            .map_err(|e| ProcessError::Broadcast {
                client_id: client_id.clone(),
                reason: e.to_string(),
            })?;

        self.registry
            .send(&client_id, payload)
            .await
            .map_err(|e| ProcessError::Broadcast {
                client_id: client_id.clone(),
                reason: e.to_string(),
            })?;

        info!(client_id, "order delivered, client notified");
        Ok(())
    }

    /// Fire-and-forget error notification. Never escalated: a missing or
    /// broken client connection must not mask the original publish failure.
    async fn broadcast_cancellation(&self, mut event: OrderEvent, cause: &PublishError) {
        event.order_status = OrderStatus::Cancelled;

        let Some(client_id) = event.client_id.clone() else {
            return;
        };

        let notification = Notification::OrderCancelled {
            order: event,
            message: cause.to_string(),
        };
        match notification.to_bytes() {
            Ok(payload) => {
                if let Err(err) = self.registry.send(&client_id, payload).await {
                    warn!(client_id, error = %err, "failed to broadcast cancellation");
                }
            }
            Err(err) => warn!(client_id, error = %err, "failed to encode cancellation"),
        }
    }
}

impl EventProcessor for OrderProcessor {
    fn process(
        &self,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), ProcessError>> + Send + '_>> {
        let decoded = OrderEvent::from_bytes(payload);
        Box::pin(async move {
            let event = decoded.map_err(|e| {
                warn!(error = %e, "rejecting undecodable delivery");
                ProcessError::Decode(e.to_string())
            })?;
            self.run(event).await
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::registry::{ClientConnection, SendError};
    use serde_json::json;
    use std::sync::Mutex;

    /// Records publishes; optionally fails them all.
    struct StubPublisher {
        published: Mutex<Vec<(String, OrderEvent)>>,
        fail: bool,
    }

    impl StubPublisher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                published: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                published: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        fn published(&self) -> Vec<(String, OrderEvent)> {
            self.published.lock().unwrap().clone()
        }
    }

    impl EventPublisher for StubPublisher {
        fn publish(
            &self,
            queue: &str,
            event: &OrderEvent,
        ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + '_>> {
            let queue = queue.to_string();
            let event = event.clone();
            Box::pin(async move {
                if self.fail {
                    return Err(PublishError::Transport {
                        queue,
                        reason: "broker down".to_string(),
                    });
                }
                self.published.lock().unwrap().push((queue, event));
                Ok(())
            })
        }
    }

    struct StubConnection {
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl StubConnection {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent_json(&self) -> Vec<serde_json::Value> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|p| serde_json::from_slice(p).unwrap())
                .collect()
        }
    }

    impl ClientConnection for StubConnection {
        fn send(
            &self,
            payload: Vec<u8>,
        ) -> Pin<Box<dyn Future<Output = Result<(), SendError>> + Send + '_>> {
            Box::pin(async move {
                self.sent.lock().unwrap().push(payload);
                Ok(())
            })
        }
    }

    fn processor(
        publisher: Arc<StubPublisher>,
        registry: Arc<ConnectionRegistry>,
    ) -> OrderProcessor {
        OrderProcessor::new(publisher, registry, "orders", 1..=1)
    }

    fn payload(status: OrderStatus) -> Vec<u8> {
        OrderEvent::new(status)
            .with_client_id("client-1")
            .with_field("order_no", json!(42))
            .to_bytes()
            .unwrap()
    }

    #[tokio::test]
    async fn ordered_republishes_as_preparing() {
        let publisher = StubPublisher::new();
        let registry = Arc::new(ConnectionRegistry::new());
        let proc = processor(publisher.clone(), registry);

        proc.process(&payload(OrderStatus::Ordered)).await.unwrap();

        let published = publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "orders");
        assert_eq!(published[0].1.order_status, OrderStatus::Preparing);
        assert_eq!(published[0].1.fields["order_no"], json!(42));
    }

    #[tokio::test(start_paused = true)]
    async fn preparing_holds_then_republishes_as_prepared() {
        let publisher = StubPublisher::new();
        let registry = Arc::new(ConnectionRegistry::new());
        let proc = processor(publisher.clone(), registry);

        proc.process(&payload(OrderStatus::Preparing))
            .await
            .unwrap();

        let published = publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].1.order_status, OrderStatus::Prepared);
    }

    #[tokio::test]
    async fn prepared_broadcasts_delivered_without_republishing() {
        let publisher = StubPublisher::new();
        let registry = Arc::new(ConnectionRegistry::new());
        let conn = StubConnection::new();
        registry.register("client-1", conn.clone() as Arc<dyn ClientConnection>);
        let proc = processor(publisher.clone(), registry);

        proc.process(&payload(OrderStatus::Prepared)).await.unwrap();

        assert!(publisher.published().is_empty());
        let sent = conn.sent_json();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["type"], "order_delivered");
        assert_eq!(sent[0]["order"]["order_status"], "DELIVERED");
        assert_eq!(sent[0]["order"]["order_no"], 42);
    }

    #[tokio::test]
    async fn terminal_statuses_are_dropped() {
        let publisher = StubPublisher::new();
        let registry = Arc::new(ConnectionRegistry::new());
        let proc = processor(publisher.clone(), registry);

        proc.process(&payload(OrderStatus::Delivered))
            .await
            .unwrap();
        proc.process(&payload(OrderStatus::Cancelled))
            .await
            .unwrap();

        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_reports_decode_error() {
        let publisher = StubPublisher::new();
        let registry = Arc::new(ConnectionRegistry::new());
        let proc = processor(publisher.clone(), registry);

        let err = proc.process(b"{\"order_no\": 42}").await.unwrap_err();
        assert!(matches!(err, ProcessError::Decode(_)));

        let err = proc.process(b"not json").await.unwrap_err();
        assert!(matches!(err, ProcessError::Decode(_)));
    }

    #[tokio::test]
    async fn publish_failure_broadcasts_cancellation_and_reports_failure() {
        let publisher = StubPublisher::failing();
        let registry = Arc::new(ConnectionRegistry::new());
        let conn = StubConnection::new();
        registry.register("client-1", conn.clone() as Arc<dyn ClientConnection>);
        let proc = processor(publisher, registry);

        let err = proc
            .process(&payload(OrderStatus::Ordered))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Publish(_)));

        let sent = conn.sent_json();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["type"], "order_cancelled");
        assert_eq!(sent[0]["order"]["order_status"], "CANCELLED");
    }

    #[tokio::test]
    async fn delivered_without_client_id_is_dropped_quietly() {
        let publisher = StubPublisher::new();
        let registry = Arc::new(ConnectionRegistry::new());
        let proc = processor(publisher, registry);

        let payload = OrderEvent::new(OrderStatus::Prepared).to_bytes().unwrap();
        proc.process(&payload).await.unwrap();
    }

    #[tokio::test]
    async fn delivered_to_unregistered_client_is_fire_and_forget() {
        let publisher = StubPublisher::new();
        let registry = Arc::new(ConnectionRegistry::new());
        let proc = processor(publisher, registry);

        // client-1 never connected; send is a no-op, processing succeeds.
        proc.process(&payload(OrderStatus::Prepared)).await.unwrap();
    }
}
