//! In-memory test doubles for the Orderline pipeline.
//!
//! Nothing here talks to a broker or a socket. The doubles implement the
//! core traits so the state machine, the web handlers, and full pipeline
//! scenarios can be exercised synchronously in-process:
//!
//! - [`mocks::InMemoryPublisher`] records publishes and optionally fails them.
//! - [`mocks::RecordingConnection`] is a [`ClientConnection`] that captures
//!   every payload sent to it.
//! - [`mocks::InMemoryQueue`] is a FIFO standing in for the broker queue,
//!   with a drive loop that mimics the consumer's ack/requeue decision.
//!
//! [`ClientConnection`]: orderline_core::ClientConnection

#![forbid(unsafe_code)]
// Test-support code may panic on poisoned locks; that is a test failure,
// not a production concern.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::missing_panics_doc)]

/// Stateful doubles for the pipeline's seams.
pub mod mocks {
    use orderline_core::{
        ClientConnection, EventProcessor, EventPublisher, OrderEvent, PublishError, SendError,
    };
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};

    /// Records every `(queue, event)` publish. Can be switched into a
    /// failing mode to exercise the cancellation path.
    #[derive(Default)]
    pub struct InMemoryPublisher {
        published: Mutex<Vec<(String, OrderEvent)>>,
        fail_reason: Mutex<Option<String>>,
    }

    impl InMemoryPublisher {
        /// Create a recording publisher.
        #[must_use]
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Make every subsequent publish fail with a transport error.
        pub fn fail_with(&self, reason: impl Into<String>) {
            *self.fail_reason.lock().unwrap() = Some(reason.into());
        }

        /// Clear the failing mode.
        pub fn recover(&self) {
            *self.fail_reason.lock().unwrap() = None;
        }

        /// Everything published so far, in order.
        #[must_use]
        pub fn published(&self) -> Vec<(String, OrderEvent)> {
            self.published.lock().unwrap().clone()
        }

        /// The sequence of published statuses, for lineage assertions.
        #[must_use]
        pub fn statuses(&self) -> Vec<orderline_core::OrderStatus> {
            self.published
                .lock()
                .unwrap()
                .iter()
                .map(|(_, event)| event.order_status)
                .collect()
        }
    }

    impl EventPublisher for InMemoryPublisher {
        fn publish(
            &self,
            queue: &str,
            event: &OrderEvent,
        ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + '_>> {
            let queue = queue.to_string();
            let event = event.clone();
            Box::pin(async move {
                if let Some(reason) = self.fail_reason.lock().unwrap().clone() {
                    return Err(PublishError::Transport { queue, reason });
                }
                self.published.lock().unwrap().push((queue, event));
                Ok(())
            })
        }
    }

    /// A live connection that captures sent payloads instead of writing to
    /// a socket.
    #[derive(Default)]
    pub struct RecordingConnection {
        sent: Mutex<Vec<Vec<u8>>>,
        closed: Mutex<bool>,
    }

    impl RecordingConnection {
        /// Create a recording connection.
        #[must_use]
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Make subsequent sends fail as if the transport had closed.
        pub fn close(&self) {
            *self.closed.lock().unwrap() = true;
        }

        /// Raw payloads sent so far.
        #[must_use]
        pub fn sent(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().clone()
        }

        /// Sent payloads parsed as JSON, for structural assertions.
        #[must_use]
        pub fn sent_json(&self) -> Vec<serde_json::Value> {
            self.sent()
                .iter()
                .map(|payload| serde_json::from_slice(payload).unwrap())
                .collect()
        }
    }

    impl ClientConnection for RecordingConnection {
        fn send(
            &self,
            payload: Vec<u8>,
        ) -> Pin<Box<dyn Future<Output = Result<(), SendError>> + Send + '_>> {
            Box::pin(async move {
                if *self.closed.lock().unwrap() {
                    return Err(SendError::Closed);
                }
                self.sent.lock().unwrap().push(payload);
                Ok(())
            })
        }
    }

    /// A FIFO queue standing in for the broker, so the processor's
    /// re-publications re-enter the same loop they came from.
    ///
    /// `drive` mimics the consumer contract: pop a delivery, run the
    /// processor, drop it on success (ack) or push it back on failure
    /// (nack with requeue).
    #[derive(Default)]
    pub struct InMemoryQueue {
        deliveries: Mutex<VecDeque<Vec<u8>>>,
        history: Mutex<Vec<OrderEvent>>,
    }

    impl InMemoryQueue {
        /// Create an empty queue.
        #[must_use]
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Enqueue a raw payload (use for malformed wire bytes).
        pub fn push_raw(&self, payload: Vec<u8>) {
            self.deliveries.lock().unwrap().push_back(payload);
        }

        /// Pop the next delivery, if any.
        #[must_use]
        pub fn pop(&self) -> Option<Vec<u8>> {
            self.deliveries.lock().unwrap().pop_front()
        }

        /// Number of pending deliveries.
        #[must_use]
        pub fn len(&self) -> usize {
            self.deliveries.lock().unwrap().len()
        }

        /// Whether the queue holds no deliveries.
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        /// Every event published through this queue, in publish order.
        /// Raw pushes are not recorded.
        #[must_use]
        pub fn published_events(&self) -> Vec<OrderEvent> {
            self.history.lock().unwrap().clone()
        }

        /// Process up to `limit` deliveries through `processor`, requeueing
        /// failures. Returns the number of deliveries handed out. The limit
        /// keeps tests of permanently failing messages from looping
        /// forever.
        pub async fn drive(&self, processor: &dyn EventProcessor, limit: usize) -> usize {
            let mut handled = 0;
            while handled < limit {
                let Some(payload) = self.pop() else { break };
                if processor.process(&payload).await.is_err() {
                    self.push_raw(payload);
                }
                handled += 1;
            }
            handled
        }
    }

    impl EventPublisher for InMemoryQueue {
        fn publish(
            &self,
            _queue: &str,
            event: &OrderEvent,
        ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + '_>> {
            let payload = event.to_bytes();
            let event = event.clone();
            Box::pin(async move {
                let payload = payload.map_err(|e| PublishError::Encode(e.to_string()))?;
                self.history.lock().unwrap().push(event);
                self.push_raw(payload);
                Ok(())
            })
        }
    }
}

pub use mocks::{InMemoryPublisher, InMemoryQueue, RecordingConnection};
