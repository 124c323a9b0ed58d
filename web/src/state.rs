//! Application state shared across HTTP and WebSocket handlers.

use orderline_core::{ConnectionRegistry, EventPublisher};
use std::sync::Arc;

/// Shared state injected into every handler.
///
/// Holds the pipeline seams the boundary needs: the publisher for order
/// admission and the registry the WebSocket handler populates. Both are
/// trait objects so tests can swap in the in-memory doubles.
#[derive(Clone)]
pub struct AppState {
    /// Publishes admitted orders into the pipeline.
    pub publisher: Arc<dyn EventPublisher>,
    /// Directory of live client connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Queue new orders are published to.
    pub order_queue: String,
}

impl AppState {
    /// Create the shared state.
    #[must_use]
    pub fn new(
        publisher: Arc<dyn EventPublisher>,
        registry: Arc<ConnectionRegistry>,
        order_queue: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            registry,
            order_queue: order_queue.into(),
        }
    }
}
