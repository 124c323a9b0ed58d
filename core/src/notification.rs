//! Outbound notification payloads for live clients.
//!
//! Broadcasts are tagged JSON envelopes, so a client can dispatch on the
//! `type` field:
//!
//! ```json
//! { "type": "order_delivered", "order": { "order_status": "DELIVERED", "order_no": 42 } }
//! { "type": "order_cancelled", "order": { "order_status": "CANCELLED" }, "message": "..." }
//! ```

use crate::event::{EventError, OrderEvent};
use serde::{Deserialize, Serialize};

/// A notification pushed to a live client over its registered connection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// The order completed; `order` carries the full event with
    /// `order_status` set to `DELIVERED`.
    OrderDelivered {
        /// The completed event.
        order: OrderEvent,
    },

    /// The order could not be advanced; `order` carries the event with
    /// `order_status` set to `CANCELLED`.
    OrderCancelled {
        /// The failed event.
        order: OrderEvent,
        /// Human-readable cause.
        message: String,
    },
}

impl Notification {
    /// Encode to the JSON payload written to the client connection.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Encode`] if the embedded event cannot be
    /// serialized.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(EventError::Encode)
    }
}
