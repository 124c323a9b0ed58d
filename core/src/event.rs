//! Order event model and wire encoding.
//!
//! Every message on the broker queue is a UTF-8 JSON object with a required
//! `order_status` key. All other keys (order number, item list, ...) are
//! free-form and pass through the pipeline unmodified.
//!
//! # Wire Format
//!
//! ```json
//! {
//!   "order_status": "ORDERED",
//!   "client_id": "session-42",
//!   "order_no": 42,
//!   "items": ["margherita"]
//! }
//! ```
//!
//! `client_id` identifies the live connection that should receive the
//! terminal notification for this order. It is injected at admission time
//! and carried through every re-publication.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Errors raised while encoding or decoding an [`OrderEvent`].
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize the event to its JSON wire form.
    #[error("failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),

    /// The payload was not a valid encoding of an order event
    /// (malformed JSON, not an object, or missing/invalid `order_status`).
    #[error("failed to decode event: {0}")]
    Decode(#[source] serde_json::Error),
}

/// The processing stage of an order.
///
/// The closed enumeration drives the pipeline state machine:
///
/// ```text
/// ORDERED ──> PREPARING ──> PREPARED ──> DELIVERED
///     │            │
///     └────────────┴──────> CANCELLED   (unrecoverable publish failure)
/// ```
///
/// `DELIVERED` and `CANCELLED` are terminal: an event carrying either is
/// never re-published.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Freshly admitted, waiting to be picked up.
    Ordered,
    /// Being worked on (the stage with the simulated delay).
    Preparing,
    /// Work finished, awaiting delivery notification.
    Prepared,
    /// Terminal success.
    Delivered,
    /// Terminal failure.
    Cancelled,
}

impl OrderStatus {
    /// Whether this status ends the event's lifecycle.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// The wire representation of this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ordered => "ORDERED",
            Self::Preparing => "PREPARING",
            Self::Prepared => "PREPARED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work flowing through the pipeline.
///
/// Ownership transfers at every hand-off: publisher → queue → consumer →
/// processor → publisher/registry. The processor overwrites `order_status`
/// exactly once per stage and re-publishes a new copy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderEvent {
    /// Current processing stage. Required on the wire.
    pub order_status: OrderStatus,

    /// Identity of the live connection that owns this order, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// All remaining fields, passed through opaquely.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl OrderEvent {
    /// Create an event with the given status and no extra fields.
    #[must_use]
    pub fn new(order_status: OrderStatus) -> Self {
        Self {
            order_status,
            client_id: None,
            fields: Map::new(),
        }
    }

    /// Attach a client identity.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Attach a free-form field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Encode to the JSON wire payload.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Encode`] if a free-form field cannot be
    /// serialized.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(EventError::Encode)
    }

    /// Decode from a queue delivery payload.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Decode`] for malformed JSON, a non-object
    /// payload, or a missing/unknown `order_status` value.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EventError> {
        serde_json::from_slice(bytes).map_err(EventError::Decode)
    }
}
