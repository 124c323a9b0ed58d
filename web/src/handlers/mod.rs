//! HTTP and WebSocket request handlers.

pub mod health;
pub mod live;
pub mod orders;
