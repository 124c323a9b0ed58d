//! HTTP and WebSocket boundary for the order pipeline.
//!
//! Exposes three routes:
//!
//! - `POST /orders/create`: admit a new order into the pipeline
//! - `GET /ws/:client_id`: open a live connection for status notifications
//! - `GET /ping`: liveness probe
//!
//! The router is handed the pipeline seams ([`AppState`]) by the binary;
//! this crate owns no broker or processing logic.

pub mod error;
pub mod handlers;
pub mod state;

pub use error::AppError;
pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the application router with all routes and middleware.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(handlers::health::ping))
        .route("/orders/create", post(handlers::orders::create_order))
        .route("/ws/:client_id", get(handlers::live::connect))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
