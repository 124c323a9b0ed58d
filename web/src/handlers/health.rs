//! Liveness probe.

use axum::Json;
use serde_json::{json, Value};

/// `GET /ping`: confirms the process is serving requests.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn ping() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ping_pongs() {
        let Json(body) = ping().await;
        assert_eq!(body["message"], "pong");
    }
}
