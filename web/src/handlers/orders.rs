//! Order admission.
//!
//! The HTTP boundary carries no business logic: it validates that the body
//! is a JSON object, stamps the initial status, and forwards the event
//! verbatim into the pipeline. The response echoes the accepted payload;
//! everything after that is asynchronous and only visible to a client
//! listening on its WebSocket connection.

use crate::error::AppError;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use orderline_core::{OrderEvent, OrderStatus, PublishError};
use serde_json::{json, Value};
use tracing::info;

/// `POST /orders/create`
///
/// Accepts a free-form JSON object, injects `order_status = ORDERED`, and
/// publishes it to the order queue. An optional `client_id` string field
/// names the live connection that should receive the terminal notification.
///
/// # Errors
///
/// - `422 VALIDATION_ERROR` if the body is not a JSON object.
/// - `500 INTERNAL_SERVER_ERROR` if the accepted event cannot be encoded.
/// - `503 SERVICE_UNAVAILABLE` if the publish fails at admission time.
pub async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let Value::Object(mut fields) = payload else {
        return Err(AppError::validation("order payload must be a JSON object"));
    };

    let client_id = fields
        .remove("client_id")
        .and_then(|v| v.as_str().map(str::to_owned));
    // Admission always sets the initial status, whatever the caller sent.
    fields.remove("order_status");

    let event = OrderEvent {
        order_status: OrderStatus::Ordered,
        client_id,
        fields,
    };

    state
        .publisher
        .publish(&state.order_queue, &event)
        .await
        .map_err(|err| match err {
            PublishError::Encode(_) => {
                AppError::internal("failed to encode order").with_source(err.into())
            }
            _ => AppError::unavailable("failed to enqueue order").with_source(err.into()),
        })?;

    info!(queue = %state.order_queue, "order admitted");

    let accepted = serde_json::to_value(&event)
        .map_err(|err| AppError::internal("failed to render accepted order").with_source(err.into()))?;
    Ok(Json(json!({
        "statusCode": 200,
        "message": "order accepted",
        "data": accepted,
    })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use orderline_core::ConnectionRegistry;
    use orderline_testing::InMemoryPublisher;
    use std::sync::Arc;

    fn state(publisher: Arc<InMemoryPublisher>) -> AppState {
        AppState::new(
            publisher,
            Arc::new(ConnectionRegistry::new()),
            "orders",
        )
    }

    #[tokio::test]
    async fn admission_stamps_ordered_and_publishes() {
        let publisher = InMemoryPublisher::new();
        let body = json!({ "order_no": 42, "client_id": "session-9", "items": ["margherita"] });

        let response = create_order(State(state(publisher.clone())), Json(body))
            .await
            .unwrap();

        let published = publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "orders");
        assert_eq!(published[0].1.order_status, OrderStatus::Ordered);
        assert_eq!(published[0].1.client_id.as_deref(), Some("session-9"));
        assert_eq!(published[0].1.fields["order_no"], json!(42));

        assert_eq!(response.0["data"]["order_status"], "ORDERED");
        assert_eq!(response.0["data"]["order_no"], 42);
    }

    #[tokio::test]
    async fn caller_supplied_status_is_overwritten() {
        let publisher = InMemoryPublisher::new();
        let body = json!({ "order_no": 1, "order_status": "DELIVERED" });

        create_order(State(state(publisher.clone())), Json(body))
            .await
            .unwrap();

        assert_eq!(publisher.published()[0].1.order_status, OrderStatus::Ordered);
    }

    #[tokio::test]
    async fn non_object_body_is_rejected() {
        let publisher = InMemoryPublisher::new();

        let err = create_order(State(state(publisher.clone())), Json(json!([1, 2, 3])))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "[VALIDATION_ERROR] order payload must be a JSON object");
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn publish_failure_surfaces_as_unavailable() {
        let publisher = InMemoryPublisher::new();
        publisher.fail_with("broker down");

        let err = create_order(State(state(publisher)), Json(json!({ "order_no": 2 })))
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("[SERVICE_UNAVAILABLE]"));
    }
}
