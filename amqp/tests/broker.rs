//! Contract tests against a live RabbitMQ broker.
//!
//! Ignored by default so the suite stays hermetic. Run them with a broker
//! listening on the default local port:
//!
//! ```text
//! cargo test -p orderline-amqp -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use orderline_amqp::{AmqpPublisher, BrokerConfig, ConnectionManager};
use orderline_core::{EventPublisher, OrderEvent, OrderStatus};
use serde_json::json;
use std::sync::Arc;

fn local_config() -> BrokerConfig {
    BrokerConfig {
        host: "localhost".to_string(),
        port: 5672,
        username: "guest".to_string(),
        password: "guest".to_string(),
        default_queue: "orderline-contract".to_string(),
    }
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn redeclaring_a_queue_with_identical_properties_succeeds() {
    let manager = ConnectionManager::connect(local_config()).await.unwrap();

    manager
        .declare_queue("orderline-contract-declare")
        .await
        .unwrap();
    // Identical properties: the broker treats the second declaration as an
    // assertion, not a conflict.
    manager
        .declare_queue("orderline-contract-declare")
        .await
        .unwrap();

    manager.close().await;
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn publish_round_trips_through_a_declared_queue() {
    let manager = Arc::new(ConnectionManager::connect(local_config()).await.unwrap());
    manager
        .declare_queue("orderline-contract-publish")
        .await
        .unwrap();

    let publisher = AmqpPublisher::new(Arc::clone(&manager));
    let event = OrderEvent::new(OrderStatus::Ordered).with_field("order_no", json!(42));
    publisher
        .publish("orderline-contract-publish", &event)
        .await
        .unwrap();

    manager.close().await;
}
