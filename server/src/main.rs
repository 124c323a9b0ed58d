//! Orderline service binary.
//!
//! Wires the pieces together: dials the broker, starts the queue consumer
//! in the background, and serves the HTTP/WebSocket boundary until a
//! shutdown signal arrives.

mod config;

use anyhow::Context;
use config::Config;
use orderline_amqp::{AmqpConsumer, AmqpPublisher, ConnectionManager};
use orderline_core::{ConnectionRegistry, EventProcessor, EventPublisher, OrderProcessor};
use orderline_web::{build_router, AppState};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present; a missing file is not an error.
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "orderline=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("invalid configuration")?;
    let queue = config.broker.default_queue.clone();

    let manager = Arc::new(
        ConnectionManager::connect(config.broker.clone())
            .await
            .context("broker unreachable at startup")?,
    );
    manager
        .declare_queue(&queue)
        .await
        .context("failed to declare order queue")?;

    let publisher: Arc<dyn EventPublisher> = Arc::new(AmqpPublisher::new(Arc::clone(&manager)));
    let registry = Arc::new(ConnectionRegistry::new());
    let processor: Arc<dyn EventProcessor> = Arc::new(OrderProcessor::new(
        Arc::clone(&publisher),
        Arc::clone(&registry),
        queue.clone(),
        config.prep_delay_secs.clone(),
    ));

    let consumer = AmqpConsumer::new(Arc::clone(&manager), config.max_in_flight);
    let consumer_queue = queue.clone();
    tokio::spawn(async move {
        if let Err(err) = consumer.run(&consumer_queue, processor).await {
            error!(error = %err, "consumer stopped");
        }
    });

    let state = AppState::new(publisher, registry, queue);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;
    info!(addr = %config.bind_addr(), "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    manager.close().await;
    info!("shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => error!(error = %err, "failed to install sigterm handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("ctrl-c received, shutting down"),
        () = terminate => info!("sigterm received, shutting down"),
    }
}
