//! Live-connection handler.
//!
//! `GET /ws/:client_id` upgrades to a WebSocket, greets the client,
//! registers the connection under the client's identity, then reads frames
//! until the transport errors or closes. Notifications flow the other way:
//! processing workers push through the registry, never through this loop.
//!
//! The registry entry is removed on the way out, but only if it still
//! points at this connection, so a client that reconnected meanwhile keeps
//! its fresh entry.

use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use orderline_core::{ClientConnection, ConnectionRegistry, SendError};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// First frame sent on every new connection.
pub const GREETING: &str = "connection established: order updates will follow";

/// `GET /ws/:client_id`: upgrade and hand the socket to the session loop.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn connect(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    info!(client_id, "websocket connection requested");
    ws.on_upgrade(move |socket| client_session(socket, client_id, state.registry))
}

/// The sending half of a client's socket, registered with the registry.
///
/// Writes are serialized by the mutex: notification workers may send
/// concurrently, and frames from two sends must never interleave.
struct WsClientConnection {
    sender: tokio::sync::Mutex<SplitSink<WebSocket, Message>>,
}

impl ClientConnection for WsClientConnection {
    fn send(
        &self,
        payload: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), SendError>> + Send + '_>> {
        Box::pin(async move {
            let text =
                String::from_utf8(payload).map_err(|e| SendError::Transport(e.to_string()))?;
            let mut sender = self.sender.lock().await;
            sender
                .send(Message::Text(text))
                .await
                .map_err(|e| SendError::Transport(e.to_string()))
        })
    }
}

async fn client_session(socket: WebSocket, client_id: String, registry: Arc<ConnectionRegistry>) {
    let (mut sender, mut receiver) = socket.split();

    if sender
        .send(Message::Text(GREETING.to_owned()))
        .await
        .is_err()
    {
        warn!(client_id, "client vanished before greeting");
        return;
    }

    let connection: Arc<dyn ClientConnection> = Arc::new(WsClientConnection {
        sender: tokio::sync::Mutex::new(sender),
    });
    registry.register(&client_id, Arc::clone(&connection));

    // Keep-alive loop. Inbound frames are not part of the protocol; the
    // channel exists for outbound notifications only.
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Close(_)) => {
                debug!(client_id, "client requested close");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                debug!(client_id, error = %err, "client transport error");
                break;
            }
        }
    }

    if registry.deregister(&client_id, &connection) {
        info!(client_id, "client connection deregistered");
    }
}
