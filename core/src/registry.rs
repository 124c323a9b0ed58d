//! Live-connection registry.
//!
//! Maps a client identity to its live outbound connection so processing
//! workers can push notifications out-of-band from the queue. The registry
//! is the only shared mutable state in the pipeline besides the broker
//! connection itself, so all access is serialized here.
//!
//! # Semantics
//!
//! - At most one connection per client identity; registering again
//!   overwrites (last writer wins).
//! - `send` to an unregistered identity is a successful no-op. The client
//!   may simply have disconnected, and the pipeline must not care.
//! - Entries are removed by whoever owns the inbound accept loop (the
//!   WebSocket handler), never by the registry itself.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Errors raised while writing to a live connection.
#[derive(Error, Debug)]
pub enum SendError {
    /// The payload was not valid UTF-8 or the transport write failed.
    #[error("connection write failed: {0}")]
    Transport(String),

    /// The connection is closed.
    #[error("connection closed")]
    Closed,
}

/// One live duplex connection, as seen from the sending side.
///
/// Implementations must serialize their own writes: `send` may be called
/// concurrently from many processing workers, and bytes from two calls must
/// never interleave on the wire.
pub trait ClientConnection: Send + Sync {
    /// Write one complete payload to the client.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] if the transport write fails or the
    /// connection has closed.
    fn send(
        &self,
        payload: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), SendError>> + Send + '_>>;
}

/// Concurrency-safe directory of live client connections.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<dyn ClientConnection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or overwrite the connection for `client_id`.
    pub fn register(&self, client_id: impl Into<String>, connection: Arc<dyn ClientConnection>) {
        let client_id = client_id.into();
        let mut map = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let replaced = map.insert(client_id.clone(), connection).is_some();
        drop(map);
        tracing::info!(client_id, replaced, "client connection registered");
    }

    /// Look up the live connection for `client_id`.
    #[must_use]
    pub fn lookup(&self, client_id: &str) -> Option<Arc<dyn ClientConnection>> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(client_id)
            .cloned()
    }

    /// Remove the entry for `client_id`, but only if it still maps to
    /// `connection`. Returns whether an entry was removed.
    ///
    /// The guard prevents a closing connection from evicting a newer one
    /// registered under the same identity in the meantime.
    pub fn deregister(&self, client_id: &str, connection: &Arc<dyn ClientConnection>) -> bool {
        let mut map = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match map.get(client_id) {
            Some(current) if Arc::ptr_eq(current, connection) => {
                map.remove(client_id);
                true
            }
            _ => false,
        }
    }

    /// Send `payload` to the client registered under `client_id`.
    ///
    /// An unregistered identity is a successful no-op: the notification is
    /// fire-and-forget toward a possibly-disconnected client. The registry
    /// lock is released before the write is awaited, so a slow client never
    /// blocks registration.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] only if a registered connection's transport
    /// write fails.
    pub async fn send(&self, client_id: &str, payload: Vec<u8>) -> Result<(), SendError> {
        let Some(connection) = self.lookup(client_id) else {
            tracing::debug!(client_id, "no live connection, dropping notification");
            return Ok(());
        };
        connection.send(payload).await
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct StubConnection {
        sent: Mutex<Vec<Vec<u8>>>,
        fail: bool,
    }

    impl StubConnection {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        fn sent(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl ClientConnection for StubConnection {
        fn send(
            &self,
            payload: Vec<u8>,
        ) -> Pin<Box<dyn Future<Output = Result<(), SendError>> + Send + '_>> {
            Box::pin(async move {
                if self.fail {
                    return Err(SendError::Closed);
                }
                self.sent.lock().unwrap().push(payload);
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn register_then_send_delivers_bytes() {
        let registry = ConnectionRegistry::new();
        let conn = StubConnection::new();
        registry.register("pizza", conn.clone() as Arc<dyn ClientConnection>);

        registry.send("pizza", b"hello".to_vec()).await.unwrap();

        assert_eq!(conn.sent(), vec![b"hello".to_vec()]);
    }

    #[tokio::test]
    async fn send_to_unregistered_client_is_a_noop() {
        let registry = ConnectionRegistry::new();
        registry.send("ghost", b"hello".to_vec()).await.unwrap();
    }

    #[tokio::test]
    async fn send_surfaces_transport_failure() {
        let registry = ConnectionRegistry::new();
        registry.register("pizza", StubConnection::failing() as Arc<dyn ClientConnection>);

        let err = registry.send("pizza", b"hello".to_vec()).await.unwrap_err();
        assert!(matches!(err, SendError::Closed));
    }

    #[tokio::test]
    async fn reregistration_overwrites() {
        let registry = ConnectionRegistry::new();
        let first = StubConnection::new();
        let second = StubConnection::new();
        registry.register("pizza", first.clone() as Arc<dyn ClientConnection>);
        registry.register("pizza", second.clone() as Arc<dyn ClientConnection>);

        registry.send("pizza", b"late".to_vec()).await.unwrap();

        assert!(first.sent().is_empty());
        assert_eq!(second.sent(), vec![b"late".to_vec()]);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn deregister_is_guarded_by_identity() {
        let registry = ConnectionRegistry::new();
        let stale: Arc<dyn ClientConnection> = StubConnection::new();
        let fresh: Arc<dyn ClientConnection> = StubConnection::new();

        registry.register("pizza", stale.clone());
        registry.register("pizza", fresh.clone());

        // The stale connection's accept loop fires after the overwrite.
        assert!(!registry.deregister("pizza", &stale));
        assert_eq!(registry.len(), 1);

        assert!(registry.deregister("pizza", &fresh));
        assert!(registry.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_register_and_send_do_not_corrupt_state() {
        let registry = Arc::new(ConnectionRegistry::new());
        let conn = StubConnection::new();
        registry.register("shared", conn.clone() as Arc<dyn ClientConnection>);

        let mut tasks = Vec::new();
        for i in 0..32u32 {
            let registry = Arc::clone(&registry);
            let conn = conn.clone();
            tasks.push(tokio::spawn(async move {
                if i % 4 == 0 {
                    registry.register("shared", conn as Arc<dyn ClientConnection>);
                } else {
                    registry
                        .send("shared", i.to_be_bytes().to_vec())
                        .await
                        .unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        // Every non-register task delivered exactly one intact payload.
        let sent = conn.sent();
        assert_eq!(sent.len(), 24);
        assert!(sent.iter().all(|p| p.len() == 4));
        assert_eq!(registry.len(), 1);
    }
}
