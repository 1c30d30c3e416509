//! Registry of live connections, keyed by [`ConnectionId`].
//!
//! Each entry holds what the server needs to reach one connection from the
//! outside: its peer address and its outbound sender.  Nothing is shared
//! between entries, so one slow or misbehaving client cannot hold up another.
//!
//! The registry also remembers whether the server is closing its connections.
//! Both the close request and each registration take the same lock, so every
//! connection is told about a close exactly once: either it was already
//! registered and appears in [`ConnectionRegistry::begin_close`]'s snapshot,
//! or it registers afterwards and [`ConnectionRegistry::insert`] hands it the
//! pending close code.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::RwLock;
use wt_core::{CloseCode, ConnectionId};

use super::outbound::OutboundSender;

/// Everything the server keeps about one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub peer_addr: SocketAddr,
    pub sender: OutboundSender,
}

#[derive(Debug, Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    closing: Option<CloseCode>,
}

/// Shared map of live connections.  Cloning shares the same map.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<RegistryState>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection.
    ///
    /// Returns the close code the connection must be closed with when
    /// [`begin_close`](Self::begin_close) has already been called.
    pub async fn insert(&self, id: ConnectionId, entry: ConnectionEntry) -> Option<CloseCode> {
        let mut state = self.inner.write().await;
        state.connections.insert(id, entry);
        state.closing
    }

    pub async fn remove(&self, id: ConnectionId) -> Option<ConnectionEntry> {
        self.inner.write().await.connections.remove(&id)
    }

    /// Returns the outbound sender of `id`, if it is still connected.
    pub async fn sender(&self, id: ConnectionId) -> Option<OutboundSender> {
        self.inner
            .read()
            .await
            .connections
            .get(&id)
            .map(|e| e.sender.clone())
    }

    /// Marks the registry as closing with `code` and returns a snapshot of
    /// every connection registered so far.
    ///
    /// Returns `None` if a close was already requested; those connections
    /// have been handed a code once and must not get another.
    ///
    /// The lock is released before returning, so callers can await sends
    /// without blocking registrations.
    pub async fn begin_close(&self, code: CloseCode) -> Option<Vec<(ConnectionId, ConnectionEntry)>> {
        let mut state = self.inner.write().await;
        if state.closing.is_some() {
            return None;
        }
        state.closing = Some(code);
        Some(
            state
                .connections
                .iter()
                .map(|(id, e)| (*id, e.clone()))
                .collect(),
        )
    }

    /// The close code requested by [`begin_close`](Self::begin_close), if any.
    pub async fn closing(&self) -> Option<CloseCode> {
        self.inner.read().await.closing
    }

    pub async fn ids(&self) -> Vec<ConnectionId> {
        self.inner.read().await.connections.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn entry(id: ConnectionId) -> ConnectionEntry {
        let (sender, _rx) = OutboundSender::channel(id);
        ConnectionEntry {
            peer_addr: "127.0.0.1:5000".parse().unwrap(),
            sender,
        }
    }

    #[tokio::test]
    async fn test_insert_then_lookup() {
        // Arrange
        let registry = ConnectionRegistry::new();
        let id = Uuid::new_v4();

        // Act
        let pending = registry.insert(id, entry(id)).await;

        // Assert
        assert_eq!(pending, None);
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.sender(id).await.map(|s| s.connection()), Some(id));
    }

    #[tokio::test]
    async fn test_remove_forgets_connection() {
        let registry = ConnectionRegistry::new();
        let id = Uuid::new_v4();
        registry.insert(id, entry(id)).await;

        assert!(registry.remove(id).await.is_some());
        assert!(registry.sender(id).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_ids_lists_every_connection() {
        let registry = ConnectionRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        registry.insert(a, entry(a)).await;
        registry.insert(b, entry(b)).await;

        let mut ids = registry.ids().await;
        ids.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_clones_share_the_same_map() {
        let registry = ConnectionRegistry::new();
        let clone = registry.clone();
        let id = Uuid::new_v4();

        clone.insert(id, entry(id)).await;

        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_begin_close_snapshots_registered_connections() {
        // Arrange
        let registry = ConnectionRegistry::new();
        let id = Uuid::new_v4();
        registry.insert(id, entry(id)).await;

        // Act
        let snapshot = registry.begin_close(CloseCode(4000)).await.unwrap();

        // Assert
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].0, id);
        assert_eq!(snapshot[0].1.peer_addr.port(), 5000);
        assert_eq!(registry.closing().await, Some(CloseCode(4000)));
    }

    #[tokio::test]
    async fn test_connection_registered_after_close_gets_the_code() {
        // Arrange
        let registry = ConnectionRegistry::new();
        registry.begin_close(CloseCode(4000)).await;
        let late = Uuid::new_v4();

        // Act
        let pending = registry.insert(late, entry(late)).await;

        // Assert
        assert_eq!(pending, Some(CloseCode(4000)));
    }

    #[tokio::test]
    async fn test_second_close_request_returns_nothing() {
        let registry = ConnectionRegistry::new();
        let id = Uuid::new_v4();
        registry.insert(id, entry(id)).await;

        assert!(registry.begin_close(CloseCode(4000)).await.is_some());
        assert!(registry.begin_close(CloseCode(4001)).await.is_none());
        assert_eq!(registry.closing().await, Some(CloseCode(4000)));
    }
}
