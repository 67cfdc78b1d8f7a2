use super::connection::{ConnectionId, StreamConnection};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Diagnostic bookkeeping of open streams.
///
/// Only ids and open times live here; events never pass through the registry.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    active: DashMap<ConnectionId, Instant>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id for a newly accepted stream and mark it active.
    pub fn register(&self) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.active.insert(id, Instant::now());
        id
    }

    /// Forget a stream, returning how long it was open.
    pub fn remove(&self, id: ConnectionId) -> Option<Duration> {
        self.active
            .remove(&id)
            .map(|(_, opened_at)| opened_at.elapsed())
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.active.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

/// Ties a connection's lifetime to the outbound response stream.
///
/// Dropped when the client disconnects (the response body goes away), which
/// closes the connection and removes it from the registry.
pub struct ConnectionLease {
    connection: Arc<StreamConnection>,
    registry: Arc<ConnectionRegistry>,
}

impl ConnectionLease {
    pub fn new(connection: Arc<StreamConnection>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            connection,
            registry,
        }
    }

    pub fn connection(&self) -> &Arc<StreamConnection> {
        &self.connection
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        let id = self.connection.id();
        self.connection.close();
        if let Some(lifetime) = self.registry.remove(id) {
            info!(
                "Released connection {} after {:?} ({} still open)",
                id,
                lifetime,
                self.registry.len()
            );
        }
    }
}
