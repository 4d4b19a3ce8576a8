//! Live connection tracking.
//!
//! One entry per open WebSocket, keyed by connection id. Several entries may
//! share a user id (multiple tabs or devices). Entries whose transport has
//! gone away are skipped by lookups and reaped by the sweep task; stale
//! entries between those two moments are tolerated by every caller.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::info;

use acre_core::ids::{ConnectionId, UserId};

/// A registered WebSocket connection.
pub struct Connection {
    pub id: ConnectionId,
    pub user_id: UserId,
    sender: mpsc::Sender<Message>,
    connected: AtomicBool,
    last_pong: AtomicU64,
}

impl Connection {
    fn new(user_id: UserId, sender: mpsc::Sender<Message>) -> Self {
        Self {
            id: ConnectionId::new(),
            user_id,
            sender,
            connected: AtomicBool::new(true),
            last_pong: AtomicU64::new(now_secs()),
        }
    }

    /// Liveness derived from transport state: the writer task flips
    /// `connected` off when the socket errors, and the channel closes when
    /// the writer is gone.
    pub fn is_live(&self) -> bool {
        self.connected.load(Ordering::Relaxed) && !self.sender.is_closed()
    }

    pub fn mark_closed(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }

    pub fn record_pong(&self) {
        self.last_pong.store(now_secs(), Ordering::Relaxed);
    }

    /// Heartbeat-based liveness, used by the sweep task.
    pub fn is_alive(&self, client_timeout: Duration) -> bool {
        let last = self.last_pong.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < client_timeout.as_secs()
    }

    pub(crate) fn sender(&self) -> &mpsc::Sender<Message> {
        &self.sender
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Registry of all connected WebSocket clients.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection for a user; returns the connection and the
    /// receiving end its writer task drains.
    pub fn register(
        &self,
        user_id: UserId,
        max_send_queue: usize,
    ) -> (Arc<Connection>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(max_send_queue);
        let conn = Arc::new(Connection::new(user_id, tx));
        self.connections.insert(conn.id.clone(), Arc::clone(&conn));
        (conn, rx)
    }

    /// Remove a connection. Idempotent; removing an unknown id is fine.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.remove(id).map(|(_, conn)| {
            conn.mark_closed();
            conn
        })
    }

    /// All registered connections for a user whose transport is still open.
    pub fn find_live_by_user(&self, user_id: &UserId) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .filter(|entry| entry.user_id == *user_id && entry.is_live())
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Every registered connection for a user, live or not. The broadcaster
    /// uses this to reap dead entries it runs into.
    pub fn connections_for_user(&self, user_id: &UserId) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .filter(|entry| entry.user_id == *user_id)
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn has_live_for_user(&self, user_id: &UserId) -> bool {
        self.connections
            .iter()
            .any(|entry| entry.user_id == *user_id && entry.is_live())
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Drop connections whose transport closed or whose heartbeat lapsed.
    /// Presence accounting stays with the connection's own task.
    pub fn sweep_stale(&self, client_timeout: Duration) -> usize {
        let stale: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|entry| !entry.is_live() || !entry.is_alive(client_timeout))
            .map(|entry| entry.id.clone())
            .collect();

        let mut removed = 0;
        for id in stale {
            if let Some(conn) = self.remove(&id) {
                removed += 1;
                info!(connection_id = %conn.id, user_id = %conn.user_id, "swept stale connection");
            }
        }
        removed
    }
}

/// Periodically sweep stale connections.
pub fn start_sweep_task(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
    client_timeout: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // consume the immediate first tick
        loop {
            ticker.tick().await;
            let removed = registry.sweep_stale(client_timeout);
            if removed > 0 {
                info!(removed, "stale connection sweep");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(raw: &str) -> UserId {
        UserId::from_raw(raw)
    }

    #[test]
    fn register_and_remove() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.count(), 0);

        let (a, _rx_a) = registry.register(user("user_a"), 8);
        let (b, _rx_b) = registry.register(user("user_b"), 8);
        assert_eq!(registry.count(), 2);

        registry.remove(&a.id);
        assert_eq!(registry.count(), 1);

        // removing twice is not an error
        assert!(registry.remove(&a.id).is_none());
        registry.remove(&b.id);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn connection_ids_are_fresh() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = registry.register(user("user_a"), 8);
        let (b, _rx_b) = registry.register(user("user_a"), 8);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn find_live_by_user_returns_all_devices() {
        let registry = ConnectionRegistry::new();
        let (_a1, _rx1) = registry.register(user("user_a"), 8);
        let (_a2, _rx2) = registry.register(user("user_a"), 8);
        let (_b, _rx3) = registry.register(user("user_b"), 8);

        assert_eq!(registry.find_live_by_user(&user("user_a")).len(), 2);
        assert_eq!(registry.find_live_by_user(&user("user_b")).len(), 1);
        assert!(registry.find_live_by_user(&user("user_c")).is_empty());
    }

    #[test]
    fn closed_connection_is_treated_as_absent() {
        let registry = ConnectionRegistry::new();
        let (a1, _rx1) = registry.register(user("user_a"), 8);
        let (_a2, _rx2) = registry.register(user("user_a"), 8);

        a1.mark_closed();

        // still registered, but no longer live
        assert_eq!(registry.count(), 2);
        assert_eq!(registry.find_live_by_user(&user("user_a")).len(), 1);
        assert!(registry.has_live_for_user(&user("user_a")));
    }

    #[test]
    fn dropped_receiver_kills_liveness() {
        let registry = ConnectionRegistry::new();
        let (a, rx) = registry.register(user("user_a"), 8);
        assert!(a.is_live());

        drop(rx);
        assert!(!a.is_live());
        assert!(!registry.has_live_for_user(&user("user_a")));
    }

    #[test]
    fn sweep_removes_closed_connections() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = registry.register(user("user_a"), 8);
        let (_b, _rx_b) = registry.register(user("user_b"), 8);

        a.mark_closed();
        let removed = registry.sweep_stale(Duration::from_secs(90));
        assert_eq!(removed, 1);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn sweep_removes_expired_heartbeats() {
        let registry = ConnectionRegistry::new();
        let (a, _rx) = registry.register(user("user_a"), 8);
        a.last_pong.store(0, Ordering::Relaxed);

        let removed = registry.sweep_stale(Duration::from_secs(90));
        assert_eq!(removed, 1);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn fresh_connection_survives_sweep() {
        let registry = ConnectionRegistry::new();
        let (_a, _rx) = registry.register(user("user_a"), 8);
        assert_eq!(registry.sweep_stale(Duration::from_secs(90)), 0);
        assert_eq!(registry.count(), 1);
    }
}
