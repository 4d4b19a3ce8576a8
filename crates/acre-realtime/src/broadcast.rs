//! Fan-out of one message to every interested live connection.
//!
//! The audience comes from the presence cache, the transports from the
//! connection registry. The envelope is serialized exactly once; the same
//! bytes go to every recipient. Sends run concurrently, each bounded by a
//! timeout.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use futures::future::join_all;
use serde_json::Value;
use tracing::warn;

use acre_core::ids::UserId;
use acre_core::protocol::{Envelope, USERS_STATUS};

use crate::presence::PresenceCache;
use crate::registry::{Connection, ConnectionRegistry};

pub struct Broadcaster {
    presence: Arc<PresenceCache>,
    registry: Arc<ConnectionRegistry>,
    send_timeout: Duration,
}

impl Broadcaster {
    pub fn new(
        presence: Arc<PresenceCache>,
        registry: Arc<ConnectionRegistry>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            presence,
            registry,
            send_timeout,
        }
    }

    /// Broadcast a full presence refresh to everyone currently active.
    pub async fn broadcast_users_status(&self) -> usize {
        self.broadcast(USERS_STATUS, Value::Null, None).await
    }

    /// Serialize `{type, value}` once and send it to every live connection
    /// of every active user, skipping `exclude`. `users_status` ignores the
    /// given payload and always carries the full presence snapshot, so a
    /// client that misses one broadcast self-heals on the next.
    ///
    /// Returns the number of connections the message was handed to. Send
    /// failures are logged and reaped, never surfaced.
    pub async fn broadcast(&self, kind: &str, payload: Value, exclude: Option<&UserId>) -> usize {
        let audience = self.presence.snapshot_active(exclude);
        if audience.is_empty() {
            return 0;
        }

        let value = if kind == USERS_STATUS {
            match serde_json::to_value(self.presence.snapshot_all()) {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "presence snapshot serialization failed");
                    return 0;
                }
            }
        } else {
            payload
        };

        let text = match serde_json::to_string(&Envelope::new(kind, value)) {
            Ok(t) => t,
            Err(e) => {
                warn!(kind, error = %e, "broadcast serialization failed");
                return 0;
            }
        };
        // Utf8Bytes clones share the underlying buffer.
        let frame = Message::Text(text.into());

        let mut sends = Vec::new();
        for user in &audience {
            for conn in self.registry.connections_for_user(&user.id) {
                if conn.is_live() {
                    sends.push(self.send_one(conn, frame.clone()));
                } else {
                    self.reap(&conn, "transport closed before send");
                }
            }
        }

        join_all(sends).await.into_iter().filter(|ok| *ok).count()
    }

    async fn send_one(&self, conn: Arc<Connection>, frame: Message) -> bool {
        match tokio::time::timeout(self.send_timeout, conn.sender().send(frame)).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => {
                self.reap(&conn, "send to closed connection");
                false
            }
            Err(_) => {
                self.reap(&conn, "send timed out");
                false
            }
        }
    }

    fn reap(&self, conn: &Connection, reason: &str) {
        warn!(
            connection_id = %conn.id,
            user_id = %conn.user_id,
            reason,
            "dropping dead connection from registry"
        );
        conn.mark_closed();
        self.registry.remove(&conn.id);
    }
}
