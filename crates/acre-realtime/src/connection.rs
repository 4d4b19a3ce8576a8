//! Per-connection lifecycle: register, stream, tear down.
//!
//! Each accepted socket gets a reader task (the receive loop) and a writer
//! task (outbound queue + heartbeat). Either one ending tears the connection
//! down; cleanup runs exactly once, in `serve_socket`, after both sides are
//! done.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use acre_core::ids::UserId;
use acre_core::protocol::{self, InboundFrame};
use acre_store::UserRepo;

use crate::broadcast::Broadcaster;
use crate::presence::PresenceCache;
use crate::registry::{Connection, ConnectionRegistry};

pub struct Hub {
    presence: Arc<PresenceCache>,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Broadcaster,
    users: UserRepo,
    max_send_queue: usize,
    heartbeat_interval: Duration,
}

impl Hub {
    pub fn new(
        presence: Arc<PresenceCache>,
        registry: Arc<ConnectionRegistry>,
        broadcaster: Broadcaster,
        users: UserRepo,
        max_send_queue: usize,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            presence,
            registry,
            broadcaster,
            users,
            max_send_queue,
            heartbeat_interval,
        }
    }

    pub fn presence(&self) -> &PresenceCache {
        &self.presence
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Register an authenticated user's new connection, mark them active,
    /// and push a presence refresh to everyone.
    pub async fn connect(&self, user_id: UserId) -> (Arc<Connection>, mpsc::Receiver<Message>) {
        let (conn, rx) = self.registry.register(user_id, self.max_send_queue);
        info!(connection_id = %conn.id, user_id = %conn.user_id, "connection registered");
        self.flip_presence(&conn.user_id, true);
        self.broadcaster.broadcast_users_status().await;
        (conn, rx)
    }

    /// Tear a connection down. The user goes inactive only when this was
    /// their last live connection.
    pub async fn disconnect(&self, conn: &Connection) {
        conn.mark_closed();
        self.registry.remove(&conn.id);
        if !self.registry.has_live_for_user(&conn.user_id) {
            self.flip_presence(&conn.user_id, false);
        }
        info!(connection_id = %conn.id, user_id = %conn.user_id, "connection closed");
        self.broadcaster.broadcast_users_status().await;
    }

    /// Dispatch one inbound text frame. Never terminates the connection:
    /// malformed and unrecognized frames are logged and dropped.
    pub async fn handle_frame(&self, conn: &Connection, text: &str) {
        match protocol::parse_frame(text) {
            Ok(InboundFrame::Drawing { kind, payload }) => {
                self.broadcaster
                    .broadcast(&kind, payload, Some(&conn.user_id))
                    .await;
            }
            Ok(InboundFrame::PresenceFlip { active }) => {
                self.flip_presence(&conn.user_id, active);
                self.broadcaster.broadcast_users_status().await;
            }
            Ok(InboundFrame::Unknown { kind }) => {
                debug!(connection_id = %conn.id, kind, "ignoring unrecognized message type");
            }
            Err(e) => {
                warn!(connection_id = %conn.id, error = %e, "ignoring malformed frame");
            }
        }
    }

    fn flip_presence(&self, user_id: &UserId, active: bool) {
        self.presence.set_active(user_id, active);
        if let Err(e) = self.users.set_active(user_id, active) {
            warn!(user_id = %user_id, error = %e, "presence write-through failed");
        }
    }

    /// Drive an upgraded socket until it closes.
    pub async fn serve_socket(self: Arc<Self>, socket: WebSocket, user_id: UserId) {
        let (conn, mut rx) = self.connect(user_id).await;

        let (mut ws_tx, mut ws_rx) = socket.split();

        // Writer: drain the outbound queue and keep the heartbeat going.
        let writer_conn = Arc::clone(&conn);
        let heartbeat = self.heartbeat_interval;
        let mut writer = tokio::spawn(async move {
            let mut ping = tokio::time::interval(heartbeat);
            ping.tick().await; // consume the immediate first tick
            loop {
                tokio::select! {
                    msg = rx.recv() => {
                        match msg {
                            Some(frame) => {
                                if ws_tx.send(frame).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                    _ = ping.tick() => {
                        if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                            break;
                        }
                    }
                }
            }
            writer_conn.mark_closed();
        });

        // Reader: the receive loop. Blocks only this connection's task.
        let reader_hub = Arc::clone(&self);
        let reader_conn = Arc::clone(&conn);
        let mut reader = tokio::spawn(async move {
            while let Some(result) = ws_rx.next().await {
                let msg = match result {
                    Ok(msg) => msg,
                    Err(e) => {
                        debug!(connection_id = %reader_conn.id, error = %e, "transport error");
                        break;
                    }
                };
                match msg {
                    Message::Text(text) => {
                        reader_hub.handle_frame(&reader_conn, text.as_str()).await;
                    }
                    Message::Pong(_) => reader_conn.record_pong(),
                    Message::Close(_) => break,
                    Message::Ping(_) => {} // axum answers pings for us
                    _ => {}
                }
            }
        });

        tokio::select! {
            _ = &mut writer => reader.abort(),
            _ = &mut reader => writer.abort(),
        }

        self.disconnect(&conn).await;
    }
}
