use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use acre_store::{Database, UserRepo};

use crate::auth::{JwtSettings, TokenVerifier};
use crate::broadcast::Broadcaster;
use crate::connection::Hub;
use crate::presence::PresenceCache;
use crate::registry::{self, ConnectionRegistry};

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
    pub bind: String,
    pub max_send_queue: usize,
    pub send_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
    pub sweep_interval: Duration,
    pub jwt: JwtSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind: "0.0.0.0".into(),
            max_send_queue: 256,
            send_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
            client_timeout: Duration::from_secs(90),
            sweep_interval: Duration::from_secs(60),
            jwt: JwtSettings {
                secret: "acre-dev-secret".into(),
                issuer: "acre".into(),
                audience: "acre-client".into(),
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error(transparent)]
    Store(#[from] acre_store::StoreError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub verifier: Arc<TokenVerifier>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle to the running hub.
pub async fn start(config: ServerConfig, db: Database) -> Result<ServerHandle, ServeError> {
    let users = UserRepo::new(db.clone());
    let presence = Arc::new(PresenceCache::new());
    presence.load_all(users.list_status()?);
    info!(users = presence.len(), "presence cache primed");

    let connections = Arc::new(ConnectionRegistry::new());
    let broadcaster = Broadcaster::new(
        Arc::clone(&presence),
        Arc::clone(&connections),
        config.send_timeout,
    );
    let hub = Arc::new(Hub::new(
        presence,
        Arc::clone(&connections),
        broadcaster,
        users,
        config.max_send_queue,
        config.heartbeat_interval,
    ));
    let verifier = Arc::new(TokenVerifier::new(&config.jwt));

    let sweep = registry::start_sweep_task(
        Arc::clone(&connections),
        config.sweep_interval,
        config.client_timeout,
    );

    let state = AppState {
        hub: Arc::clone(&hub),
        verifier,
    };
    let router = build_router(state);

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    info!(port = local_addr.port(), "realtime hub listening");

    let server = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        hub,
        _server: server,
        _sweep: sweep,
    })
}

/// Handle returned by `start()` — keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    pub hub: Arc<Hub>,
    _server: tokio::task::JoinHandle<()>,
    _sweep: tokio::task::JoinHandle<()>,
}

#[derive(Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// WebSocket upgrade handler. Non-upgrade requests get 400; a missing or
/// invalid token gets 401 before any channel state exists.
async fn ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let Ok(ws) = ws else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let token = query.token.unwrap_or_default();
    match state.verifier.verify(&token) {
        Ok(user_id) => {
            let hub = Arc::clone(&state.hub);
            ws.on_upgrade(move |socket| hub.serve_socket(socket, user_id))
                .into_response()
        }
        Err(e) => {
            warn!(error = %e, "websocket auth rejected");
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "connections": state.hub.registry().count(),
        "active_users": state.hub.presence().active_count(),
    }))
}
