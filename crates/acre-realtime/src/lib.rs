pub mod auth;
pub mod broadcast;
pub mod connection;
pub mod presence;
pub mod registry;
pub mod server;

pub use auth::{AuthError, JwtSettings, TokenVerifier};
pub use broadcast::Broadcaster;
pub use connection::Hub;
pub use presence::PresenceCache;
pub use registry::{Connection, ConnectionRegistry};
pub use server::{build_router, start, AppState, ServeError, ServerConfig, ServerHandle};
