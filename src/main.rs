use std::path::PathBuf;

use clap::Parser;

use acre_realtime::{JwtSettings, ServerConfig};
use acre_store::Database;

#[derive(Parser, Debug)]
#[command(name = "acre", about = "Collaborative map-area server with a realtime presence hub")]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Path to the SQLite database.
    #[arg(long, default_value = "acre.db")]
    db: PathBuf,

    /// Expected JWT issuer.
    #[arg(long, default_value = "acre")]
    jwt_issuer: String,

    /// Expected JWT audience.
    #[arg(long, default_value = "acre-client")]
    jwt_audience: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let secret = std::env::var("ACRE_JWT_SECRET").unwrap_or_else(|_| {
        tracing::warn!("ACRE_JWT_SECRET not set, using the development secret");
        "acre-dev-secret".into()
    });

    let db = Database::open(&args.db).expect("failed to open database");

    let config = ServerConfig {
        port: args.port,
        bind: args.bind,
        jwt: JwtSettings {
            secret,
            issuer: args.jwt_issuer,
            audience: args.jwt_audience,
        },
        ..Default::default()
    };

    let handle = acre_realtime::start(config, db)
        .await
        .expect("failed to start server");

    tracing::info!(port = handle.port, "acre server ready");

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl+c");

    tracing::info!("shutting down");
}
