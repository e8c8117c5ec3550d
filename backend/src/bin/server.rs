//! accessmap HTTP Server Binary
//!
//! Main entry point for the accessmap REST API server. Loads configuration,
//! builds the routing provider and services, and starts serving requests.
//!
//! # Usage
//!
//! ```bash
//! # Straight-line routing, default settings
//! cargo run --bin accessmap-server
//!
//! # OSRM routing
//! ACCESSMAP_PROVIDER=osrm ACCESSMAP_OSRM_URL=http://localhost:5000 \
//!   cargo run --bin accessmap-server --features http-provider
//! ```
//!
//! # Environment Variables
//!
//! - `ACCESSMAP_CONFIG`: Path to a TOML config file (default: search for `accessmap.toml`)
//! - `ACCESSMAP_PROVIDER`, `ACCESSMAP_OSRM_URL`, `ACCESSMAP_MODE`,
//!   `ACCESSMAP_BATCH_SIZE`, `ACCESSMAP_CONCURRENCY`: routing overrides
//! - `HOST`: Server host (default: 0.0.0.0)
//! - `PORT`: Server port (default: 8080)
//! - `RUST_LOG`: Log level (default: info)

use std::env;
use std::net::SocketAddr;

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use accessmap::config::AppConfig;
use accessmap::http::{create_router, AppState};
use accessmap::services::build_services;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(
            env::var("RUST_LOG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Level::INFO),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting accessmap HTTP Server");

    let mut config = match env::var("ACCESSMAP_CONFIG") {
        Ok(path) => AppConfig::from_file(&path)?,
        Err(_) => AppConfig::from_default_location()?,
    };
    config.apply_env_overrides()?;

    let service = build_services(&config)?;
    // Keep the selection in sync with target removals.
    let _listener = service.spawn_target_listener();
    info!(
        "Services initialized (provider: {}, mode: {})",
        service.routes().provider_name(),
        service.mode()
    );

    let state = AppState::new(service);
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    info!("Server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
