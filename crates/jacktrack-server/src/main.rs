//! # jacktrack-server
//!
//! HTTP server for JackTrack.
//!
//! This binary provides:
//! - REST API for the BLE session, round history, settings and backups
//! - OpenAPI documentation via Swagger UI
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development, without Bluetooth hardware
//! cargo run --package jacktrack-server --features mock-bluetooth
//!
//! # Production
//! JACKTRACK_ENV=production JACKTRACK_LOG_DIR=/var/log/jacktrack ./jacktrack-server
//! ```
//!
//! The configuration file is read from `JACKTRACK_CONFIG` if set, otherwise
//! from the platform default path.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use jacktrack_core::{BlePlatform, Config, StartOptions};
use jacktrack_server::api;
use jacktrack_server::logging::{self, LogMode};
use jacktrack_server::state::AppState;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[cfg(not(any(feature = "bluetooth", feature = "mock-bluetooth")))]
compile_error!("enable the `bluetooth` or `mock-bluetooth` feature");

#[cfg(feature = "mock-bluetooth")]
fn platform() -> Arc<dyn BlePlatform> {
    info!("Using mock Bluetooth platform");
    Arc::new(jacktrack_core::MockPlatform::demo())
}

#[cfg(all(feature = "bluetooth", not(feature = "mock-bluetooth")))]
fn platform() -> Arc<dyn BlePlatform> {
    Arc::new(jacktrack_core::BluerPlatform::new())
}

fn config_path() -> PathBuf {
    std::env::var_os("JACKTRACK_CONFIG").map_or_else(Config::default_path, PathBuf::from)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(LogMode::from_env())?;

    info!("Starting jacktrack-server");

    let path = config_path();
    let config = Config::load_or_default(&path)?;
    info!(config = %path.display(), data_dir = %config.storage.data_dir.display(), "Configuration loaded");

    let addr = SocketAddr::new(config.server.bind_address, config.server.port);
    let start_options = StartOptions {
        suppress_system_alert: config.ble.suppress_system_alert,
    };
    let state = AppState::with_file_store(config, platform())?;

    // The server stays up without Bluetooth; clients retry through /api/ble.
    match state.session().initialize(start_options).await {
        Ok(adapter) => info!(?adapter, "Bluetooth session initialized"),
        Err(e) => warn!(error = %e, "Bluetooth session not initialized"),
    }

    let app = api::create_router(state);
    let listener = TcpListener::bind(addr).await?;

    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
