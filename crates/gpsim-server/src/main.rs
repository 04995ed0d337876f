//! GPS receiver simulator binary.
//!
//! Serves the control API and the position push channel, and writes one
//! NMEA `GGA` sentence per tick to the opened serial device while the
//! engine runs.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `gpsim-config.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Build the shared session and broadcast channel
//! 4. Spawn the control API server
//! 5. Wait for `Ctrl-C`, then stop the engine and close the port

mod error;

use std::path::Path;
use std::sync::Arc;

use gpsim_core::config::GpsimConfig;
use gpsim_observer::{AppState, ServerConfig, spawn_observer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

const CONFIG_PATH: &str = "gpsim-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the server address
/// does not parse, or the shutdown signal cannot be awaited.
#[tokio::main]
async fn main() -> Result<(), AppError> {
    let (config, from_file) = load_config()?;

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!("gpsim-server starting");
    if !from_file {
        info!(path = CONFIG_PATH, "Config file not found, using defaults");
    }
    info!(
        host = config.server.host,
        port = config.server.port,
        tick_interval_ms = config.simulation.tick_interval_ms,
        default_baud_rate = config.serial.default_baud_rate,
        "Configuration loaded"
    );

    let state = Arc::new(AppState::from_config(&config));
    let server = spawn_observer(ServerConfig::from(&config), Arc::clone(&state))?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    server.abort();
    if let Err(e) = state.controller.close_port().await {
        warn!(error = %e, "Failed to close serial port on shutdown");
        return Err(e.into());
    }

    info!("gpsim-server stopped");
    Ok(())
}

/// Load configuration from `gpsim-config.yaml`.
///
/// Returns the config and whether it came from the file. Environment
/// overrides are applied either way.
fn load_config() -> Result<(GpsimConfig, bool), AppError> {
    let config_path = Path::new(CONFIG_PATH);
    if config_path.exists() {
        Ok((GpsimConfig::from_file(config_path)?, true))
    } else {
        let mut config = GpsimConfig::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok((config, false))
    }
}
