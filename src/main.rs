//! # duel
//!
//! Server binary: loads settings, installs logging and runs the hub until
//! interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use duel_server::config::ServerConfig;
use duel_server::server::DuelServer;
use duel_settings::loader::{load_settings_from_path, settings_path};
use duel_telemetry::{TelemetryConfig, init_telemetry};

/// Two-player match hub.
#[derive(Parser, Debug)]
#[command(name = "duel", about = "Two-player match hub over WebSocket")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file. Defaults to `$DUEL_HOME/settings.json`.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Seconds to wait for connections to drain on shutdown.
    #[arg(long, default_value = "10")]
    drain_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let path = args.settings.unwrap_or_else(settings_path);
    let settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;

    let logging = &settings.logging;
    init_telemetry(&TelemetryConfig::from_names(
        &logging.level,
        &logging.modules,
        logging.json,
    ))
    .context("Failed to install tracing subscriber")?;

    let mut config = ServerConfig::from_settings(&settings);
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if config.jwt_secret.is_none() {
        tracing::warn!("no JWT secret configured; every connection will be refused");
    }

    let handle = DuelServer::new(config)
        .start()
        .await
        .context("Failed to start server")?;
    tracing::info!(addr = %handle.addr, "duel server ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown(Some(Duration::from_secs(args.drain_secs))).await;
    Ok(())
}
