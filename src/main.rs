//! # relay
//!
//! WebSocket relay binary. Loads settings, starts the server, and runs until
//! interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use relay_server::config::ServerConfig;
use relay_server::server::RelayServer;
use tracing::info;

/// WebSocket relay server.
#[derive(Parser, Debug)]
#[command(name = "relay", about = "WebSocket relay server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.relay/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = cli.config.unwrap_or_else(relay_settings::settings_path);
    let settings = relay_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;

    let level = cli.log_level.as_deref().unwrap_or(&settings.logging.level);
    relay_core::logging::init_subscriber(level);

    let mut config = ServerConfig::from(&settings.server);
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    let metrics_handle =
        relay_server::metrics::install_recorder().context("Failed to install metrics recorder")?;
    let server = RelayServer::new(config, metrics_handle);
    let (addr, _handle) = server
        .listen()
        .await
        .with_context(|| format!("Failed to bind {}", server.config().bind_addr()))?;
    info!(%addr, url = %format!("ws://{addr}"), "relay ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("shutting down");
    Ok(())
}
