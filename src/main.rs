//! Byway gateway
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                       BYWAY                          │
//!                 │                                                      │
//!  Client ───────▶│  http::server ──▶ http::director ──▶ http::transport ─┼──▶ Upstream
//!                 │                        │                             │
//!                 │                        ▼                             │
//!                 │               routing::RoutingSnapshot               │
//!                 │                        ▲                             │
//!                 │                        │ compile + publish           │
//!                 │   store (file / redis) ┘                             │
//!                 │        ▲                                             │
//!  Operator ─────▶│  admin API (byway-ctl)                               │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use byway::config::{load_config, GatewayConfig};
use byway::lifecycle::signals::shutdown_on_signal;
use byway::lifecycle::{Gateway, Shutdown};
use byway::observability::logging;

#[derive(Parser)]
#[command(name = "byway")]
#[command(about = "Version-aware reverse-proxy gateway", long_about = None)]
struct Cli {
    /// Gateway configuration file (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "byway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        unrouted = ?config.routing.unrouted,
        source = ?config.source,
        request_timeout_secs = config.timeouts.request_secs,
        admin_enabled = config.admin.enabled,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    let gateway = Gateway::start(&config, &shutdown).await?;

    tokio::spawn(shutdown_on_signal(shutdown.clone()));
    gateway.wait().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
