//! relay-proxy host server.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌────────────────────────────────────────────────┐
//!                     │                  relay-proxy                    │
//!   Client Request    │  ┌─────────┐    ┌──────────┐    ┌────────────┐ │
//!   ──────────────────┼─▶│  http   │───▶│ routing  │───▶│   proxy    │ │
//!                     │  │ server  │    │ by Host  │    │ dispatcher │ │
//!                     │  └─────────┘    └──────────┘    └─────┬──────┘ │
//!                     │                                  plain │ upgrade│
//!                     │                          ┌─────────────┴──┐     │
//!                     │                          ▼                ▼     │
//!   Client Response   │                   ┌────────────┐   ┌─────────┐ │
//!   ◀─────────────────┼───────────────────│ hyper      │   │net::    │─┼──▶ Upstream
//!                     │                   │ client     │   │relay    │ │
//!                     │                   └────────────┘   └─────────┘ │
//!                     └────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use relay_proxy::config::load_config;
use relay_proxy::observability::init_logging;
use relay_proxy::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "relay-proxy")]
#[command(about = "HTTP and WebSocket reverse proxy", long_about = None)]
struct Cli {
    /// Host configuration file (TOML).
    #[arg(short, long, default_value = "relay-proxy.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_logging(&config.observability)?;

    tracing::info!("relay-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        path = %cli.config.display(),
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config)?;
    shutdown.trigger_on_signal();
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
