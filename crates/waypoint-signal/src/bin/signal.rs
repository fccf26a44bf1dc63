//! Waypoint Signal Server
//!
//! Rendezvous and signaling server for peer discovery. Clients authenticate
//! over HTTP, then exchange connection-negotiation messages over WebSocket
//! (or HTTP polling as a fallback).
//!
//! # Usage
//!
//! ```bash
//! waypoint-signal --port 8765
//!
//! # With a config file
//! waypoint-signal --config /etc/waypoint/config.toml
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use waypoint_core::{Config, MemoryUserStore};
use waypoint_signal::{SignalServer, SignalState};

#[derive(Parser, Debug)]
#[command(name = "waypoint-signal")]
#[command(about = "Waypoint rendezvous and signaling server")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Config file path (defaults to the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Session idle TTL in seconds (overrides config)
    #[arg(long)]
    session_ttl: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = &args.bind {
        config.server.bind = bind.parse()?;
    }
    if let Some(ttl) = args.session_ttl {
        config.session.ttl_secs = ttl;
    }

    let addr = SocketAddr::new(config.server.bind, config.server.port);

    info!("Starting Waypoint Signal Server");
    info!("Listening on {}", addr);
    info!(
        "Session TTL {}s, sweep every {}s",
        config.session.ttl_secs, config.session.sweep_interval_secs
    );

    let users = Arc::new(MemoryUserStore::new());
    let state = SignalState::new(config, users);

    let server = SignalServer::new(state);
    server.serve(addr).await?;

    Ok(())
}
