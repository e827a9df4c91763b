//! Towline Daemon - Towing dispatch server
//!
//! Accepts WebSocket connections from customers, tow trucks and service
//! garages, routes their channel messages, and matches towing requests to
//! the nearest available tow truck.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (or the platform config file if present)
//! towlined
//!
//! # Use an explicit config file
//! TOWLINE_CONFIG=/etc/towline.toml towlined
//!
//! # Override listen address and offer timeout
//! towlined --listen 0.0.0.0:8080 --offer-timeout-secs 20
//!
//! # Enable debug logging
//! RUST_LOG=towlined=debug towlined
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use towline_core::MemoryStore;
use towlined::config::{DaemonConfig, CONFIG_ENV};
use towlined::payments::OfflinePayments;
use towlined::server::{AppState, DaemonServer};

/// Towline daemon - towing dispatch server
#[derive(Parser, Debug)]
#[command(name = "towlined", version, about)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the config file
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Seconds a tow truck has to answer an offer, overriding the config file
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    offer_timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("towlined=info".parse()?)
                .add_directive("towline_core=info".parse()?)
                .add_directive("towline_protocol=info".parse()?),
        )
        .init();

    let mut config = DaemonConfig::load(args.config.as_deref()).context("Failed to load config")?;
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Some(secs) = args.offer_timeout_secs {
        config.dispatch.offer_timeout_secs = secs;
    }
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        listen = %config.server.listen,
        offer_timeout_secs = config.dispatch.offer_timeout_secs,
        providers = config.providers.len(),
        "Towline daemon starting"
    );

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    // Setup signal handlers
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let store = Arc::new(MemoryStore::with_providers(config.providers.clone()));
    let payments = Arc::new(OfflinePayments::new());
    let state = AppState::new(store, payments, config.dispatch.clone(), cancel_token)
        .with_keep_alive(config.server.keep_alive());

    let server = DaemonServer::new(state);
    if let Err(e) = server.run(config.server.listen).await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Towline daemon stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
