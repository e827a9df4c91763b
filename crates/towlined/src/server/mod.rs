//! HTTP and WebSocket server for the Towline daemon.
//!
//! The server:
//! - Accepts participant WebSockets at `/ws/{role}/{identity}`, and at
//!   `/{role}/{identity}` for clients that dial the bare path
//! - Spawns a ConnectionHandler for each socket
//! - Serves the towing request entry points and a health check
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  DaemonServer   │
//! │  (axum, TCP)    │
//! └───────┬─────────┘
//!         │ upgrade                         POST /towing
//!         ▼                                       │
//! ┌─────────────────┐     ┌─────────────┐   ┌─────▼───────┐
//! │ConnectionHandler│────▶│   Router    │   │TowingIntake │
//! │  (per socket)   │     └──────┬──────┘   └─────┬───────┘
//! └─────────────────┘            │                │
//!                                ▼                ▼
//!                    chat / telemetry /    DispatchEngine
//!                    ledger / engine
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Server errors are returned to the caller

mod connection;
mod http;

pub use connection::{
    ConnectionError, ConnectionHandler, KeepAlive, IDLE_TIMEOUT, MAX_MESSAGE_SIZE, PING_INTERVAL,
};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use towline_core::Store;

use crate::config::DispatchConfig;
use crate::dispatch::DispatchEngine;
use crate::intake::TowingIntake;
use crate::payments::PaymentGateway;
use crate::registry::ConnectionRegistry;
use crate::router::Router;

/// Services shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: ConnectionRegistry,
    pub router: Router,
    pub engine: DispatchEngine,
    pub intake: TowingIntake,
    pub cancel_token: CancellationToken,
    pub keep_alive: KeepAlive,
}

impl AppState {
    /// Wires the daemon's services around a store and payment gateway.
    pub fn new(
        store: Arc<dyn Store>,
        payments: Arc<dyn PaymentGateway>,
        dispatch: DispatchConfig,
        cancel_token: CancellationToken,
    ) -> Self {
        let registry = ConnectionRegistry::new();
        let engine = DispatchEngine::new(Arc::clone(&store), registry.clone(), dispatch);
        let router = Router::new(Arc::clone(&store), registry.clone(), engine.clone());
        let intake = TowingIntake::new(store, engine.clone(), registry.clone(), payments);

        Self {
            registry,
            router,
            engine,
            intake,
            cancel_token,
            keep_alive: KeepAlive::default(),
        }
    }

    /// Overrides the socket keepalive timing.
    pub fn with_keep_alive(mut self, keep_alive: KeepAlive) -> Self {
        self.keep_alive = keep_alive;
        self
    }
}

/// The daemon's network front end.
pub struct DaemonServer {
    state: AppState,
}

impl DaemonServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Returns the shared services.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Builds the axum application.
    pub fn app(&self) -> axum::Router {
        axum::Router::new()
            .route("/ws/{role}/{identity}", get(http::ws_connect))
            .route("/{role}/{identity}", get(http::ws_connect))
            .route("/towing", post(http::create_towing))
            .route("/towing/{booking_id}/cancel", post(http::cancel_towing))
            .route("/health", get(http::health))
            .with_state(self.state.clone())
    }

    /// Binds `addr` and serves until the cancellation token fires.
    pub async fn run(&self, addr: SocketAddr) -> Result<(), ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr,
                error: e.to_string(),
            })?;
        self.run_with_listener(listener).await
    }

    /// Serves on an already-bound listener until the cancellation token fires.
    pub async fn run_with_listener(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local = listener
            .local_addr()
            .map_err(|e| ServerError::Serve(e.to_string()))?;
        info!(addr = %local, "Daemon server listening");

        let shutdown = self.state.cancel_token.clone();
        axum::serve(listener, self.app())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))?;

        info!("Server shutdown complete");
        Ok(())
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },

    #[error("Server error: {0}")]
    Serve(String),
}
