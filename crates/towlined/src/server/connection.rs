//! Per-connection handler.
//!
//! Each WebSocket gets its own `ConnectionHandler` that:
//! - registers the socket's write half under the connection's key
//! - reads text frames and routes them one at a time
//! - pings the peer on an interval and drops it after a silent stretch
//!   (pongs count as traffic)
//! - unregisters (only its own entry) when the socket closes
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Connection errors are logged and result in graceful disconnect

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitStream;
use futures::StreamExt;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::{ConnectionKey, ConnectionRegistry, WsTransport};
use crate::router::{RouteOutcome, Router};

/// Maximum message size (1 MB)
pub const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Interval between keepalive pings (30 seconds)
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Silence after which a connection is considered dead (90 seconds)
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Keepalive timing for participant sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    pub ping_interval: Duration,
    /// Must exceed `ping_interval`, or a healthy peer is dropped.
    pub idle_timeout: Duration,
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self {
            ping_interval: PING_INTERVAL,
            idle_timeout: IDLE_TIMEOUT,
        }
    }
}

/// Handler for a single participant connection.
pub struct ConnectionHandler {
    key: ConnectionKey,
    registry: ConnectionRegistry,
    router: Router,
    cancel_token: CancellationToken,
    keep_alive: KeepAlive,
}

impl ConnectionHandler {
    pub fn new(
        key: ConnectionKey,
        registry: ConnectionRegistry,
        router: Router,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            key,
            registry,
            router,
            cancel_token,
            keep_alive: KeepAlive::default(),
        }
    }

    pub fn with_keep_alive(mut self, keep_alive: KeepAlive) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Runs the connection until the socket closes or the daemon shuts down.
    pub async fn run(self, socket: WebSocket) {
        let (sink, mut stream) = socket.split();
        let transport = Arc::new(WsTransport::new(sink));
        let id = self.registry.register(self.key.clone(), transport.clone()).await;

        if let Err(e) = self.process_frames(&mut stream, &transport).await {
            debug!(key = %self.key, connection = %id, error = %e, "Connection closed");
        }

        self.registry.unregister(&self.key, id).await;
        transport.close().await;
        info!(key = %self.key, connection = %id, "Client disconnected");
    }

    /// Reads and routes frames until the connection ends.
    async fn process_frames(
        &self,
        stream: &mut SplitStream<WebSocket>,
        transport: &WsTransport,
    ) -> Result<(), ConnectionError> {
        let period = self.keep_alive.ping_interval;
        let mut ping = interval_at(Instant::now() + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_seen = Instant::now();

        loop {
            let next = tokio::select! {
                _ = self.cancel_token.cancelled() => return Ok(()),
                _ = ping.tick() => {
                    transport
                        .ping()
                        .await
                        .map_err(|e| ConnectionError::Io(e.to_string()))?;
                    continue;
                }
                _ = sleep_until(last_seen + self.keep_alive.idle_timeout) => {
                    return Err(ConnectionError::Timeout);
                }
                next = stream.next() => next,
            };
            last_seen = Instant::now();

            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(ConnectionError::Io(e.to_string())),
                None => return Ok(()),
            };

            match message {
                Message::Text(text) => {
                    let text = text.as_str();
                    if text.len() > MAX_MESSAGE_SIZE {
                        warn!(
                            key = %self.key,
                            size = text.len(),
                            max = MAX_MESSAGE_SIZE,
                            "Dropping oversized frame"
                        );
                        continue;
                    }

                    match self.router.route(&self.key, text).await {
                        RouteOutcome::Handled(kind) => {
                            debug!(key = %self.key, message_type = %kind, "Frame handled");
                        }
                        other => debug!(key = %self.key, outcome = ?other, "Frame not handled"),
                    }
                }
                Message::Binary(_) => {
                    debug!(key = %self.key, "Ignoring binary frame");
                }
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Close(_) => return Ok(()),
            }
        }
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Peer went silent")]
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_display() {
        assert_eq!(ConnectionError::Timeout.to_string(), "Peer went silent");
        assert!(ConnectionError::Io("reset".to_string())
            .to_string()
            .contains("reset"));
    }

    #[test]
    fn test_default_keep_alive_tolerates_missed_ping() {
        let keep_alive = KeepAlive::default();
        assert!(keep_alive.idle_timeout >= keep_alive.ping_interval * 2);
    }
}
