//! Write side of a participant connection.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::SinkExt;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

/// Write timeout (10 seconds)
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors writing to a transport.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("I/O error: {0}")]
    Io(String),
}

/// Something that can deliver a text frame to one participant.
///
/// Implementations serialize concurrent writes themselves.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, text: String) -> Result<(), TransportError>;
}

/// Writer half of an axum WebSocket.
pub struct WsTransport {
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsTransport {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    /// Sends a keepalive ping. The peer's pong arrives on the read half.
    pub async fn ping(&self) -> Result<(), TransportError> {
        self.write(Message::Ping(Bytes::new())).await
    }

    /// Sends a close frame. Errors are ignored; the peer may already be gone.
    pub async fn close(&self) {
        let mut sink = self.sink.lock().await;
        let _ = timeout(WRITE_TIMEOUT, sink.close()).await;
    }

    async fn write(&self, message: Message) -> Result<(), TransportError> {
        let mut sink = self.sink.lock().await;

        match timeout(WRITE_TIMEOUT, sink.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransportError::Io(e.to_string())),
            Err(_) => Err(TransportError::WriteTimeout),
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.write(Message::Text(text.into())).await
    }
}

/// Transport backed by an in-process channel.
///
/// Frames written to it can be read back from the paired receiver, which
/// makes it the transport of choice for embedding and for tests.
pub struct ChannelTransport {
    sender: mpsc::UnboundedSender<String>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.sender.send(text).map_err(|_| TransportError::Closed)
    }
}
