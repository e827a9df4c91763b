//! Connection registry.
//!
//! Maps `(role, identity)` to the single live connection for that key. The
//! registry is pure bookkeeping: it never opens or closes transports, it
//! only remembers which transport to write to.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  register/unregister  ┌──────────────────────────┐
//! │ConnectionHandler │──────────────────────▶│ RwLock<HashMap<Key,Conn>>│
//! │  (per socket)    │                       └────────────┬─────────────┘
//! └──────────────────┘                                    │ read lock, clone Arc
//!                                                         ▼
//! ┌──────────────────┐        send()         ┌──────────────────────────┐
//! │ router / engine  │──────────────────────▶│  Arc<dyn Transport>      │
//! └──────────────────┘                       │  (own write lock)        │
//!                                            └──────────────────────────┘
//! ```
//!
//! The map lock is held only long enough to clone the transport handle, so
//! writes to different participants never wait on each other.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Write failures are reported as `false` and evict the failing entry

mod transport;

pub use transport::{ChannelTransport, Transport, TransportError, WsTransport, WRITE_TIMEOUT};

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use towline_core::{ParticipantId, Role};
use towline_protocol::{OutboundFrame, OutboundMessage};

/// Identifies one registration. Assigned in increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Registry key: one live connection per role and identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub role: Role,
    pub identity: ParticipantId,
}

impl ConnectionKey {
    pub fn new(role: Role, identity: impl Into<ParticipantId>) -> Self {
        Self {
            role,
            identity: identity.into(),
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.role, self.identity)
    }
}

struct Connection {
    id: ConnectionId,
    transport: Arc<dyn Transport>,
    connected_at: DateTime<Utc>,
}

type ConnectionMap = Arc<RwLock<HashMap<ConnectionKey, Connection>>>;

/// Shared handle to the connection table.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: ConnectionMap,
    next_id: Arc<AtomicU64>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a transport for `key`, replacing any previous entry.
    ///
    /// The replaced transport is not closed; its handler discovers the
    /// replacement when its own `unregister` becomes a no-op.
    pub async fn register(&self, key: ConnectionKey, transport: Arc<dyn Transport>) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let connection = Connection {
            id,
            transport,
            connected_at: Utc::now(),
        };

        let replaced = {
            let mut connections = self.connections.write().await;
            connections.insert(key.clone(), connection)
        };

        match replaced {
            Some(old) => info!(
                key = %key,
                connection = %id,
                replaced = %old.id,
                "Connection replaced"
            ),
            None => info!(key = %key, connection = %id, "Connection established"),
        }

        id
    }

    /// Removes the entry for `key` if it still belongs to connection `id`.
    ///
    /// Returns true if an entry was removed.
    pub async fn unregister(&self, key: &ConnectionKey, id: ConnectionId) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get(key) {
            Some(current) if current.id == id => {
                let age = Utc::now() - current.connected_at;
                connections.remove(key);
                info!(
                    key = %key,
                    connection = %id,
                    connected_secs = age.num_seconds(),
                    "Connection closed"
                );
                true
            }
            Some(current) => {
                debug!(
                    key = %key,
                    connection = %id,
                    current = %current.id,
                    "Stale unregister ignored"
                );
                false
            }
            None => false,
        }
    }

    /// Sends `message` to the live connection of `(role, identity)`.
    ///
    /// Returns false if the participant has no live connection or the write
    /// failed; nothing is queued. A failed write evicts the entry.
    pub async fn send(&self, role: Role, identity: &ParticipantId, message: &OutboundMessage) -> bool {
        let key = ConnectionKey::new(role, identity.clone());

        let target = {
            let connections = self.connections.read().await;
            connections
                .get(&key)
                .map(|conn| (conn.id, Arc::clone(&conn.transport)))
        };

        let Some((id, transport)) = target else {
            debug!(key = %key, message_type = message.type_name(), "Recipient offline");
            return false;
        };

        let frame = OutboundFrame::new(role, message.clone());
        let text = match frame.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode outbound frame");
                return false;
            }
        };

        match transport.send_text(text).await {
            Ok(()) => {
                debug!(key = %key, message_type = message.type_name(), "Message sent");
                true
            }
            Err(e) => {
                warn!(key = %key, connection = %id, error = %e, "Write failed, dropping connection");
                self.unregister(&key, id).await;
                false
            }
        }
    }

    /// Returns true if `key` has a live connection.
    pub async fn is_connected(&self, key: &ConnectionKey) -> bool {
        self.connections.read().await.contains_key(key)
    }

    /// Returns the connection currently registered for `key`.
    pub async fn connection_id(&self, key: &ConnectionKey) -> Option<ConnectionId> {
        self.connections.read().await.get(key).map(|conn| conn.id)
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}
