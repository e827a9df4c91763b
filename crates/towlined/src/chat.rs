//! Chat delivery.
//!
//! A chat line is persisted before anything is sent. Delivery is a single
//! synchronous attempt to the receiver's live connection: if it succeeds the
//! stored message is marked delivered, otherwise it stays `sent` and is never
//! replayed. The sender always gets the stored message echoed back so every
//! client renders the server's copy.

use std::sync::Arc;

use tracing::{debug, warn};

use towline_core::{ChatMessage, DeliveryStatus, NewChatMessage, Role, Store, StoreResult};
use towline_protocol::OutboundMessage;

use crate::registry::ConnectionRegistry;

/// Persists and delivers chat messages.
#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn Store>,
    registry: ConnectionRegistry,
}

impl ChatService {
    pub fn new(store: Arc<dyn Store>, registry: ConnectionRegistry) -> Self {
        Self { store, registry }
    }

    /// Stores `message`, sends it to the receiver and echoes it to the sender.
    ///
    /// Returns the stored message with its final delivery status.
    ///
    /// # Errors
    ///
    /// Fails if the message cannot be saved (nothing is sent), or if marking
    /// it delivered fails (the receiver has it; the echo still goes out).
    pub async fn deliver(
        &self,
        message: NewChatMessage,
        receiver_role: Role,
        sender_role: Role,
    ) -> StoreResult<ChatMessage> {
        let mut stored = self.store.save_message(message).await?;

        let outbound = OutboundMessage::Chat {
            chat_id: stored.chat_id.clone(),
            message: stored.clone(),
        };
        let delivered = self
            .registry
            .send(receiver_role, &stored.receiver_id, &outbound)
            .await;

        let status_update = if delivered {
            self.store
                .set_message_status(&stored.id, DeliveryStatus::Delivered)
                .await
        } else {
            Ok(())
        };

        match &status_update {
            Ok(()) if delivered => stored.status = DeliveryStatus::Delivered,
            Ok(()) => {}
            Err(e) => warn!(
                message_id = %stored.id,
                error = %e,
                "Failed to mark chat message delivered"
            ),
        }

        debug!(
            chat_id = %stored.chat_id,
            message_id = %stored.id,
            receiver = %stored.receiver_id,
            delivered,
            "Chat message processed"
        );

        let echo = OutboundMessage::Chat {
            chat_id: stored.chat_id.clone(),
            message: stored.clone(),
        };
        self.registry.send(sender_role, &stored.sender_id, &echo).await;

        status_update.map(|()| stored)
    }
}
