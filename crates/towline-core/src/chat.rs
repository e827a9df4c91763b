//! Chat messages exchanged between requesters and providers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ChatId, MessageId, ParticipantId};

/// Whether a chat message reached a live connection of its receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Persisted, receiver was offline.
    Sent,
    /// Persisted and written to the receiver's connection.
    Delivered,
}

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: ParticipantId,
    pub receiver_id: ParticipantId,
    pub text: String,
    pub status: DeliveryStatus,
    pub sent_at: DateTime<Utc>,
}

/// Fields required to persist a new chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChatMessage {
    pub chat_id: ChatId,
    pub sender_id: ParticipantId,
    pub receiver_id: ParticipantId,
    pub text: String,
}
