//! Frame parsing.
//!
//! A frame is decoded in three steps, each of which can reject it:
//!
//! 1. the envelope tags (`channel`, `type`, optional `sender`) are read;
//! 2. the channel is resolved to a role and the type is checked against that
//!    channel's dispatch table;
//! 3. the whole frame is decoded into the channel's message enum.
//!
//! The resulting `ParseError` tells the router which of the three drop
//! reasons applies. Nothing is ever sent back to the client for a parse
//! failure.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use towline_core::{ParticipantId, Role};

use crate::channel::{self, MessageKind};
use crate::inbound::{FieldAgentMessage, InboundMessage, RequesterMessage, StationMessage};

/// Errors turning a text frame into an `Envelope`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Not JSON, or missing the `channel`/`type` tags.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// The `channel` tag names no known role.
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// The `type` tag is not handled on this channel.
    #[error("unknown message type {kind:?} on channel {channel}")]
    UnknownType { channel: Role, kind: String },

    /// The payload does not match the message type.
    #[error("malformed {kind} payload on channel {channel}: {reason}")]
    Malformed {
        channel: Role,
        kind: MessageKind,
        reason: String,
    },
}

/// The routing tags of a frame, before payload decoding.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawEnvelope {
    pub channel: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub sender: Option<ParticipantId>,
}

/// A fully decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Identity the client claims to send as, if it set one.
    pub sender: Option<ParticipantId>,
    pub message: InboundMessage,
}

impl Envelope {
    /// The role whose channel carried this frame.
    pub fn channel(&self) -> Role {
        self.message.channel()
    }

    /// The message type.
    pub fn kind(&self) -> MessageKind {
        self.message.kind()
    }
}

/// Parses a text frame into a typed envelope.
pub fn parse_frame(text: &str) -> Result<Envelope, ParseError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ParseError::InvalidFrame(e.to_string()))?;
    let raw = RawEnvelope::deserialize(&value)
        .map_err(|e| ParseError::InvalidFrame(e.to_string()))?;

    let channel =
        Role::parse(&raw.channel).ok_or_else(|| ParseError::UnknownChannel(raw.channel.clone()))?;
    let kind = channel::resolve(channel, &raw.kind).ok_or_else(|| ParseError::UnknownType {
        channel,
        kind: raw.kind.clone(),
    })?;

    let malformed = |reason: String| ParseError::Malformed {
        channel,
        kind,
        reason,
    };

    let message = match channel {
        Role::Requester => InboundMessage::Requester(
            serde_json::from_value::<RequesterMessage>(value)
                .map_err(|e| malformed(e.to_string()))?,
        ),
        Role::FieldAgent => InboundMessage::FieldAgent(
            serde_json::from_value::<FieldAgentMessage>(value)
                .map_err(|e| malformed(e.to_string()))?,
        ),
        Role::StationAgent => InboundMessage::Station(
            serde_json::from_value::<StationMessage>(value)
                .map_err(|e| malformed(e.to_string()))?,
        ),
    };

    if let InboundMessage::Requester(RequesterMessage::Chat(chat)) = &message {
        if chat.receiver_type.is_none() {
            return Err(malformed("missing field `receiverType`".to_string()));
        }
    }

    Ok(Envelope {
        sender: raw.sender,
        message,
    })
}
