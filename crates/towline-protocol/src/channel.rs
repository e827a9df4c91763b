//! Channel dispatch tables.
//!
//! A channel is named after the role whose handler set processes it. Each
//! channel accepts a fixed set of message types; anything else is dropped by
//! the router before payload decoding is attempted.

use serde::{Deserialize, Serialize};
use std::fmt;

use towline_core::Role;

/// Every message type that appears on any channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageKind {
    Chat,
    Payment,
    DataUpdate,
    Notification,
    ServiceRequest,
    Location,
    Availability,
}

impl MessageKind {
    const ALL: [MessageKind; 7] = [
        MessageKind::Chat,
        MessageKind::Payment,
        MessageKind::DataUpdate,
        MessageKind::Notification,
        MessageKind::ServiceRequest,
        MessageKind::Location,
        MessageKind::Availability,
    ];

    /// Returns the wire tag for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Payment => "payment",
            Self::DataUpdate => "dataUpdate",
            Self::Notification => "notification",
            Self::ServiceRequest => "serviceRequest",
            Self::Location => "location",
            Self::Availability => "availability",
        }
    }

    /// Parses a wire tag. Tags are case-sensitive.
    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const REQUESTER_TYPES: &[MessageKind] = &[
    MessageKind::Chat,
    MessageKind::Payment,
    MessageKind::DataUpdate,
    MessageKind::Notification,
    MessageKind::ServiceRequest,
];

const FIELD_AGENT_TYPES: &[MessageKind] = &[
    MessageKind::Chat,
    MessageKind::DataUpdate,
    MessageKind::Location,
    MessageKind::Notification,
    MessageKind::ServiceRequest,
    MessageKind::Availability,
];

const STATION_TYPES: &[MessageKind] = &[
    MessageKind::Chat,
    MessageKind::DataUpdate,
    MessageKind::Notification,
];

/// Message types accepted on the channel of `role`.
pub fn message_types(role: Role) -> &'static [MessageKind] {
    match role {
        Role::Requester => REQUESTER_TYPES,
        Role::FieldAgent => FIELD_AGENT_TYPES,
        Role::StationAgent => STATION_TYPES,
    }
}

/// Resolves a type tag against the channel of `role`.
pub fn resolve(role: Role, tag: &str) -> Option<MessageKind> {
    MessageKind::parse(tag).filter(|kind| message_types(role).contains(kind))
}
