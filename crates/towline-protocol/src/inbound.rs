//! Typed inbound messages, one enum per channel.
//!
//! Field names follow the camelCase the clients send. Agent and requester
//! identifiers also accept the older `servicemanId` / `customerId` spellings.
//! Message types that the daemon only logs (`dataUpdate`, `notification`,
//! requester-side `serviceRequest`) keep their payload as raw JSON.

use serde::Deserialize;
use serde_json::Value;

use towline_core::{
    BookingId, ChatId, Coordinates, Money, OfferResponse, ParticipantId, RideId, Role,
};

use crate::channel::MessageKind;

// ============================================================================
// Payloads
// ============================================================================

/// A chat line sent by any participant.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    pub chat_id: ChatId,
    pub text: String,
    pub sender_id: ParticipantId,
    pub receiver_id: ParticipantId,
    /// Role of the receiver. Required on the requester channel, where the
    /// receiver may be either kind of provider.
    #[serde(default)]
    pub receiver_type: Option<Role>,
}

/// An in-app payment from a requester to a provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub booking_id: BookingId,
    pub receiver_id: ParticipantId,
    pub amount: Money,
    #[serde(default)]
    pub receiver_type: Option<Role>,
}

/// A tow truck's position while working a booking.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    #[serde(default, alias = "servicemanId")]
    pub agent_id: Option<ParticipantId>,
    pub booking_id: BookingId,
    pub ride_id: RideId,
    #[serde(alias = "customerId")]
    pub requester_id: ParticipantId,
    pub location: Coordinates,
}

/// A tow truck going on or off duty.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityUpdate {
    #[serde(default, alias = "servicemanId")]
    pub agent_id: Option<ParticipantId>,
    pub is_online: bool,
    #[serde(default)]
    pub location: Option<Coordinates>,
}

/// A tow truck's answer to a towing offer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferReply {
    pub booking_id: BookingId,
    pub response: OfferResponse,
    #[serde(default, alias = "servicemanId")]
    pub agent_id: Option<ParticipantId>,
}

// ============================================================================
// Channel enums
// ============================================================================

/// Messages on the `Customer` channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RequesterMessage {
    Chat(ChatPayload),
    Payment(PaymentPayload),
    DataUpdate(Value),
    Notification(Value),
    ServiceRequest(Value),
}

/// Messages on the `Tower` channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FieldAgentMessage {
    Chat(ChatPayload),
    DataUpdate(Value),
    Location(LocationUpdate),
    Notification(Value),
    ServiceRequest(OfferReply),
    Availability(AvailabilityUpdate),
}

/// Messages on the `Service` channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StationMessage {
    Chat(ChatPayload),
    DataUpdate(Value),
    Notification(Value),
}

/// A decoded inbound message, tagged with its channel.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Requester(RequesterMessage),
    FieldAgent(FieldAgentMessage),
    Station(StationMessage),
}

impl InboundMessage {
    /// The role whose channel carried this message.
    pub fn channel(&self) -> Role {
        match self {
            Self::Requester(_) => Role::Requester,
            Self::FieldAgent(_) => Role::FieldAgent,
            Self::Station(_) => Role::StationAgent,
        }
    }

    /// The message type.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Requester(msg) => match msg {
                RequesterMessage::Chat(_) => MessageKind::Chat,
                RequesterMessage::Payment(_) => MessageKind::Payment,
                RequesterMessage::DataUpdate(_) => MessageKind::DataUpdate,
                RequesterMessage::Notification(_) => MessageKind::Notification,
                RequesterMessage::ServiceRequest(_) => MessageKind::ServiceRequest,
            },
            Self::FieldAgent(msg) => match msg {
                FieldAgentMessage::Chat(_) => MessageKind::Chat,
                FieldAgentMessage::DataUpdate(_) => MessageKind::DataUpdate,
                FieldAgentMessage::Location(_) => MessageKind::Location,
                FieldAgentMessage::Notification(_) => MessageKind::Notification,
                FieldAgentMessage::ServiceRequest(_) => MessageKind::ServiceRequest,
                FieldAgentMessage::Availability(_) => MessageKind::Availability,
            },
            Self::Station(msg) => match msg {
                StationMessage::Chat(_) => MessageKind::Chat,
                StationMessage::DataUpdate(_) => MessageKind::DataUpdate,
                StationMessage::Notification(_) => MessageKind::Notification,
            },
        }
    }
}
