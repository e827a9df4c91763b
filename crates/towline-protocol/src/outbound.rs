//! Messages the daemon pushes to connected participants.
//!
//! Every outbound frame is an `OutboundMessage` flattened next to a `channel`
//! field naming the recipient's role, e.g.
//!
//! ```json
//! {"channel":"Customer","type":"notification","message":"Request already handled"}
//! ```

use serde::{Deserialize, Serialize};

use towline_core::{BookingId, ChatId, ChatMessage, Coordinates, Money, ParticipantId, RideId, Role};

/// Client route the requester app opens after a request resolves.
pub const BOOKINGS_SCREEN: &str = "/bookings";

const ALREADY_HANDLED: &str = "Request already handled";
const REQUEST_ACCEPTED: &str = "Your towing request has been accepted";
const REQUEST_UNMATCHED: &str = "Your towing request was not accepted by any available towers";
const NEW_REQUEST: &str = "New towing request available";
const BOOKING_CANCELLED: &str = "The booking has been cancelled";

/// A message pushed to one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    /// A persisted chat message, sent to its receiver and echoed to its sender.
    #[serde(rename_all = "camelCase")]
    Chat {
        chat_id: ChatId,
        message: ChatMessage,
    },

    /// Informational text, optionally tied to a booking.
    #[serde(rename_all = "camelCase")]
    Notification {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        booking_id: Option<BookingId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tower_id: Option<ParticipantId>,
    },

    /// Asks the client app to open a screen.
    Navigation { screen: String },

    /// A towing offer to one tow truck.
    #[serde(rename_all = "camelCase")]
    ServiceRequest {
        message: String,
        booking_id: BookingId,
        distance: f64,
        cost: Money,
    },

    /// The assigned tow truck's latest position.
    #[serde(rename_all = "camelCase")]
    Location {
        location: Coordinates,
        booking_id: BookingId,
        ride_id: RideId,
    },
}

impl OutboundMessage {
    /// A plain notification.
    pub fn notification(message: impl Into<String>) -> Self {
        Self::Notification {
            message: message.into(),
            booking_id: None,
            tower_id: None,
        }
    }

    /// Reply to an offer response that arrived too late or from the wrong agent.
    pub fn already_handled() -> Self {
        Self::notification(ALREADY_HANDLED)
    }

    /// Tells the requester which tow truck took the booking.
    pub fn request_accepted(booking_id: BookingId, tower_id: ParticipantId) -> Self {
        Self::Notification {
            message: REQUEST_ACCEPTED.to_string(),
            booking_id: Some(booking_id),
            tower_id: Some(tower_id),
        }
    }

    /// Tells the requester nobody took the booking.
    pub fn request_unmatched(booking_id: BookingId) -> Self {
        Self::Notification {
            message: REQUEST_UNMATCHED.to_string(),
            booking_id: Some(booking_id),
            tower_id: None,
        }
    }

    /// Tells a tow truck a booking it was offered or assigned is gone.
    pub fn booking_cancelled(booking_id: BookingId) -> Self {
        Self::Notification {
            message: BOOKING_CANCELLED.to_string(),
            booking_id: Some(booking_id),
            tower_id: None,
        }
    }

    /// Sends the requester app to its bookings list.
    pub fn show_bookings() -> Self {
        Self::Navigation {
            screen: BOOKINGS_SCREEN.to_string(),
        }
    }

    /// A towing offer.
    pub fn offer(booking_id: BookingId, distance: f64, cost: Money) -> Self {
        Self::ServiceRequest {
            message: NEW_REQUEST.to_string(),
            booking_id,
            distance,
            cost,
        }
    }

    /// Wire tag of this message.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Chat { .. } => "chat",
            Self::Notification { .. } => "notification",
            Self::Navigation { .. } => "navigation",
            Self::ServiceRequest { .. } => "serviceRequest",
            Self::Location { .. } => "location",
        }
    }
}

/// An outbound message addressed to the channel of `channel`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundFrame {
    pub channel: Role,
    #[serde(flatten)]
    pub message: OutboundMessage,
}

impl OutboundFrame {
    pub fn new(channel: Role, message: OutboundMessage) -> Self {
        Self { channel, message }
    }

    /// Encodes the frame as JSON text.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
