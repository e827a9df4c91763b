//! Towline Protocol - Wire format for channel messages
//!
//! Every frame exchanged over a participant connection is a JSON object
//! carrying a `channel` tag (the role the message belongs to) and a `type`
//! tag (the operation within that channel). This crate provides:
//! - the per-channel dispatch tables (`channel`)
//! - frame parsing into typed inbound messages (`envelope`, `inbound`)
//! - the outbound messages the daemon pushes to clients (`outbound`)

pub mod channel;
pub mod envelope;
pub mod inbound;
pub mod outbound;

pub use channel::{message_types, MessageKind};
pub use envelope::{parse_frame, Envelope, ParseError, RawEnvelope};
pub use inbound::{
    AvailabilityUpdate, ChatPayload, FieldAgentMessage, InboundMessage, LocationUpdate,
    OfferReply, PaymentPayload, RequesterMessage, StationMessage,
};
pub use outbound::{OutboundFrame, OutboundMessage, BOOKINGS_SCREEN};
