//! Towline Core - Shared domain types for the dispatch daemon
//!
//! This crate provides the domain types shared between the wire protocol
//! (`towline-protocol`) and the daemon (`towlined`):
//! - identifiers, roles, money and coordinates
//! - the storage records the daemon reads and mutates
//! - the request-matching state machine
//! - the `Store` collaborator trait and an in-process `MemoryStore`
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod chat;
pub mod error;
pub mod geo;
pub mod ids;
pub mod matching;
pub mod money;
pub mod records;
pub mod role;
pub mod store;

// Re-exports for convenience
pub use chat::{ChatMessage, DeliveryStatus, NewChatMessage};
pub use error::{DomainError, DomainResult};
pub use geo::{Coordinates, Place};
pub use ids::{BookingId, ChatId, MessageId, ParticipantId, RideId, VehicleId};
pub use matching::{MatchError, MatchRequest, MatchStatus, OfferResponse, StaleReason, Transition};
pub use money::Money;
pub use records::{
    Booking, BookingKind, BookingStatus, BookingUpdate, NewBooking, Provider, ProviderKind, Ride,
    RideStatus,
};
pub use role::Role;
pub use store::{MemoryStore, Store, StoreError, StoreResult};
