//! Storage collaborator interface.
//!
//! The dispatch core does not own booking, ride, provider or chat records; it
//! reads and mutates them through the `Store` trait. Production deployments
//! back this with their record database; `MemoryStore` is the in-process
//! implementation used by the standalone daemon and by tests.
//!
//! Every method is a single storage round-trip from the caller's point of
//! view. Failures surface as `StoreError` and are treated as retryable by the
//! dispatch engine.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::chat::{ChatMessage, DeliveryStatus, NewChatMessage};
use crate::geo::{Coordinates, Place};
use crate::ids::{BookingId, ChatId, MessageId, ParticipantId, RideId};
use crate::money::Money;
use crate::records::{Booking, BookingUpdate, NewBooking, Provider, ProviderKind, Ride, RideStatus};

/// Errors returned by the storage collaborator.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// The addressed record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The backend could not complete the operation; the caller may retry.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Creates a not-found error for a record kind and id.
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Returns true if the record was missing (as opposed to a backend failure).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Read/write operations the dispatch core consumes from record storage.
#[async_trait]
pub trait Store: Send + Sync {
    // ------------------------------------------------------------------
    // Providers
    // ------------------------------------------------------------------

    /// Looks up a provider by id.
    async fn provider(&self, id: &ParticipantId) -> StoreResult<Provider>;

    /// Sets a provider's availability, and its location when given.
    async fn set_provider_availability(
        &self,
        id: &ParticipantId,
        available: bool,
        location: Option<Coordinates>,
    ) -> StoreResult<()>;

    /// Records a provider's current location.
    async fn set_provider_location(&self, id: &ParticipantId, location: Coordinates) -> StoreResult<()>;

    /// Adds `amount` to a provider's earnings and withdrawable balance.
    async fn credit_provider(&self, id: &ParticipantId, amount: Money) -> StoreResult<Provider>;

    /// Available providers of `kind` within `radius_m` of `origin`, nearest first.
    async fn nearby_available(
        &self,
        kind: ProviderKind,
        origin: Coordinates,
        radius_m: f64,
    ) -> StoreResult<Vec<ParticipantId>>;

    // ------------------------------------------------------------------
    // Bookings
    // ------------------------------------------------------------------

    async fn create_booking(&self, booking: NewBooking) -> StoreResult<Booking>;

    async fn booking(&self, id: &BookingId) -> StoreResult<Booking>;

    async fn update_booking(&self, id: &BookingId, update: BookingUpdate) -> StoreResult<Booking>;

    /// Adds `amount` to the paid total and reduces any outstanding balance.
    async fn record_payment(&self, id: &BookingId, amount: Money) -> StoreResult<Booking>;

    // ------------------------------------------------------------------
    // Rides
    // ------------------------------------------------------------------

    async fn create_ride(&self, from: Place, to: Place) -> StoreResult<Ride>;

    async fn ride(&self, id: &RideId) -> StoreResult<Ride>;

    async fn set_ride_status(&self, id: &RideId, status: RideStatus) -> StoreResult<()>;

    /// Records the assigned tow truck's position on the ride.
    async fn set_ride_driver(&self, id: &RideId, position: Coordinates) -> StoreResult<()>;

    // ------------------------------------------------------------------
    // Chat
    // ------------------------------------------------------------------

    async fn create_chat(&self) -> StoreResult<ChatId>;

    /// Persists a new message with status `Sent`.
    async fn save_message(&self, message: NewChatMessage) -> StoreResult<ChatMessage>;

    async fn set_message_status(&self, id: &MessageId, status: DeliveryStatus) -> StoreResult<()>;
}
