//! Storage records the daemon reads or mutates.
//!
//! These are deliberately partial views of the booking, ride and provider
//! records owned by the storage collaborator: only the fields the dispatch
//! core touches are modelled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::{Coordinates, Place};
use crate::ids::{BookingId, ChatId, ParticipantId, RideId, VehicleId};
use crate::money::Money;

/// Kind of provider account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Mobile tow truck (field agent).
    Tower,
    /// Stationary service garage (station agent).
    Service,
}

/// A tow truck or service garage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub id: ParticipantId,
    pub name: String,
    pub kind: ProviderKind,
    #[serde(default)]
    pub location: Option<Coordinates>,
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub earnings: Money,
    #[serde(default)]
    pub balance: Money,
}

/// Kind of booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingKind {
    Towing,
    Service,
}

/// Lifecycle status of a booking record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Accepted,
    Ongoing,
    Completed,
    Rejected,
    Cancelled,
}

/// A booking record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: BookingId,
    pub kind: BookingKind,
    pub requester_id: ParticipantId,
    pub vehicle_id: VehicleId,
    pub provider_id: Option<ParticipantId>,
    pub ride_id: Option<RideId>,
    pub chat_id: Option<ChatId>,
    pub status: BookingStatus,
    pub cost: Money,
    pub paid: Money,
    pub balance: Money,
    pub notes: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields required to create a booking.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBooking {
    pub kind: BookingKind,
    pub requester_id: ParticipantId,
    pub vehicle_id: VehicleId,
    pub ride_id: Option<RideId>,
    pub chat_id: Option<ChatId>,
    pub cost: Money,
    pub notes: Vec<String>,
}

/// Partial update applied to a booking; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingUpdate {
    pub status: Option<BookingStatus>,
    pub provider_id: Option<ParticipantId>,
}

impl BookingUpdate {
    /// Update that only changes the status.
    pub fn status(status: BookingStatus) -> Self {
        Self {
            status: Some(status),
            provider_id: None,
        }
    }

    /// Update that assigns a provider and marks the booking accepted.
    pub fn accepted_by(provider_id: ParticipantId) -> Self {
        Self {
            status: Some(BookingStatus::Accepted),
            provider_id: Some(provider_id),
        }
    }
}

/// Lifecycle status of a ride record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RideStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

/// A ride record: the towing leg of a booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ride {
    pub id: RideId,
    pub from: Place,
    pub to: Place,
    /// Last reported position of the assigned tow truck.
    pub driver: Option<Coordinates>,
    pub status: RideStatus,
}
