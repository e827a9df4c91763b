//! Type-safe identifiers.
//!
//! Every record the daemon touches is addressed by an opaque string ID handed
//! out by the storage collaborator. Wrapping each kind in its own newtype keeps
//! a `RideId` from being passed where a `BookingId` is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from a string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the underlying string reference.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identity of a connected participant (requester, tower, or station).
    ///
    /// The same identity space is used for requesters and providers; the
    /// `Role` disambiguates.
    ParticipantId
);

string_id!(
    /// Identifier of a booking record.
    BookingId
);

string_id!(
    /// Identifier of a ride record (the towing leg of a booking).
    RideId
);

string_id!(
    /// Identifier of a chat thread attached to a booking.
    ChatId
);

string_id!(
    /// Identifier of a single chat message.
    MessageId
);

string_id!(
    /// Identifier of the requester's vehicle.
    VehicleId
);
