//! Participant roles and their wire names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

/// The three classes of real-time participants.
///
/// On the wire the roles keep the names the mobile and web clients already
/// speak (`Customer`, `Tower`, `Service`); the descriptive names are accepted
/// as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// A customer requesting a tow or a service.
    #[serde(rename = "Customer", alias = "Requester")]
    Requester,

    /// A mobile tow truck.
    #[serde(rename = "Tower", alias = "FieldAgent")]
    FieldAgent,

    /// A stationary service garage.
    #[serde(rename = "Service", alias = "StationAgent")]
    StationAgent,
}

impl Role {
    /// All roles, in channel order.
    pub const ALL: [Role; 3] = [Role::Requester, Role::FieldAgent, Role::StationAgent];

    /// Returns the wire name of this role.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Requester => "Customer",
            Self::FieldAgent => "Tower",
            Self::StationAgent => "Service",
        }
    }

    /// Parses a role from either its wire name or its descriptive name,
    /// ignoring ASCII case.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| {
            name.eq_ignore_ascii_case(role.wire_name())
                || name.eq_ignore_ascii_case(role.descriptive_name())
        })
    }

    fn descriptive_name(&self) -> &'static str {
        match self {
            Self::Requester => "Requester",
            Self::FieldAgent => "FieldAgent",
            Self::StationAgent => "StationAgent",
        }
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| DomainError::UnknownRole(s.to_string()))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}
