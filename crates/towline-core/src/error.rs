//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur when building domain values from untrusted input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Role name not recognised
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    /// Identifier was empty
    #[error("Empty {kind} identifier")]
    EmptyId { kind: &'static str },

    /// Coordinates outside the valid latitude/longitude range
    #[error("Invalid coordinates: ({latitude}, {longitude})")]
    InvalidCoordinates { latitude: f64, longitude: f64 },

    /// Invalid field value
    #[error("Invalid {field}: {value} (expected {expected})")]
    InvalidFieldValue {
        field: String,
        value: String,
        expected: String,
    },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
