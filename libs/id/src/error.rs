//! Error types for id parsing and time validation.

use thiserror::Error;

/// Errors that can occur when parsing ids or building timestamps.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IdError {
    /// The id string is empty.
    #[error("ID cannot be empty")]
    Empty,

    /// The id has a prefix that belongs to another resource type.
    #[error("invalid ID prefix: expected '{expected}', got '{actual}'")]
    InvalidPrefix {
        expected: &'static str,
        actual: String,
    },

    /// The numeric portion of the id is invalid.
    #[error("invalid ID number: {0}")]
    InvalidNumber(String),

    /// A simulated timestamp was NaN or infinite.
    #[error("simulated time must be finite, got {0}")]
    NonFiniteTime(f64),

    /// A simulated timestamp was negative.
    #[error("simulated time cannot be negative, got {0}")]
    NegativeTime(f64),
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }

    /// Returns true if this error comes from a timestamp rather than an id.
    pub fn is_time_error(&self) -> bool {
        matches!(self, IdError::NonFiniteTime(_) | IdError::NegativeTime(_))
    }
}
