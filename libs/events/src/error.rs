//! Error types for record handling.

use thiserror::Error;

/// Errors that can occur when building or writing records.
#[derive(Debug, Error, Clone)]
pub enum EventError {
    /// A required envelope field was not set.
    #[error("missing record field: {0}")]
    MissingField(&'static str),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The sink could not be written to.
    #[error("sink write failed: {0}")]
    Io(String),

    /// The record sequence went backwards.
    #[error("invalid record sequence: expected {expected}, got {actual}")]
    InvalidSequence { expected: u64, actual: u64 },
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for EventError {
    fn from(err: std::io::Error) -> Self {
        EventError::Io(err.to_string())
    }
}
