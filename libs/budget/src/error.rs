//! Error types for budget arithmetic.

use thiserror::Error;

/// Errors raised by budget vectors and curves.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BudgetError {
    /// Two vectors (or a vector and the alpha set) have different lengths.
    #[error("dimension mismatch: expected {expected} alphas, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A commit asked for more than the curve has left on some alpha.
    #[error(
        "insufficient budget at alpha #{alpha_index}: requested {requested}, available {available}"
    )]
    InsufficientBudget {
        alpha_index: usize,
        requested: f64,
        available: f64,
    },

    /// The alpha set is empty, unordered or contains invalid orders.
    #[error("invalid alpha set: {0}")]
    InvalidAlphas(String),

    /// A budget entry is negative, NaN or infinite.
    #[error("invalid budget value {value} at alpha #{index}")]
    InvalidValue { index: usize, value: f64 },

    /// A mechanism or conversion parameter is out of range.
    #[error("invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
}

impl BudgetError {
    /// Returns true for the expected, per-task rejection case.
    pub fn is_insufficient(&self) -> bool {
        matches!(self, BudgetError::InsufficientBudget { .. })
    }
}
