//! # privpack-budget
//!
//! Privacy budget arithmetic for the privpack scheduler.
//!
//! Budgets are tracked under Rényi differential privacy: a budget is a vector
//! with one epsilon per Rényi order ("alpha"). Every vector in a run is
//! indexed by the same [`AlphaSet`], which is passed around explicitly.
//!
//! - [`Budget`]: a plain non-negative vector (a demand, a capacity, an
//!   increment).
//! - [`BudgetCurve`]: the remaining budget of one block, with the
//!   consume/unlock operations and the non-negativity invariant.
//! - [`DemandCurve`]: RDP curves of common mechanisms, used to build task
//!   demands.
//!
//! # Invariants
//!
//! - Vectors combined in one operation have the same length as the alpha set
//! - A curve's remaining budget never goes below zero on any alpha
//! - Unlocking never raises a curve above its capacity

mod alphas;
mod budget;
mod curve;
mod error;
mod rdp;

pub use alphas::{AlphaSet, DEFAULT_ALPHAS};
pub use budget::Budget;
pub use curve::BudgetCurve;
pub use error::BudgetError;
pub use rdp::DemandCurve;
