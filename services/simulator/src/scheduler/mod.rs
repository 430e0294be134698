//! Simulation clock and event loop.
//!
//! The scheduler is responsible for:
//! - Ordering block arrivals, unlocks, expiries and task arrivals in
//!   simulated time
//! - Running the allocation policy at arrival (FCFS) or at periodic
//!   recomputations (batch policies)
//! - Committing plans atomically and emitting one decision record per task
//! - Stopping on completion or on the wall-clock timeout

mod engine;
mod events;

pub use engine::{SimState, Simulation};
pub use events::{Event, EventKind, EventQueue};
