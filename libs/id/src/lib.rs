//! # privpack-id
//!
//! Stable id types and simulated timestamps for the privpack scheduler.
//!
//! ## Design Principles
//!
//! - Ids are assigned by the simulator from monotonic sequences, never reused
//! - Ids are typed to prevent mixing blocks and tasks
//! - Every id has a canonical prefixed form (`blk_3`, `task_17`) for logs,
//!   and serializes as its bare integer so traces stay easy to post-process
//! - Simulated time is a totally ordered finite `f64`
//!
//! ## Ordering
//!
//! Block and task ids increase with creation order, so sorting by id is the
//! same as sorting by creation (ties in arrival time are broken this way).

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;
