//! # privpack-events
//!
//! Output records of a simulation run and the sinks that receive them.
//!
//! ## Design Principles
//!
//! - Records are immutable once emitted
//! - Every terminal task state produces exactly one decision record
//! - Records are ordered by a run-wide sequence number
//!
//! ## Record Envelope
//!
//! All records share a common envelope with:
//! - Stream ordering (`seq`)
//! - Simulated time of emission (`sim_time`)
//! - Record kind and schema version (`kind`, `version`)
//!
//! ## Record Kinds
//!
//! - Task decisions (`task.allocated`, `task.rejected`)
//! - Periodic metrics (`metrics.reported`)
//! - Final summary (`run.completed`)

mod envelope;
mod error;
mod sink;
mod types;

pub use envelope::*;
pub use error::EventError;
pub use sink::*;
pub use types::*;
