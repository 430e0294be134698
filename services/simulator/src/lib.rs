//! privpack simulator library.
//!
//! This crate primarily ships the `privpack-sim` binary, but exposes its
//! engine so runs can be driven and inspected from tests.

pub mod blocks;
pub mod config;
pub mod error;
pub mod policy;
pub mod report;
pub mod scheduler;
pub mod solver;
pub mod tasks;

pub use config::SimConfig;
pub use error::{SimError, SimResult};
pub use scheduler::{SimState, Simulation};
