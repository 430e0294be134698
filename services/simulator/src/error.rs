//! Simulator error type.

use privpack_budget::BudgetError;
use privpack_events::EventError;
use privpack_id::IdError;
use thiserror::Error;

use crate::blocks::RegistryError;
use crate::config::ConfigError;
use crate::solver::SolverError;
use crate::tasks::WorkloadError;

/// Result type for simulator operations.
pub type SimResult<T> = Result<T, SimError>;

/// Errors that stop a run.
///
/// Per-task failures are not errors: they end up as rejection reasons in
/// decision records.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Workload(#[from] WorkloadError),

    #[error("block registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("record output: {0}")]
    Output(#[from] EventError),

    #[error("budget: {0}")]
    Budget(#[from] BudgetError),

    #[error("time: {0}")]
    Time(#[from] IdError),

    #[error("solver: {0}")]
    Solver(#[from] SolverError),

    #[error("simulation has not started")]
    NotStarted,

    #[error("simulation already ran")]
    AlreadyRan,
}
