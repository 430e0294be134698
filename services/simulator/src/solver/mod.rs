//! Optimization backend for multi-dimensional knapsack problems.
//!
//! Policies build a [`PackingProblem`] (items are tasks, constraints are
//! budget dimensions) and hand it to a [`Solver`]. Solvers only read the
//! problem; they never see registry state.

mod exact;
mod greedy;

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{SolverConfig, SolverKind};

pub use exact::ExactSolver;
pub use greedy::GreedySolver;

/// Solver errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("invalid packing problem: {0}")]
    InvalidProblem(String),

    #[error("cannot build solver thread pool: {0}")]
    ThreadPool(String),
}

/// What a packing maximizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Number of admitted items.
    Count,
    /// Sum of admitted items' values.
    #[default]
    Profit,
}

/// Maximize `sum(values[i] * x[i])` subject to
/// `sum(weights[c][i] * x[i]) <= capacities[c]` for every constraint `c`.
#[derive(Debug, Clone, PartialEq)]
pub struct PackingProblem {
    values: Vec<f64>,
    capacities: Vec<f64>,
    /// Indexed `[constraint][item]`.
    weights: Vec<Vec<f64>>,
}

impl PackingProblem {
    /// Checks shapes. Values and weights must be finite and non-negative;
    /// capacities only finite.
    pub fn new(
        values: Vec<f64>,
        capacities: Vec<f64>,
        weights: Vec<Vec<f64>>,
    ) -> Result<Self, SolverError> {
        if weights.len() != capacities.len() {
            return Err(SolverError::InvalidProblem(format!(
                "{} constraint rows for {} capacities",
                weights.len(),
                capacities.len()
            )));
        }
        if let Some((c, row)) = weights
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != values.len())
        {
            return Err(SolverError::InvalidProblem(format!(
                "constraint {c} has {} weights for {} items",
                row.len(),
                values.len()
            )));
        }
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(SolverError::InvalidProblem("values must be finite and non-negative".into()));
        }
        if weights.iter().flatten().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(SolverError::InvalidProblem("weights must be finite and non-negative".into()));
        }
        if capacities.iter().any(|c| !c.is_finite()) {
            return Err(SolverError::InvalidProblem("capacities must be finite".into()));
        }
        Ok(Self {
            values,
            capacities,
            weights,
        })
    }

    pub fn n_items(&self) -> usize {
        self.values.len()
    }

    pub fn n_constraints(&self) -> usize {
        self.capacities.len()
    }

    pub fn value(&self, item: usize) -> f64 {
        self.values[item]
    }

    pub fn capacity(&self, constraint: usize) -> f64 {
        self.capacities[constraint]
    }

    pub fn weight(&self, constraint: usize, item: usize) -> f64 {
        self.weights[constraint][item]
    }

    /// True if some capacity is negative, which no selection can satisfy.
    pub fn is_infeasible(&self) -> bool {
        self.capacities.iter().any(|c| *c < 0.0)
    }

    /// True if `item` fits into `residual`.
    pub fn fits(&self, item: usize, residual: &[f64]) -> bool {
        self.weights
            .iter()
            .zip(residual)
            .all(|(row, r)| row[item] <= *r)
    }

    /// True if `selected` satisfies every constraint.
    pub fn is_feasible(&self, selected: &[usize]) -> bool {
        self.weights.iter().zip(&self.capacities).all(|(row, cap)| {
            let used: f64 = selected.iter().map(|i| row[*i]).sum();
            used <= *cap
        })
    }

    pub fn objective_of(&self, selected: &[usize]) -> f64 {
        selected.iter().map(|i| self.values[*i]).sum()
    }

    /// Subtracts `item`'s weights from `residual`.
    pub(crate) fn take(&self, item: usize, residual: &mut [f64]) {
        for (row, r) in self.weights.iter().zip(residual.iter_mut()) {
            *r -= row[item];
        }
    }

    /// Gives `item`'s weights back to `residual`.
    pub(crate) fn give_back(&self, item: usize, residual: &mut [f64]) {
        for (row, r) in self.weights.iter().zip(residual.iter_mut()) {
            *r += row[item];
        }
    }

    /// Weight of `item` summed over constraints, each scaled by its capacity.
    /// Constraints with zero capacity are skipped.
    pub(crate) fn normalized_weight(&self, item: usize) -> f64 {
        self.weights
            .iter()
            .zip(&self.capacities)
            .filter(|(_, cap)| **cap > 0.0)
            .map(|(row, cap)| row[item] / cap)
            .sum()
    }

    /// Items that fit into the full capacities on their own, ordered by
    /// value over normalized weight, highest first; ties by index.
    pub(crate) fn density_order(&self) -> Vec<usize> {
        let mut items: Vec<(usize, f64)> = (0..self.n_items())
            .filter(|i| self.fits(*i, &self.capacities))
            .map(|i| {
                let weight = self.normalized_weight(i);
                let density = if weight > 0.0 {
                    self.values[i] / weight
                } else {
                    f64::INFINITY
                };
                (i, density)
            })
            .collect();
        items.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        items.into_iter().map(|(i, _)| i).collect()
    }

    pub(crate) fn capacities(&self) -> &[f64] {
        &self.capacities
    }
}

/// Outcome class of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// The search completed.
    Optimal,
    /// The time limit hit; the best assignment found so far is returned.
    TimedOutWithIncumbent,
    /// No assignment satisfies the constraints.
    Infeasible,
    /// The backend declined the problem.
    SolverUnavailable,
}

impl SolveStatus {
    /// True when the solution carries a usable assignment.
    pub fn has_assignment(&self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::TimedOutWithIncumbent)
    }
}

impl std::fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolveStatus::Optimal => write!(f, "optimal"),
            SolveStatus::TimedOutWithIncumbent => write!(f, "timed_out_with_incumbent"),
            SolveStatus::Infeasible => write!(f, "infeasible"),
            SolveStatus::SolverUnavailable => write!(f, "solver_unavailable"),
        }
    }
}

/// Result of a solve.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// Selected item indices, ascending.
    pub selected: Vec<usize>,
    pub status: SolveStatus,
    pub objective: f64,
    /// True only when the selection is known to be optimal.
    pub proven_optimal: bool,
}

impl Solution {
    pub(crate) fn assignment(
        problem: &PackingProblem,
        mut selected: Vec<usize>,
        status: SolveStatus,
        proven_optimal: bool,
    ) -> Self {
        selected.sort_unstable();
        Self {
            objective: problem.objective_of(&selected),
            selected,
            status,
            proven_optimal,
        }
    }

    pub fn infeasible() -> Self {
        Self::empty(SolveStatus::Infeasible)
    }

    pub fn unavailable() -> Self {
        Self::empty(SolveStatus::SolverUnavailable)
    }

    fn empty(status: SolveStatus) -> Self {
        Self {
            selected: Vec::new(),
            status,
            objective: 0.0,
            proven_optimal: false,
        }
    }
}

/// A packing backend. Implementations are selected at startup.
pub trait Solver: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Solves within `time_limit` of wall-clock time.
    fn solve(&self, problem: &PackingProblem, time_limit: Duration) -> Solution;
}

/// Builds the configured backend.
pub fn build_solver(config: &SolverConfig) -> Result<Arc<dyn Solver>, SolverError> {
    let solver: Arc<dyn Solver> = match config.backend {
        SolverKind::Exact => Arc::new(ExactSolver::new(config.max_items, config.threads)?),
        SolverKind::Greedy => Arc::new(GreedySolver),
    };
    Ok(solver)
}

/// Fills `selected` with any remaining candidates that still fit, in
/// density order.
pub(crate) fn fill_greedily(
    problem: &PackingProblem,
    order: &[usize],
    selected: &mut Vec<usize>,
    residual: &mut [f64],
) {
    for &item in order {
        if selected.contains(&item) {
            continue;
        }
        if problem.fits(item, residual) {
            problem.take(item, residual);
            selected.push(item);
        }
    }
}
