//! Density-ordered first fit.

use std::time::Duration;

use super::{fill_greedily, PackingProblem, Solution, SolveStatus, Solver};

/// Polynomial heuristic: items by value over normalized weight, first fit.
///
/// Always completes. The selection is only reported as proven optimal when
/// every item fits.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedySolver;

impl GreedySolver {
    /// The greedy selection, unsorted.
    pub(crate) fn select(problem: &PackingProblem) -> Vec<usize> {
        let order = problem.density_order();
        let mut residual = problem.capacities().to_vec();
        let mut selected = Vec::with_capacity(order.len());
        fill_greedily(problem, &order, &mut selected, &mut residual);
        selected
    }
}

impl Solver for GreedySolver {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn solve(&self, problem: &PackingProblem, _time_limit: Duration) -> Solution {
        if problem.is_infeasible() {
            return Solution::infeasible();
        }
        let selected = Self::select(problem);
        let proven_optimal = selected.len() == problem.n_items();
        Solution::assignment(problem, selected, SolveStatus::Optimal, proven_optimal)
    }
}
