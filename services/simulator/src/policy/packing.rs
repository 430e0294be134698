//! Efficient packing.

use std::sync::Arc;
use std::time::Duration;

use privpack_events::RejectReason;
use privpack_id::{BlockId, SimTime};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, warn};

use super::relevance::{self, MetricInputs, RelevanceCache};
use super::{Candidate, Verdict};
use crate::blocks::BudgetSnapshot;
use crate::config::{PackingConfig, PackingStrategy, SolverFailureMode};
use crate::solver::{GreedySolver, Objective, PackingProblem, Solution, Solver, SolverError};
use crate::tasks::Task;

/// Admits the batch that packs best into the remaining budget.
///
/// The `global` strategy solves one knapsack over the whole batch; the other
/// strategies rank tasks by profit over relevance-weighted cost and admit
/// greedily.
#[derive(Debug)]
pub struct Packing {
    config: PackingConfig,
    solver: Arc<dyn Solver>,
    time_limit: Duration,
    cache: RelevanceCache,
    pool: Option<ThreadPool>,
}

impl Packing {
    pub fn new(
        config: PackingConfig,
        solver: Arc<dyn Solver>,
        time_limit: Duration,
        recomputation_period: f64,
    ) -> Result<Self, SolverError> {
        let pool = if config.n_knapsack_solvers > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(config.n_knapsack_solvers)
                .thread_name(|index| format!("privpack-knapsack-{index}"))
                .build()
                .map_err(|e| SolverError::ThreadPool(e.to_string()))?;
            Some(pool)
        } else {
            None
        };
        Ok(Self {
            config,
            solver,
            time_limit,
            cache: RelevanceCache::new(recomputation_period),
            pool,
        })
    }

    pub fn strategy(&self) -> PackingStrategy {
        self.config.strategy
    }

    pub fn relevance(&self) -> &RelevanceCache {
        &self.cache
    }

    /// Recomputes the relevance matrix when due.
    pub fn refresh(&mut self, snapshot: &BudgetSnapshot, candidates: &[Candidate<'_>], now: SimTime) {
        if self.config.strategy == PackingStrategy::Global || !self.cache.is_due(snapshot, now) {
            return;
        }
        let demands = resolved(candidates);
        let matrix = relevance::compute(&MetricInputs {
            snapshot,
            demands: &demands,
            config: &self.config,
            solver: self.solver.as_ref(),
            time_limit: self.time_limit,
            pool: self.pool.as_ref(),
        });
        self.cache.store(matrix, now);
    }

    pub fn decide(
        &mut self,
        snapshot: &BudgetSnapshot,
        candidates: &[Candidate<'_>],
        now: SimTime,
    ) -> Vec<Verdict> {
        let mut verdicts = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if let Err(e) = &candidate.blocks {
                verdicts.push(Verdict::unresolved(candidate.task, *e, true));
            }
        }
        let items = resolved(candidates);
        if items.is_empty() {
            return verdicts;
        }

        match self.config.strategy {
            PackingStrategy::Global => verdicts.extend(self.decide_global(snapshot, &items)),
            _ => {
                self.refresh(snapshot, candidates, now);
                verdicts.extend(self.decide_by_efficiency(snapshot, &items));
            }
        }
        verdicts
    }

    fn decide_global(&self, snapshot: &BudgetSnapshot, items: &[(&Task, &[BlockId])]) -> Vec<Verdict> {
        let solution = match build_problem(snapshot, items, self.config.objective) {
            Ok(problem) => {
                let solution = self.solver.solve(&problem, self.time_limit);
                debug!(
                    solver = self.solver.name(),
                    items = problem.n_items(),
                    constraints = problem.n_constraints(),
                    status = %solution.status,
                    objective = solution.objective,
                    "Batch solved"
                );
                if solution.status.has_assignment() {
                    Some(solution)
                } else {
                    self.fallback(&problem, &solution)
                }
            }
            Err(e) => {
                warn!(error = %e, "Cannot build packing problem");
                None
            }
        };

        let Some(solution) = solution else {
            return items
                .iter()
                .map(|(task, _)| match self.config.on_solver_failure {
                    SolverFailureMode::RejectBatch => {
                        Verdict::reject(task, RejectReason::SolverUnavailable)
                    }
                    _ => Verdict::defer(task, RejectReason::SolverUnavailable),
                })
                .collect();
        };

        // Solutions are re-checked against the snapshot in arrival order; a
        // timed-out incumbent is never trusted blindly.
        let mut budget = snapshot.clone();
        items
            .iter()
            .enumerate()
            .map(|(index, (task, blocks))| {
                if solution.selected.binary_search(&index).is_ok()
                    && budget.deduct(blocks, &task.demand)
                {
                    Verdict::allocate(task, blocks.to_vec())
                } else {
                    Verdict::defer(task, RejectReason::InsufficientBudget)
                }
            })
            .collect()
    }

    fn fallback(&self, problem: &PackingProblem, failed: &Solution) -> Option<Solution> {
        match self.config.on_solver_failure {
            SolverFailureMode::Heuristic => {
                warn!(
                    solver = self.solver.name(),
                    status = %failed.status,
                    "Solver gave no assignment, using greedy heuristic"
                );
                let solution = GreedySolver.solve(problem, self.time_limit);
                solution.status.has_assignment().then_some(solution)
            }
            SolverFailureMode::DeferBatch | SolverFailureMode::RejectBatch => {
                warn!(
                    solver = self.solver.name(),
                    status = %failed.status,
                    mode = ?self.config.on_solver_failure,
                    "Solver gave no assignment"
                );
                None
            }
        }
    }

    fn decide_by_efficiency(
        &self,
        snapshot: &BudgetSnapshot,
        items: &[(&Task, &[BlockId])],
    ) -> Vec<Verdict> {
        let matrix = self.cache.matrix();
        let mut ranked: Vec<(f64, &Task, &[BlockId])> = items
            .iter()
            .map(|(task, blocks)| {
                let cost = matrix.cost(task, blocks);
                let efficiency = if cost > 0.0 {
                    task.profit / cost
                } else {
                    f64::INFINITY
                };
                (efficiency, *task, *blocks)
            })
            .collect();
        ranked.sort_by(|(ea, a, _), (eb, b, _)| {
            eb.total_cmp(ea)
                .then((a.arrival, a.id).cmp(&(b.arrival, b.id)))
        });

        let mut budget = snapshot.clone();
        ranked
            .into_iter()
            .map(|(_, task, blocks)| {
                if budget.deduct(blocks, &task.demand) {
                    Verdict::allocate(task, blocks.to_vec())
                } else {
                    Verdict::defer(task, RejectReason::InsufficientBudget)
                }
            })
            .collect()
    }
}

/// Candidates whose blocks resolved.
fn resolved<'c>(candidates: &'c [Candidate<'_>]) -> Vec<(&'c Task, &'c [BlockId])> {
    candidates
        .iter()
        .filter_map(|c| c.blocks.as_ref().ok().map(|b| (c.task, b.as_slice())))
        .collect()
}

/// One item per task, one constraint per (targeted block, alpha).
fn build_problem(
    snapshot: &BudgetSnapshot,
    items: &[(&Task, &[BlockId])],
    objective: Objective,
) -> Result<PackingProblem, SolverError> {
    let mut blocks: Vec<BlockId> = items.iter().flat_map(|(_, b)| b.iter().copied()).collect();
    blocks.sort_unstable();
    blocks.dedup();

    let mut capacities = Vec::new();
    let mut weights = Vec::new();
    for block_id in blocks {
        let remaining = snapshot.remaining(block_id).ok_or_else(|| {
            SolverError::InvalidProblem(format!("block {block_id} is not in the snapshot"))
        })?;
        for (alpha, capacity) in remaining.iter().enumerate() {
            capacities.push(capacity);
            weights.push(
                items
                    .iter()
                    .map(|(task, targets)| {
                        if targets.contains(&block_id) {
                            task.demand.get(alpha)
                        } else {
                            0.0
                        }
                    })
                    .collect(),
            );
        }
    }

    let values = items
        .iter()
        .map(|(task, _)| match objective {
            Objective::Count => 1.0,
            Objective::Profit => task.profit,
        })
        .collect();
    PackingProblem::new(values, capacities, weights)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{allocated, on_block0, snapshot, task};
    use super::super::Decision;
    use super::*;
    use crate::solver::{ExactSolver, SolveStatus};

    fn packing(config: PackingConfig, solver: Arc<dyn Solver>) -> Packing {
        Packing::new(config, solver, Duration::from_secs(5), 1.0).unwrap()
    }

    fn exact() -> Arc<dyn Solver> {
        Arc::new(ExactSolver::new(64, 1).unwrap())
    }

    /// Declines every problem.
    #[derive(Debug)]
    struct Unavailable;

    impl Solver for Unavailable {
        fn name(&self) -> &'static str {
            "unavailable"
        }

        fn solve(&self, _problem: &PackingProblem, _time_limit: Duration) -> Solution {
            Solution::unavailable()
        }
    }

    /// Times out with every item selected, feasible or not.
    #[derive(Debug)]
    struct OverfullIncumbent;

    impl Solver for OverfullIncumbent {
        fn name(&self) -> &'static str {
            "overfull"
        }

        fn solve(&self, problem: &PackingProblem, _time_limit: Duration) -> Solution {
            let all = (0..problem.n_items()).collect();
            Solution::assignment(problem, all, SolveStatus::TimedOutWithIncumbent, false)
        }
    }

    #[test]
    fn test_timed_out_incumbent_is_revalidated() {
        let tasks: Vec<Task> = (0..4).map(|i| task(i, &[4.0])).collect();
        let candidates: Vec<_> = tasks.iter().map(on_block0).collect();
        let policy = packing(PackingConfig::default(), Arc::new(OverfullIncumbent));
        let verdicts = policy.decide_global(&snapshot(&[10.0], 1), &resolved(&candidates));

        assert_eq!(allocated(&verdicts), vec![0, 1]);
        for verdict in &verdicts[2..] {
            assert_eq!(
                verdict.decision,
                Decision::Defer(RejectReason::InsufficientBudget)
            );
        }
    }

    #[test]
    fn test_global_count_admits_both_small_tasks() {
        let a = task(0, &[4.0]);
        let b = task(1, &[4.0]);
        let config = PackingConfig {
            objective: Objective::Count,
            ..PackingConfig::default()
        };
        let verdicts = packing(config, exact()).decide(
            &snapshot(&[10.0], 1),
            &[on_block0(&a), on_block0(&b)],
            SimTime::ZERO,
        );
        assert_eq!(allocated(&verdicts), vec![0, 1]);
    }

    #[test]
    fn test_global_prefers_two_small_over_one_big() {
        let big = task(0, &[6.0]).with_profit(3.0);
        let small_a = task(1, &[5.0]).with_profit(2.0);
        let small_b = task(2, &[5.0]).with_profit(2.0);
        let verdicts = packing(PackingConfig::default(), exact()).decide(
            &snapshot(&[10.0], 1),
            &[on_block0(&big), on_block0(&small_a), on_block0(&small_b)],
            SimTime::ZERO,
        );
        assert_eq!(allocated(&verdicts), vec![1, 2]);
        assert_eq!(
            verdicts[0].decision,
            Decision::Defer(RejectReason::InsufficientBudget)
        );
    }

    #[test]
    fn test_unavailable_solver_falls_back() {
        let a = task(0, &[4.0]);
        let candidates = [on_block0(&a)];
        let snap = snapshot(&[10.0], 1);

        let heuristic = packing(PackingConfig::default(), Arc::new(Unavailable));
        assert_eq!(allocated(&heuristic.decide_global(&snap, &resolved(&candidates))), vec![0]);

        let defer = packing(
            PackingConfig {
                on_solver_failure: SolverFailureMode::DeferBatch,
                ..PackingConfig::default()
            },
            Arc::new(Unavailable),
        );
        assert_eq!(
            defer.decide_global(&snap, &resolved(&candidates))[0].decision,
            Decision::Defer(RejectReason::SolverUnavailable)
        );

        let reject = packing(
            PackingConfig {
                on_solver_failure: SolverFailureMode::RejectBatch,
                ..PackingConfig::default()
            },
            Arc::new(Unavailable),
        );
        assert_eq!(
            reject.decide_global(&snap, &resolved(&candidates))[0].decision,
            Decision::Reject(RejectReason::SolverUnavailable)
        );
    }

    #[test]
    fn test_problem_has_one_constraint_per_block_alpha() {
        let a = task(0, &[1.0, 2.0]);
        let blocks = [BlockId::new(1)];
        let problem = build_problem(
            &snapshot(&[5.0, 5.0], 2),
            &[(&a, &blocks[..])],
            Objective::Profit,
        )
        .unwrap();
        assert_eq!(problem.n_constraints(), 2);
        assert_eq!(problem.weight(1, 0), 2.0);
        assert_eq!(
            exact().solve(&problem, Duration::from_secs(1)).status,
            SolveStatus::Optimal
        );
    }

    #[test]
    fn test_efficiency_strategies_never_overcommit() {
        let tasks: Vec<Task> = (0..6).map(|i| task(i, &[3.0, 1.0 + i as f64])).collect();
        let candidates: Vec<_> = tasks.iter().map(on_block0).collect();
        let snap = snapshot(&[10.0, 10.0], 1);
        for strategy in [
            PackingStrategy::SoftKnapsack,
            PackingStrategy::ArgmaxKnapsack,
            PackingStrategy::BatchOverflow,
            PackingStrategy::DynamicFlat,
            PackingStrategy::Flat,
            PackingStrategy::Overflow,
            PackingStrategy::SoftmaxOverflow,
        ] {
            let mut policy = packing(
                PackingConfig {
                    strategy,
                    temperature: 1.0,
                    ..PackingConfig::default()
                },
                exact(),
            );
            let verdicts = policy.decide(&snap, &candidates, SimTime::ZERO);
            assert_eq!(verdicts.len(), tasks.len());
            let admitted = allocated(&verdicts);
            assert!(!admitted.is_empty(), "{strategy:?} admitted nothing");
            let used: f64 = admitted.iter().map(|i| tasks[*i as usize].demand.get(1)).sum();
            assert!(used <= 10.0, "{strategy:?} used {used}");
            assert_eq!(policy.relevance().refreshed_at(), Some(SimTime::ZERO));
        }
    }

    #[test]
    fn test_dynamic_flat_prefers_cheap_tasks() {
        let expensive = task(0, &[9.0]);
        let cheap = task(1, &[2.0]);
        let mut policy = packing(
            PackingConfig {
                strategy: PackingStrategy::DynamicFlat,
                ..PackingConfig::default()
            },
            exact(),
        );
        let verdicts = policy.decide(
            &snapshot(&[10.0], 1),
            &[on_block0(&expensive), on_block0(&cheap)],
            SimTime::ZERO,
        );
        assert_eq!(allocated(&verdicts), vec![1]);
    }
}
