//! Allocation policies.
//!
//! A policy looks at a [`BudgetSnapshot`] and a batch of candidates and
//! returns one [`Verdict`] per candidate. It deducts tentatively from its own
//! copy of the snapshot so the plans it returns fit together; the scheduler
//! commits them, in the returned order.

mod dominant_shares;
mod fcfs;
mod packing;
mod relevance;

use std::sync::Arc;
use std::time::Duration;

use privpack_events::RejectReason;
use privpack_id::{BlockId, SimTime, TaskId};

use crate::blocks::{AllocationPlan, BudgetSnapshot, SelectionError};
use crate::config::{PolicyKind, SchedulerConfig};
use crate::solver::{Solver, SolverError};
use crate::tasks::Task;

pub use dominant_shares::{dominant_share, DominantShares};
pub use fcfs::Fcfs;
pub use packing::Packing;
pub use relevance::{RelevanceCache, RelevanceMatrix};

/// A pending task with its selector resolved at decision time.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub task: &'a Task,
    pub blocks: Result<Vec<BlockId>, SelectionError>,
}

impl<'a> Candidate<'a> {
    pub fn new(task: &'a Task, blocks: Result<Vec<BlockId>, SelectionError>) -> Self {
        Self { task, blocks }
    }
}

/// What happens to a candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Commit the plan.
    Allocate(AllocationPlan),
    /// Terminal rejection.
    Reject(RejectReason),
    /// Keep the task pending for the next recomputation.
    Defer(RejectReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub task_id: TaskId,
    pub decision: Decision,
}

impl Verdict {
    pub fn allocate(task: &Task, blocks: Vec<BlockId>) -> Self {
        Self {
            task_id: task.id,
            decision: Decision::Allocate(AllocationPlan::new(task.id, blocks, task.demand.clone())),
        }
    }

    pub fn reject(task: &Task, reason: RejectReason) -> Self {
        Self {
            task_id: task.id,
            decision: Decision::Reject(reason),
        }
    }

    pub fn defer(task: &Task, reason: RejectReason) -> Self {
        Self {
            task_id: task.id,
            decision: Decision::Defer(reason),
        }
    }

    /// Verdict for a candidate whose selector did not resolve.
    ///
    /// Missing blocks are terminal when deciding at arrival; a batch policy
    /// may still see enough blocks later.
    pub(crate) fn unresolved(task: &Task, error: SelectionError, batch: bool) -> Self {
        match error {
            SelectionError::NotEnoughBlocks { .. } if batch => Self::defer(task, error.reason()),
            _ => Self::reject(task, error.reason()),
        }
    }
}

/// The closed set of allocation policies.
#[derive(Debug)]
pub enum Policy {
    Fcfs(Fcfs),
    DominantShares(DominantShares),
    Packing(Packing),
}

impl Policy {
    /// Builds the configured policy around the run's solver.
    pub fn from_config(
        config: &SchedulerConfig,
        solver: Arc<dyn Solver>,
        time_limit: Duration,
    ) -> Result<Self, SolverError> {
        let policy = match config.method {
            PolicyKind::Fcfs => Policy::Fcfs(Fcfs),
            PolicyKind::DominantShares => Policy::DominantShares(DominantShares::new(
                config.tiebreaker,
                config.clip_demands,
            )),
            PolicyKind::Packing => Policy::Packing(Packing::new(
                config.packing.clone(),
                solver,
                time_limit,
                config.metric_recomputation_period,
            )?),
        };
        Ok(policy)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Policy::Fcfs(_) => "fcfs",
            Policy::DominantShares(_) => "dominant_shares",
            Policy::Packing(_) => "packing",
        }
    }

    /// Batch policies decide at recomputation events instead of at arrival.
    pub fn is_batch(&self) -> bool {
        !matches!(self, Policy::Fcfs(_))
    }

    /// Refreshes policy state before a decision pass. Dominant shares drop
    /// tasks that are no longer pending; relevance matrices are recomputed
    /// once their period has elapsed.
    pub fn refresh(&mut self, snapshot: &BudgetSnapshot, candidates: &[Candidate<'_>], now: SimTime) {
        match self {
            Policy::Fcfs(_) => {}
            Policy::DominantShares(policy) => policy.refresh(candidates),
            Policy::Packing(policy) => policy.refresh(snapshot, candidates, now),
        }
    }

    /// One verdict per candidate, allocations in commit order.
    pub fn decide(
        &mut self,
        snapshot: &BudgetSnapshot,
        candidates: &[Candidate<'_>],
        now: SimTime,
    ) -> Vec<Verdict> {
        if candidates.is_empty() {
            return Vec::new();
        }
        match self {
            Policy::Fcfs(policy) => policy.decide(snapshot, candidates),
            Policy::DominantShares(policy) => policy.decide(snapshot, candidates),
            Policy::Packing(policy) => policy.decide(snapshot, candidates, now),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::blocks::{BlockRegistry, BlockSelector};
    use privpack_budget::Budget;

    pub(crate) fn snapshot(capacity: &[f64], n_blocks: usize) -> BudgetSnapshot {
        let mut registry = BlockRegistry::new(Budget::new(capacity.to_vec()).unwrap(), 16);
        for _ in 0..n_blocks {
            registry.create_block(SimTime::ZERO).unwrap();
        }
        registry.snapshot()
    }

    pub(crate) fn task(id: u64, demand: &[f64]) -> Task {
        Task::new(
            TaskId::new(id),
            SimTime::new(id as f64).unwrap(),
            Budget::new(demand.to_vec()).unwrap(),
            BlockSelector::latest(1),
        )
    }

    pub(crate) fn on_block0(task: &Task) -> Candidate<'_> {
        Candidate::new(task, Ok(vec![BlockId::new(0)]))
    }

    pub(crate) fn allocated(verdicts: &[Verdict]) -> Vec<u64> {
        verdicts
            .iter()
            .filter(|v| matches!(v.decision, Decision::Allocate(_)))
            .map(|v| v.task_id.value())
            .collect()
    }

    #[test]
    fn test_unresolved_candidates() {
        let t = task(0, &[1.0]);
        let not_enough = SelectionError::NotEnoughBlocks {
            requested: 2,
            available: 1,
        };
        assert_eq!(
            Verdict::unresolved(&t, not_enough, true).decision,
            Decision::Defer(RejectReason::NotEnoughBlocks)
        );
        assert_eq!(
            Verdict::unresolved(&t, not_enough, false).decision,
            Decision::Reject(RejectReason::NotEnoughBlocks)
        );
        assert_eq!(
            Verdict::unresolved(&t, SelectionError::NoEligibleBlocks, true).decision,
            Decision::Reject(RejectReason::NoEligibleBlocks)
        );
    }

    #[test]
    fn test_policy_names_and_batch_flag() {
        let solver: Arc<dyn Solver> = Arc::new(crate::solver::GreedySolver);
        let mut config = SchedulerConfig::default();
        for (method, name, batch) in [
            (PolicyKind::Fcfs, "fcfs", false),
            (PolicyKind::DominantShares, "dominant_shares", true),
            (PolicyKind::Packing, "packing", true),
        ] {
            config.method = method;
            let policy = Policy::from_config(&config, solver.clone(), Duration::from_secs(1)).unwrap();
            assert_eq!(policy.name(), name);
            assert_eq!(policy.is_batch(), batch);
        }
    }

    #[test]
    fn test_empty_batch_is_a_no_op() {
        let mut policy = Policy::DominantShares(DominantShares::default());
        assert!(policy.decide(&snapshot(&[10.0], 1), &[], SimTime::ZERO).is_empty());
    }
}
