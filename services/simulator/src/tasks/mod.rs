//! Tasks, the pending queue and the workload feeding it.

mod queue;
mod workload;

use privpack_budget::Budget;
use privpack_events::{DecisionRecord, Outcome};
use privpack_id::{BlockId, SimTime, TaskId};

use crate::blocks::{AllocationPlan, BlockSelector};

pub use queue::TaskQueue;
pub use workload::{TaskDescriptor, TraceRecord, Workload, WorkloadError};

/// An analytics task asking for privacy budget.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub name: Option<String>,
    pub arrival: SimTime,
    pub profit: f64,
    pub selector: BlockSelector,
    /// Per-alpha demand, charged to each selected block.
    pub demand: Budget,
    /// Absolute deadline.
    pub deadline: Option<SimTime>,
    /// Times a policy has considered the task.
    pub attempts: u32,
    /// Blocks the selector resolved to at the last decision.
    pub last_blocks: Vec<BlockId>,
}

impl Task {
    pub fn new(id: TaskId, arrival: SimTime, demand: Budget, selector: BlockSelector) -> Self {
        Self {
            id,
            name: None,
            arrival,
            profit: 1.0,
            selector,
            demand,
            deadline: None,
            attempts: 0,
            last_blocks: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_profit(mut self, profit: f64) -> Self {
        self.profit = profit;
        self
    }

    pub fn with_deadline(mut self, deadline: SimTime) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Decision record for the task's terminal state.
    pub fn decision_record(
        &self,
        outcome: Outcome,
        policy: &str,
        now: SimTime,
        plan: Option<&AllocationPlan>,
    ) -> DecisionRecord {
        DecisionRecord {
            task_id: self.id,
            task_name: self.name.clone(),
            outcome,
            policy: policy.to_string(),
            arrival_time: self.arrival,
            decision_time: now,
            profit: self.profit,
            demand: self.demand.as_slice().to_vec(),
            block_ids: plan.map_or_else(|| self.last_blocks.clone(), |p| p.blocks.clone()),
            allocations: plan.map(AllocationPlan::allocations).unwrap_or_default(),
            attempts: self.attempts,
        }
    }
}
