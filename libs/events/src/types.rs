//! Record payload definitions.
//!
//! Each record kind has a payload struct. Budget vectors are written as plain
//! per-alpha arrays in the order of the run's alpha set.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use privpack_id::{BlockId, SimTime, TaskId};
use serde::{Deserialize, Serialize};

// =============================================================================
// Record Kind Constants
// =============================================================================

/// All record kind names as constants.
pub mod record_kinds {
    // Tasks
    pub const TASK_ALLOCATED: &str = "task.allocated";
    pub const TASK_REJECTED: &str = "task.rejected";

    // Metrics
    pub const METRICS_REPORTED: &str = "metrics.reported";

    // Run
    pub const RUN_COMPLETED: &str = "run.completed";
}

// =============================================================================
// Status Enums
// =============================================================================

/// Why a task ended up rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Some targeted block could not afford the demand.
    InsufficientBudget,
    /// No live block was eligible for the task's selector.
    NoEligibleBlocks,
    /// Fewer eligible blocks than the selector asked for.
    NotEnoughBlocks,
    /// The task was deferred more times than allowed.
    RetriesExhausted,
    /// The task's deadline passed while it was pending.
    DeadlineExpired,
    /// The solver could not run and the batch was not retried.
    SolverUnavailable,
    /// The run hit its wall-clock bound.
    SchedulerTimeout,
    /// No further event could ever admit the task.
    Unschedulable,
    /// The run stopped on a fatal error while the task was pending.
    RunAborted,
}

impl RejectReason {
    /// All reasons, in declaration order.
    pub const ALL: [RejectReason; 9] = [
        RejectReason::InsufficientBudget,
        RejectReason::NoEligibleBlocks,
        RejectReason::NotEnoughBlocks,
        RejectReason::RetriesExhausted,
        RejectReason::DeadlineExpired,
        RejectReason::SolverUnavailable,
        RejectReason::SchedulerTimeout,
        RejectReason::Unschedulable,
        RejectReason::RunAborted,
    ];

    /// Stable reason code written to records.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::InsufficientBudget => "insufficient_budget",
            RejectReason::NoEligibleBlocks => "no_eligible_blocks",
            RejectReason::NotEnoughBlocks => "not_enough_blocks",
            RejectReason::RetriesExhausted => "retries_exhausted",
            RejectReason::DeadlineExpired => "deadline_expired",
            RejectReason::SolverUnavailable => "solver_unavailable",
            RejectReason::SchedulerTimeout => "scheduler_timeout",
            RejectReason::Unschedulable => "unschedulable",
            RejectReason::RunAborted => "run_aborted",
        }
    }

    /// True for reasons a batch policy may still recover from by retrying
    /// at a later recomputation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RejectReason::InsufficientBudget | RejectReason::NotEnoughBlocks
        )
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Terminal state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    Allocated,
    Rejected(RejectReason),
}

impl Outcome {
    pub fn is_allocated(&self) -> bool {
        matches!(self, Outcome::Allocated)
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            Outcome::Allocated => None,
            Outcome::Rejected(reason) => Some(*reason),
        }
    }
}

/// Why the clock stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every event was processed and the queue drained.
    Completed,
    /// The wall-clock bound was exceeded.
    SchedulerTimeout,
    /// A fatal error stopped the clock; records up to that point stand.
    Aborted,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Completed => write!(f, "completed"),
            StopReason::SchedulerTimeout => write!(f, "scheduler_timeout"),
            StopReason::Aborted => write!(f, "aborted"),
        }
    }
}

// =============================================================================
// Task Records
// =============================================================================

/// Budget committed to one block for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockAllocation {
    pub block_id: BlockId,
    pub amounts: Vec<f64>,
}

/// Payload for `task.allocated` and `task.rejected`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub task_id: TaskId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    pub outcome: Outcome,
    pub policy: String,
    pub arrival_time: SimTime,
    pub decision_time: SimTime,
    pub profit: f64,
    /// Per-alpha demand, applied to each block.
    pub demand: Vec<f64>,
    /// Blocks the selector resolved to at the last decision; empty when it
    /// never resolved.
    pub block_ids: Vec<BlockId>,
    /// Committed amounts; empty for rejections.
    pub allocations: Vec<BlockAllocation>,
    /// Times the task was considered by the policy.
    pub attempts: u32,
}

impl DecisionRecord {
    /// Record kind for this decision.
    pub fn kind(&self) -> &'static str {
        match self.outcome {
            Outcome::Allocated => record_kinds::TASK_ALLOCATED,
            Outcome::Rejected(_) => record_kinds::TASK_REJECTED,
        }
    }

    /// Time between arrival and decision.
    pub fn delay(&self) -> f64 {
        self.decision_time.since(self.arrival_time)
    }
}

// =============================================================================
// Metrics Records
// =============================================================================

/// State of one block at report time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockUsage {
    pub block_id: BlockId,
    pub created_at: SimTime,
    pub expired: bool,
    pub remaining: Vec<f64>,
    /// Largest consumed share of capacity over the alphas.
    pub max_consumed_fraction: f64,
}

/// Payload for `metrics.reported`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub sim_time: SimTime,
    pub tasks_arrived: u64,
    pub tasks_allocated: u64,
    pub tasks_rejected: u64,
    pub tasks_pending: u64,
    /// Allocated over decided tasks; zero before any decision.
    pub acceptance_rate: f64,
    pub realized_profit: f64,
    /// Jain's index over allocated tasks' dominant shares.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fairness: Option<f64>,
    pub blocks: Vec<BlockUsage>,
}

// =============================================================================
// Run Records
// =============================================================================

/// Payload for `run.completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub policy: String,
    /// Hash of the effective configuration.
    pub config_fingerprint: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub wall_time_seconds: f64,
    pub final_sim_time: SimTime,
    pub stop_reason: StopReason,
    pub blocks_created: u64,
    pub total_tasks: u64,
    pub allocated: u64,
    pub rejected: u64,
    pub realized_profit: f64,
    pub acceptance_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fairness: Option<f64>,
    /// Rejection counts keyed by reason code.
    pub rejections_by_reason: BTreeMap<String, u64>,
}

/// Any record payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Decision(DecisionRecord),
    Metrics(MetricsSnapshot),
    Summary(RunSummary),
}

impl Record {
    /// Record kind written to the envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Record::Decision(decision) => decision.kind(),
            Record::Metrics(_) => record_kinds::METRICS_REPORTED,
            Record::Summary(_) => record_kinds::RUN_COMPLETED,
        }
    }

    pub fn as_decision(&self) -> Option<&DecisionRecord> {
        match self {
            Record::Decision(decision) => Some(decision),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(outcome: Outcome) -> DecisionRecord {
        DecisionRecord {
            task_id: TaskId::new(7),
            task_name: None,
            outcome,
            policy: "fcfs".into(),
            arrival_time: SimTime::new(1.0).unwrap(),
            decision_time: SimTime::new(3.5).unwrap(),
            profit: 1.0,
            demand: vec![6.0],
            block_ids: vec![BlockId::new(0)],
            allocations: vec![],
            attempts: 1,
        }
    }

    #[test]
    fn test_reject_reason_codes_are_unique() {
        let mut codes: Vec<_> = RejectReason::ALL.iter().map(|r| r.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), RejectReason::ALL.len());
    }

    #[test]
    fn test_reject_reason_serializes_as_code() {
        for reason in RejectReason::ALL {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason.code()));
        }
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(Outcome::Rejected(RejectReason::NoEligibleBlocks)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "rejected", "reason": "no_eligible_blocks"})
        );
        let json = serde_json::to_value(Outcome::Allocated).unwrap();
        assert_eq!(json, serde_json::json!({"status": "allocated"}));
    }

    #[test]
    fn test_decision_kind_and_delay() {
        let allocated = decision(Outcome::Allocated);
        assert_eq!(allocated.kind(), record_kinds::TASK_ALLOCATED);
        assert_eq!(allocated.delay(), 2.5);

        let rejected = decision(Outcome::Rejected(RejectReason::InsufficientBudget));
        assert_eq!(rejected.kind(), record_kinds::TASK_REJECTED);
        assert_eq!(rejected.outcome.reason(), Some(RejectReason::InsufficientBudget));
    }

    #[test]
    fn test_decision_round_trips() {
        let record = decision(Outcome::Rejected(RejectReason::DeadlineExpired));
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("task_name"));
        let parsed: DecisionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_retryable_reasons() {
        assert!(RejectReason::InsufficientBudget.is_retryable());
        assert!(!RejectReason::NoEligibleBlocks.is_retryable());
        assert!(!RejectReason::Unschedulable.is_retryable());
    }
}
