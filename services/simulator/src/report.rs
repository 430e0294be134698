//! Run metrics and the final summary.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use privpack_budget::Budget;
use privpack_events::{DecisionRecord, MetricsSnapshot, Outcome, RejectReason, RunSummary, StopReason};
use privpack_id::SimTime;

use crate::blocks::BlockRegistry;
use crate::policy::dominant_share;

/// Jain's fairness index, `(sum x)^2 / (n * sum x^2)`.
///
/// `None` for an empty sample; 1 when every value is zero.
pub fn jain_index(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().sum();
    let sum_sq: f64 = values.iter().map(|x| x * x).sum();
    if sum_sq <= 0.0 {
        return Some(1.0);
    }
    Some(sum * sum / (values.len() as f64 * sum_sq))
}

/// Counters accumulated from decision records.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    arrived: u64,
    allocated: u64,
    rejected: u64,
    realized_profit: f64,
    rejections: BTreeMap<RejectReason, u64>,
    /// Dominant share of every allocated task, against one block's capacity.
    shares: Vec<f64>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_arrived(&mut self) {
        self.arrived += 1;
    }

    /// Accounts for a terminal decision.
    pub fn record(&mut self, decision: &DecisionRecord, capacity: &Budget, clip: bool) {
        match decision.outcome {
            Outcome::Allocated => {
                self.allocated += 1;
                self.realized_profit += decision.profit;
                if let Ok(demand) = Budget::new(decision.demand.clone()) {
                    self.shares.push(dominant_share(&demand, [capacity], clip));
                }
            }
            Outcome::Rejected(reason) => {
                self.rejected += 1;
                *self.rejections.entry(reason).or_default() += 1;
            }
        }
    }

    pub fn arrived(&self) -> u64 {
        self.arrived
    }

    pub fn allocated(&self) -> u64 {
        self.allocated
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    pub fn realized_profit(&self) -> f64 {
        self.realized_profit
    }

    pub fn rejections(&self, reason: RejectReason) -> u64 {
        self.rejections.get(&reason).copied().unwrap_or(0)
    }

    /// Allocated over decided tasks; zero before any decision.
    pub fn acceptance_rate(&self) -> f64 {
        let decided = self.allocated + self.rejected;
        if decided == 0 {
            0.0
        } else {
            self.allocated as f64 / decided as f64
        }
    }

    pub fn fairness(&self) -> Option<f64> {
        jain_index(&self.shares)
    }

    pub fn snapshot(&self, now: SimTime, pending: usize, registry: &BlockRegistry) -> MetricsSnapshot {
        MetricsSnapshot {
            sim_time: now,
            tasks_arrived: self.arrived,
            tasks_allocated: self.allocated,
            tasks_rejected: self.rejected,
            tasks_pending: pending as u64,
            acceptance_rate: self.acceptance_rate(),
            realized_profit: self.realized_profit,
            fairness: self.fairness(),
            blocks: registry.usage(),
        }
    }

    pub fn summary(&self, run: RunInfo) -> RunSummary {
        let finished_at = Utc::now();
        let wall_time_seconds = (finished_at - run.started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        RunSummary {
            policy: run.policy,
            config_fingerprint: run.config_fingerprint,
            started_at: run.started_at,
            finished_at,
            wall_time_seconds,
            final_sim_time: run.final_sim_time,
            stop_reason: run.stop_reason,
            blocks_created: run.blocks_created,
            total_tasks: self.arrived,
            allocated: self.allocated,
            rejected: self.rejected,
            realized_profit: self.realized_profit,
            acceptance_rate: self.acceptance_rate(),
            fairness: self.fairness(),
            rejections_by_reason: self
                .rejections
                .iter()
                .map(|(reason, count)| (reason.code().to_string(), *count))
                .collect(),
        }
    }
}

/// Run-level facts the collector does not track.
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub policy: String,
    pub config_fingerprint: String,
    pub started_at: DateTime<Utc>,
    pub final_sim_time: SimTime,
    pub stop_reason: StopReason,
    pub blocks_created: u64,
}
