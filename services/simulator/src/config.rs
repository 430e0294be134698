//! Simulation configuration.
//!
//! Loaded from TOML, every section optional. Field ranges are checked by
//! `validator`; [`SimConfig::validate_all`] adds the checks that span several
//! fields and must pass before the clock starts.

use std::path::{Path, PathBuf};

use privpack_budget::{AlphaSet, Budget, BudgetError, DemandCurve};
use privpack_reconcile::ConfigFingerprint;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::blocks::SelectorKind;
use crate::solver::Objective;

/// Environment variable overriding the log level.
pub const LOG_LEVEL_ENV: &str = "PRIVPACK_LOG_LEVEL";

/// Orders used when the configuration does not list its own. Orders at or
/// below 2 are left out because an (epsilon, delta) capacity is usually zero
/// there.
pub const DEFAULT_RUN_ALPHAS: [f64; 8] = [3.0, 4.0, 5.0, 6.0, 8.0, 16.0, 32.0, 64.0];

/// Configuration errors. All of them are fatal and raised before the run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("invalid TOML: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid budget settings: {0}")]
    Budget(#[from] BudgetError),
}

// =============================================================================
// Top Level
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// Seed for every random draw of the run.
    pub global_seed: u64,

    /// Log filter used when `RUST_LOG` is not set.
    pub log_level: String,

    #[validate(nested)]
    pub budget: BudgetConfig,

    #[validate(nested)]
    pub blocks: BlocksConfig,

    #[validate(nested)]
    pub tasks: TasksConfig,

    #[validate(nested)]
    pub scheduler: SchedulerConfig,

    #[validate(nested)]
    pub solver: SolverConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            global_seed: 64,
            log_level: "info".to_string(),
            budget: BudgetConfig::default(),
            blocks: BlocksConfig::default(),
            tasks: TasksConfig::default(),
            scheduler: SchedulerConfig::default(),
            solver: SolverConfig::default(),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

/// Per-block budget.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct BudgetConfig {
    /// Rényi orders of the run, strictly increasing.
    pub alphas: Vec<f64>,

    /// Target epsilon the capacity is derived from.
    #[validate(range(exclusive_min = 0.0))]
    pub epsilon: f64,

    /// Target delta the capacity is derived from.
    #[validate(range(exclusive_min = 0.0, exclusive_max = 1.0))]
    pub delta: f64,

    /// Explicit per-alpha capacity; overrides epsilon and delta.
    pub capacity: Option<Vec<f64>>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            alphas: DEFAULT_RUN_ALPHAS.to_vec(),
            epsilon: 10.0,
            delta: 1e-7,
            capacity: None,
        }
    }
}

/// Block arrivals, lifetime and unlocking.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct BlocksConfig {
    /// Blocks created at t=0.
    pub initial_num: u32,

    /// Cap on simultaneously live blocks.
    #[validate(range(min = 1))]
    pub max_num: u32,

    /// Blocks created over the whole run; defaults to `max_num`.
    pub total_num: Option<u32>,

    /// Simulated time between two block arrivals.
    #[validate(range(exclusive_min = 0.0))]
    pub arrival_interval: f64,

    /// Time after creation at which a block stops accepting allocations.
    #[validate(range(exclusive_min = 0.0))]
    pub data_lifetime: Option<f64>,

    /// Share of the capacity available at creation.
    #[validate(range(min = 0.0, max = 1.0))]
    pub initial_unlocked_fraction: f64,

    /// Number of unit steps over which the withheld share is released.
    /// Zero means nothing is withheld.
    pub budget_unlocking_time: u32,
}

impl BlocksConfig {
    /// Share available at creation once the unlock schedule is taken into
    /// account: without unlock steps the whole capacity is available.
    pub fn effective_unlocked_fraction(&self) -> f64 {
        if self.budget_unlocking_time == 0 {
            1.0
        } else {
            self.initial_unlocked_fraction
        }
    }
}

impl Default for BlocksConfig {
    fn default() -> Self {
        Self {
            initial_num: 1,
            max_num: 10,
            total_num: None,
            arrival_interval: 1.0,
            data_lifetime: None,
            initial_unlocked_fraction: 1.0,
            budget_unlocking_time: 0,
        }
    }
}

/// Where tasks come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    /// Exponential inter-arrival times.
    #[default]
    Poisson,
    /// Fixed inter-arrival time.
    Constant,
    /// Replay of a JSON-lines trace.
    Trace,
}

/// Workload generation or replay.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct TasksConfig {
    pub source: TaskSource,

    /// Mean number of task arrivals per block arrival interval.
    #[validate(range(exclusive_min = 0.0))]
    pub avg_num_tasks_per_block: f64,

    /// Tasks submitted at t=0, before the arrival process starts.
    pub initial_num: u32,

    /// Stop generating after this many tasks.
    pub max_num: Option<u32>,

    /// Trace file for the `trace` source.
    pub trace_path: Option<PathBuf>,

    /// Overrides every task's own block selection policy.
    pub block_selection_policy: Option<SelectorKind>,

    /// Relative multiplicative noise on generated demands.
    #[validate(range(min = 0.0))]
    pub demands_tiebreaker: f64,

    /// Task templates sampled by frequency.
    #[validate(nested)]
    pub specs: Vec<TaskSpec>,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            source: TaskSource::Poisson,
            avg_num_tasks_per_block: 10.0,
            initial_num: 0,
            max_num: None,
            trace_path: None,
            block_selection_policy: None,
            demands_tiebreaker: 0.0,
            specs: vec![TaskSpec::default()],
        }
    }
}

/// A task template.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct TaskSpec {
    pub name: Option<String>,

    /// Relative sampling weight.
    #[serde(default = "default_one")]
    #[validate(range(min = 0.0))]
    pub frequency: f64,

    #[serde(default = "default_one")]
    #[validate(range(min = 0.0))]
    pub profit: f64,

    #[serde(default = "default_n_blocks")]
    #[validate(range(min = 1))]
    pub n_blocks: u32,

    #[serde(default)]
    pub block_selection_policy: SelectorKind,

    /// Deadline relative to arrival.
    #[validate(range(min = 0.0))]
    pub relative_deadline: Option<f64>,

    pub demand: DemandCurve,
}

impl Default for TaskSpec {
    fn default() -> Self {
        Self {
            name: Some("gaussian".to_string()),
            frequency: 1.0,
            profit: 1.0,
            n_blocks: 1,
            block_selection_policy: SelectorKind::LatestBlocksFirst,
            relative_deadline: None,
            demand: DemandCurve::Gaussian { sigma: 10.0 },
        }
    }
}

fn default_one() -> f64 {
    1.0
}

fn default_n_blocks() -> u32 {
    1
}

/// Which allocation policy runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Fcfs,
    #[default]
    DominantShares,
    Packing,
}

/// Tie-breaking among equal dominant shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tiebreaker {
    /// Earlier arrival first.
    #[default]
    Arrival,
    /// Higher profit first, then earlier arrival.
    Profit,
}

/// How the packing policy ranks a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PackingStrategy {
    /// One multi-dimensional knapsack over the whole batch.
    #[default]
    Global,
    /// Softmax relevance from per-(block, alpha) profit knapsacks.
    SoftKnapsack,
    /// Hard argmax relevance from per-(block, alpha) count knapsacks.
    ArgmaxKnapsack,
    /// Demand over batch overflow.
    BatchOverflow,
    /// Demand over remaining budget.
    DynamicFlat,
    /// Demand over block capacity, fixed for the whole run.
    Flat,
    /// Demand over batch overflow against the block capacity.
    Overflow,
    /// Softmax of the negated batch overflow, over available budget.
    SoftmaxOverflow,
}

/// Normalization of a relevance matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeBy {
    #[default]
    None,
    AvailableBudget,
    Capacity,
}

/// What the packing policy does when the solver gives no assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SolverFailureMode {
    /// Solve again with the greedy heuristic.
    #[default]
    Heuristic,
    /// Keep the whole batch pending for the next recomputation.
    DeferBatch,
    /// Reject the whole batch.
    RejectBatch,
}

/// Packing policy options.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct PackingConfig {
    pub strategy: PackingStrategy,

    pub objective: Objective,

    #[validate(range(exclusive_min = 0.0))]
    pub temperature: f64,

    pub normalize_by: NormalizeBy,

    /// Use `p^temperature / sum` instead of a softmax.
    pub polynomial_ratio: bool,

    /// Divide each block's knapsack profits by their maximum first.
    pub rescale_profits: bool,

    /// Worker threads for the local knapsacks.
    #[validate(range(min = 1))]
    pub n_knapsack_solvers: usize,

    pub on_solver_failure: SolverFailureMode,
}

impl Default for PackingConfig {
    fn default() -> Self {
        Self {
            strategy: PackingStrategy::Global,
            objective: Objective::Profit,
            temperature: 0.01,
            normalize_by: NormalizeBy::None,
            polynomial_ratio: false,
            rescale_profits: false,
            n_knapsack_solvers: 1,
            on_solver_failure: SolverFailureMode::Heuristic,
        }
    }
}

/// Scheduling loop.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    pub method: PolicyKind,

    /// Simulated time between two batch recomputations.
    #[validate(range(exclusive_min = 0.0))]
    pub metric_recomputation_period: f64,

    /// Simulated time between two metrics records.
    #[validate(range(exclusive_min = 0.0))]
    pub report_period: Option<f64>,

    /// Wall-clock bound on the whole run.
    #[validate(range(exclusive_min = 0.0))]
    pub scheduler_timeout_seconds: Option<f64>,

    /// Times a deferred task may be put back; unbounded when absent.
    pub max_retries: Option<u32>,

    pub tiebreaker: Tiebreaker,

    /// Clip each demand share at 1 in dominant shares.
    pub clip_demands: bool,

    #[validate(nested)]
    pub packing: PackingConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            method: PolicyKind::DominantShares,
            metric_recomputation_period: 1.0,
            report_period: None,
            scheduler_timeout_seconds: None,
            max_retries: None,
            tiebreaker: Tiebreaker::Arrival,
            clip_demands: false,
            packing: PackingConfig::default(),
        }
    }
}

/// Optimization backend choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// Branch and bound.
    #[default]
    Exact,
    /// Density-ordered first fit.
    Greedy,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    pub backend: SolverKind,

    #[validate(range(exclusive_min = 0.0))]
    pub time_limit_seconds: f64,

    #[validate(range(min = 1))]
    pub threads: usize,

    /// Largest problem the exact backend accepts.
    #[validate(range(min = 1))]
    pub max_items: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            backend: SolverKind::Exact,
            time_limit_seconds: 1.0,
            threads: 1,
            max_items: 200,
        }
    }
}

// =============================================================================
// Loading and Validation
// =============================================================================

impl SimConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Applies environment overrides. Only the log level can be overridden.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            if !level.trim().is_empty() {
                self.log_level = level;
            }
        }
        self
    }

    /// Runs every check; the run must not start unless this passes.
    pub fn validate_all(&self) -> Result<(), ConfigError> {
        self.validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let alphas = self.alpha_set()?;
        let capacity = self.block_capacity(&alphas)?;
        if capacity.is_zero() {
            return Err(ConfigError::Invalid(
                "block capacity is zero on every alpha".into(),
            ));
        }

        let blocks = &self.blocks;
        if blocks.max_num < blocks.initial_num {
            return Err(ConfigError::Invalid(format!(
                "blocks.max_num ({}) is smaller than blocks.initial_num ({})",
                blocks.max_num, blocks.initial_num
            )));
        }
        let total = self.total_blocks();
        if total < blocks.initial_num {
            return Err(ConfigError::Invalid(format!(
                "blocks.total_num ({total}) is smaller than blocks.initial_num ({})",
                blocks.initial_num
            )));
        }
        if blocks.data_lifetime.is_none() && total > blocks.max_num {
            return Err(ConfigError::Invalid(format!(
                "blocks.total_num ({total}) exceeds blocks.max_num ({}) and blocks never expire",
                blocks.max_num
            )));
        }
        let peak = self.peak_live_blocks();
        if peak > blocks.max_num {
            return Err(ConfigError::Invalid(format!(
                "up to {peak} blocks are live at once but blocks.max_num is {}; \
                 shorten blocks.data_lifetime or lengthen blocks.arrival_interval",
                blocks.max_num
            )));
        }

        match self.tasks.source {
            TaskSource::Trace => {
                if self.tasks.trace_path.is_none() {
                    return Err(ConfigError::Invalid(
                        "tasks.trace_path is required for the trace source".into(),
                    ));
                }
            }
            TaskSource::Poisson | TaskSource::Constant => {
                if self.tasks.specs.is_empty() {
                    return Err(ConfigError::Invalid(
                        "at least one task spec is required to generate tasks".into(),
                    ));
                }
                let total_frequency: f64 = self.tasks.specs.iter().map(|s| s.frequency).sum();
                if !(total_frequency > 0.0) {
                    return Err(ConfigError::Invalid(
                        "task spec frequencies sum to zero".into(),
                    ));
                }
            }
        }
        for (index, spec) in self.tasks.specs.iter().enumerate() {
            spec.demand.evaluate(&alphas).map_err(|e| {
                ConfigError::Invalid(format!("task spec #{index} has an invalid demand: {e}"))
            })?;
        }

        Ok(())
    }

    pub fn alpha_set(&self) -> Result<AlphaSet, ConfigError> {
        Ok(AlphaSet::new(self.budget.alphas.clone())?)
    }

    /// Per-alpha capacity of every new block.
    pub fn block_capacity(&self, alphas: &AlphaSet) -> Result<Budget, ConfigError> {
        let budget = match &self.budget.capacity {
            Some(values) => Budget::for_alphas(values.clone(), alphas)?,
            None => Budget::from_epsilon_delta(self.budget.epsilon, self.budget.delta, alphas)?,
        };
        Ok(budget)
    }

    /// Blocks created over the run.
    pub fn total_blocks(&self) -> u32 {
        self.blocks.total_num.unwrap_or(self.blocks.max_num)
    }

    /// Arrival time of the `index`-th block of the stream.
    fn block_arrival(&self, index: u32) -> f64 {
        let blocks = &self.blocks;
        if index < blocks.initial_num {
            0.0
        } else {
            f64::from(index - blocks.initial_num + 1) * blocks.arrival_interval
        }
    }

    /// Largest number of blocks live at the same time over the run.
    ///
    /// A block is live from its arrival until `data_lifetime` later; an
    /// expiry at the same instant as an arrival frees its slot first.
    pub fn peak_live_blocks(&self) -> u32 {
        let total = self.total_blocks();
        let Some(lifetime) = self.blocks.data_lifetime else {
            return total;
        };
        let mut oldest_live = 0;
        let mut peak = 0;
        for newest in 0..total {
            let now = self.block_arrival(newest);
            while self.block_arrival(oldest_live) + lifetime <= now {
                oldest_live += 1;
            }
            peak = peak.max(newest - oldest_live + 1);
        }
        peak
    }

    /// Arrival time of the last block.
    pub fn last_block_arrival(&self) -> f64 {
        let later = self.total_blocks().saturating_sub(self.blocks.initial_num);
        f64::from(later) * self.blocks.arrival_interval
    }

    /// Generated tasks arrive strictly before this time: one block interval
    /// after the last block.
    pub fn task_horizon(&self) -> f64 {
        self.last_block_arrival() + self.blocks.arrival_interval
    }

    /// Hash of the effective configuration.
    pub fn fingerprint(&self) -> String {
        ConfigFingerprint::of(self)
            .map(|f| f.to_string())
            .unwrap_or_else(|_| "unavailable".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SimConfig::default();
        config.validate_all().unwrap();
        let alphas = config.alpha_set().unwrap();
        let capacity = config.block_capacity(&alphas).unwrap();
        assert!(capacity.iter().all(|c| c > 0.0));
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let config = SimConfig::from_toml_str(include_str!("../config/default.toml")).unwrap();
        config.validate_all().unwrap();
        assert_eq!(config.tasks.specs.len(), 2);
        assert_eq!(config.tasks.specs[1].n_blocks, 3);
        assert_eq!(config.scheduler.report_period, Some(5.0));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = SimConfig::from_toml_str(
            r#"
            global_seed = 7

            [blocks]
            initial_num = 2
            max_num = 4

            [scheduler]
            method = "packing"

            [scheduler.packing]
            strategy = "soft_knapsack"
            "#,
        )
        .unwrap();
        assert_eq!(config.global_seed, 7);
        assert_eq!(config.blocks.max_num, 4);
        assert_eq!(config.scheduler.method, PolicyKind::Packing);
        assert_eq!(config.scheduler.packing.strategy, PackingStrategy::SoftKnapsack);
        assert_eq!(config.scheduler.metric_recomputation_period, 1.0);
        config.validate_all().unwrap();
    }

    #[test]
    fn test_max_num_below_initial_num_fails_fast() {
        let mut config = SimConfig::default();
        config.blocks.initial_num = 5;
        config.blocks.max_num = 3;
        let err = config.validate_all().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("max_num")));
    }

    #[test]
    fn test_peak_live_blocks_follows_lifetime() {
        let mut config = SimConfig::default();
        config.blocks.initial_num = 1;
        config.blocks.max_num = 2;
        config.blocks.total_num = Some(3);
        config.blocks.arrival_interval = 1.0;
        config.blocks.data_lifetime = Some(2.0);
        // Blocks at t=0, 1, 2: the first expires as the third arrives.
        assert_eq!(config.peak_live_blocks(), 2);
        config.validate_all().unwrap();

        config.blocks.data_lifetime = Some(2.5);
        assert_eq!(config.peak_live_blocks(), 3);
        let err = config.validate_all().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("live at once")));
    }

    #[test]
    fn test_peak_live_blocks_counts_initial_burst() {
        let mut config = SimConfig::default();
        config.blocks.initial_num = 3;
        config.blocks.max_num = 3;
        config.blocks.total_num = Some(6);
        config.blocks.arrival_interval = 1.0;
        config.blocks.data_lifetime = Some(1.0);
        assert_eq!(config.peak_live_blocks(), 3);
        config.validate_all().unwrap();

        config.blocks.data_lifetime = Some(1.5);
        assert_eq!(config.peak_live_blocks(), 4);
        assert!(config.validate_all().is_err());
    }

    #[test]
    fn test_no_unlock_steps_means_nothing_withheld() {
        let mut config = SimConfig::default();
        config.blocks.initial_unlocked_fraction = 0.0;
        config.blocks.budget_unlocking_time = 0;
        assert_eq!(config.blocks.effective_unlocked_fraction(), 1.0);
        config.blocks.budget_unlocking_time = 2;
        assert_eq!(config.blocks.effective_unlocked_fraction(), 0.0);
    }

    #[test]
    fn test_range_violation_is_reported() {
        let mut config = SimConfig::default();
        config.scheduler.metric_recomputation_period = 0.0;
        assert!(matches!(
            config.validate_all().unwrap_err(),
            ConfigError::Invalid(_)
        ));
    }

    #[test]
    fn test_explicit_capacity_must_match_alphas() {
        let mut config = SimConfig::default();
        config.budget.alphas = vec![2.0];
        config.budget.capacity = Some(vec![10.0, 10.0]);
        assert!(matches!(
            config.validate_all().unwrap_err(),
            ConfigError::Budget(BudgetError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_trace_source_requires_path() {
        let mut config = SimConfig::default();
        config.tasks.source = TaskSource::Trace;
        assert!(config.validate_all().is_err());
        config.tasks.trace_path = Some(PathBuf::from("tasks.jsonl"));
        config.validate_all().unwrap();
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = SimConfig::from_toml_str("[blocks]\nmax_blocks = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_task_spec_demand_from_toml() {
        let config = SimConfig::from_toml_str(
            r#"
            [budget]
            alphas = [2.0]
            capacity = [10.0]

            [[tasks.specs]]
            name = "big"
            frequency = 0.5
            demand = { mechanism = "explicit", rdp_epsilons = [6.0] }
            "#,
        )
        .unwrap();
        config.validate_all().unwrap();
        assert_eq!(config.tasks.specs.len(), 1);
        assert_eq!(config.tasks.specs[0].n_blocks, 1);
    }

    #[test]
    fn test_horizon_follows_block_stream() {
        let mut config = SimConfig::default();
        config.blocks.initial_num = 2;
        config.blocks.max_num = 5;
        config.blocks.arrival_interval = 2.0;
        assert_eq!(config.last_block_arrival(), 6.0);
        assert_eq!(config.task_horizon(), 8.0);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = SimConfig::default().fingerprint();
        let b = SimConfig::default().fingerprint();
        assert_eq!(a, b);
        let mut other = SimConfig::default();
        other.global_seed = 1;
        assert_ne!(a, other.fingerprint());
    }
}
