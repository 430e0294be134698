//! Task arrivals: generated from task specs or replayed from a trace.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use privpack_budget::{AlphaSet, Budget, BudgetError};
use privpack_id::{BlockId, IdError, SimTime, TaskId};
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use super::Task;
use crate::blocks::{BlockSelector, SelectorKind};
use crate::config::{SimConfig, TaskSource, TaskSpec};

/// Relative tolerance when matching trace alphas to the run's alphas.
const ALPHA_TOLERANCE: f64 = 1e-9;

/// Workload errors. Raised before the run starts.
#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("cannot read trace {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("trace line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("trace line {line}: {message}")]
    InvalidRecord { line: usize, message: String },

    #[error("trace records need either arrival_time or relative_submit_time on every line")]
    MissingArrival,

    #[error("invalid task specs: {0}")]
    InvalidSpecs(String),

    #[error("budget error: {0}")]
    Budget(#[from] BudgetError),

    #[error("time error: {0}")]
    Time(#[from] IdError),
}

/// A task before it enters the simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    pub arrival: SimTime,
    pub name: Option<String>,
    pub profit: f64,
    pub selector: BlockSelector,
    pub demand: Budget,
    pub deadline: Option<SimTime>,
}

impl TaskDescriptor {
    pub fn new(arrival: SimTime, demand: Budget, selector: BlockSelector) -> Self {
        Self {
            arrival,
            name: None,
            profit: 1.0,
            selector,
            demand,
            deadline: None,
        }
    }

    pub fn with_profit(mut self, profit: f64) -> Self {
        self.profit = profit;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_deadline(mut self, deadline: SimTime) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Turns the descriptor into a task with its assigned id.
    pub fn into_task(self, id: TaskId) -> Task {
        Task {
            id,
            name: self.name,
            arrival: self.arrival,
            profit: self.profit,
            selector: self.selector,
            demand: self.demand,
            deadline: self.deadline,
            attempts: 0,
            last_blocks: Vec::new(),
        }
    }
}

/// One line of a JSON-lines trace.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TraceRecord {
    /// Absolute arrival time.
    pub arrival_time: Option<f64>,
    /// Share of the task stream's duration elapsed since the previous task.
    pub relative_submit_time: Option<f64>,
    #[serde(default = "default_profit")]
    pub profit: f64,
    #[serde(default = "default_n_blocks")]
    pub n_blocks: usize,
    pub block_selection_policy: Option<SelectorKind>,
    /// Orders of `rdp_epsilons`; the run's orders when absent.
    pub alphas: Option<Vec<f64>>,
    pub rdp_epsilons: Vec<f64>,
    /// Deadline relative to arrival.
    pub deadline: Option<f64>,
    pub task_name: Option<String>,
    pub block_ids: Option<Vec<BlockId>>,
}

fn default_profit() -> f64 {
    1.0
}

fn default_n_blocks() -> usize {
    1
}

/// Every task of a run, sorted by arrival.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workload {
    tasks: Vec<TaskDescriptor>,
}

impl Workload {
    /// Sorts descriptors by arrival; equal arrivals keep their order.
    pub fn new(mut tasks: Vec<TaskDescriptor>) -> Self {
        tasks.sort_by(|a, b| a.arrival.cmp(&b.arrival));
        Self { tasks }
    }

    /// Builds the workload the configuration asks for.
    pub fn from_config<R: Rng + ?Sized>(
        config: &SimConfig,
        alphas: &AlphaSet,
        rng: &mut R,
    ) -> Result<Self, WorkloadError> {
        match config.tasks.source {
            TaskSource::Trace => {
                let path = config.tasks.trace_path.as_deref().ok_or_else(|| {
                    WorkloadError::InvalidSpecs("trace source without trace_path".into())
                })?;
                Self::from_trace_path(path, config, alphas)
            }
            TaskSource::Poisson | TaskSource::Constant => Self::generate(config, alphas, rng),
        }
    }

    /// Samples tasks from the configured specs until one block interval after
    /// the last block arrival.
    pub fn generate<R: Rng + ?Sized>(
        config: &SimConfig,
        alphas: &AlphaSet,
        rng: &mut R,
    ) -> Result<Self, WorkloadError> {
        let tasks_cfg = &config.tasks;
        let specs = &tasks_cfg.specs;
        let chooser = WeightedIndex::new(specs.iter().map(|s| s.frequency))
            .map_err(|e| WorkloadError::InvalidSpecs(e.to_string()))?;
        let demands: Vec<Budget> = specs
            .iter()
            .map(|s| s.demand.evaluate(alphas))
            .collect::<Result<_, _>>()?;

        let max_tasks = tasks_cfg.max_num.map_or(usize::MAX, |m| m as usize);
        let mean_interval = config.blocks.arrival_interval / tasks_cfg.avg_num_tasks_per_block;
        let horizon = config.task_horizon();

        let mut tasks = Vec::new();
        let push = |tasks: &mut Vec<TaskDescriptor>,
                    rng: &mut R,
                    at: f64|
         -> Result<(), WorkloadError> {
            let index = chooser.sample(rng);
            sample_task(
                &specs[index],
                &demands[index],
                tasks_cfg.block_selection_policy,
                tasks_cfg.demands_tiebreaker,
                SimTime::new(at)?,
                rng,
            )
            .map(|task| tasks.push(task))
        };

        for _ in 0..tasks_cfg.initial_num {
            if tasks.len() >= max_tasks {
                break;
            }
            push(&mut tasks, rng, 0.0)?;
        }

        let mut now = 0.0;
        while tasks.len() < max_tasks {
            now += match tasks_cfg.source {
                TaskSource::Constant => mean_interval,
                _ => exponential(rng, mean_interval),
            };
            if now >= horizon {
                break;
            }
            push(&mut tasks, rng, now)?;
        }

        info!(
            tasks = tasks.len(),
            horizon,
            mean_interval,
            "Workload generated"
        );
        Ok(Self::new(tasks))
    }

    pub fn from_trace_path(
        path: &Path,
        config: &SimConfig,
        alphas: &AlphaSet,
    ) -> Result<Self, WorkloadError> {
        let file = std::fs::File::open(path).map_err(|e| WorkloadError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let workload = Self::from_trace_reader(std::io::BufReader::new(file), config, alphas)?;
        info!(path = %path.display(), tasks = workload.len(), "Trace loaded");
        Ok(workload)
    }

    /// Replays a JSON-lines trace. Blank lines are skipped.
    ///
    /// With `relative_submit_time`, the gaps are rescaled so the whole trace
    /// spans the block arrival stream.
    pub fn from_trace_reader<B: BufRead>(
        reader: B,
        config: &SimConfig,
        alphas: &AlphaSet,
    ) -> Result<Self, WorkloadError> {
        let mut records = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line_no = index + 1;
            let line = line.map_err(|e| WorkloadError::Parse {
                line: line_no,
                message: e.to_string(),
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let record: TraceRecord =
                serde_json::from_str(&line).map_err(|e| WorkloadError::Parse {
                    line: line_no,
                    message: e.to_string(),
                })?;
            records.push((line_no, record));
        }
        if let Some(max) = config.tasks.max_num {
            records.truncate(max as usize);
        }

        let arrivals = trace_arrivals(&records, config)?;
        let mut tasks = Vec::with_capacity(records.len());
        for ((line, record), arrival) in records.into_iter().zip(arrivals) {
            tasks.push(trace_task(line, record, arrival, config, alphas)?);
        }
        debug!(tasks = tasks.len(), "Trace parsed");
        Ok(Self::new(tasks))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskDescriptor> {
        self.tasks.iter()
    }

    pub fn into_tasks(self) -> Vec<TaskDescriptor> {
        self.tasks
    }
}

/// Exponential draw by inverse transform sampling.
fn exponential<R: Rng + ?Sized>(rng: &mut R, mean: f64) -> f64 {
    let u: f64 = rng.random();
    -mean * (1.0 - u).ln()
}

fn sample_task<R: Rng + ?Sized>(
    spec: &TaskSpec,
    demand: &Budget,
    selector_override: Option<SelectorKind>,
    tiebreaker: f64,
    arrival: SimTime,
    rng: &mut R,
) -> Result<TaskDescriptor, WorkloadError> {
    let demand = if tiebreaker > 0.0 {
        let noise: f64 = rng.random();
        demand.scale(1.0 + tiebreaker * noise)?
    } else {
        demand.clone()
    };
    let selector = BlockSelector::Policy {
        kind: selector_override.unwrap_or(spec.block_selection_policy),
        n_blocks: spec.n_blocks as usize,
    };
    let mut task = TaskDescriptor::new(arrival, demand, selector).with_profit(spec.profit);
    if let Some(name) = &spec.name {
        task = task.with_name(name.clone());
    }
    if let Some(relative) = spec.relative_deadline {
        task = task.with_deadline(arrival.advance(relative));
    }
    Ok(task)
}

fn trace_arrivals(
    records: &[(usize, TraceRecord)],
    config: &SimConfig,
) -> Result<Vec<SimTime>, WorkloadError> {
    if records.iter().all(|(_, r)| r.arrival_time.is_some()) {
        return records
            .iter()
            .map(|(_, r)| {
                SimTime::new(r.arrival_time.unwrap_or_default()).map_err(WorkloadError::from)
            })
            .collect();
    }
    if !records.iter().all(|(_, r)| r.relative_submit_time.is_some()) {
        return Err(WorkloadError::MissingArrival);
    }

    let gaps: Vec<f64> = records
        .iter()
        .map(|(_, r)| r.relative_submit_time.unwrap_or_default())
        .collect();
    if let Some(line) = records
        .iter()
        .zip(&gaps)
        .find(|(_, gap)| !gap.is_finite() || **gap < 0.0)
        .map(|((line, _), _)| *line)
    {
        return Err(WorkloadError::InvalidRecord {
            line,
            message: "relative_submit_time must be finite and non-negative".into(),
        });
    }

    let total: f64 = gaps.iter().sum();
    let span = config.last_block_arrival();
    let mut now = 0.0;
    gaps.iter()
        .map(|gap| {
            if total > 0.0 {
                now += gap / total * span;
            }
            SimTime::new(now).map_err(WorkloadError::from)
        })
        .collect()
}

fn trace_task(
    line: usize,
    record: TraceRecord,
    arrival: SimTime,
    config: &SimConfig,
    alphas: &AlphaSet,
) -> Result<TaskDescriptor, WorkloadError> {
    let invalid = |message: String| WorkloadError::InvalidRecord { line, message };

    let epsilons = match &record.alphas {
        None => record.rdp_epsilons.clone(),
        Some(trace_alphas) => {
            if trace_alphas.len() != record.rdp_epsilons.len() {
                return Err(invalid(format!(
                    "{} alphas but {} rdp_epsilons",
                    trace_alphas.len(),
                    record.rdp_epsilons.len()
                )));
            }
            alphas
                .iter()
                .map(|alpha| {
                    trace_alphas
                        .iter()
                        .position(|a| (a - alpha).abs() <= ALPHA_TOLERANCE * alpha.abs())
                        .map(|i| record.rdp_epsilons[i])
                        .ok_or_else(|| invalid(format!("no epsilon for alpha {alpha}")))
                })
                .collect::<Result<Vec<_>, _>>()?
        }
    };
    let demand = Budget::for_alphas(epsilons, alphas).map_err(|e| invalid(e.to_string()))?;

    if !record.profit.is_finite() || record.profit < 0.0 {
        return Err(invalid(format!("invalid profit {}", record.profit)));
    }

    let selector = match record.block_ids {
        Some(ids) if !ids.is_empty() => BlockSelector::Explicit(ids),
        Some(_) => return Err(invalid("block_ids is empty".into())),
        None => {
            if record.n_blocks == 0 {
                return Err(invalid("n_blocks must be at least 1".into()));
            }
            BlockSelector::Policy {
                kind: config
                    .tasks
                    .block_selection_policy
                    .or(record.block_selection_policy)
                    .unwrap_or_default(),
                n_blocks: record.n_blocks,
            }
        }
    };

    let mut task = TaskDescriptor::new(arrival, demand, selector).with_profit(record.profit);
    if let Some(name) = record.task_name {
        task = task.with_name(name);
    }
    if let Some(relative) = record.deadline {
        if !relative.is_finite() || relative < 0.0 {
            return Err(invalid(format!("invalid deadline {relative}")));
        }
        task = task.with_deadline(arrival.advance(relative));
    }
    Ok(task)
}
