//! Relevance metrics for the packing policy.
//!
//! A relevance matrix weighs each (block, alpha) dimension. A task's cost is
//! its demand weighted by the relevance of the blocks it targets, and the
//! packing policy admits tasks by profit over cost.

use std::collections::BTreeMap;
use std::time::Duration;

use privpack_id::{BlockId, SimTime};
use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::debug;

use crate::blocks::BudgetSnapshot;
use crate::config::{NormalizeBy, PackingConfig, PackingStrategy};
use crate::solver::{GreedySolver, PackingProblem, Solver};
use crate::tasks::Task;

/// Per-block, per-alpha weights.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelevanceMatrix {
    rows: BTreeMap<BlockId, Vec<f64>>,
}

impl RelevanceMatrix {
    pub fn row(&self, block_id: BlockId) -> Option<&[f64]> {
        self.rows.get(&block_id).map(Vec::as_slice)
    }

    pub fn contains(&self, block_id: BlockId) -> bool {
        self.rows.contains_key(&block_id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Demand weighted by relevance, summed over `blocks`. Blocks without a
    /// row cost nothing.
    pub fn cost(&self, task: &Task, blocks: &[BlockId]) -> f64 {
        blocks
            .iter()
            .filter_map(|b| self.rows.get(b))
            .map(|row| task.demand.iter().zip(row).map(|(d, r)| d * r).sum::<f64>())
            .sum()
    }

    fn insert(&mut self, block_id: BlockId, row: Vec<f64>) {
        self.rows.insert(block_id, row);
    }
}

/// The matrix and when it was last computed.
#[derive(Debug, Clone)]
pub struct RelevanceCache {
    period: f64,
    refreshed_at: Option<SimTime>,
    matrix: RelevanceMatrix,
}

impl RelevanceCache {
    pub fn new(period: f64) -> Self {
        Self {
            period,
            refreshed_at: None,
            matrix: RelevanceMatrix::default(),
        }
    }

    /// Due when the period has elapsed or an eligible block has no row yet.
    pub fn is_due(&self, snapshot: &BudgetSnapshot, now: SimTime) -> bool {
        match self.refreshed_at {
            None => true,
            Some(at) => {
                now.since(at) >= self.period
                    || snapshot.block_ids().any(|b| !self.matrix.contains(b))
            }
        }
    }

    pub fn store(&mut self, matrix: RelevanceMatrix, now: SimTime) {
        self.matrix = matrix;
        self.refreshed_at = Some(now);
    }

    pub fn matrix(&self) -> &RelevanceMatrix {
        &self.matrix
    }

    pub fn refreshed_at(&self) -> Option<SimTime> {
        self.refreshed_at
    }
}

/// Everything a metric may look at.
pub(crate) struct MetricInputs<'a> {
    pub snapshot: &'a BudgetSnapshot,
    /// Pending tasks with resolved blocks.
    pub demands: &'a [(&'a Task, &'a [BlockId])],
    pub config: &'a PackingConfig,
    pub solver: &'a dyn Solver,
    pub time_limit: Duration,
    pub pool: Option<&'a ThreadPool>,
}

/// Computes the matrix of a relevance strategy. `Global` has none.
pub(crate) fn compute(inputs: &MetricInputs<'_>) -> RelevanceMatrix {
    let matrix = match inputs.config.strategy {
        PackingStrategy::Global => RelevanceMatrix::default(),
        PackingStrategy::DynamicFlat => dynamic_flat(inputs.snapshot),
        PackingStrategy::Flat => flat(inputs.snapshot),
        PackingStrategy::BatchOverflow => {
            batch_overflow(inputs.snapshot, inputs.demands, Baseline::Remaining)
        }
        PackingStrategy::Overflow => {
            batch_overflow(inputs.snapshot, inputs.demands, Baseline::Capacity)
        }
        PackingStrategy::SoftmaxOverflow => {
            softmax_overflow(inputs.snapshot, inputs.demands, inputs.config.temperature)
        }
        PackingStrategy::SoftKnapsack | PackingStrategy::ArgmaxKnapsack => {
            let profits = knapsack_profits(inputs);
            let matrix = knapsack_relevance(&profits, inputs.config);
            normalize(matrix, inputs.config.normalize_by, inputs.snapshot)
        }
    };
    debug!(
        strategy = ?inputs.config.strategy,
        blocks = matrix.len(),
        tasks = inputs.demands.len(),
        "Relevance recomputed"
    );
    matrix
}

/// `1 / remaining`, zero where nothing remains.
fn dynamic_flat(snapshot: &BudgetSnapshot) -> RelevanceMatrix {
    let mut matrix = RelevanceMatrix::default();
    for block_id in snapshot.block_ids() {
        if let Some(remaining) = snapshot.remaining(block_id) {
            let row = remaining
                .iter()
                .map(|r| if r > 0.0 { 1.0 / r } else { 0.0 })
                .collect();
            matrix.insert(block_id, row);
        }
    }
    matrix
}

/// `1 / capacity`, zero where the capacity is zero.
fn flat(snapshot: &BudgetSnapshot) -> RelevanceMatrix {
    let mut matrix = RelevanceMatrix::default();
    for block_id in snapshot.block_ids() {
        if let Some(capacity) = snapshot.capacity(block_id) {
            let row = capacity
                .iter()
                .map(|c| if c > 0.0 { 1.0 / c } else { 0.0 })
                .collect();
            matrix.insert(block_id, row);
        }
    }
    matrix
}

/// Budget the pending demand is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Baseline {
    Remaining,
    Capacity,
}

/// Pending demand minus the baseline budget, per alpha. Alphas with no
/// budget left overflow infinitely.
fn overflow_row(
    snapshot: &BudgetSnapshot,
    demands: &[(&Task, &[BlockId])],
    block_id: BlockId,
    baseline: Baseline,
) -> Option<Vec<f64>> {
    let budget = match baseline {
        Baseline::Remaining => snapshot.remaining(block_id)?,
        Baseline::Capacity => snapshot.capacity(block_id)?,
    };
    let mut requested = vec![0.0; budget.len()];
    for (task, blocks) in demands {
        if blocks.contains(&block_id) {
            for (total, d) in requested.iter_mut().zip(task.demand.iter()) {
                *total += d;
            }
        }
    }
    Some(
        requested
            .iter()
            .zip(budget.iter())
            .map(|(req, avail)| if avail <= 0.0 { f64::INFINITY } else { req - avail })
            .collect(),
    )
}

/// `1 / overflow` per alpha. A block that can serve every pending demand on
/// some alpha costs nothing.
fn batch_overflow(
    snapshot: &BudgetSnapshot,
    demands: &[(&Task, &[BlockId])],
    baseline: Baseline,
) -> RelevanceMatrix {
    let mut matrix = RelevanceMatrix::default();
    for block_id in snapshot.block_ids() {
        let Some(overflow) = overflow_row(snapshot, demands, block_id, baseline) else {
            continue;
        };
        let row = if overflow.iter().any(|o| *o <= 0.0) {
            vec![0.0; overflow.len()]
        } else {
            overflow.iter().map(|o| 1.0 / o).collect()
        };
        matrix.insert(block_id, row);
    }
    matrix
}

/// Softmax over alphas of `-temperature * overflow`, divided by the
/// remaining budget. Uncontended blocks cost nothing.
fn softmax_overflow(
    snapshot: &BudgetSnapshot,
    demands: &[(&Task, &[BlockId])],
    temperature: f64,
) -> RelevanceMatrix {
    let mut matrix = RelevanceMatrix::default();
    for block_id in snapshot.block_ids() {
        let (Some(overflow), Some(remaining)) = (
            overflow_row(snapshot, demands, block_id, Baseline::Remaining),
            snapshot.remaining(block_id),
        ) else {
            continue;
        };
        let row = if overflow.iter().any(|o| *o <= 0.0) {
            vec![0.0; overflow.len()]
        } else {
            let logits: Vec<f64> = overflow.iter().map(|o| -temperature * o).collect();
            softmax(&logits, 1.0)
                .iter()
                .zip(remaining.iter())
                .map(|(p, avail)| if avail > 0.0 { p / avail } else { 0.0 })
                .collect()
        };
        matrix.insert(block_id, row);
    }
    matrix
}

/// Best knapsack value of each (block, alpha) on its own: profit for the
/// soft metric, task count for the argmax metric.
fn knapsack_profits(inputs: &MetricInputs<'_>) -> BTreeMap<BlockId, Vec<f64>> {
    let count = inputs.config.strategy == PackingStrategy::ArgmaxKnapsack;
    let dimensions: Vec<(BlockId, usize, f64)> = inputs
        .snapshot
        .block_ids()
        .filter_map(|b| inputs.snapshot.remaining(b).map(|r| (b, r)))
        .flat_map(|(b, remaining)| {
            remaining
                .iter()
                .enumerate()
                .map(move |(alpha, capacity)| (b, alpha, capacity))
        })
        .collect();

    let solve = |&(block_id, alpha, capacity): &(BlockId, usize, f64)| -> f64 {
        if capacity <= 0.0 {
            return 0.0;
        }
        let mut values = Vec::new();
        let mut weights = Vec::new();
        for (task, blocks) in inputs.demands {
            if blocks.contains(&block_id) {
                values.push(if count { 1.0 } else { task.profit });
                weights.push(task.demand.get(alpha));
            }
        }
        if values.is_empty() {
            return 0.0;
        }
        match PackingProblem::new(values, vec![capacity], vec![weights]) {
            Ok(problem) => {
                let solution = inputs.solver.solve(&problem, inputs.time_limit);
                if solution.status.has_assignment() {
                    solution.objective
                } else {
                    GreedySolver.solve(&problem, inputs.time_limit).objective
                }
            }
            Err(_) => 0.0,
        }
    };

    let results: Vec<f64> = match inputs.pool {
        Some(pool) => pool.install(|| dimensions.par_iter().map(solve).collect()),
        None => dimensions.iter().map(solve).collect(),
    };

    let mut profits: BTreeMap<BlockId, Vec<f64>> = BTreeMap::new();
    for ((block_id, _, _), value) in dimensions.iter().zip(results) {
        profits.entry(*block_id).or_default().push(value);
    }
    profits
}

fn knapsack_relevance(
    profits: &BTreeMap<BlockId, Vec<f64>>,
    config: &PackingConfig,
) -> RelevanceMatrix {
    let mut matrix = RelevanceMatrix::default();
    for (block_id, row) in profits {
        let mut row = row.clone();
        if config.rescale_profits {
            let max = row.iter().copied().fold(0.0, f64::max);
            if max > 0.0 {
                row.iter_mut().for_each(|p| *p /= max);
            }
        }
        let relevance = match config.strategy {
            PackingStrategy::ArgmaxKnapsack => argmax(&row),
            _ if config.polynomial_ratio => polynomial_ratio(&row, config.temperature),
            _ => softmax(&row, config.temperature),
        };
        matrix.insert(*block_id, relevance);
    }
    matrix
}

fn softmax(row: &[f64], temperature: f64) -> Vec<f64> {
    let scaled: Vec<f64> = row.iter().map(|p| p / temperature).collect();
    let max = scaled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scaled.iter().map(|z| (z - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    if total > 0.0 && total.is_finite() {
        exps.iter().map(|e| e / total).collect()
    } else {
        vec![0.0; row.len()]
    }
}

fn polynomial_ratio(row: &[f64], temperature: f64) -> Vec<f64> {
    let powered: Vec<f64> = row.iter().map(|p| p.max(0.0).powf(temperature)).collect();
    let total: f64 = powered.iter().sum();
    if total > 0.0 {
        powered.iter().map(|p| p / total).collect()
    } else {
        vec![0.0; row.len()]
    }
}

/// One on every alpha reaching the row's maximum.
fn argmax(row: &[f64]) -> Vec<f64> {
    let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    row.iter().map(|p| if *p == max { 1.0 } else { 0.0 }).collect()
}

fn normalize(matrix: RelevanceMatrix, by: NormalizeBy, snapshot: &BudgetSnapshot) -> RelevanceMatrix {
    if by == NormalizeBy::None {
        return matrix;
    }
    let mut normalized = RelevanceMatrix::default();
    for (block_id, row) in matrix.rows {
        let denominators = match by {
            NormalizeBy::AvailableBudget => snapshot.remaining(block_id),
            NormalizeBy::Capacity => snapshot.capacity(block_id),
            NormalizeBy::None => None,
        };
        let row = match denominators {
            Some(den) => row
                .iter()
                .zip(den.iter())
                .map(|(r, d)| if d > 0.0 { r / d } else { 0.0 })
                .collect(),
            None => vec![0.0; row.len()],
        };
        normalized.insert(block_id, row);
    }
    normalized
}
