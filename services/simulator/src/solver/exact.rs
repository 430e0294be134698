//! Branch and bound.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use super::greedy::GreedySolver;
use super::{fill_greedily, PackingProblem, Solution, SolveStatus, Solver, SolverError};

/// Nodes between two clock reads.
const CLOCK_CHECK_INTERVAL: u64 = 1024;

/// Slack on objective comparisons.
const TOLERANCE: f64 = 1e-9;

/// Depth-first branch and bound over items in density order.
///
/// Nodes are bounded by the fractional relaxation of the surrogate
/// constraint obtained by summing every constraint scaled by its capacity.
/// The greedy selection seeds the incumbent. With more than one thread the
/// tree is split at a fixed depth and the subtrees run on a rayon pool,
/// sharing the incumbent objective; the returned selection does not depend
/// on thread timing unless the time limit hits.
#[derive(Debug)]
pub struct ExactSolver {
    max_items: usize,
    pool: Option<ThreadPool>,
}

impl ExactSolver {
    pub fn new(max_items: usize, threads: usize) -> Result<Self, SolverError> {
        let pool = if threads > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|index| format!("privpack-solver-{index}"))
                .build()
                .map_err(|e| SolverError::ThreadPool(e.to_string()))?;
            Some(pool)
        } else {
            None
        };
        Ok(Self { max_items, pool })
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }
}

impl Solver for ExactSolver {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn solve(&self, problem: &PackingProblem, time_limit: Duration) -> Solution {
        if problem.n_items() > self.max_items {
            debug!(
                items = problem.n_items(),
                max_items = self.max_items,
                "Problem too large for exact backend"
            );
            return Solution::unavailable();
        }
        if problem.is_infeasible() {
            return Solution::infeasible();
        }

        let deadline = Instant::now() + time_limit;
        let order = problem.density_order();
        let seed = GreedySolver::select(problem);
        let seed_value = problem.objective_of(&seed);
        let integral = (0..problem.n_items()).all(|i| problem.value(i).fract() == 0.0);

        let search = Search {
            problem,
            order: &order,
            deadline,
            integral,
            shared: AtomicU64::new(seed_value.to_bits()),
            timed_out: AtomicBool::new(false),
        };

        let found = match &self.pool {
            Some(pool) => pool.install(|| search.run_parallel(pool.current_num_threads())),
            None => search.run_subtree(&Prefix::root(problem)),
        };

        let timed_out = search.timed_out.load(Ordering::Relaxed);
        let mut selected = match found {
            Some((value, selected)) if value > seed_value + TOLERANCE => selected,
            _ => seed,
        };

        let mut residual = problem.capacities().to_vec();
        for &item in &selected {
            problem.take(item, &mut residual);
        }
        fill_greedily(problem, &order, &mut selected, &mut residual);

        let status = if timed_out {
            SolveStatus::TimedOutWithIncumbent
        } else {
            SolveStatus::Optimal
        };
        Solution::assignment(problem, selected, status, !timed_out)
    }
}

/// Fixed decisions on the first items of the order.
#[derive(Debug, Clone)]
struct Prefix {
    depth: usize,
    value: f64,
    residual: Vec<f64>,
    chosen: Vec<usize>,
}

impl Prefix {
    fn root(problem: &PackingProblem) -> Self {
        Self {
            depth: 0,
            value: 0.0,
            residual: problem.capacities().to_vec(),
            chosen: Vec::new(),
        }
    }
}

struct Search<'a> {
    problem: &'a PackingProblem,
    order: &'a [usize],
    deadline: Instant,
    integral: bool,
    /// Best objective known to any worker, as `f64` bits. Objectives are
    /// non-negative, so the bit patterns order like the values.
    shared: AtomicU64,
    timed_out: AtomicBool,
}

impl Search<'_> {
    /// Splits the tree into subtrees, include branch first, and keeps the
    /// best result; ties go to the earliest subtree.
    fn run_parallel(&self, threads: usize) -> Option<(f64, Vec<usize>)> {
        let mut split_depth = 0;
        while (1usize << split_depth) < threads * 4 && split_depth < self.order.len() {
            split_depth += 1;
        }

        let mut prefixes = vec![Prefix::root(self.problem)];
        for depth in 0..split_depth {
            let item = self.order[depth];
            let mut next = Vec::with_capacity(prefixes.len() * 2);
            for prefix in prefixes {
                if self.problem.fits(item, &prefix.residual) {
                    let mut include = prefix.clone();
                    self.problem.take(item, &mut include.residual);
                    include.value += self.problem.value(item);
                    include.chosen.push(item);
                    include.depth = depth + 1;
                    next.push(include);
                }
                let mut exclude = prefix;
                exclude.depth = depth + 1;
                next.push(exclude);
            }
            prefixes = next;
        }

        let results: Vec<Option<(f64, Vec<usize>)>> = prefixes
            .par_iter()
            .map(|prefix| self.run_subtree(prefix))
            .collect();

        let mut best: Option<(f64, Vec<usize>)> = None;
        for (value, selected) in results.into_iter().flatten() {
            let better = match &best {
                Some((best_value, _)) => value > *best_value + TOLERANCE,
                None => true,
            };
            if better {
                best = Some((value, selected));
            }
        }
        best
    }

    /// Best selection in the subtree below `prefix`, if any beats nothing.
    fn run_subtree(&self, prefix: &Prefix) -> Option<(f64, Vec<usize>)> {
        let mut worker = Worker {
            search: self,
            nodes: 0,
            best_value: f64::NEG_INFINITY,
            best: Vec::new(),
            residual: prefix.residual.clone(),
            chosen: prefix.chosen.clone(),
        };
        worker.descend(prefix.depth, prefix.value);
        if worker.best_value.is_finite() {
            let value = self.problem.objective_of(&worker.best);
            Some((value, worker.best))
        } else {
            None
        }
    }

    fn publish(&self, value: f64) {
        self.shared.fetch_max(value.max(0.0).to_bits(), Ordering::Relaxed);
    }

    fn incumbent(&self) -> f64 {
        f64::from_bits(self.shared.load(Ordering::Relaxed))
    }

    /// Fractional surrogate bound on what items `order[depth..]` can still add.
    fn bound(&self, depth: usize, residual: &[f64]) -> f64 {
        let problem = self.problem;
        let mut room: f64 = residual
            .iter()
            .zip(problem.capacities())
            .filter(|(_, cap)| **cap > 0.0)
            .map(|(r, cap)| r.max(0.0) / cap)
            .sum();
        let mut bound = 0.0;
        for &item in &self.order[depth..] {
            if !problem.fits(item, residual) {
                continue;
            }
            let weight = problem.normalized_weight(item);
            let value = problem.value(item);
            if weight <= room {
                room -= weight;
                bound += value;
            } else {
                if weight > 0.0 {
                    bound += value * room / weight;
                }
                break;
            }
        }
        bound
    }
}

struct Worker<'s, 'a> {
    search: &'s Search<'a>,
    nodes: u64,
    best_value: f64,
    best: Vec<usize>,
    residual: Vec<f64>,
    chosen: Vec<usize>,
}

impl Worker<'_, '_> {
    fn descend(&mut self, depth: usize, value: f64) {
        let search = self.search;
        self.nodes += 1;
        if self.nodes % CLOCK_CHECK_INTERVAL == 0 && Instant::now() >= search.deadline {
            search.timed_out.store(true, Ordering::Relaxed);
        }
        if search.timed_out.load(Ordering::Relaxed) {
            return;
        }

        if value > self.best_value + TOLERANCE {
            self.best_value = value;
            self.best = self.chosen.clone();
            search.publish(value);
        }
        if depth == search.order.len() {
            return;
        }

        let mut bound = value + search.bound(depth, &self.residual);
        if search.integral {
            bound = (bound + TOLERANCE).floor();
        }
        // Local pruning keeps the first best selection in depth-first order;
        // the shared incumbent only cuts subtrees that cannot tie it.
        if bound <= self.best_value + TOLERANCE || bound < search.incumbent() - TOLERANCE {
            return;
        }

        let item = search.order[depth];
        let problem = search.problem;
        if problem.fits(item, &self.residual) {
            problem.take(item, &mut self.residual);
            self.chosen.push(item);
            self.descend(depth + 1, value + problem.value(item));
            self.chosen.pop();
            problem.give_back(item, &mut self.residual);
        }
        self.descend(depth + 1, value);
    }
}
