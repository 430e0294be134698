//! Discrete-event simulation loop.
//!
//! The engine owns the simulated clock. Each event is processed to
//! completion before the next is popped:
//! - Block arrivals create blocks and schedule their unlocks and expiry
//! - Task arrivals enqueue tasks, or decide them at once under FCFS
//! - Recomputations hand pending tasks to a batch policy and commit the
//!   resulting plans
//! - Metric reports snapshot counters and block budgets

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use privpack_budget::AlphaSet;
use privpack_events::{
    Outcome, Record, RecordSink, Recorder, RejectReason, RunSummary, StopReason,
};
use privpack_id::{BlockId, IdSequence, SimTime, TaskId};
use privpack_reconcile::{RetryPolicy, RetryVerdict};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error, info, instrument, warn};

use super::events::{EventKind, EventQueue};
use crate::blocks::{AllocationPlan, Block, BlockRegistry, RegistryError};
use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::policy::{Candidate, Decision, Policy};
use crate::report::{MetricsCollector, RunInfo};
use crate::solver::build_solver;
use crate::tasks::{Task, TaskDescriptor, TaskQueue, Workload};

/// Lifecycle of a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimState {
    Idle,
    Running,
    Draining,
    Stopped,
}

/// A single simulation run writing its records to `S`.
pub struct Simulation<S: RecordSink> {
    config: SimConfig,
    alphas: AlphaSet,
    state: SimState,
    clock: SimTime,
    events: EventQueue,
    registry: BlockRegistry,
    queue: TaskQueue,
    /// Workload descriptors, taken as their arrival events fire.
    arrivals: Vec<Option<TaskDescriptor>>,
    task_ids: IdSequence<TaskId>,
    policy: Policy,
    rng: StdRng,
    recorder: Recorder<S>,
    metrics: MetricsCollector,
    fingerprint: String,
    started_at: Option<DateTime<Utc>>,
    wall_deadline: Option<Instant>,
    stop_reason: StopReason,
    summary: Option<RunSummary>,
}

impl<S: RecordSink> Simulation<S> {
    /// Validates `config` and builds its workload, generated or replayed.
    pub fn new(config: SimConfig, sink: S) -> SimResult<Self> {
        config.validate_all()?;
        let alphas = config.alpha_set()?;
        let mut rng = StdRng::seed_from_u64(config.global_seed);
        let workload = Workload::from_config(&config, &alphas, &mut rng)?;
        Self::build(config, alphas, workload, rng, sink)
    }

    /// Runs `workload` instead of the one `config` describes.
    pub fn with_workload(config: SimConfig, workload: Workload, sink: S) -> SimResult<Self> {
        config.validate_all()?;
        let alphas = config.alpha_set()?;
        let rng = StdRng::seed_from_u64(config.global_seed);
        Self::build(config, alphas, workload, rng, sink)
    }

    fn build(
        config: SimConfig,
        alphas: AlphaSet,
        workload: Workload,
        rng: StdRng,
        sink: S,
    ) -> SimResult<Self> {
        let capacity = config.block_capacity(&alphas)?;
        for task in workload.iter() {
            alphas.check_len(task.demand.len())?;
        }

        let registry = BlockRegistry::new(capacity, config.blocks.max_num)
            .with_unlocked_fraction(config.blocks.effective_unlocked_fraction())
            .with_lifetime(config.blocks.data_lifetime);
        let retry_policy = config
            .scheduler
            .max_retries
            .map_or_else(RetryPolicy::unbounded, RetryPolicy::bounded);
        let solver = build_solver(&config.solver)?;
        let time_limit = Duration::from_secs_f64(config.solver.time_limit_seconds);
        let policy = Policy::from_config(&config.scheduler, solver, time_limit)?;
        let fingerprint = config.fingerprint();

        Ok(Self {
            alphas,
            state: SimState::Idle,
            clock: SimTime::ZERO,
            events: EventQueue::new(),
            registry,
            queue: TaskQueue::new(retry_policy),
            arrivals: workload.into_tasks().into_iter().map(Some).collect(),
            task_ids: IdSequence::new(),
            policy,
            rng,
            recorder: Recorder::new(sink),
            metrics: MetricsCollector::new(),
            fingerprint,
            started_at: None,
            wall_deadline: None,
            stop_reason: StopReason::Completed,
            summary: None,
            config,
        })
    }

    // =========================================================================
    // Run Loop
    // =========================================================================

    /// Runs to completion and returns the summary, which is also the last
    /// record written to the sink.
    ///
    /// A fatal error during the run still drains the queue and writes a
    /// partial summary with [`StopReason::Aborted`] before it is returned.
    #[instrument(skip(self), fields(policy = self.policy.name()))]
    pub fn run(&mut self) -> SimResult<RunSummary> {
        self.start()?;
        loop {
            match self.step() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    error!(
                        sim_time = self.clock.value(),
                        pending = self.queue.len(),
                        error = %e,
                        "Simulation aborted"
                    );
                    self.stop_reason = StopReason::Aborted;
                    self.events.clear();
                    if let Err(flush_err) = self.finish() {
                        warn!(error = %flush_err, "Partial results could not be written");
                    }
                    return Err(e);
                }
            }
        }
        self.finish()
    }

    /// Schedules the block stream, the task arrivals and the first periodic
    /// events.
    pub fn start(&mut self) -> SimResult<()> {
        if self.state != SimState::Idle {
            return Err(SimError::AlreadyRan);
        }
        self.state = SimState::Running;
        self.started_at = Some(Utc::now());
        self.wall_deadline = self
            .config
            .scheduler
            .scheduler_timeout_seconds
            .map(|limit| Instant::now() + Duration::from_secs_f64(limit));

        let blocks = &self.config.blocks;
        for _ in 0..blocks.initial_num {
            self.events.schedule(SimTime::ZERO, EventKind::BlockArrival);
        }
        let later = self.config.total_blocks().saturating_sub(blocks.initial_num);
        for k in 1..=later {
            let at = SimTime::new(f64::from(k) * blocks.arrival_interval)?;
            self.events.schedule(at, EventKind::BlockArrival);
        }

        for (index, task) in self.arrivals.iter().enumerate() {
            if let Some(task) = task {
                self.events.schedule(task.arrival, EventKind::TaskArrival { index });
            }
        }

        if self.policy.is_batch() {
            self.events.schedule(SimTime::ZERO, EventKind::Recompute);
        }
        if let Some(period) = self.config.scheduler.report_period {
            self.events.schedule(SimTime::ZERO.advance(period), EventKind::ReportMetrics);
        }

        info!(
            policy = self.policy.name(),
            alphas = self.alphas.len(),
            blocks = self.config.total_blocks(),
            tasks = self.arrivals.len(),
            seed = self.config.global_seed,
            fingerprint = %self.fingerprint,
            "Simulation started"
        );
        Ok(())
    }

    /// Processes the next event. Returns false once the clock has nothing
    /// left to do.
    pub fn step(&mut self) -> SimResult<bool> {
        if self.state != SimState::Running {
            return Ok(false);
        }
        if self.wall_deadline.is_some_and(|d| Instant::now() >= d) {
            warn!(
                sim_time = self.clock.value(),
                pending = self.queue.len(),
                "Scheduler timeout reached, stopping"
            );
            self.stop_reason = StopReason::SchedulerTimeout;
            self.events.clear();
            return Ok(false);
        }
        let Some(event) = self.events.pop() else {
            return Ok(false);
        };
        if event.time > self.clock {
            self.clock = event.time;
        }

        match event.kind {
            EventKind::BlockArrival => self.on_block_arrival()?,
            EventKind::BlockUnlock {
                block_id,
                steps_left,
            } => self.on_block_unlock(block_id, steps_left)?,
            EventKind::BlockExpiry { block_id } => self.on_block_expiry(block_id),
            EventKind::TaskArrival { index } => self.on_task_arrival(index)?,
            EventKind::Recompute => self.on_recompute()?,
            EventKind::ReportMetrics => self.on_report()?,
        }
        Ok(true)
    }

    /// Rejects what is still pending and writes the final records.
    pub fn finish(&mut self) -> SimResult<RunSummary> {
        match self.state {
            SimState::Running => {}
            SimState::Idle => return Err(SimError::NotStarted),
            SimState::Draining | SimState::Stopped => return Err(SimError::AlreadyRan),
        }
        self.state = SimState::Draining;

        let reason = match self.stop_reason {
            StopReason::Completed => RejectReason::Unschedulable,
            StopReason::SchedulerTimeout => RejectReason::SchedulerTimeout,
            StopReason::Aborted => RejectReason::RunAborted,
        };
        let pending = self.queue.drain();
        if !pending.is_empty() {
            debug!(pending = pending.len(), reason = %reason, "Draining pending tasks");
        }
        for task in pending {
            self.record(&task, Outcome::Rejected(reason), None)?;
        }

        let snapshot = self.metrics.snapshot(self.clock, 0, &self.registry);
        self.recorder.emit(self.clock, Record::Metrics(snapshot))?;

        let summary = self.metrics.summary(RunInfo {
            policy: self.policy.name().to_string(),
            config_fingerprint: self.fingerprint.clone(),
            started_at: self.started_at.unwrap_or_else(Utc::now),
            final_sim_time: self.clock,
            stop_reason: self.stop_reason,
            blocks_created: self.registry.created(),
        });
        self.summary = Some(summary.clone());
        self.recorder.emit(self.clock, Record::Summary(summary.clone()))?;
        self.recorder.flush()?;
        self.state = SimState::Stopped;

        info!(
            stop_reason = %summary.stop_reason,
            final_sim_time = summary.final_sim_time.value(),
            total_tasks = summary.total_tasks,
            allocated = summary.allocated,
            rejected = summary.rejected,
            realized_profit = summary.realized_profit,
            wall_time_seconds = summary.wall_time_seconds,
            "Simulation finished"
        );
        Ok(summary)
    }

    // =========================================================================
    // Event Handlers
    // =========================================================================

    fn on_block_arrival(&mut self) -> SimResult<()> {
        let block_id = self.registry.create_block(self.clock)?;

        let steps = self.config.blocks.budget_unlocking_time;
        if steps > 0 && self.config.blocks.effective_unlocked_fraction() < 1.0 {
            for k in 1..=steps {
                self.events.schedule(
                    self.clock.advance(f64::from(k)),
                    EventKind::BlockUnlock {
                        block_id,
                        steps_left: steps - k + 1,
                    },
                );
            }
        }
        if let Some(expiry) = self.registry.get(block_id).and_then(Block::expires_at) {
            self.events.schedule(expiry, EventKind::BlockExpiry { block_id });
        }
        Ok(())
    }

    fn on_block_unlock(&mut self, block_id: BlockId, steps_left: u32) -> SimResult<()> {
        match self.registry.unlock_step(block_id, steps_left) {
            Ok(released) => {
                debug!(
                    block_id = %block_id,
                    steps_left,
                    released = released.max_value(),
                    "Budget unlocked"
                );
                Ok(())
            }
            // Collected after expiry.
            Err(RegistryError::UnknownBlock(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn on_block_expiry(&mut self, block_id: BlockId) {
        if self.registry.expire(block_id) {
            self.collect_garbage();
        }
    }

    fn on_task_arrival(&mut self, index: usize) -> SimResult<()> {
        let Some(descriptor) = self.arrivals.get_mut(index).and_then(Option::take) else {
            return Ok(());
        };
        let task = descriptor.into_task(self.task_ids.next_id());
        self.metrics.task_arrived();
        debug!(
            task_id = %task.id,
            arrival = task.arrival.value(),
            profit = task.profit,
            "Task arrived"
        );

        if self.policy.is_batch() {
            self.queue.enqueue(task);
            Ok(())
        } else {
            self.decide(vec![task])
        }
    }

    fn on_recompute(&mut self) -> SimResult<()> {
        for task in self.queue.expire_deadlines(self.clock) {
            self.record(&task, Outcome::Rejected(RejectReason::DeadlineExpired), None)?;
        }
        let ready = self.queue.pop_ready(self.clock);
        if !ready.is_empty() {
            self.decide(ready)?;
        }
        self.collect_garbage();

        if self.events.has_substantive() {
            let next = self.clock.advance(self.config.scheduler.metric_recomputation_period);
            self.events.schedule(next, EventKind::Recompute);
        } else {
            debug!(
                sim_time = self.clock.value(),
                pending = self.queue.len(),
                "Final recompute pass"
            );
        }
        Ok(())
    }

    fn on_report(&mut self) -> SimResult<()> {
        let snapshot = self
            .metrics
            .snapshot(self.clock, self.queue.len(), &self.registry);
        self.recorder.emit(self.clock, Record::Metrics(snapshot))?;
        if let Some(period) = self.config.scheduler.report_period {
            if self.events.has_substantive() {
                self.events
                    .schedule(self.clock.advance(period), EventKind::ReportMetrics);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Decisions
    // =========================================================================

    /// Resolves selectors, asks the policy for verdicts and applies them in
    /// the order returned.
    fn decide(&mut self, mut tasks: Vec<Task>) -> SimResult<()> {
        let snapshot = self.registry.snapshot();
        let resolved: Vec<_> = tasks
            .iter_mut()
            .map(|task| {
                let blocks = self.registry.select(&task.selector, &mut self.rng);
                task.last_blocks = blocks.clone().unwrap_or_default();
                task.attempts += 1;
                blocks
            })
            .collect();

        let verdicts = {
            let candidates: Vec<Candidate<'_>> = tasks
                .iter()
                .zip(resolved)
                .map(|(task, blocks)| Candidate::new(task, blocks))
                .collect();
            self.policy.refresh(&snapshot, &candidates, self.clock);
            self.policy.decide(&snapshot, &candidates, self.clock)
        };

        let mut by_id: BTreeMap<TaskId, Task> = tasks.into_iter().map(|t| (t.id, t)).collect();
        let mut admitted = 0usize;
        for verdict in verdicts {
            let Some(task) = by_id.remove(&verdict.task_id) else {
                continue;
            };
            match verdict.decision {
                Decision::Allocate(plan) => {
                    if self.commit(&task, &plan)? {
                        admitted += 1;
                    }
                }
                Decision::Reject(reason) => {
                    self.record(&task, Outcome::Rejected(reason), None)?;
                }
                Decision::Defer(reason) => self.defer(task, reason)?,
            }
        }
        for (_, task) in by_id {
            warn!(task_id = %task.id, "Policy returned no verdict, deferring");
            self.defer(task, RejectReason::Unschedulable)?;
        }

        debug!(
            sim_time = self.clock.value(),
            admitted,
            pending = self.queue.len(),
            "Decision pass complete"
        );
        Ok(())
    }

    /// Commits a plan. Returns false if the registry refused it, in which
    /// case the task is deferred or rejected.
    fn commit(&mut self, task: &Task, plan: &AllocationPlan) -> SimResult<bool> {
        match self.registry.commit_allocation(plan) {
            Ok(()) => {
                self.record(task, Outcome::Allocated, Some(plan))?;
                Ok(true)
            }
            Err(e) if e.is_plan_error() => {
                warn!(task_id = %task.id, error = %e, "Allocation plan refused");
                let reason = match e {
                    RegistryError::Budget(_) => RejectReason::InsufficientBudget,
                    _ => RejectReason::NoEligibleBlocks,
                };
                if self.policy.is_batch() {
                    self.defer(task.clone(), reason)?;
                } else {
                    self.record(task, Outcome::Rejected(reason), None)?;
                }
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn defer(&mut self, task: Task, reason: RejectReason) -> SimResult<()> {
        let task_id = task.id;
        // Kept for the record if the requeue turns out to be terminal.
        let snapshot = task.clone();
        match self.queue.requeue(task, self.clock) {
            Ok(()) => {
                debug!(task_id = %task_id, reason = %reason, "Task deferred");
                Ok(())
            }
            Err(verdict) => {
                let terminal = match verdict {
                    RetryVerdict::DeadlineExpired => RejectReason::DeadlineExpired,
                    _ => RejectReason::RetriesExhausted,
                };
                self.record(&snapshot, Outcome::Rejected(terminal), None)
            }
        }
    }

    fn record(&mut self, task: &Task, outcome: Outcome, plan: Option<&AllocationPlan>) -> SimResult<()> {
        let decision = task.decision_record(outcome, self.policy.name(), self.clock, plan);
        self.queue.resolved(task.id);
        self.metrics.record(
            &decision,
            self.registry.block_capacity(),
            self.config.scheduler.clip_demands,
        );
        match outcome {
            Outcome::Allocated => debug!(
                task_id = %task.id,
                blocks = decision.block_ids.len(),
                "Task allocated"
            ),
            Outcome::Rejected(reason) => debug!(
                task_id = %task.id,
                reason = %reason,
                "Task rejected"
            ),
        }
        self.recorder.emit(self.clock, Record::Decision(decision))?;
        Ok(())
    }

    fn collect_garbage(&mut self) {
        let referenced = self.queue.referenced_blocks();
        self.registry.collect_garbage(&referenced);
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> SimState {
        self.state
    }

    pub fn clock(&self) -> SimTime {
        self.clock
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn alphas(&self) -> &AlphaSet {
        &self.alphas
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Summary of a finished run, partial ones included.
    pub fn summary(&self) -> Option<&RunSummary> {
        self.summary.as_ref()
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn sink(&self) -> &S {
        self.recorder.sink()
    }

    pub fn into_sink(self) -> S {
        self.recorder.into_sink()
    }
}
