//! Test harness for simulator integration tests.
//!
//! Builds small single-alpha configurations and hand-written workloads, runs
//! them to completion and exposes the recorded stream.

use privpack_budget::Budget;
use privpack_events::{DecisionRecord, MemorySink, Outcome, RunSummary};
use privpack_id::{SimTime, TaskId};
use privpack_simulator::blocks::BlockSelector;
use privpack_simulator::config::{BlocksConfig, BudgetConfig, PolicyKind, SimConfig};
use privpack_simulator::tasks::{TaskDescriptor, Workload};
use privpack_simulator::Simulation;

/// One block at t=0 with `capacity` on each of `alphas`.
pub fn single_block_config(method: PolicyKind, alphas: &[f64], capacity: &[f64]) -> SimConfig {
    let mut config = SimConfig::default();
    config.budget = BudgetConfig {
        alphas: alphas.to_vec(),
        capacity: Some(capacity.to_vec()),
        ..BudgetConfig::default()
    };
    config.blocks = BlocksConfig {
        initial_num: 1,
        max_num: 1,
        total_num: Some(1),
        ..BlocksConfig::default()
    };
    config.scheduler.method = method;
    config
}

pub fn task(arrival: f64, demand: &[f64]) -> TaskDescriptor {
    TaskDescriptor::new(
        SimTime::new(arrival).unwrap(),
        Budget::new(demand.to_vec()).unwrap(),
        BlockSelector::latest(1),
    )
}

/// A finished run.
#[allow(dead_code)]
pub struct RunOutput {
    pub summary: RunSummary,
    pub sink: MemorySink,
}

#[allow(dead_code)]
impl RunOutput {
    pub fn decisions(&self) -> Vec<&DecisionRecord> {
        self.sink.decisions().collect()
    }

    pub fn decision(&self, task_id: u64) -> &DecisionRecord {
        self.sink
            .decisions()
            .find(|d| d.task_id == TaskId::new(task_id))
            .unwrap_or_else(|| panic!("no decision for task {task_id}"))
    }

    pub fn allocated_ids(&self) -> Vec<u64> {
        self.sink
            .decisions()
            .filter(|d| d.outcome == Outcome::Allocated)
            .map(|d| d.task_id.value())
            .collect()
    }
}

pub fn run_workload(config: SimConfig, tasks: Vec<TaskDescriptor>) -> RunOutput {
    let mut sim = Simulation::with_workload(config, Workload::new(tasks), MemorySink::new())
        .expect("valid simulation");
    let summary = sim.run().expect("run completes");
    RunOutput {
        summary,
        sink: sim.into_sink(),
    }
}

#[allow(dead_code)]
pub fn run_config(config: SimConfig) -> RunOutput {
    let mut sim = Simulation::new(config, MemorySink::new()).expect("valid simulation");
    let summary = sim.run().expect("run completes");
    RunOutput {
        summary,
        sink: sim.into_sink(),
    }
}
