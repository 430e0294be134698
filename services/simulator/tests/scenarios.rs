mod harness;

use harness::{run_workload, single_block_config, task};
use privpack_events::{Outcome, RejectReason, StopReason};
use privpack_id::{BlockId, SimTime};
use privpack_simulator::config::PolicyKind;
use privpack_simulator::solver::Objective;

#[test]
fn fcfs_admits_first_and_rejects_second() {
    let config = single_block_config(PolicyKind::Fcfs, &[2.0], &[10.0]);
    let out = run_workload(config, vec![task(0.0, &[6.0]), task(1.0, &[6.0])]);

    assert_eq!(out.allocated_ids(), vec![0]);
    let second = out.decision(1);
    assert_eq!(
        second.outcome,
        Outcome::Rejected(RejectReason::InsufficientBudget)
    );
    assert_eq!(second.decision_time, SimTime::new(1.0).unwrap());
    assert_eq!(out.decision(0).allocations[0].amounts, vec![6.0]);
    assert_eq!(out.summary.allocated, 1);
    assert_eq!(out.summary.rejected, 1);
}

#[test]
fn packing_by_count_admits_both_small_tasks() {
    let mut config = single_block_config(PolicyKind::Packing, &[2.0], &[10.0]);
    config.scheduler.packing.objective = Objective::Count;
    let out = run_workload(config, vec![task(0.0, &[4.0]), task(0.0, &[4.0])]);

    assert_eq!(out.allocated_ids(), vec![0, 1]);
    assert_eq!(out.summary.acceptance_rate, 1.0);
}

#[test]
fn unlocked_budget_admits_task_later() {
    for method in [PolicyKind::DominantShares, PolicyKind::Packing] {
        let mut config = single_block_config(method, &[2.0], &[10.0]);
        config.blocks.initial_unlocked_fraction = 0.5;
        config.blocks.budget_unlocking_time = 2;
        let out = run_workload(config, vec![task(0.0, &[9.0])]);

        let record = out.decision(0);
        assert_eq!(record.outcome, Outcome::Allocated, "{method:?}");
        assert_eq!(record.decision_time, SimTime::new(2.0).unwrap(), "{method:?}");
        assert_eq!(record.attempts, 3, "{method:?}");
    }

    let mut config = single_block_config(PolicyKind::Fcfs, &[2.0], &[10.0]);
    config.blocks.initial_unlocked_fraction = 0.5;
    config.blocks.budget_unlocking_time = 2;
    let out = run_workload(config, vec![task(0.0, &[9.0])]);
    assert_eq!(
        out.decision(0).outcome,
        Outcome::Rejected(RejectReason::InsufficientBudget)
    );
}

#[test]
fn tasks_without_blocks_are_rejected() {
    let mut config = single_block_config(PolicyKind::Fcfs, &[2.0], &[10.0]);
    config.blocks.initial_num = 0;
    config.blocks.arrival_interval = 5.0;
    let out = run_workload(config, vec![task(1.0, &[1.0])]);
    assert_eq!(
        out.decision(0).outcome,
        Outcome::Rejected(RejectReason::NoEligibleBlocks)
    );
}

#[test]
fn expired_blocks_stop_accepting_tasks() {
    let mut config = single_block_config(PolicyKind::Fcfs, &[2.0], &[10.0]);
    config.blocks.data_lifetime = Some(1.0);
    config.blocks.max_num = 2;
    config.blocks.total_num = Some(2);
    config.blocks.arrival_interval = 5.0;
    let out = run_workload(config, vec![task(0.5, &[1.0]), task(2.0, &[1.0])]);

    assert_eq!(out.decision(0).outcome, Outcome::Allocated);
    assert_eq!(
        out.decision(1).outcome,
        Outcome::Rejected(RejectReason::NoEligibleBlocks)
    );
}

#[test]
fn expiring_block_frees_its_slot_for_a_new_arrival() {
    let mut config = single_block_config(PolicyKind::Fcfs, &[2.0], &[10.0]);
    config.blocks.max_num = 2;
    config.blocks.total_num = Some(3);
    config.blocks.arrival_interval = 1.0;
    config.blocks.data_lifetime = Some(2.0);
    let out = run_workload(config, vec![task(0.5, &[6.0]), task(2.5, &[6.0])]);

    assert_eq!(out.summary.stop_reason, StopReason::Completed);
    assert_eq!(out.summary.blocks_created, 3);
    assert_eq!(out.allocated_ids(), vec![0, 1]);
    assert_eq!(out.decision(1).block_ids, vec![BlockId::new(2)]);
}

#[test]
fn multi_block_tasks_wait_for_enough_blocks() {
    let mut config = single_block_config(PolicyKind::DominantShares, &[2.0], &[10.0]);
    config.blocks.max_num = 2;
    config.blocks.total_num = Some(2);
    config.blocks.arrival_interval = 3.0;
    let mut wide = task(0.0, &[1.0]);
    wide.selector = privpack_simulator::blocks::BlockSelector::latest(2);
    let out = run_workload(config, vec![wide]);

    let record = out.decision(0);
    assert_eq!(record.outcome, Outcome::Allocated);
    assert_eq!(record.decision_time, SimTime::new(3.0).unwrap());
    assert_eq!(record.block_ids.len(), 2);
}
