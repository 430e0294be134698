mod harness;

use std::collections::{BTreeMap, BTreeSet};

use harness::{run_config, RunOutput};
use privpack_budget::DemandCurve;
use privpack_events::Outcome;
use privpack_simulator::config::{PackingStrategy, PolicyKind, SimConfig, SolverKind, TaskSpec};
use rstest::rstest;

/// Four blocks, Gaussian tasks sized so that a block fits about four of them.
fn contended_config(method: PolicyKind, strategy: PackingStrategy) -> SimConfig {
    let mut config = SimConfig::default();
    config.global_seed = 7;
    config.blocks.initial_num = 1;
    config.blocks.max_num = 4;
    config.blocks.total_num = Some(4);
    config.tasks.avg_num_tasks_per_block = 4.0;
    config.tasks.specs = vec![
        TaskSpec {
            name: Some("small".into()),
            demand: DemandCurve::Gaussian { sigma: 4.0 },
            ..TaskSpec::default()
        },
        TaskSpec {
            name: Some("wide".into()),
            n_blocks: 2,
            profit: 3.0,
            frequency: 0.5,
            demand: DemandCurve::Gaussian { sigma: 6.0 },
            ..TaskSpec::default()
        },
    ];
    config.scheduler.method = method;
    config.scheduler.packing.strategy = strategy;
    config.scheduler.packing.temperature = 0.5;
    config.solver.time_limit_seconds = 0.5;
    config
}

fn committed_per_block(out: &RunOutput) -> BTreeMap<u64, Vec<f64>> {
    let mut committed: BTreeMap<u64, Vec<f64>> = BTreeMap::new();
    for decision in out.decisions() {
        for allocation in &decision.allocations {
            let sums = committed
                .entry(allocation.block_id.value())
                .or_insert_with(|| vec![0.0; allocation.amounts.len()]);
            for (sum, amount) in sums.iter_mut().zip(&allocation.amounts) {
                *sum += amount;
            }
        }
    }
    committed
}

#[rstest]
#[case::fcfs(PolicyKind::Fcfs, PackingStrategy::Global)]
#[case::dominant_shares(PolicyKind::DominantShares, PackingStrategy::Global)]
#[case::packing_global(PolicyKind::Packing, PackingStrategy::Global)]
#[case::packing_soft_knapsack(PolicyKind::Packing, PackingStrategy::SoftKnapsack)]
#[case::packing_argmax_knapsack(PolicyKind::Packing, PackingStrategy::ArgmaxKnapsack)]
#[case::packing_batch_overflow(PolicyKind::Packing, PackingStrategy::BatchOverflow)]
#[case::packing_dynamic_flat(PolicyKind::Packing, PackingStrategy::DynamicFlat)]
#[case::packing_flat(PolicyKind::Packing, PackingStrategy::Flat)]
#[case::packing_overflow(PolicyKind::Packing, PackingStrategy::Overflow)]
#[case::packing_softmax_overflow(PolicyKind::Packing, PackingStrategy::SoftmaxOverflow)]
fn every_task_gets_exactly_one_decision(
    #[case] method: PolicyKind,
    #[case] strategy: PackingStrategy,
) {
    let out = run_config(contended_config(method, strategy));

    let ids: BTreeSet<u64> = out.decisions().iter().map(|d| d.task_id.value()).collect();
    assert_eq!(ids.len(), out.decisions().len());
    assert_eq!(ids.len() as u64, out.summary.total_tasks);
    assert_eq!(out.summary.allocated + out.summary.rejected, out.summary.total_tasks);
    assert!(out.summary.total_tasks > 0);
    assert!(out.summary.allocated > 0, "{method:?}/{strategy:?} admitted nothing");
}

#[rstest]
#[case::fcfs(PolicyKind::Fcfs, PackingStrategy::Global)]
#[case::dominant_shares(PolicyKind::DominantShares, PackingStrategy::Global)]
#[case::packing_global(PolicyKind::Packing, PackingStrategy::Global)]
#[case::packing_soft_knapsack(PolicyKind::Packing, PackingStrategy::SoftKnapsack)]
#[case::packing_dynamic_flat(PolicyKind::Packing, PackingStrategy::DynamicFlat)]
#[case::packing_flat(PolicyKind::Packing, PackingStrategy::Flat)]
#[case::packing_overflow(PolicyKind::Packing, PackingStrategy::Overflow)]
#[case::packing_softmax_overflow(PolicyKind::Packing, PackingStrategy::SoftmaxOverflow)]
fn allocations_never_exceed_capacity(
    #[case] method: PolicyKind,
    #[case] strategy: PackingStrategy,
) {
    let config = contended_config(method, strategy);
    let alphas = config.alpha_set().unwrap();
    let capacity = config.block_capacity(&alphas).unwrap();
    let out = run_config(config);

    for (block, sums) in committed_per_block(&out) {
        for (alpha, sum) in sums.iter().enumerate() {
            assert!(
                *sum <= capacity.get(alpha) + 1e-9,
                "block {block} alpha #{alpha}: {sum} > {}",
                capacity.get(alpha)
            );
        }
    }
    let last = out.sink.metrics().last().unwrap();
    assert!(last
        .blocks
        .iter()
        .all(|b| b.remaining.iter().all(|r| *r >= 0.0)));
}

#[rstest]
#[case(PolicyKind::Fcfs)]
#[case(PolicyKind::DominantShares)]
#[case(PolicyKind::Packing)]
fn same_seed_same_decisions(#[case] method: PolicyKind) {
    let first = run_config(contended_config(method, PackingStrategy::Global));
    let second = run_config(contended_config(method, PackingStrategy::Global));

    let outcomes = |out: &RunOutput| -> Vec<(u64, Outcome, Vec<u64>)> {
        out.decisions()
            .iter()
            .map(|d| {
                (
                    d.task_id.value(),
                    d.outcome,
                    d.block_ids.iter().map(|b| b.value()).collect(),
                )
            })
            .collect()
    };
    assert_eq!(outcomes(&first), outcomes(&second));
    assert_eq!(first.summary.config_fingerprint, second.summary.config_fingerprint);
}

#[rstest]
#[case(SolverKind::Exact, 1)]
#[case(SolverKind::Exact, 4)]
#[case(SolverKind::Greedy, 1)]
fn solver_backends_produce_feasible_batches(#[case] backend: SolverKind, #[case] threads: usize) {
    let mut config = contended_config(PolicyKind::Packing, PackingStrategy::Global);
    config.solver.backend = backend;
    config.solver.threads = threads;
    let out = run_config(config);

    assert!(out.summary.allocated > 0);
    assert_eq!(out.summary.allocated + out.summary.rejected, out.summary.total_tasks);
}

#[test]
fn packing_realizes_at_least_fcfs_profit_on_a_single_batch() {
    use harness::{run_workload, single_block_config, task};

    let big = task(0.0, &[6.0]).with_profit(3.0);
    let small_a = task(0.0, &[5.0]).with_profit(2.0);
    let small_b = task(0.0, &[5.0]).with_profit(2.0);

    let fcfs = run_workload(
        single_block_config(PolicyKind::Fcfs, &[2.0], &[10.0]),
        vec![big.clone(), small_a.clone(), small_b.clone()],
    );
    let packing = run_workload(
        single_block_config(PolicyKind::Packing, &[2.0], &[10.0]),
        vec![big, small_a, small_b],
    );
    assert_eq!(fcfs.summary.realized_profit, 3.0);
    assert_eq!(packing.summary.realized_profit, 4.0);
}
