//! Fair share: smallest dominant share first.

use std::collections::{BTreeMap, BTreeSet};

use privpack_budget::Budget;
use privpack_events::RejectReason;
use privpack_id::TaskId;

use super::{Candidate, Verdict};
use crate::blocks::BudgetSnapshot;
use crate::config::Tiebreaker;

/// Largest share of a capacity the demand takes, over every block and alpha.
/// Alphas with zero capacity are skipped; `clip` caps each share at 1.
pub fn dominant_share<'b>(
    demand: &Budget,
    capacities: impl IntoIterator<Item = &'b Budget>,
    clip: bool,
) -> f64 {
    capacities
        .into_iter()
        .flat_map(|capacity| {
            demand
                .iter()
                .zip(capacity.iter())
                .filter(|(_, c)| *c > 0.0)
                .map(|(d, c)| if clip { (d / c).min(1.0) } else { d / c })
        })
        .fold(0.0, f64::max)
}

/// Admits pending tasks in non-decreasing dominant share while they fit.
#[derive(Debug, Clone, Default)]
pub struct DominantShares {
    tiebreaker: Tiebreaker,
    clip_demands: bool,
    /// Capacities never change, so a task's share is computed once.
    shares: BTreeMap<TaskId, f64>,
}

impl DominantShares {
    pub fn new(tiebreaker: Tiebreaker, clip_demands: bool) -> Self {
        Self {
            tiebreaker,
            clip_demands,
            shares: BTreeMap::new(),
        }
    }

    /// Drops cached shares of tasks not in this decision pass.
    pub fn refresh(&mut self, candidates: &[Candidate<'_>]) {
        let pending: BTreeSet<TaskId> = candidates.iter().map(|c| c.task.id).collect();
        self.shares.retain(|id, _| pending.contains(id));
    }

    pub fn decide(&mut self, snapshot: &BudgetSnapshot, candidates: &[Candidate<'_>]) -> Vec<Verdict> {
        let mut verdicts = Vec::with_capacity(candidates.len());
        let mut ranked = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match &candidate.blocks {
                Err(e) => verdicts.push(Verdict::unresolved(candidate.task, *e, true)),
                Ok(blocks) => {
                    let share = *self.shares.entry(candidate.task.id).or_insert_with(|| {
                        dominant_share(
                            &candidate.task.demand,
                            blocks.iter().filter_map(|b| snapshot.capacity(*b)),
                            self.clip_demands,
                        )
                    });
                    ranked.push((share, candidate, blocks));
                }
            }
        }

        let tiebreaker = self.tiebreaker;
        ranked.sort_by(|(sa, a, _), (sb, b, _)| {
            let by_share = sa.total_cmp(sb);
            let by_arrival = (a.task.arrival, a.task.id).cmp(&(b.task.arrival, b.task.id));
            match tiebreaker {
                Tiebreaker::Arrival => by_share.then(by_arrival),
                Tiebreaker::Profit => by_share
                    .then(b.task.profit.total_cmp(&a.task.profit))
                    .then(by_arrival),
            }
        });

        let mut budget = snapshot.clone();
        for (_, candidate, blocks) in ranked {
            if budget.deduct(blocks, &candidate.task.demand) {
                verdicts.push(Verdict::allocate(candidate.task, blocks.clone()));
            } else {
                verdicts.push(Verdict::defer(candidate.task, RejectReason::InsufficientBudget));
            }
        }
        verdicts
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{allocated, on_block0, snapshot, task};
    use super::super::Decision;
    use super::*;
    use crate::tasks::Task;

    #[test]
    fn test_dominant_share_skips_zero_capacity() {
        let demand = Budget::new(vec![5.0, 1.0]).unwrap();
        let capacity = Budget::new(vec![0.0, 4.0]).unwrap();
        assert_eq!(dominant_share(&demand, [&capacity], false), 0.25);

        let small = Budget::new(vec![1.0, 1.0]).unwrap();
        let big = Budget::new(vec![1.0, 8.0]).unwrap();
        assert_eq!(dominant_share(&big, [&small], false), 8.0);
        assert_eq!(dominant_share(&big, [&small], true), 1.0);
    }

    #[test]
    fn test_small_shares_first() {
        let big = task(0, &[8.0]);
        let small_a = task(1, &[3.0]);
        let small_b = task(2, &[4.0]);
        let mut policy = DominantShares::default();
        let verdicts = policy.decide(
            &snapshot(&[10.0], 1),
            &[on_block0(&big), on_block0(&small_a), on_block0(&small_b)],
        );
        assert_eq!(allocated(&verdicts), vec![1, 2]);
        let deferred = verdicts.iter().find(|v| v.task_id == big.id).unwrap();
        assert_eq!(
            deferred.decision,
            Decision::Defer(RejectReason::InsufficientBudget)
        );
    }

    #[test]
    fn test_profit_tiebreaker() {
        let cheap = task(0, &[6.0]);
        let valuable = task(1, &[6.0]).with_profit(5.0);
        let candidates = [on_block0(&cheap), on_block0(&valuable)];

        let mut by_arrival = DominantShares::new(Tiebreaker::Arrival, false);
        assert_eq!(allocated(&by_arrival.decide(&snapshot(&[10.0], 1), &candidates)), vec![0]);

        let mut by_profit = DominantShares::new(Tiebreaker::Profit, false);
        assert_eq!(allocated(&by_profit.decide(&snapshot(&[10.0], 1), &candidates)), vec![1]);
    }

    #[test]
    fn test_refresh_drops_resolved_tasks() {
        let a = task(0, &[1.0]);
        let b = task(1, &[1.0]);
        let mut policy = DominantShares::default();
        policy.decide(&snapshot(&[10.0], 1), &[on_block0(&a), on_block0(&b)]);
        assert_eq!(policy.shares.len(), 2);
        policy.refresh(&[on_block0(&b)]);
        assert_eq!(policy.shares.len(), 1);
        assert!(policy.shares.contains_key(&b.id));
    }

    #[test]
    fn test_refresh_keeps_every_pending_task_of_a_large_batch() {
        let tasks: Vec<Task> = (0..400).map(|i| task(i, &[0.01])).collect();
        let candidates: Vec<_> = tasks.iter().map(on_block0).collect();
        let mut policy = DominantShares::default();
        policy.decide(&snapshot(&[10.0], 1), &candidates);
        assert_eq!(policy.shares.len(), 400);

        let odd: Vec<_> = candidates.iter().skip(1).step_by(2).cloned().collect();
        policy.refresh(&odd);
        assert_eq!(policy.shares.len(), 200);
        assert!(policy.shares.keys().all(|id| id.value() % 2 == 1));
    }
}
