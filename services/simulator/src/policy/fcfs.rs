//! First come, first served.

use privpack_events::RejectReason;

use super::{Candidate, Verdict};
use crate::blocks::BudgetSnapshot;

/// Decides each task at arrival, in arrival order: the full demand on every
/// selected block, or an immediate rejection.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fcfs;

impl Fcfs {
    pub fn decide(&self, snapshot: &BudgetSnapshot, candidates: &[Candidate<'_>]) -> Vec<Verdict> {
        let mut budget = snapshot.clone();
        candidates
            .iter()
            .map(|candidate| match &candidate.blocks {
                Err(e) => Verdict::unresolved(candidate.task, *e, false),
                Ok(blocks) => {
                    if budget.deduct(blocks, &candidate.task.demand) {
                        Verdict::allocate(candidate.task, blocks.clone())
                    } else {
                        Verdict::reject(candidate.task, RejectReason::InsufficientBudget)
                    }
                }
            })
            .collect()
    }
}
