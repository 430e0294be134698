//! Block registry.
//!
//! The registry owns every block and its budget curve. Policies only see a
//! [`BudgetSnapshot`]; the scheduler commits their plans through
//! [`BlockRegistry::commit_allocation`], which is all-or-nothing across the
//! plan's blocks.

mod selector;

use std::collections::{BTreeMap, BTreeSet};

use privpack_budget::{Budget, BudgetCurve, BudgetError};
use privpack_events::{BlockAllocation, BlockUsage};
use privpack_id::{BlockId, IdSequence, SimTime, TaskId};
use rand::Rng;
use thiserror::Error;
use tracing::debug;

pub use selector::{BlockSelector, SelectionError, SelectorKind};

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("cannot create block: {max_live} live blocks already exist")]
    CapacityExceeded { max_live: u32 },

    #[error("unknown block {0}")]
    UnknownBlock(BlockId),

    #[error("block {0} has expired")]
    BlockExpired(BlockId),

    #[error("budget error: {0}")]
    Budget(#[from] BudgetError),
}

impl RegistryError {
    /// True when the error only concerns the plan, not the registry.
    pub fn is_plan_error(&self) -> bool {
        match self {
            RegistryError::CapacityExceeded { .. } => false,
            RegistryError::Budget(e) => e.is_insufficient(),
            RegistryError::UnknownBlock(_) | RegistryError::BlockExpired(_) => true,
        }
    }
}

/// A data partition and its remaining privacy budget.
#[derive(Debug, Clone)]
pub struct Block {
    id: BlockId,
    created_at: SimTime,
    expires_at: Option<SimTime>,
    curve: BudgetCurve,
    expired: bool,
}

impl Block {
    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn created_at(&self) -> SimTime {
        self.created_at
    }

    pub fn expires_at(&self) -> Option<SimTime> {
        self.expires_at
    }

    pub fn curve(&self) -> &BudgetCurve {
        &self.curve
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// True while the block accepts new allocations.
    pub fn is_eligible(&self) -> bool {
        !self.expired
    }

    fn usage(&self) -> BlockUsage {
        BlockUsage {
            block_id: self.id,
            created_at: self.created_at,
            expired: self.expired,
            remaining: self.curve.remaining_budget().as_slice().to_vec(),
            max_consumed_fraction: self
                .curve
                .consumed_fraction()
                .into_iter()
                .fold(0.0, f64::max),
        }
    }
}

/// Budget a task asks to commit on a set of blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationPlan {
    pub task_id: TaskId,
    pub blocks: Vec<BlockId>,
    /// Per-alpha demand, charged to every block.
    pub demand: Budget,
}

impl AllocationPlan {
    pub fn new(task_id: TaskId, blocks: Vec<BlockId>, demand: Budget) -> Self {
        Self {
            task_id,
            blocks,
            demand,
        }
    }

    /// One allocation per block.
    pub fn allocations(&self) -> Vec<BlockAllocation> {
        self.blocks
            .iter()
            .map(|block_id| BlockAllocation {
                block_id: *block_id,
                amounts: self.demand.as_slice().to_vec(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SnapshotEntry {
    remaining: Budget,
    capacity: Budget,
}

/// Copy of the eligible blocks' budgets taken before a decision.
///
/// Policies deduct tentatively from their own copy while building plans; the
/// registry is never touched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BudgetSnapshot {
    blocks: BTreeMap<BlockId, SnapshotEntry>,
}

impl BudgetSnapshot {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn contains(&self, block_id: BlockId) -> bool {
        self.blocks.contains_key(&block_id)
    }

    /// Eligible block ids, oldest first.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.keys().copied()
    }

    pub fn remaining(&self, block_id: BlockId) -> Option<&Budget> {
        self.blocks.get(&block_id).map(|e| &e.remaining)
    }

    pub fn capacity(&self, block_id: BlockId) -> Option<&Budget> {
        self.blocks.get(&block_id).map(|e| &e.capacity)
    }

    /// True iff every block is in the snapshot and can afford `demand`.
    pub fn can_afford(&self, blocks: &[BlockId], demand: &Budget) -> bool {
        blocks.iter().all(|id| {
            self.blocks
                .get(id)
                .is_some_and(|e| demand.fits_within(&e.remaining))
        })
    }

    /// Deducts `demand` from every block if all of them can afford it.
    /// Returns false and leaves the snapshot unchanged otherwise.
    pub fn deduct(&mut self, blocks: &[BlockId], demand: &Budget) -> bool {
        if !self.can_afford(blocks, demand) {
            return false;
        }
        for id in blocks {
            if let Some(entry) = self.blocks.get_mut(id) {
                if let Ok(rest) = entry.remaining.checked_sub(demand) {
                    entry.remaining = rest;
                }
            }
        }
        true
    }
}

/// Owns the blocks of a run.
#[derive(Debug, Clone)]
pub struct BlockRegistry {
    capacity: Budget,
    initial_unlocked_fraction: f64,
    data_lifetime: Option<f64>,
    max_live: u32,
    ids: IdSequence<BlockId>,
    blocks: BTreeMap<BlockId, Block>,
}

impl BlockRegistry {
    /// Registry whose blocks start with `capacity` fully unlocked.
    pub fn new(capacity: Budget, max_live: u32) -> Self {
        Self {
            capacity,
            initial_unlocked_fraction: 1.0,
            data_lifetime: None,
            max_live,
            ids: IdSequence::new(),
            blocks: BTreeMap::new(),
        }
    }

    /// Only `fraction` of the capacity is available at creation.
    pub fn with_unlocked_fraction(mut self, fraction: f64) -> Self {
        self.initial_unlocked_fraction = fraction;
        self
    }

    /// Blocks expire `lifetime` after creation.
    pub fn with_lifetime(mut self, lifetime: Option<f64>) -> Self {
        self.data_lifetime = lifetime;
        self
    }

    pub fn block_capacity(&self) -> &Budget {
        &self.capacity
    }

    /// Creates a block at `now`.
    pub fn create_block(&mut self, now: SimTime) -> Result<BlockId, RegistryError> {
        if self.live_count() >= self.max_live as usize {
            return Err(RegistryError::CapacityExceeded {
                max_live: self.max_live,
            });
        }
        let id = self.ids.next_id();
        let block = Block {
            id,
            created_at: now,
            expires_at: self.data_lifetime.map(|lifetime| now.advance(lifetime)),
            curve: BudgetCurve::with_unlocked_fraction(
                self.capacity.clone(),
                self.initial_unlocked_fraction,
            ),
            expired: false,
        };
        debug!(block_id = %id, created_at = now.value(), "Block created");
        self.blocks.insert(id, block);
        Ok(id)
    }

    /// Marks a block expired. Returns false if it was already expired or has
    /// been collected.
    pub fn expire(&mut self, block_id: BlockId) -> bool {
        match self.blocks.get_mut(&block_id) {
            Some(block) if !block.expired => {
                block.expired = true;
                debug!(block_id = %block_id, "Block expired");
                true
            }
            _ => false,
        }
    }

    /// Releases `increment` of the block's withheld budget.
    pub fn unlock(&mut self, block_id: BlockId, increment: &Budget) -> Result<Budget, RegistryError> {
        let block = self
            .blocks
            .get_mut(&block_id)
            .ok_or(RegistryError::UnknownBlock(block_id))?;
        Ok(block.curve.unlock(increment)?)
    }

    /// Releases an equal share of what is still withheld, given that
    /// `steps_left` releases remain (this one included).
    pub fn unlock_step(&mut self, block_id: BlockId, steps_left: u32) -> Result<Budget, RegistryError> {
        let block = self
            .blocks
            .get(&block_id)
            .ok_or(RegistryError::UnknownBlock(block_id))?;
        let withheld = block.curve.withheld();
        let increment = withheld.scale(1.0 / f64::from(steps_left.max(1)))?;
        self.unlock(block_id, &increment)
    }

    /// Eligible block ids, oldest first.
    pub fn eligible_ids(&self) -> Vec<BlockId> {
        self.blocks
            .values()
            .filter(|b| b.is_eligible())
            .map(|b| b.id)
            .collect()
    }

    /// Resolves a selector against the currently eligible blocks.
    pub fn select<R: Rng + ?Sized>(
        &self,
        selector: &BlockSelector,
        rng: &mut R,
    ) -> Result<Vec<BlockId>, SelectionError> {
        selector.resolve(&self.eligible_ids(), rng)
    }

    /// Copies the eligible blocks' budgets.
    pub fn snapshot(&self) -> BudgetSnapshot {
        BudgetSnapshot {
            blocks: self
                .blocks
                .values()
                .filter(|b| b.is_eligible())
                .map(|b| {
                    (
                        b.id,
                        SnapshotEntry {
                            remaining: b.curve.remaining_budget().clone(),
                            capacity: b.curve.capacity().clone(),
                        },
                    )
                })
                .collect(),
        }
    }

    /// Commits a plan on every block or on none.
    ///
    /// Validates first; if a block still fails while committing, the blocks
    /// already debited are rolled back before the error is returned.
    pub fn commit_allocation(&mut self, plan: &AllocationPlan) -> Result<(), RegistryError> {
        for block_id in &plan.blocks {
            let block = self
                .blocks
                .get(block_id)
                .ok_or(RegistryError::UnknownBlock(*block_id))?;
            if block.expired {
                return Err(RegistryError::BlockExpired(*block_id));
            }
            block.curve.remaining_budget().checked_sub(&plan.demand)?;
        }

        let mut committed: Vec<BlockId> = Vec::with_capacity(plan.blocks.len());
        for block_id in &plan.blocks {
            let result = match self.blocks.get_mut(block_id) {
                Some(block) => block.curve.commit(&plan.demand).map_err(RegistryError::from),
                None => Err(RegistryError::UnknownBlock(*block_id)),
            };
            if let Err(e) = result {
                self.rollback(&committed, &plan.demand);
                return Err(e);
            }
            committed.push(*block_id);
        }
        Ok(())
    }

    fn rollback(&mut self, committed: &[BlockId], demand: &Budget) {
        for block_id in committed {
            if let Some(block) = self.blocks.get_mut(block_id) {
                // Same dimension as the commit that just succeeded.
                let _ = block.curve.release(demand);
            }
        }
    }

    /// Drops expired blocks that no pending task references. Returns the
    /// collected ids.
    pub fn collect_garbage(&mut self, referenced: &BTreeSet<BlockId>) -> Vec<BlockId> {
        let collectable: Vec<BlockId> = self
            .blocks
            .values()
            .filter(|b| b.expired && !referenced.contains(&b.id))
            .map(|b| b.id)
            .collect();
        for id in &collectable {
            self.blocks.remove(id);
        }
        if !collectable.is_empty() {
            debug!(collected = collectable.len(), "Expired blocks collected");
        }
        collectable
    }

    /// Per-block state for metrics.
    pub fn usage(&self) -> Vec<BlockUsage> {
        self.blocks.values().map(Block::usage).collect()
    }

    pub fn get(&self, block_id: BlockId) -> Option<&Block> {
        self.blocks.get(&block_id)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    /// Blocks not yet expired.
    pub fn live_count(&self) -> usize {
        self.blocks.values().filter(|b| b.is_eligible()).count()
    }

    /// Blocks created over the run, collected ones included.
    pub fn created(&self) -> u64 {
        self.ids.issued()
    }
}
