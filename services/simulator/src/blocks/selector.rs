//! Block selectors.
//!
//! A selector is resolved against the blocks eligible at decision time, never
//! ahead of it. Eligible ids are passed oldest first.

use std::fmt;
use std::str::FromStr;

use privpack_events::RejectReason;
use privpack_id::BlockId;
use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a selector could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("no eligible blocks")]
    NoEligibleBlocks,

    #[error("not enough blocks: requested {requested}, available {available}")]
    NotEnoughBlocks { requested: usize, available: usize },
}

impl SelectionError {
    /// Rejection reason recorded for the task.
    pub fn reason(&self) -> RejectReason {
        match self {
            SelectionError::NoEligibleBlocks => RejectReason::NoEligibleBlocks,
            SelectionError::NotEnoughBlocks { .. } => RejectReason::NotEnoughBlocks,
        }
    }
}

/// How `n` blocks are picked among the eligible ones.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SelectorKind {
    /// The `n` most recent blocks.
    #[default]
    LatestBlocksFirst,
    /// `n` blocks uniformly at random, without replacement.
    RandomBlocks,
    /// `n` consecutive blocks starting at a uniformly random offset.
    ContiguousBlocksRandomOffset,
    /// `n` blocks without replacement, the block of rank `k` (oldest is 0)
    /// drawn with weight `(k + 1)^-s`.
    Zeta(f64),
}

impl fmt::Display for SelectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorKind::LatestBlocksFirst => write!(f, "LatestBlocksFirst"),
            SelectorKind::RandomBlocks => write!(f, "RandomBlocks"),
            SelectorKind::ContiguousBlocksRandomOffset => write!(f, "ContiguousBlocksRandomOffset"),
            SelectorKind::Zeta(s) => write!(f, "Zeta_{s}"),
        }
    }
}

impl FromStr for SelectorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "latestblocksfirst" | "latest_blocks_first" | "latest" => {
                return Ok(SelectorKind::LatestBlocksFirst)
            }
            "randomblocks" | "random_blocks" | "random" => return Ok(SelectorKind::RandomBlocks),
            "contiguousblocksrandomoffset" | "contiguous_blocks_random_offset" | "contiguous" => {
                return Ok(SelectorKind::ContiguousBlocksRandomOffset)
            }
            _ => {}
        }
        if let Some(exponent) = normalized.strip_prefix("zeta_") {
            let s: f64 = exponent
                .parse()
                .map_err(|_| format!("invalid zeta exponent in selector {s:?}"))?;
            if !s.is_finite() || s < 0.0 {
                return Err(format!("zeta exponent must be finite and non-negative, got {s}"));
            }
            return Ok(SelectorKind::Zeta(s));
        }
        Err(format!("unknown block selection policy {s:?}"))
    }
}

impl TryFrom<String> for SelectorKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SelectorKind> for String {
    fn from(kind: SelectorKind) -> Self {
        kind.to_string()
    }
}

/// Which blocks a task targets.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockSelector {
    /// Fixed block ids, e.g. from a trace.
    Explicit(Vec<BlockId>),
    /// `n_blocks` blocks picked by `kind`.
    Policy { kind: SelectorKind, n_blocks: usize },
}

impl BlockSelector {
    pub fn latest(n_blocks: usize) -> Self {
        BlockSelector::Policy {
            kind: SelectorKind::LatestBlocksFirst,
            n_blocks,
        }
    }

    /// Number of blocks the selector asks for.
    pub fn requested(&self) -> usize {
        match self {
            BlockSelector::Explicit(ids) => ids.len(),
            BlockSelector::Policy { n_blocks, .. } => *n_blocks,
        }
    }

    /// Explicit ids, which keep their blocks from being collected.
    pub fn explicit_ids(&self) -> &[BlockId] {
        match self {
            BlockSelector::Explicit(ids) => ids,
            BlockSelector::Policy { .. } => &[],
        }
    }

    /// Resolves the selector against `eligible`, sorted oldest first.
    ///
    /// The result is sorted ascending and free of duplicates.
    pub fn resolve<R: Rng + ?Sized>(
        &self,
        eligible: &[BlockId],
        rng: &mut R,
    ) -> Result<Vec<BlockId>, SelectionError> {
        if eligible.is_empty() {
            return Err(SelectionError::NoEligibleBlocks);
        }
        match self {
            BlockSelector::Explicit(ids) => resolve_explicit(ids, eligible),
            BlockSelector::Policy { kind, n_blocks } => {
                resolve_policy(*kind, *n_blocks, eligible, rng)
            }
        }
    }
}

fn resolve_explicit(
    ids: &[BlockId],
    eligible: &[BlockId],
) -> Result<Vec<BlockId>, SelectionError> {
    let mut wanted = ids.to_vec();
    wanted.sort_unstable();
    wanted.dedup();

    let available = wanted
        .iter()
        .filter(|id| eligible.binary_search(id).is_ok())
        .count();
    if available == 0 {
        return Err(SelectionError::NoEligibleBlocks);
    }
    if available < wanted.len() {
        return Err(SelectionError::NotEnoughBlocks {
            requested: wanted.len(),
            available,
        });
    }
    Ok(wanted)
}

fn resolve_policy<R: Rng + ?Sized>(
    kind: SelectorKind,
    n_blocks: usize,
    eligible: &[BlockId],
    rng: &mut R,
) -> Result<Vec<BlockId>, SelectionError> {
    let available = eligible.len();
    if n_blocks > available {
        return Err(SelectionError::NotEnoughBlocks {
            requested: n_blocks,
            available,
        });
    }

    let mut selected: Vec<BlockId> = match kind {
        SelectorKind::LatestBlocksFirst => eligible[available - n_blocks..].to_vec(),
        SelectorKind::ContiguousBlocksRandomOffset => {
            let offset = rng.random_range(0..=available - n_blocks);
            eligible[offset..offset + n_blocks].to_vec()
        }
        SelectorKind::RandomBlocks => index::sample(rng, available, n_blocks)
            .into_iter()
            .map(|i| eligible[i])
            .collect(),
        SelectorKind::Zeta(s) => {
            let weight = |k: usize| (k as f64 + 1.0).powf(-s);
            // Fewer non-zero weights than blocks requested: at such an
            // exponent the mass sits on the oldest blocks.
            let positive = (0..available).filter(|k| weight(*k) > 0.0).count();
            if positive < n_blocks {
                eligible[..n_blocks].to_vec()
            } else {
                match index::sample_weighted(rng, available, weight, n_blocks) {
                    Ok(indices) => indices.into_iter().map(|i| eligible[i]).collect(),
                    Err(_) => eligible[..n_blocks].to_vec(),
                }
            }
        }
    };
    selected.sort_unstable();
    Ok(selected)
}
