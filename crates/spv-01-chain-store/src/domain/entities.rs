//! # Domain Entities

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use shared_types::{BlockHeader, Hash256};
use std::fmt;

use super::errors::RejectReason;

/// Identifier of a chain (main or fork) that survives tip changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ForkId(pub u64);

impl fmt::Display for ForkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain#{}", self.0)
    }
}

/// A header in the arena with its derived data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderEntry {
    /// The header itself.
    pub header: BlockHeader,
    /// Cached header hash.
    pub hash: Hash256,
    /// Height from the root.
    pub height: u64,
    /// Total work from the root up to and including this header.
    pub chain_work: U256,
}

/// Bookkeeping for one chain, keyed by its tip hash.
#[derive(Clone, Debug)]
pub(crate) struct ChainMeta {
    pub id: ForkId,
    pub tip: Hash256,
    pub height: u64,
    /// Height of the last header shared with the main chain.
    pub fork_point: u64,
    pub work: U256,
    /// Creation order, used to break work ties when pruning.
    pub created_seq: u64,
}

impl ChainMeta {
    pub fn snapshot(&self, is_main: bool) -> ChainSnapshot {
        ChainSnapshot {
            id: self.id,
            tip_hash: self.tip,
            height: self.height,
            work: self.work,
            fork_point: if is_main { None } else { Some(self.fork_point) },
        }
    }
}

/// Read-only view of a chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainSnapshot {
    /// Chain identifier.
    pub id: ForkId,
    /// Tip hash.
    pub tip_hash: Hash256,
    /// Tip height.
    pub height: u64,
    /// Cumulative work at the tip.
    pub work: U256,
    /// Common ancestor height with the main chain (`None` for main itself).
    pub fork_point: Option<u64>,
}

/// Result classification of `accept`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// Header extended the main chain tip.
    ExtendedMain,
    /// Header extended the tip of an existing fork.
    ExtendedFork(ForkId),
    /// Header branched off a non-tip header.
    StartedFork(ForkId),
    /// Header violated a rule.
    Rejected(RejectReason),
    /// Header already stored.
    AlreadyKnown,
}

impl AcceptOutcome {
    /// True if the header is now stored (new or already known).
    pub fn is_stored(&self) -> bool {
        !matches!(self, AcceptOutcome::Rejected(_))
    }
}

/// The main chain switched to a heavier branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorgEvent {
    /// Height of the last header shared by old and new main.
    pub common_ancestor_height: u64,
    /// Previous main tip.
    pub old_tip: Hash256,
    /// New main tip.
    pub new_tip: Hash256,
}

/// What `accept` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcceptResult {
    /// Classification.
    pub outcome: AcceptOutcome,
    /// Set when this header made a fork overtake the main chain.
    pub reorg: Option<ReorgEvent>,
}

impl AcceptResult {
    pub(crate) fn plain(outcome: AcceptOutcome) -> Self {
        Self {
            outcome,
            reorg: None,
        }
    }

    pub(crate) fn rejected(reason: RejectReason) -> Self {
        Self::plain(AcceptOutcome::Rejected(reason))
    }
}
