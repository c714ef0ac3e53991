//! # Domain Errors

use shared_types::{Hash256, HeaderDecodeError};
use thiserror::Error;

/// Why `accept` refused a header.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Header hash is above its own target.
    #[error("insufficient proof of work")]
    InsufficientProofOfWork,

    /// Compact target is malformed, zero, or easier than the pow limit.
    #[error("invalid target bits {bits:#010x}")]
    InvalidTarget {
        /// Offending compact target.
        bits: u32,
    },

    /// Previous hash is not in the store.
    #[error("unknown parent {0}")]
    UnknownParent(Hash256),

    /// The caller's height hint disagrees with the parent linkage.
    #[error("height mismatch: hinted {hinted}, linked {linked}")]
    HeightMismatch {
        /// Height claimed by the source.
        hinted: u64,
        /// Height implied by the parent.
        linked: u64,
    },

    /// Header sits at a checkpoint height but has a different hash.
    #[error("checkpoint mismatch at height {height}")]
    CheckpointMismatch {
        /// Checkpoint height.
        height: u64,
    },

    /// Header would fork the main chain at or below a checkpoint it has passed.
    #[error("fork at height {height} is below checkpoint {checkpoint}")]
    ForkBelowCheckpoint {
        /// Height of the forking header.
        height: u64,
        /// Highest checkpoint on the main chain.
        checkpoint: u64,
    },

    /// Bits differ from what the retarget rule requires.
    #[error("unexpected difficulty: expected {expected:#010x}, got {got:#010x}")]
    UnexpectedDifficulty {
        /// Required compact target.
        expected: u32,
        /// Compact target carried by the header.
        got: u32,
    },

    /// Timestamp is not above the median of the previous headers.
    #[error("timestamp {timestamp} not after median time past {median}")]
    TimestampTooOld {
        /// Header timestamp.
        timestamp: u32,
        /// Median of the ancestor window.
        median: u32,
    },

    /// Timestamp is beyond the allowed future drift.
    #[error("timestamp {timestamp} too far in the future (limit {limit})")]
    TimestampTooFarInFuture {
        /// Header timestamp.
        timestamp: u32,
        /// Latest acceptable timestamp.
        limit: u64,
    },
}

impl RejectReason {
    /// True if the header may become acceptable later without changing.
    ///
    /// Only the future-drift check depends on the local clock; every other
    /// rule is a property of the header and its ancestors.
    pub fn is_clock_dependent(&self) -> bool {
        matches!(self, RejectReason::TimestampTooFarInFuture { .. })
    }
}

/// Chain store errors outside of per-header rejection.
#[derive(Debug, Error)]
pub enum ChainStoreError {
    /// A store root must start a difficulty period.
    #[error("root height {height} is not a multiple of the retarget interval {interval}")]
    MisalignedRoot {
        /// Requested root height.
        height: u64,
        /// Retarget interval.
        interval: u64,
    },

    /// A persisted file does not start with this store's root header.
    #[error("header file root {found} does not match store root {expected}")]
    RootMismatch {
        /// Root of this store.
        expected: Hash256,
        /// First header in the file.
        found: Hash256,
    },

    /// A persisted header failed re-validation.
    #[error("stored header at height {height} rejected: {reason}")]
    Rejected {
        /// Height of the offending record.
        height: u64,
        /// Rejection reason.
        reason: RejectReason,
    },

    /// Header bytes could not be decoded.
    #[error(transparent)]
    Decode(#[from] HeaderDecodeError),

    /// Filesystem error.
    #[error("header file I/O: {0}")]
    Io(#[from] std::io::Error),
}
