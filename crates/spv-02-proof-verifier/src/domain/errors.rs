//! # Domain Errors

use thiserror::Error;

/// Why an inclusion proof could not be evaluated or did not hold.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProofFailure {
    /// No main-chain header at the claimed height.
    #[error("no main-chain header at height {height}")]
    HeaderUnavailable {
        /// Claimed height.
        height: u64,
    },

    /// Branch deeper than any real block tree.
    #[error("merkle branch of length {len} exceeds the maximum")]
    BranchTooLong {
        /// Supplied branch length.
        len: usize,
    },

    /// Position has bits set beyond the branch length.
    #[error("position {position} out of range for branch length {len}")]
    PositionOutOfRange {
        /// Supplied position.
        position: u64,
        /// Supplied branch length.
        len: usize,
    },

    /// Branch depth or position disagrees with the known transaction count.
    #[error("branch length {len} inconsistent with {tx_count} transactions")]
    InconsistentTxCount {
        /// Supplied branch length.
        len: usize,
        /// Known transaction count.
        tx_count: u64,
    },
}
