//! # Value Objects

use serde::{Deserialize, Serialize};
use shared_types::Hash256;

/// Deepest branch accepted. A tree this deep already holds a billion leaves.
pub const MAX_BRANCH_LENGTH: usize = 30;

/// A wallet's question: is `tx_id` in the block at `claimed_height`?
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProofRequest {
    /// Transaction id.
    pub tx_id: Hash256,
    /// Height the server claims the transaction was mined at.
    pub claimed_height: u64,
}

/// A server's answer to a `ProofRequest`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleBranch {
    /// Sibling hashes from leaf to root.
    pub branch: Vec<Hash256>,
    /// Leaf index of the transaction within the block.
    pub position: u64,
}

/// Outcome of checking a proof against the main chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofResult {
    /// True if the branch folds to the header's merkle root.
    pub included: bool,
    /// Hash of the header the proof was checked against.
    pub matched_header_hash: Hash256,
    /// Confirmations at the time of the check (`tip - height + 1`).
    pub confirmations: u64,
}
