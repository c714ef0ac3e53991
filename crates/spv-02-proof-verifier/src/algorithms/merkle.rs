//! # Merkle Branch Verification
//!
//! Bitcoin transaction trees: leaves are txids, inner nodes are
//! `sha256d(left || right)`, and an odd level duplicates its last node.
//!
//! # Branch folding
//!
//! Bit `i` of `position` (LSB first) says where the running hash sits at
//! level `i`:
//! - `0`: running hash is the left child, sibling on the right
//! - `1`: running hash is the right child, sibling on the left

use shared_types::{sha256d, BlockHeader, Hash256};

use crate::domain::{ProofFailure, MAX_BRANCH_LENGTH};

/// Verify that `tx_id` sits at `position` under `header.merkle_root`.
///
/// Fails closed on over-long branches and on positions with bits beyond the
/// branch length.
///
/// # Time Complexity: O(branch length)
pub fn verify(header: &BlockHeader, tx_id: &Hash256, branch: &[Hash256], position: u64) -> bool {
    check_branch_shape(branch.len(), position).is_ok()
        && fold_branch(tx_id, branch, position) == header.merkle_root
}

/// Like [`verify`], additionally requiring the branch to match a tree of
/// `tx_count` leaves.
pub fn verify_with_tx_count(
    header: &BlockHeader,
    tx_id: &Hash256,
    branch: &[Hash256],
    position: u64,
    tx_count: u64,
) -> bool {
    check_tx_count(branch.len(), position, tx_count).is_ok() && verify(header, tx_id, branch, position)
}

/// Reject a branch that cannot belong to a tree of `tx_count` leaves.
pub fn check_tx_count(len: usize, position: u64, tx_count: u64) -> Result<(), ProofFailure> {
    if tx_count == 0 || position >= tx_count || len != tree_depth(tx_count) {
        return Err(ProofFailure::InconsistentTxCount { len, tx_count });
    }
    Ok(())
}

/// Reject branches no real block could produce.
pub fn check_branch_shape(len: usize, position: u64) -> Result<(), ProofFailure> {
    if len > MAX_BRANCH_LENGTH {
        return Err(ProofFailure::BranchTooLong { len });
    }
    if position >> len != 0 {
        return Err(ProofFailure::PositionOutOfRange { position, len });
    }
    Ok(())
}

/// Fold a branch into the leaf hash, returning the implied root.
///
/// Levels past the width of `position` read as left children.
pub(crate) fn fold_branch(tx_id: &Hash256, branch: &[Hash256], position: u64) -> Hash256 {
    let mut current = *tx_id;
    for (level, sibling) in branch.iter().enumerate() {
        let bit = u32::try_from(level)
            .ok()
            .and_then(|shift| position.checked_shr(shift))
            .unwrap_or(0)
            & 1;
        current = if bit == 0 {
            hash_pair(&current, sibling)
        } else {
            hash_pair(sibling, &current)
        };
    }
    current
}

/// Merkle root of a list of txids.
pub fn compute_merkle_root(tx_ids: &[Hash256]) -> Hash256 {
    if tx_ids.is_empty() {
        return Hash256::ZERO;
    }

    let mut level = tx_ids.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level[0]
}

/// Branch for the txid at `index`, or `None` if out of range.
pub fn build_merkle_branch(tx_ids: &[Hash256], index: usize) -> Option<Vec<Hash256>> {
    if index >= tx_ids.len() {
        return None;
    }

    let mut branch = Vec::new();
    let mut level = tx_ids.to_vec();
    let mut index = index;

    while level.len() > 1 {
        let sibling = index ^ 1;
        // Odd level: the last node pairs with itself.
        branch.push(*level.get(sibling).unwrap_or(&level[index]));
        level = next_level(&level);
        index /= 2;
    }

    Some(branch)
}

fn next_level(level: &[Hash256]) -> Vec<Hash256> {
    level
        .chunks(2)
        .map(|pair| hash_pair(&pair[0], pair.get(1).unwrap_or(&pair[0])))
        .collect()
}

fn hash_pair(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left.as_bytes());
    buf[32..].copy_from_slice(right.as_bytes());
    sha256d(&buf)
}

fn tree_depth(leaves: u64) -> usize {
    let mut depth = 0;
    let mut width = leaves;
    while width > 1 {
        width = (width + 1) / 2;
        depth += 1;
    }
    depth
}
