//! # Test Helpers
//!
//! Header mining for regtest-difficulty chains.

use shared_types::{sha256d, BlockHeader};

use crate::algorithms::{compact_to_u256, hash_meets_target};

/// Increment the nonce until the header meets its own target.
///
/// Only practical for easy targets such as regtest's.
pub fn solve(mut header: BlockHeader) -> BlockHeader {
    let Ok(target) = compact_to_u256(header.bits) else {
        return header;
    };
    while !hash_meets_target(&header.hash(), target) {
        header.nonce = header.nonce.wrapping_add(1);
    }
    header
}

/// Mine a child of `parent` with the parent's bits, ten minutes later.
///
/// `seed` varies the merkle root so sibling branches get distinct hashes.
pub fn mine_child(parent: &BlockHeader, seed: u32) -> BlockHeader {
    mine_child_with_bits(parent, seed, parent.bits)
}

/// Mine a child of `parent` with explicit bits.
pub fn mine_child_with_bits(parent: &BlockHeader, seed: u32, bits: u32) -> BlockHeader {
    let parent_hash = parent.hash();
    let mut preimage = parent_hash.as_bytes().to_vec();
    preimage.extend_from_slice(&seed.to_le_bytes());

    solve(BlockHeader {
        version: 4,
        prev_hash: parent_hash,
        merkle_root: sha256d(&preimage),
        timestamp: parent.timestamp + 600,
        bits,
        nonce: 0,
    })
}

/// Mine `count` consecutive headers on top of `base`.
pub fn mine_chain(base: &BlockHeader, count: usize, seed: u32) -> Vec<BlockHeader> {
    let mut headers = Vec::with_capacity(count);
    let mut parent = *base;
    for _ in 0..count {
        let child = mine_child(&parent, seed);
        headers.push(child);
        parent = child;
    }
    headers
}
