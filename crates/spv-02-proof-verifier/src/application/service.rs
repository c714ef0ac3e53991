//! # Proof Verifier Service
//!
//! Resolves a `ProofRequest` against the main chain. The header is copied out
//! of the store first; the Merkle fold itself runs without any lock.

use tracing::debug;

use crate::algorithms::{check_branch_shape, check_tx_count, verify};
use crate::domain::{MerkleBranch, ProofFailure, ProofRequest, ProofResult};
use crate::ports::HeaderLookup;

/// Stateless inclusion-proof checker.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProofVerifier;

impl ProofVerifier {
    /// Create a verifier.
    pub fn new() -> Self {
        Self
    }

    /// Check `branch` for `request` against the main-chain header at the
    /// claimed height.
    ///
    /// Structural problems and a missing header are errors; a well-formed
    /// branch that does not reach the merkle root yields `included: false`.
    pub fn check(
        &self,
        lookup: &dyn HeaderLookup,
        request: &ProofRequest,
        branch: &MerkleBranch,
    ) -> Result<ProofResult, ProofFailure> {
        check_branch_shape(branch.branch.len(), branch.position)?;

        let anchor = lookup
            .anchor_at(request.claimed_height)
            .ok_or(ProofFailure::HeaderUnavailable {
                height: request.claimed_height,
            })?;

        let included = verify(&anchor.header, &request.tx_id, &branch.branch, branch.position);
        let confirmations = anchor
            .tip_height
            .saturating_sub(request.claimed_height)
            .saturating_add(1);

        debug!(
            tx_id = %request.tx_id,
            height = request.claimed_height,
            included,
            confirmations,
            "Inclusion proof checked"
        );

        Ok(ProofResult {
            included,
            matched_header_hash: anchor.header.hash(),
            confirmations,
        })
    }

    /// Like [`check`](Self::check) for a block whose transaction count is
    /// known, so the branch depth can be held to it.
    pub fn check_with_tx_count(
        &self,
        lookup: &dyn HeaderLookup,
        request: &ProofRequest,
        branch: &MerkleBranch,
        tx_count: u64,
    ) -> Result<ProofResult, ProofFailure> {
        check_tx_count(branch.branch.len(), branch.position, tx_count)?;
        self.check(lookup, request, branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{build_merkle_branch, compute_merkle_root};
    use shared_types::{sha256d, BlockHeader, Hash256};
    use spv_01_chain_store::testing::{mine_chain, solve};
    use spv_01_chain_store::{ChainStore, ChainStoreConfig, FixedTimeSource};
    use std::sync::Arc;

    /// Store with a 6-header main chain whose header 3 commits to `txs`.
    fn store_with_block(txs: &[Hash256]) -> ChainStore {
        let mut store = ChainStore::new(
            ChainStoreConfig::for_testing(),
            Arc::new(FixedTimeSource::far_future()),
        );
        let genesis = store.params().genesis;
        let mut headers = mine_chain(&genesis, 2, 1);
        let block = solve(BlockHeader {
            version: 4,
            prev_hash: headers[1].hash(),
            merkle_root: compute_merkle_root(txs),
            timestamp: headers[1].timestamp + 600,
            bits: headers[1].bits,
            nonce: 0,
        });
        headers.push(block);
        headers.extend(mine_chain(&block, 3, 1));
        for header in headers {
            store.accept(header, None);
        }
        store
    }

    fn txs() -> Vec<Hash256> {
        (0u8..7).map(|i| sha256d(&[i])).collect()
    }

    #[test]
    fn test_proof_included_with_confirmations() {
        let txs = txs();
        let store = store_with_block(&txs);
        let request = ProofRequest {
            tx_id: txs[5],
            claimed_height: 3,
        };
        let branch = MerkleBranch {
            branch: build_merkle_branch(&txs, 5).unwrap(),
            position: 5,
        };

        let result = ProofVerifier::new().check(&store, &request, &branch).unwrap();
        assert!(result.included);
        assert_eq!(result.confirmations, 4);
        assert_eq!(result.matched_header_hash, store.header_at(3).unwrap().hash());
    }

    #[test]
    fn test_wrong_height_not_included() {
        let txs = txs();
        let store = store_with_block(&txs);
        let request = ProofRequest {
            tx_id: txs[0],
            claimed_height: 4,
        };
        let branch = MerkleBranch {
            branch: build_merkle_branch(&txs, 0).unwrap(),
            position: 0,
        };
        let result = ProofVerifier::new().check(&store, &request, &branch).unwrap();
        assert!(!result.included);
    }

    #[test]
    fn test_height_above_tip() {
        let txs = txs();
        let store = store_with_block(&txs);
        let request = ProofRequest {
            tx_id: txs[0],
            claimed_height: 99,
        };
        let branch = MerkleBranch {
            branch: build_merkle_branch(&txs, 0).unwrap(),
            position: 0,
        };
        assert_eq!(
            ProofVerifier::new().check(&store, &request, &branch),
            Err(ProofFailure::HeaderUnavailable { height: 99 })
        );
    }

    #[test]
    fn test_known_tx_count_bounds_branch() {
        let txs = txs();
        let store = store_with_block(&txs);
        let request = ProofRequest {
            tx_id: txs[5],
            claimed_height: 3,
        };
        let branch = MerkleBranch {
            branch: build_merkle_branch(&txs, 5).unwrap(),
            position: 5,
        };
        let verifier = ProofVerifier::new();

        let result = verifier.check_with_tx_count(&store, &request, &branch, 7).unwrap();
        assert!(result.included);
        // Seven leaves need three levels; two leaves need one.
        assert_eq!(
            verifier.check_with_tx_count(&store, &request, &branch, 2),
            Err(ProofFailure::InconsistentTxCount { len: 3, tx_count: 2 })
        );
    }

    #[test]
    fn test_malformed_branch_is_error() {
        let store = store_with_block(&txs());
        let request = ProofRequest {
            tx_id: Hash256::ZERO,
            claimed_height: 3,
        };
        let branch = MerkleBranch {
            branch: vec![Hash256::ZERO; 2],
            position: 8,
        };
        assert!(matches!(
            ProofVerifier::new().check(&store, &request, &branch),
            Err(ProofFailure::PositionOutOfRange { .. })
        ));
    }
}
