//! # Reorganization Scenarios
//!
//! A server switches to a heavier branch; the wallet must follow it with a
//! single reorg event and drop proofs anchored on the abandoned branch.

#[cfg(test)]
mod tests {
    use super::super::fixtures::{
        block_with, deadline, drain_events, endpoint, genesis, served, Pool,
    };
    use proptest::prelude::*;
    use shared_bus::SpvEvent;
    use shared_types::{sha256d, Hash256};
    use spv_01_chain_store::testing::mine_chain;
    use spv_02_proof_verifier::build_merkle_branch;
    use spv_03_server_session::testing::MockElectrumServer;
    use spv_03_server_session::MerkleResponse;
    use spv_04_network_coordinator::{CoordinatorError, WalletNetworkApi};
    use std::time::Duration;

    fn reorgs(events: &[SpvEvent]) -> Vec<(u64, Hash256, Hash256)> {
        events
            .iter()
            .filter_map(|event| match event {
                SpvEvent::Reorg {
                    common_ancestor_height,
                    old_tip,
                    new_tip,
                } => Some((*common_ancestor_height, *old_tip, *new_tip)),
                _ => None,
            })
            .collect()
    }

    // =========================================================================
    // HEAVIER BRANCH
    // =========================================================================

    /// Main chain h1..h10, then the server moves to a branch leaving at h5
    /// and running to h12.
    #[tokio::test]
    async fn test_switches_to_heavier_branch_once() {
        let main = mine_chain(&genesis(), 10, 1);
        let server = MockElectrumServer::new(served(&main));
        let pool = Pool::start(&[(endpoint("a"), server.clone())]);
        pool.synced_at(10).await;

        let mut events = pool.events();
        let branch = mine_chain(&main[4], 7, 2);
        let mut reorganized = main[..5].to_vec();
        reorganized.extend_from_slice(&branch);
        server.set_chain(served(&reorganized));

        let snapshot = pool.synced_at(12).await;
        assert_eq!(snapshot.best_hash, branch[6].hash());

        let seen = reorgs(&drain_events(&mut events, Duration::from_millis(200)).await);
        assert_eq!(seen.len(), 1, "exactly one reorg: {seen:?}");
        let (ancestor, old_tip, new_tip) = seen[0];
        assert_eq!(ancestor, 5);
        assert_eq!(old_tip, main[9].hash());
        // The branch overtakes at height 11; h12 then extends it.
        assert_eq!(new_tip, branch[5].hash());

        let chain = pool.coordinator.chain();
        assert_eq!(chain.hash_at(5), Some(main[4].hash()));
        assert_eq!(chain.hash_at(6), Some(branch[0].hash()));
        assert_eq!(chain.hash_at(12), Some(branch[6].hash()));
    }

    /// A lighter branch announced by the server is stored but never adopted.
    #[tokio::test]
    async fn test_lighter_branch_does_not_reorg() {
        let main = mine_chain(&genesis(), 10, 1);
        let server = MockElectrumServer::new(served(&main));
        let pool = Pool::start(&[(endpoint("a"), server.clone())]);
        pool.synced_at(10).await;

        let mut events = pool.events();
        let branch = mine_chain(&main[4], 3, 2);
        let mut shorter = main[..5].to_vec();
        shorter.extend_from_slice(&branch);
        server.set_chain(served(&shorter));

        let seen = drain_events(&mut events, Duration::from_millis(300)).await;
        assert!(reorgs(&seen).is_empty());
        assert_eq!(pool.coordinator.chain().height(), 10);
        assert_eq!(pool.coordinator.chain().hash_at(10), Some(main[9].hash()));
    }

    // =========================================================================
    // PROOF CACHE
    // =========================================================================

    #[tokio::test]
    async fn test_reorg_drops_proofs_on_abandoned_branch() {
        let tx_ids: Vec<Hash256> = (0u8..3).map(|i| sha256d(&[i])).collect();
        let mut main = mine_chain(&genesis(), 7, 1);
        let block = block_with(&main[6], &tx_ids);
        main.push(block);
        main.extend(mine_chain(&block, 2, 1));

        let server = MockElectrumServer::new(served(&main));
        server.set_merkle(
            tx_ids[1],
            MerkleResponse {
                block_height: 8,
                branch: build_merkle_branch(&tx_ids, 1).unwrap(),
                position: 1,
            },
        );
        let pool = Pool::start(&[(endpoint("a"), server.clone())]);
        pool.synced_at(10).await;

        let proof = pool
            .coordinator
            .get_merkle_proof(tx_ids[1], 8, deadline())
            .await
            .unwrap();
        assert!(proof.included);
        assert_eq!(proof.confirmations, 3);

        // The branch replaces block 8 with one that lacks the transaction,
        // while the server keeps answering with the old branch.
        let branch = mine_chain(&main[4], 8, 2);
        let mut reorganized = main[..5].to_vec();
        reorganized.extend_from_slice(&branch);
        server.set_chain(served(&reorganized));
        pool.synced_at(13).await;

        let result = pool
            .coordinator
            .get_merkle_proof(tx_ids[1], 8, deadline())
            .await;
        assert_eq!(
            result,
            Err(CoordinatorError::InclusionNotProven {
                tx_id: tx_ids[1],
                height: 8
            })
        );
        assert_eq!(server.requests_for("blockchain.transaction.get_merkle"), 2);
    }

    // =========================================================================
    // PROPERTIES
    // =========================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        /// Wherever the branch leaves the main chain, the pool ends on the
        /// heavier branch with one reorg at the fork point.
        #[test]
        fn prop_follows_any_heavier_branch(fork_at in 0usize..8, extra in 1usize..4) {
            let main = mine_chain(&genesis(), 8, 1);
            let base = if fork_at == 0 { genesis() } else { main[fork_at - 1] };
            let branch = mine_chain(&base, 8 - fork_at + extra, 2);
            let new_height = (8 + extra) as u64;

            let runtime = tokio::runtime::Runtime::new().unwrap();
            let (ancestors, best) = runtime.block_on(async {
                let server = MockElectrumServer::new(served(&main));
                let pool = Pool::start(&[(endpoint("a"), server.clone())]);
                pool.synced_at(8).await;

                let mut events = pool.events();
                let mut reorganized = main[..fork_at].to_vec();
                reorganized.extend_from_slice(&branch);
                server.set_chain(served(&reorganized));
                let snapshot = pool.synced_at(new_height).await;

                let seen = reorgs(&drain_events(&mut events, Duration::from_millis(150)).await);
                pool.coordinator.shutdown().await;
                (
                    seen.into_iter().map(|(ancestor, _, _)| ancestor).collect::<Vec<_>>(),
                    snapshot.best_hash,
                )
            });

            prop_assert_eq!(ancestors, vec![fork_at as u64]);
            prop_assert_eq!(best, branch[branch.len() - 1].hash());
        }
    }
}
