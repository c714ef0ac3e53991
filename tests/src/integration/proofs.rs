//! # Inclusion Proof Scenarios
//!
//! Proofs are answered by the primary and checked against the local chain,
//! fetching the anchoring header first when it is not stored yet.

#[cfg(test)]
mod tests {
    use super::super::fixtures::{block_with, deadline, endpoint, genesis, served, Pool};
    use shared_types::{sha256d, BlockHeader, Hash256};
    use spv_01_chain_store::testing::mine_chain;
    use spv_02_proof_verifier::build_merkle_branch;
    use spv_03_server_session::testing::MockElectrumServer;
    use spv_03_server_session::MerkleResponse;
    use spv_04_network_coordinator::{CoordinatorError, WalletNetworkApi};

    struct Fixture {
        tx_ids: Vec<Hash256>,
        headers: Vec<BlockHeader>,
        server: MockElectrumServer,
    }

    /// Chain of `length` headers where block `at` holds five transactions,
    /// each with a correct merkle answer on the server.
    fn fixture(at: usize, length: usize) -> Fixture {
        let tx_ids: Vec<Hash256> = (10u8..15).map(|i| sha256d(&[i])).collect();
        let mut headers = mine_chain(&genesis(), at - 1, 3);
        let block = block_with(&headers[at - 2], &tx_ids);
        headers.push(block);
        headers.extend(mine_chain(&block, length - at, 3));

        let server = MockElectrumServer::new(served(&headers));
        for (position, tx_id) in tx_ids.iter().enumerate() {
            server.set_merkle(
                *tx_id,
                MerkleResponse {
                    block_height: at as u64,
                    branch: build_merkle_branch(&tx_ids, position).unwrap(),
                    position: position as u64,
                },
            );
        }
        Fixture {
            tx_ids,
            headers,
            server,
        }
    }

    // =========================================================================
    // VERIFIED PROOFS
    // =========================================================================

    #[tokio::test]
    async fn test_every_transaction_in_block_proves() {
        let Fixture {
            tx_ids,
            headers,
            server,
        } = fixture(6, 9);
        let pool = Pool::start(&[(endpoint("a"), server)]);
        pool.synced_at(9).await;

        for tx_id in &tx_ids {
            let result = pool
                .coordinator
                .get_merkle_proof(*tx_id, 6, deadline())
                .await
                .unwrap();
            assert!(result.included);
            assert_eq!(result.matched_header_hash, headers[5].hash());
            assert_eq!(result.confirmations, 4);
        }
    }

    #[tokio::test]
    async fn test_confirmations_track_new_blocks() {
        let Fixture {
            tx_ids,
            headers,
            server,
        } = fixture(3, 4);
        let pool = Pool::start(&[(endpoint("a"), server.clone())]);
        pool.synced_at(4).await;

        let first = pool
            .coordinator
            .get_merkle_proof(tx_ids[0], 3, deadline())
            .await
            .unwrap();
        assert_eq!(first.confirmations, 2);

        for header in mine_chain(&headers[3], 3, 3) {
            server.push_header(header);
        }
        pool.synced_at(7).await;

        let later = pool
            .coordinator
            .get_merkle_proof(tx_ids[0], 3, deadline())
            .await
            .unwrap();
        assert_eq!(later.confirmations, 5);
        assert_eq!(server.requests_for("blockchain.transaction.get_merkle"), 1);
    }

    // =========================================================================
    // HEADER NOT YET STORED
    // =========================================================================

    /// The server knows a block the wallet has not synced to: the proof
    /// waits for the header, then verifies.
    #[tokio::test]
    async fn test_proof_fetches_missing_header() {
        let Fixture {
            tx_ids,
            headers,
            server,
        } = fixture(14, 16);
        let announced = headers[9];
        server.claim_tip(10, announced);
        let pool = Pool::start(&[(endpoint("a"), server)]);
        pool.synced_at(10).await;

        let result = pool
            .coordinator
            .get_merkle_proof(tx_ids[4], 14, deadline())
            .await
            .unwrap();
        assert!(result.included);
        assert_eq!(result.matched_header_hash, headers[13].hash());
        assert!(pool.coordinator.chain().height() >= 14);
    }

    #[tokio::test]
    async fn test_proof_above_server_chain_unavailable() {
        let Fixture { tx_ids, server, .. } = fixture(2, 3);
        let pool = Pool::start(&[(endpoint("a"), server)]);
        pool.synced_at(3).await;

        let result = pool
            .coordinator
            .get_merkle_proof(tx_ids[0], 20, deadline())
            .await;
        assert_eq!(result, Err(CoordinatorError::HeaderUnavailable { height: 20 }));
    }
}
