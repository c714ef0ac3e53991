//! # Failover Scenarios
//!
//! Losing the primary hands routing to another validated session, and
//! address subscriptions follow the new primary.

#[cfg(test)]
mod tests {
    use super::super::fixtures::{deadline, drain_events, endpoint, genesis, served, Pool};
    use shared_bus::SpvEvent;
    use spv_01_chain_store::testing::mine_chain;
    use spv_03_server_session::testing::MockElectrumServer;
    use spv_03_server_session::ServerEndpoint;
    use spv_04_network_coordinator::{PoolStatus, WalletNetworkApi};
    use std::time::Duration;

    /// Two servers on the same chain, synced, with the primary identified.
    async fn synced_pair(
        height: usize,
    ) -> (Pool, (ServerEndpoint, MockElectrumServer), (ServerEndpoint, MockElectrumServer)) {
        let chain = served(&mine_chain(&genesis(), height, 1));
        let a = (endpoint("a"), MockElectrumServer::new(chain.clone()));
        let b = (endpoint("b"), MockElectrumServer::new(chain));
        let pool = Pool::start(&[a.clone(), b.clone()]);
        pool.coordinator
            .wait_for(
                |s| s.status == PoolStatus::Synced && s.connected == 2,
                deadline(),
            )
            .await
            .unwrap();

        let primary = pool.coordinator.primary().expect("primary elected");
        if primary == a.0 {
            (pool, a, b)
        } else {
            (pool, b, a)
        }
    }

    // =========================================================================
    // PRIMARY LOSS
    // =========================================================================

    #[tokio::test]
    async fn test_backup_takes_over_when_primary_drops() {
        let (pool, (lost, lost_server), (backup, _)) = synced_pair(8).await;
        let mut events = pool.events();

        lost_server.set_offline(true);
        let backup_name = backup.to_string();
        let snapshot = pool
            .coordinator
            .wait_for(
                |s| s.status == PoolStatus::Synced && s.primary.as_deref() == Some(backup_name.as_str()),
                deadline(),
            )
            .await
            .unwrap();
        assert_eq!(snapshot.best_height, 8);
        assert_eq!(pool.coordinator.primary(), Some(backup));

        // Requests keep working through the new primary.
        let header = pool.coordinator.get_header(8, deadline()).await.unwrap();
        assert_eq!(Some(header.hash()), pool.coordinator.chain().hash_at(8));

        let seen = drain_events(&mut events, Duration::from_millis(200)).await;
        let lost_name = lost.to_string();
        assert!(seen.iter().any(|event| matches!(
            event,
            SpvEvent::ServerHealthChanged { endpoint, score } if *endpoint == lost_name && *score > 0
        )));
    }

    #[tokio::test]
    async fn test_new_blocks_follow_after_failover() {
        let (pool, (_, lost_server), (backup, backup_server)) = synced_pair(4).await;
        lost_server.set_offline(true);
        let backup_name = backup.to_string();
        pool.coordinator
            .wait_for(|s| s.primary.as_deref() == Some(backup_name.as_str()), deadline())
            .await
            .unwrap();

        let tip = pool.coordinator.chain().read().header_at(4).unwrap();
        let next = mine_chain(&tip, 2, 1);
        for header in &next {
            backup_server.push_header(*header);
        }
        let snapshot = pool.synced_at(6).await;
        assert_eq!(snapshot.best_hash, next[1].hash());
    }

    // =========================================================================
    // ADDRESS RESUBSCRIPTION
    // =========================================================================

    #[tokio::test]
    async fn test_address_subscription_survives_failover() {
        let (pool, (_, lost_server), (_, backup_server)) = synced_pair(3).await;

        let mut subscription = pool.coordinator.subscribe_address("cafe").await.unwrap();
        let initial = subscription.recv().await.unwrap();
        assert_eq!(initial.status, None);

        // Only the backup sees the payment; the wallet hears about it once the
        // backup is primary and has been resubscribed.
        backup_server.set_script_status("cafe", Some("5e".into()));
        lost_server.set_offline(true);

        let update = tokio::time::timeout(Duration::from_secs(10), subscription.recv())
            .await
            .expect("status after failover")
            .unwrap();
        assert_eq!(update.script_hash, "cafe");
        assert_eq!(update.status.as_deref(), Some("5e"));
        assert_eq!(backup_server.requests_for("blockchain.scripthash.subscribe"), 1);

        backup_server.set_script_status("cafe", Some("6f".into()));
        let later = subscription.recv().await.unwrap();
        assert_eq!(later.status.as_deref(), Some("6f"));
    }
}
