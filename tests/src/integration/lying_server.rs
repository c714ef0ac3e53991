//! # Lying Server Scenarios
//!
//! Servers whose claimed tips cannot be backed by valid headers are banned
//! and never serve the wallet, while an honest server keeps it synced.

#[cfg(test)]
mod tests {
    use super::super::fixtures::{
        deadline, drain_events, endpoint, eventually, genesis, served, Pool,
    };
    use shared_bus::SpvEvent;
    use spv_01_chain_store::testing::{mine_chain, mine_child};
    use spv_03_server_session::testing::MockElectrumServer;
    use spv_03_server_session::HealthConfig;
    use spv_04_network_coordinator::{PoolStatus, WalletNetworkApi};
    use std::time::Duration;

    fn banned_score() -> u32 {
        HealthConfig::for_testing().max_suspicion
    }

    // =========================================================================
    // UNBACKED TIPS
    // =========================================================================

    /// A tip whose header sits on genesis but claims height 50.
    #[tokio::test]
    async fn test_height_mismatch_bans_server() {
        let honest = MockElectrumServer::new(served(&mine_chain(&genesis(), 10, 1)));
        let liar = MockElectrumServer::new(served(&[]));
        liar.claim_tip(50, mine_child(&genesis(), 99));

        let pool = Pool::start(&[(endpoint("liar"), liar), (endpoint("honest"), honest)]);
        let mut events = pool.events();
        let snapshot = pool.synced_at(10).await;
        assert_eq!(snapshot.primary.as_deref(), Some("honest:50001:t"));

        eventually("liar banned", || pool.coordinator.status().banned == 1).await;
        let seen = drain_events(&mut events, Duration::from_millis(200)).await;
        assert!(seen.contains(&SpvEvent::ServerHealthChanged {
            endpoint: "liar:50001:t".to_string(),
            score: banned_score(),
        }));
    }

    /// A server serving its own short chain while claiming a far tip on top
    /// of headers it cannot produce.
    #[tokio::test]
    async fn test_short_chain_claim_bans_server() {
        let honest = MockElectrumServer::new(served(&mine_chain(&genesis(), 10, 1)));
        let own = mine_chain(&genesis(), 3, 7);
        let liar = MockElectrumServer::new(served(&own));
        liar.claim_tip(40, mine_child(&own[2], 7));

        let pool = Pool::start(&[(endpoint("liar"), liar), (endpoint("honest"), honest)]);
        pool.synced_at(10).await;
        eventually("liar banned", || pool.coordinator.status().banned == 1).await;

        // The liar's headers never displace the honest chain.
        let chain = pool.coordinator.chain();
        assert_eq!(chain.height(), 10);
        assert_ne!(chain.hash_at(3), Some(own[2].hash()));
    }

    // =========================================================================
    // BAN PERMANENCE
    // =========================================================================

    #[tokio::test]
    async fn test_banned_server_is_never_retried() {
        let honest = MockElectrumServer::new(served(&mine_chain(&genesis(), 5, 1)));
        let liar = MockElectrumServer::new(served(&[]));
        liar.claim_tip(30, mine_child(&genesis(), 42));

        let pool = Pool::start(&[(endpoint("liar"), liar), (endpoint("honest"), honest.clone())]);
        pool.synced_at(5).await;
        eventually("liar banned", || pool.coordinator.status().banned == 1).await;

        // Losing the honest server leaves nothing to fall back on.
        honest.set_offline(true);
        pool.coordinator
            .wait_for(|s| s.status == PoolStatus::Offline, deadline())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(pool.connector.attempts(&endpoint("liar")), 1);
        assert!(pool.connector.attempts(&endpoint("honest")) > 1);
        assert_eq!(pool.coordinator.primary(), None);
    }
}
