//! # Scenario Fixtures
//!
//! A [`Pool`] bundles a coordinator with the mock servers behind it so a
//! scenario can script the servers and observe the wallet side.

use shared_bus::{EventFilter, InMemoryEventBus, SpvEvent, Subscription};
use shared_types::{BlockHeader, Hash256};
use spv_01_chain_store::testing::solve;
use spv_01_chain_store::{ChainStore, ChainStoreConfig, ChainStoreService, FixedTimeSource};
use spv_02_proof_verifier::compute_merkle_root;
use spv_03_server_session::testing::MockElectrumServer;
use spv_03_server_session::ServerEndpoint;
use spv_04_network_coordinator::testing::MockConnector;
use spv_04_network_coordinator::{
    CoordinatorConfig, NetworkCoordinator, PoolSnapshot, PoolStatus, WalletNetworkApi,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Coordinator under test plus everything it talks to.
pub struct Pool {
    /// The wallet side.
    pub coordinator: NetworkCoordinator,
    /// Endpoint to server routing.
    pub connector: Arc<MockConnector>,
    /// Bus the coordinator publishes on.
    pub bus: Arc<InMemoryEventBus>,
}

impl Pool {
    /// Start a coordinator over `servers`, in the given order.
    pub fn start(servers: &[(ServerEndpoint, MockElectrumServer)]) -> Self {
        let store = ChainStore::new(
            ChainStoreConfig::for_testing(),
            Arc::new(FixedTimeSource::far_future()),
        );
        let chain = Arc::new(ChainStoreService::new(store));
        let connector = Arc::new(MockConnector::new());
        for (endpoint, server) in servers {
            connector.add(endpoint, server.clone());
        }
        let config = CoordinatorConfig::for_testing()
            .with_servers(servers.iter().map(|(endpoint, _)| endpoint.clone()).collect());
        let bus = Arc::new(InMemoryEventBus::new());
        let coordinator = NetworkCoordinator::start(config, chain, connector.clone(), bus.clone());
        Self {
            coordinator,
            connector,
            bus,
        }
    }

    /// Every event from now on.
    pub fn events(&self) -> Subscription {
        self.bus.subscribe(EventFilter::all())
    }

    /// Wait until the pool is synced at `height`.
    ///
    /// # Panics
    ///
    /// If that does not happen within [`SCENARIO_TIMEOUT`].
    pub async fn synced_at(&self, height: u64) -> PoolSnapshot {
        self.coordinator
            .wait_for(
                |s| s.status == PoolStatus::Synced && s.best_height == height,
                deadline(),
            )
            .await
            .unwrap_or_else(|e| {
                panic!(
                    "pool did not sync at {height}: {e} (last status {:?})",
                    self.coordinator.status()
                )
            })
    }
}

/// Upper bound on any single scenario step.
pub const SCENARIO_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for one wallet request.
pub fn deadline() -> Instant {
    Instant::now() + SCENARIO_TIMEOUT
}

/// Regtest genesis, the root of every scenario chain.
pub fn genesis() -> BlockHeader {
    ChainStoreConfig::for_testing().params.genesis
}

/// A server chain: genesis followed by `headers`.
pub fn served(headers: &[BlockHeader]) -> Vec<BlockHeader> {
    std::iter::once(genesis()).chain(headers.iter().copied()).collect()
}

/// Plain TCP endpoint on the default port.
pub fn endpoint(host: &str) -> ServerEndpoint {
    ServerEndpoint::tcp(host, 50001)
}

/// A mined child of `parent` committing to `tx_ids`.
pub fn block_with(parent: &BlockHeader, tx_ids: &[Hash256]) -> BlockHeader {
    solve(BlockHeader {
        version: 4,
        prev_hash: parent.hash(),
        merkle_root: compute_merkle_root(tx_ids),
        timestamp: parent.timestamp + 600,
        bits: parent.bits,
        nonce: 0,
    })
}

/// Events published until the bus stays quiet for `quiet`.
pub async fn drain_events(events: &mut Subscription, quiet: Duration) -> Vec<SpvEvent> {
    let mut seen = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(quiet, events.recv()).await {
        seen.push(event);
    }
    seen
}

/// Poll `condition` every few milliseconds until it holds.
///
/// # Panics
///
/// If it does not hold within [`SCENARIO_TIMEOUT`].
pub async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let result = tokio::time::timeout(SCENARIO_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {what}");
}
