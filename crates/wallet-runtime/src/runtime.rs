//! # Wallet Runtime
//!
//! Wires the chain store, the event bus and the network coordinator
//! together.
//!
//! ## Startup Sequence
//!
//! 1. Build the chain store from the configured preset
//! 2. Replay the header file (every record is re-validated)
//! 3. Start the coordinator with the configured servers
//! 4. Log bus events until shutdown
//!
//! ## Shutdown Sequence
//!
//! 1. Stop the coordinator (sessions close)
//! 2. Persist the main chain

use anyhow::{Context, Result};
use shared_bus::{EventFilter, EventTopic, InMemoryEventBus, SpvEvent};
use spv_01_chain_store::{ChainStore, ChainStoreService, HeaderFile, SystemTimeSource};
use spv_04_network_coordinator::{NetworkCoordinator, SessionConnector, WalletNetworkApi};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::WalletConfig;

/// A running wallet network stack.
pub struct WalletRuntime {
    header_file: HeaderFile,
    chain: Arc<ChainStoreService>,
    coordinator: NetworkCoordinator,
    bus: Arc<InMemoryEventBus>,
    event_logger: JoinHandle<()>,
}

impl WalletRuntime {
    /// Restore headers and start the coordinator.
    pub fn start(config: &WalletConfig, connector: Arc<dyn SessionConnector>) -> Result<Self> {
        let store_config = config
            .chain_store_config()
            .context("Invalid chain configuration")?;
        let coordinator_config = config
            .coordinator_config()
            .context("Invalid pool configuration")?;
        if coordinator_config.servers.is_empty() {
            warn!("No servers configured; the wallet will stay offline");
        }

        let mut store = ChainStore::new(store_config, Arc::new(SystemTimeSource));
        let header_file = HeaderFile::new(&config.network.header_file);
        let restored = header_file.load_into(&mut store).with_context(|| {
            format!("Failed to load {}", header_file.path().display())
        })?;
        info!(
            chain = %store.params().name,
            restored,
            height = store.height(),
            "Header chain restored"
        );

        let chain = Arc::new(ChainStoreService::new(store));
        let bus = Arc::new(InMemoryEventBus::new());
        let event_logger = tokio::spawn(log_events(bus.clone()));
        let coordinator =
            NetworkCoordinator::start(coordinator_config, chain.clone(), connector, bus.clone());

        Ok(Self {
            header_file,
            chain,
            coordinator,
            bus,
            event_logger,
        })
    }

    /// The coordinator, for wallet requests.
    pub fn network(&self) -> &NetworkCoordinator {
        &self.coordinator
    }

    /// The shared chain store.
    pub fn chain(&self) -> &Arc<ChainStoreService> {
        &self.chain
    }

    /// The event bus the coordinator publishes on.
    pub fn bus(&self) -> &Arc<InMemoryEventBus> {
        &self.bus
    }

    /// Write the main chain to the header file.
    pub fn persist(&self) -> Result<usize> {
        let written = self
            .header_file
            .save(&self.chain.read())
            .with_context(|| format!("Failed to save {}", self.header_file.path().display()))?;
        Ok(written)
    }

    /// Stop the coordinator and persist headers.
    pub async fn shutdown(self) -> Result<usize> {
        info!("Initiating graceful shutdown...");
        self.coordinator.shutdown().await;
        let written = self.persist()?;
        self.event_logger.abort();

        let status = self.coordinator.status();
        info!(
            height = status.best_height,
            headers = written,
            chain_events = self.bus.published(EventTopic::Chain),
            health_events = self.bus.published(EventTopic::ServerHealth),
            "Shutdown complete"
        );
        Ok(written)
    }
}

async fn log_events(bus: Arc<InMemoryEventBus>) {
    let mut events = bus.subscribe(EventFilter::all());
    while let Some(event) = events.recv().await {
        match event {
            SpvEvent::NewTip { height, hash } => info!(height, %hash, "New tip"),
            SpvEvent::Reorg {
                common_ancestor_height,
                old_tip,
                new_tip,
            } => warn!(common_ancestor_height, %old_tip, %new_tip, "Reorganization"),
            SpvEvent::ServerHealthChanged { endpoint, score } => {
                info!(%endpoint, score, "Server health changed")
            }
        }
    }
}
