//! # Chain Store Service
//!
//! Shares one `ChainStore` between the coordinator's decision loop (the only
//! writer) and readers such as the wallet API and the proof path.

use parking_lot::{RwLock, RwLockReadGuard};
use primitive_types::U256;
use shared_types::{BlockHeader, Hash256};
use tracing::{debug, warn};

use crate::domain::{AcceptOutcome, AcceptResult, ChainSnapshot, ChainStore};
use crate::ports::ChainStoreApi;

/// Lock wrapper around a `ChainStore`.
pub struct ChainStoreService {
    store: RwLock<ChainStore>,
}

impl ChainStoreService {
    /// Wrap a store.
    pub fn new(store: ChainStore) -> Self {
        Self {
            store: RwLock::new(store),
        }
    }

    /// Read guard for multi-step consistent reads.
    pub fn read(&self) -> RwLockReadGuard<'_, ChainStore> {
        self.store.read()
    }

    /// Main-chain hash at a height.
    pub fn hash_at(&self, height: u64) -> Option<Hash256> {
        self.store.read().hash_at(height)
    }

    /// Main tip height.
    pub fn height(&self) -> u64 {
        self.store.read().height()
    }

    /// Height of a stored header.
    pub fn height_of(&self, hash: &Hash256) -> Option<u64> {
        self.store.read().entry(hash).map(|entry| entry.height)
    }

    /// True if the header is on the main chain.
    pub fn is_on_main_chain(&self, hash: &Hash256) -> bool {
        self.store.read().is_on_main_chain(hash)
    }

    /// Retained forks, heaviest first.
    pub fn forks(&self) -> Vec<ChainSnapshot> {
        self.store.read().forks()
    }
}

impl ChainStoreApi for ChainStoreService {
    fn accept(&self, header: BlockHeader, height_hint: Option<u64>) -> AcceptResult {
        let result = self.store.write().accept(header, height_hint);
        match result.outcome {
            AcceptOutcome::Rejected(reason) => {
                warn!(hash = %header.hash(), height = ?height_hint, %reason, "Header rejected");
            }
            AcceptOutcome::AlreadyKnown => {}
            outcome => {
                debug!(hash = %header.hash(), height = ?height_hint, ?outcome, "Header accepted");
            }
        }
        result
    }

    fn best_chain(&self) -> ChainSnapshot {
        self.store.read().best_chain()
    }

    fn header_at(&self, height: u64) -> Option<BlockHeader> {
        self.store.read().header_at(height)
    }

    fn cumulative_work(&self, hash: &Hash256) -> Option<U256> {
        self.store.read().cumulative_work(hash)
    }

    fn contains(&self, hash: &Hash256) -> bool {
        self.store.read().contains(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainStoreConfig;
    use crate::ports::FixedTimeSource;
    use crate::testing::mine_chain;
    use std::sync::Arc;

    fn service() -> ChainStoreService {
        ChainStoreService::new(ChainStore::new(
            ChainStoreConfig::for_testing(),
            Arc::new(FixedTimeSource::far_future()),
        ))
    }

    #[test]
    fn test_accept_through_service() {
        let service = service();
        let genesis = service.read().params().genesis;
        let headers = mine_chain(&genesis, 3, 1);
        for header in &headers {
            assert_eq!(service.accept(*header, None).outcome, AcceptOutcome::ExtendedMain);
        }
        assert_eq!(service.height(), 3);
        assert_eq!(service.best_chain().tip_hash, headers[2].hash());
        assert_eq!(service.header_at(2), Some(headers[1]));
        assert_eq!(service.height_of(&headers[0].hash()), Some(1));
        assert!(service.contains(&headers[2].hash()));
    }

    #[test]
    fn test_concurrent_readers() {
        let service = Arc::new(service());
        let genesis = service.read().params().genesis;
        let headers = mine_chain(&genesis, 20, 1);

        let reader = {
            let service = service.clone();
            std::thread::spawn(move || {
                let mut last = 0;
                for _ in 0..200 {
                    let height = service.best_chain().height;
                    assert!(height >= last);
                    last = height;
                }
            })
        };
        for header in &headers {
            service.accept(*header, None);
        }
        reader.join().unwrap();
        assert_eq!(service.height(), 20);
    }
}
