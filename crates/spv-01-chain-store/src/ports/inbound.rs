//! # Inbound Ports
//!
//! API the network coordinator and proof verifier use to reach the store.

use primitive_types::U256;
use shared_types::{BlockHeader, Hash256};

use crate::domain::{AcceptResult, ChainSnapshot};

/// Chain store API - inbound port.
pub trait ChainStoreApi: Send + Sync {
    /// Validate and store a header.
    fn accept(&self, header: BlockHeader, height_hint: Option<u64>) -> AcceptResult;

    /// Heaviest chain.
    fn best_chain(&self) -> ChainSnapshot;

    /// Main-chain header at a height.
    fn header_at(&self, height: u64) -> Option<BlockHeader>;

    /// Cumulative work up to a stored header.
    fn cumulative_work(&self, hash: &Hash256) -> Option<U256>;

    /// True if the header is stored on any chain.
    fn contains(&self, hash: &Hash256) -> bool;
}
