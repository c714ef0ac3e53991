//! # Outbound Ports
//!
//! Where the verifier gets the header a proof is checked against.

use shared_types::BlockHeader;
use spv_01_chain_store::{ChainStore, ChainStoreService};

/// Owned snapshot of a main-chain header and the tip height at the same moment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProofAnchor {
    /// Main-chain header at the requested height.
    pub header: BlockHeader,
    /// Main tip height when the header was read.
    pub tip_height: u64,
}

/// Header lookup - outbound port.
pub trait HeaderLookup: Send + Sync {
    /// Main-chain header at `height` with a consistent tip height.
    fn anchor_at(&self, height: u64) -> Option<ProofAnchor>;
}

impl HeaderLookup for ChainStore {
    fn anchor_at(&self, height: u64) -> Option<ProofAnchor> {
        self.header_at(height).map(|header| ProofAnchor {
            header,
            tip_height: self.height(),
        })
    }
}

impl HeaderLookup for ChainStoreService {
    fn anchor_at(&self, height: u64) -> Option<ProofAnchor> {
        // One read guard so header and tip come from the same state.
        self.read().anchor_at(height)
    }
}
