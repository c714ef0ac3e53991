//! # Inbound Ports
//!
//! What the wallet can ask of the network layer.

use async_trait::async_trait;
use shared_types::{BlockHeader, Hash256};
use spv_02_proof_verifier::ProofResult;
use tokio::time::Instant;

use crate::application::AddressSubscription;
use crate::domain::{CoordinatorError, PoolSnapshot};

/// Wallet-facing network API.
///
/// Every answer is backed by validated headers: a header comes from the main
/// chain of the chain store, and a proof result has been checked against
/// such a header.
#[async_trait]
pub trait WalletNetworkApi: Send + Sync {
    /// Main-chain header at `height`, syncing towards it if needed.
    async fn get_header(&self, height: u64, deadline: Instant)
        -> Result<BlockHeader, CoordinatorError>;

    /// Prove that `tx_id` is included in the main-chain block at `height`.
    async fn get_merkle_proof(
        &self,
        tx_id: Hash256,
        height: u64,
        deadline: Instant,
    ) -> Result<ProofResult, CoordinatorError>;

    /// Follow status changes of an Electrum script hash. The subscription
    /// moves to the new primary after a failover.
    async fn subscribe_address(
        &self,
        script_hash: &str,
    ) -> Result<AddressSubscription, CoordinatorError>;

    /// Current pool state.
    fn status(&self) -> PoolSnapshot;
}
