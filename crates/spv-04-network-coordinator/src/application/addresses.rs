//! Address status subscriptions handed to the wallet.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Status change of one script hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressStatus {
    /// Electrum script hash (hex).
    pub script_hash: String,
    /// Electrum status hash, `None` for an unused script.
    pub status: Option<String>,
}

/// Status updates for one script hash, surviving primary failover.
pub struct AddressSubscription {
    script_hash: String,
    pending: Option<AddressStatus>,
    receiver: broadcast::Receiver<AddressStatus>,
}

impl AddressSubscription {
    pub(crate) fn new(
        script_hash: String,
        known: Option<Option<String>>,
        receiver: broadcast::Receiver<AddressStatus>,
    ) -> Self {
        let pending = known.map(|status| AddressStatus {
            script_hash: script_hash.clone(),
            status,
        });
        Self {
            script_hash,
            pending,
            receiver,
        }
    }

    /// Script hash followed.
    pub fn script_hash(&self) -> &str {
        &self.script_hash
    }

    /// Next status. `None` once the coordinator has stopped.
    pub async fn recv(&mut self) -> Option<AddressStatus> {
        if let Some(status) = self.pending.take() {
            return Some(status);
        }
        loop {
            match self.receiver.recv().await {
                Ok(update) if update.script_hash == self.script_hash => return Some(update),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, script_hash = %self.script_hash, "Address subscription lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
