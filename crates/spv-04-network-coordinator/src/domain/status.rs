//! # Pool Status

use serde::{Deserialize, Serialize};
use shared_types::Hash256;
use std::fmt;

/// Where the pool stands.
///
/// ```text
/// Bootstrapping ──► Syncing ◄──► Synced
///                      ▲            │
///                      └── Offline ◄┘  (no session, all backing off)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolStatus {
    /// No session has connected yet.
    Bootstrapping,
    /// Validating announcements or catching up.
    Syncing,
    /// The primary's validated tip is the best chain tip.
    Synced,
    /// Nothing connected and every endpoint is waiting to retry.
    Offline,
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PoolStatus::Bootstrapping => "bootstrapping",
            PoolStatus::Syncing => "syncing",
            PoolStatus::Synced => "synced",
            PoolStatus::Offline => "offline",
        };
        f.write_str(name)
    }
}

/// Point-in-time view returned by `status()`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    /// Pool state.
    pub status: PoolStatus,
    /// Primary server, if elected.
    pub primary: Option<String>,
    /// Open sessions.
    pub connected: usize,
    /// Servers banned for lying.
    pub banned: usize,
    /// Best validated height.
    pub best_height: u64,
    /// Best validated tip.
    pub best_hash: Hash256,
}

impl PoolSnapshot {
    /// Initial snapshot.
    pub fn bootstrapping(best_height: u64, best_hash: Hash256) -> Self {
        Self {
            status: PoolStatus::Bootstrapping,
            primary: None,
            connected: 0,
            banned: 0,
            best_height,
            best_hash,
        }
    }
}

/// Inputs the status is derived from.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatusInputs {
    /// Open sessions.
    pub connected: usize,
    /// Connect attempts in progress.
    pub connecting: usize,
    /// Some tip is still being validated.
    pub validating: bool,
    /// The primary's validated tip equals the best tip.
    pub primary_at_best: bool,
}

/// Next status from the current one.
pub fn next_status(current: PoolStatus, inputs: StatusInputs) -> PoolStatus {
    if inputs.connected == 0 {
        return if inputs.connecting == 0 {
            PoolStatus::Offline
        } else {
            current
        };
    }
    if inputs.validating || !inputs.primary_at_best {
        PoolStatus::Syncing
    } else {
        PoolStatus::Synced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(connected: usize, connecting: usize, validating: bool, at_best: bool) -> StatusInputs {
        StatusInputs {
            connected,
            connecting,
            validating,
            primary_at_best: at_best,
        }
    }

    #[test]
    fn test_bootstrapping_while_connecting() {
        assert_eq!(
            next_status(PoolStatus::Bootstrapping, inputs(0, 2, false, false)),
            PoolStatus::Bootstrapping
        );
    }

    #[test]
    fn test_syncing_then_synced() {
        let status = next_status(PoolStatus::Bootstrapping, inputs(1, 0, true, false));
        assert_eq!(status, PoolStatus::Syncing);
        let status = next_status(status, inputs(1, 0, false, true));
        assert_eq!(status, PoolStatus::Synced);
        // A new announcement sends it back.
        assert_eq!(next_status(status, inputs(1, 0, true, true)), PoolStatus::Syncing);
    }

    #[test]
    fn test_offline_and_recovery() {
        let status = next_status(PoolStatus::Synced, inputs(0, 0, false, false));
        assert_eq!(status, PoolStatus::Offline);
        // Still offline while a reconnect is in progress.
        assert_eq!(next_status(status, inputs(0, 1, false, false)), PoolStatus::Offline);
        assert_eq!(next_status(status, inputs(1, 0, true, false)), PoolStatus::Syncing);
    }
}
