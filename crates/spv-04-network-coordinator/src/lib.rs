//! # SPV-04 Network Coordinator
//!
//! Keeps a pool of Electrum sessions, cross-validates what each server
//! claims against the chain store, elects a primary and answers the wallet
//! only with data backed by validated headers.
//!
//! **Architecture:** Hexagonal, with a single decision loop owning all pool
//! state.
//!
//! ## Pool Status
//!
//! | Status | Meaning |
//! |--------|---------|
//! | `Bootstrapping` | No session has validated a tip yet |
//! | `Syncing` | Catching up, reorganizing, or primary behind the best tip |
//! | `Synced` | Primary's validated tip is the best tip |
//! | `Offline` | No session open and none connecting |
//!
//! ## Trust Rules
//!
//! - A tip is used for election only after its header is stored.
//! - A server whose own headers cannot back its tip is banned for the
//!   lifetime of the coordinator.
//! - A healthy primary is replaced by a heavier rival only when a second
//!   host has validated the same tip.
//! - A proof is returned only after it folds to a main-chain merkle root.
//!
//! ## Module Structure
//!
//! ```text
//! spv-04-network-coordinator/
//! ├── domain/          # status, election, backoff, orphans, proof cache
//! ├── ports/           # WalletNetworkApi (inbound), SessionConnector (outbound)
//! ├── application/     # NetworkCoordinator, decision loop, catch-up
//! ├── metrics.rs       # Prometheus metrics (feature "metrics")
//! └── config.rs        # CoordinatorConfig, BackoffConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod application;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod ports;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports
pub use application::{
    AddressStatus, AddressSubscription, CatchUpError, NetworkCoordinator, OfferReport, SessionKey,
};
pub use config::{BackoffConfig, CoordinatorConfig};
pub use domain::{CoordinatorError, PoolSnapshot, PoolStatus};
pub use ports::{SessionConnector, TcpConnector, WalletNetworkApi};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
