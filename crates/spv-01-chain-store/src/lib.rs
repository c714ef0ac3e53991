//! # SPV-01 Chain Store
//!
//! Header-chain store for an SPV wallet: the main chain plus competing forks,
//! selection by cumulative proof-of-work, and reorganization detection.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Rules enforced by `accept`
//!
//! | Rule | Rejection |
//! |------|-----------|
//! | Compact target decodes and is within the pow limit | `InvalidTarget` |
//! | Hash at or below target | `InsufficientProofOfWork` |
//! | Parent stored | `UnknownParent` |
//! | Height hint agrees with linkage | `HeightMismatch` |
//! | Checkpoint heights carry the checkpoint hash | `CheckpointMismatch` |
//! | No fork at or below a passed checkpoint | `ForkBelowCheckpoint` |
//! | Bits follow the retarget rule | `UnexpectedDifficulty` |
//! | Timestamp above median-time-past | `TimestampTooOld` |
//! | Timestamp within future drift | `TimestampTooFarInFuture` |
//!
//! ## Module Structure
//!
//! ```text
//! spv-01-chain-store/
//! ├── domain/          # ChainStore, entities, reject reasons, invariants
//! ├── algorithms/      # Compact targets, work, retarget, median time
//! ├── ports/           # ChainStoreApi (inbound) + TimeSource (outbound)
//! ├── application/     # ChainStoreService (RwLock wrapper)
//! ├── adapters/        # HeaderFile persistence
//! └── config.rs        # ChainParams presets, ChainStoreConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports
pub use adapters::HeaderFile;
pub use algorithms::{block_proof, compact_to_u256, u256_to_compact};
pub use application::ChainStoreService;
pub use config::{ChainParams, ChainStoreConfig, Checkpoint};
pub use domain::{
    AcceptOutcome, AcceptResult, ChainSnapshot, ChainStore, ChainStoreError, ForkId,
    HeaderEntry, RejectReason, ReorgEvent,
};
pub use ports::{ChainStoreApi, FixedTimeSource, SystemTimeSource, TimeSource};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
