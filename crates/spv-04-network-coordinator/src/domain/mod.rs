//! # Domain Layer
//!
//! Pool status, election rules, reconnect backoff, orphan buffering and the
//! proof cache. No I/O.

pub mod backoff;
pub mod election;
pub mod errors;
pub mod orphans;
pub mod proof_cache;
pub mod status;

pub use backoff::Backoff;
pub use election::{choose_primary, elect, is_corroborated, Candidate};
pub use errors::CoordinatorError;
pub use orphans::{Orphan, OrphanPool};
pub use proof_cache::ProofCache;
pub use status::{next_status, PoolSnapshot, PoolStatus, StatusInputs};
