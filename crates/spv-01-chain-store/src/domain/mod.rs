//! # Domain Module
//!
//! Header arena, chain bookkeeping and the accept/reorg rules.

pub mod entities;
pub mod errors;
pub mod invariants;
pub mod store;

pub use entities::*;
pub use errors::*;
pub use invariants::*;
pub use store::ChainStore;
