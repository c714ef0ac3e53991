//! Cross-crate pool scenarios.

pub mod fixtures;

mod failover;
mod lying_server;
mod proofs;
mod reorg;
