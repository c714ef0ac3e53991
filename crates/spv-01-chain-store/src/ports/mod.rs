//! # Ports
//!
//! Inbound: the chain store API. Outbound: the wall clock.

pub mod inbound;
pub mod outbound;

pub use inbound::ChainStoreApi;
pub use outbound::{FixedTimeSource, SystemTimeSource, TimeSource};
