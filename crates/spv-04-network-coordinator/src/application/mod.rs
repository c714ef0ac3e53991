//! # Application Layer
//!
//! - `coordinator`: `NetworkCoordinator`, the wallet-facing handle
//! - `decision_loop`: the task that owns the pool
//! - `catch_up`: validation of tips that do not connect yet
//! - `addresses`: script hash subscriptions that survive failover

pub mod addresses;
pub mod catch_up;
pub mod coordinator;
mod decision_loop;
pub mod messages;

pub use addresses::{AddressStatus, AddressSubscription};
pub use catch_up::CatchUpError;
pub use coordinator::NetworkCoordinator;
pub use messages::{OfferReport, SessionKey};
