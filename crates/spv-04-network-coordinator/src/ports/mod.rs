//! # Ports
//!
//! - `inbound`: `WalletNetworkApi`
//! - `outbound`: `SessionConnector`

pub mod inbound;
pub mod outbound;

pub use inbound::WalletNetworkApi;
pub use outbound::{SessionConnector, TcpConnector};
