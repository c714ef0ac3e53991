//! # Domain Module
//!
//! Endpoints, protocol messages, session lifecycle and health scoring.

pub mod endpoint;
pub mod errors;
pub mod health;
pub mod protocol;
pub mod state;

pub use endpoint::{ServerEndpoint, TransportKind};
pub use errors::{ConnectError, EndpointParseError, RpcError};
pub use health::{HealthScore, LatencyEstimate, Penalty};
pub use protocol::{
    parse_line, ClaimedTip, MerkleResponse, Method, Notification, ServerMessage, Topic,
};
pub use state::SessionState;
