//! # SPV-03 Server Session
//!
//! One connection to one Electrum server: JSON-RPC over newline-delimited
//! JSON, with pipelined requests matched by id, subscriptions delivered as
//! streams, and a running suspicion score.
//!
//! Nothing a server says is trusted here. Tips, headers and branches are
//! handed upward as claims; the chain store and proof verifier decide.
//!
//! ## Lifecycle
//!
//! ```text
//! Connecting ──handshake──► Ready ◄──cooldown── Degraded
//!     │                       │ suspicion ≥ threshold ▲
//!     │                       └───────────────────────┘
//!     └────────── any fatal error ──────────► Closed
//! ```
//!
//! ## Scoring
//!
//! | Event | Suspicion |
//! |-------|-----------|
//! | Successful response | −1 |
//! | Request timeout | +10 |
//! | Disconnect | +20 |
//! | Contradicted claim | +40 |
//! | Malformed message | +50, session closed |
//! | Unverifiable tip | ceiling, permanently |
//!
//! ## Module Structure
//!
//! ```text
//! spv-03-server-session/
//! ├── domain/          # endpoints, protocol messages, state, health
//! ├── adapters/        # line framing
//! ├── application/     # ServerSession, NotificationStream
//! └── config.rs        # SessionConfig, HealthConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports
pub use application::{NotificationStream, ServerSession};
pub use config::{HealthConfig, SessionConfig, PROTOCOL_VERSION};
pub use domain::{
    ClaimedTip, ConnectError, EndpointParseError, HealthScore, LatencyEstimate, MerkleResponse,
    Method, Notification, Penalty, RpcError, ServerEndpoint, SessionState, Topic, TransportKind,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
