//! # Coordinator Errors

use shared_types::Hash256;
use spv_02_proof_verifier::ProofFailure;
use spv_03_server_session::RpcError;
use thiserror::Error;

/// Errors surfaced to the wallet.
///
/// Transport trouble on one server never reaches the caller while another
/// server can answer; verification failures are never reported as
/// transport failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    /// No usable session before the deadline.
    #[error("No server connectivity")]
    NoConnectivity,

    /// The caller's deadline expired.
    #[error("Deadline expired while {0}")]
    Timeout(&'static str),

    /// The server's branch does not lead to the main-chain header.
    #[error("Inclusion of {tx_id} at height {height} not proven")]
    InclusionNotProven {
        /// Transaction id.
        tx_id: Hash256,
        /// Claimed height.
        height: u64,
    },

    /// No validated main-chain header at this height.
    #[error("No validated header at height {height}")]
    HeaderUnavailable {
        /// Requested height.
        height: u64,
    },

    /// The server answered outside the protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The coordinator has shut down.
    #[error("Coordinator stopped")]
    Stopped,
}

impl CoordinatorError {
    /// Map a proof failure for `(tx_id, height)`.
    pub fn from_proof(failure: ProofFailure, tx_id: Hash256, height: u64) -> Self {
        match failure {
            ProofFailure::HeaderUnavailable { height } => Self::HeaderUnavailable { height },
            _ => Self::InclusionNotProven { tx_id, height },
        }
    }
}

impl From<RpcError> for CoordinatorError {
    fn from(error: RpcError) -> Self {
        match error {
            RpcError::Timeout { .. } => Self::Timeout("waiting for a server"),
            RpcError::ConnectionClosed | RpcError::Io(_) => Self::NoConnectivity,
            RpcError::Malformed(message) => Self::Protocol(message),
            RpcError::Server { code, message } => {
                Self::Protocol(format!("server error {code}: {message}"))
            }
        }
    }
}
