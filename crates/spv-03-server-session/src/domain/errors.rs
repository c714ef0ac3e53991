//! # Domain Errors

use thiserror::Error;

/// Malformed server string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EndpointParseError {
    /// No `:port` part.
    #[error("missing port in {0:?}")]
    MissingPort(String),
    /// Port is not a number in range.
    #[error("invalid port {0:?}")]
    InvalidPort(String),
    /// Suffix other than `t` or `s`.
    #[error("unknown transport {0:?}")]
    UnknownTransport(String),
    /// Empty host name.
    #[error("empty host")]
    EmptyHost,
}

/// Failure to establish a session.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Transport not available in this build.
    #[error("transport not supported for {0}")]
    UnsupportedTransport(String),
    /// TCP connect did not finish in time.
    #[error("connect timed out")]
    Timeout,
    /// Socket error.
    #[error("connect failed: {0}")]
    Io(#[from] std::io::Error),
    /// `server.version` negotiation failed.
    #[error("handshake failed: {0}")]
    Handshake(#[source] RpcError),
}

/// Failure of a single request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// No response before the deadline (after retries).
    #[error("request {method} timed out")]
    Timeout {
        /// Method name.
        method: &'static str,
    },
    /// The session closed before a response arrived.
    #[error("connection closed")]
    ConnectionClosed,
    /// The server sent something outside the protocol.
    #[error("malformed message: {0}")]
    Malformed(String),
    /// JSON-RPC error object returned by the server.
    #[error("server error {code}: {message}")]
    Server {
        /// JSON-RPC error code.
        code: i64,
        /// Server message.
        message: String,
    },
    /// Socket error while sending.
    #[error("i/o error: {0}")]
    Io(String),
}

impl RpcError {
    /// True for failures of the connection itself rather than of one reply.
    pub fn is_transport(&self) -> bool {
        matches!(self, RpcError::ConnectionClosed | RpcError::Io(_))
    }
}
