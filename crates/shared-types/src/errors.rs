//! # Error Types
//!
//! Decoding errors for data received from remote servers.

use thiserror::Error;

/// Errors that can occur while decoding a header or hash.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderDecodeError {
    /// Input has the wrong number of bytes.
    #[error("Invalid length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },

    /// Input is not valid hexadecimal.
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    /// A header batch is not a whole number of headers.
    #[error("Header batch of {len} bytes is not a multiple of {unit}")]
    RaggedBatch { len: usize, unit: usize },
}

impl From<hex::FromHexError> for HeaderDecodeError {
    fn from(err: hex::FromHexError) -> Self {
        Self::InvalidHex(err.to_string())
    }
}
