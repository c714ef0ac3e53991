//! # Block Header
//!
//! The 80-byte proof-of-work header. This is the only block data an SPV
//! client ever stores.
//!
//! ## Wire Layout
//!
//! | Offset | Size | Field         | Encoding       |
//! |--------|------|---------------|----------------|
//! | 0      | 4    | version       | i32 LE         |
//! | 4      | 32   | prev_hash     | internal order |
//! | 36     | 32   | merkle_root   | internal order |
//! | 68     | 4    | timestamp     | u32 LE         |
//! | 72     | 4    | bits          | u32 LE         |
//! | 76     | 4    | nonce         | u32 LE         |

use serde::{Deserialize, Serialize};

use crate::errors::HeaderDecodeError;
use crate::hash::{sha256d, Hash256};

/// Serialized header size in bytes.
pub const HEADER_SIZE: usize = 80;

/// Block header record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block version.
    pub version: i32,
    /// Hash of the previous header (chain linkage key).
    pub prev_hash: Hash256,
    /// Merkle root of the block's transactions.
    pub merkle_root: Hash256,
    /// Unix timestamp claimed by the miner.
    pub timestamp: u32,
    /// Compact difficulty target.
    pub bits: u32,
    /// Proof-of-work nonce.
    pub nonce: u32,
}

impl BlockHeader {
    /// Header hash (double SHA-256 of the 80 serialized bytes).
    pub fn hash(&self) -> Hash256 {
        sha256d(&self.to_bytes())
    }

    /// Serialize to the 80-byte wire form.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(self.prev_hash.as_bytes());
        out[36..68].copy_from_slice(self.merkle_root.as_bytes());
        out[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    /// Decode exactly one header.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HeaderDecodeError> {
        if bytes.len() != HEADER_SIZE {
            return Err(HeaderDecodeError::InvalidLength {
                expected: HEADER_SIZE,
                got: bytes.len(),
            });
        }

        Ok(Self {
            version: i32::from_le_bytes(read_4(bytes, 0)),
            prev_hash: Hash256(read_32(bytes, 4)),
            merkle_root: Hash256(read_32(bytes, 36)),
            timestamp: u32::from_le_bytes(read_4(bytes, 68)),
            bits: u32::from_le_bytes(read_4(bytes, 72)),
            nonce: u32::from_le_bytes(read_4(bytes, 76)),
        })
    }

    /// Decode one header from hex.
    pub fn from_hex(s: &str) -> Result<Self, HeaderDecodeError> {
        Self::from_bytes(&hex::decode(s.trim())?)
    }

    /// Hex of the 80-byte wire form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Decode a concatenation of headers (`blockchain.block.headers` payload).
    pub fn decode_batch(bytes: &[u8]) -> Result<Vec<Self>, HeaderDecodeError> {
        if bytes.len() % HEADER_SIZE != 0 {
            return Err(HeaderDecodeError::RaggedBatch {
                len: bytes.len(),
                unit: HEADER_SIZE,
            });
        }
        bytes.chunks_exact(HEADER_SIZE).map(Self::from_bytes).collect()
    }

    /// Decode a hex concatenation of headers.
    pub fn decode_batch_hex(s: &str) -> Result<Vec<Self>, HeaderDecodeError> {
        Self::decode_batch(&hex::decode(s.trim())?)
    }
}

fn read_4(bytes: &[u8], offset: usize) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&bytes[offset..offset + 4]);
    out
}

fn read_32(bytes: &[u8], offset: usize) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes[offset..offset + 32]);
    out
}
