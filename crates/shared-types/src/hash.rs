//! # 256-bit Hashes
//!
//! `Hash256` stores bytes in internal (little-endian, wire) order. Display and
//! hex parsing use the reversed, big-endian order used by block explorers and
//! Electrum servers.

use primitive_types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::errors::HeaderDecodeError;

/// A 32-byte double-SHA-256 digest in internal byte order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The all-zero hash (previous hash of a genesis header).
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    /// Wrap raw internal-order bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Internal-order bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse from display (big-endian) hex, as returned by servers.
    pub fn from_hex(s: &str) -> Result<Self, HeaderDecodeError> {
        let mut bytes = Self::from_internal_hex(s)?.0;
        bytes.reverse();
        Ok(Self(bytes))
    }

    /// Parse from internal-order hex (as found inside serialized headers).
    pub fn from_internal_hex(s: &str) -> Result<Self, HeaderDecodeError> {
        let raw = hex::decode(s)?;
        let bytes: [u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| HeaderDecodeError::InvalidLength {
                expected: 32,
                got: raw.len(),
            })?;
        Ok(Self(bytes))
    }

    /// Display-order hex.
    pub fn to_hex(&self) -> String {
        let mut bytes = self.0;
        bytes.reverse();
        hex::encode(bytes)
    }

    /// Interpret the hash as a little-endian 256-bit number (for target checks).
    pub fn to_u256(&self) -> U256 {
        U256::from_little_endian(&self.0)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash256::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// SHA-256 applied twice.
pub fn sha256d(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    Hash256(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_display_is_reversed() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xab;
        let hash = Hash256(bytes);
        assert!(hash.to_hex().ends_with("ab"));
        assert!(hash.to_hex().starts_with("00"));
    }

    #[test]
    fn test_hex_parse_roundtrip() {
        let s = "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f";
        let hash = Hash256::from_hex(s).unwrap();
        assert_eq!(hash.to_hex(), s);
        assert_eq!(hash.0[31], 0x00);
        assert_eq!(hash.0[0], 0x6f);
    }

    #[test]
    fn test_hex_parse_wrong_length() {
        let result = Hash256::from_hex("abcd");
        assert!(matches!(
            result,
            Err(HeaderDecodeError::InvalidLength { expected: 32, got: 2 })
        ));
    }

    #[test]
    fn test_sha256d_empty() {
        // Well-known double SHA-256 of the empty string.
        let digest = sha256d(b"");
        assert_eq!(
            hex::encode(digest.0),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }

    #[test]
    fn test_serde_uses_display_hex() {
        let hash = Hash256([7u8; 32]);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));
        let back: Hash256 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
