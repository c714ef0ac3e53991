//! # Shared Types Crate
//!
//! Types every SPV subsystem agrees on: the 256-bit hash, the 80-byte block
//! header and its wire codec.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: header layout and hashing live here only.
//! - **Untrusted Input**: every decoder returns a `Result`; nothing in this
//!   crate panics on remote bytes.

pub mod errors;
pub mod hash;
pub mod header;

pub use errors::HeaderDecodeError;
pub use hash::{sha256d, Hash256};
pub use header::{BlockHeader, HEADER_SIZE};

// Re-export U256 from primitive-types for use across all subsystems
pub use primitive_types::U256;
