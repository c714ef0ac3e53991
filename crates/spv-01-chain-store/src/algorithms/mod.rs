//! # Algorithms
//!
//! Proof-of-work arithmetic and timestamp rules.

pub mod difficulty;
pub mod timestamps;

pub use difficulty::{
    block_proof, compact_to_u256, hash_meets_target, retarget, u256_to_compact, CompactError,
};
pub use timestamps::median_time_past;
