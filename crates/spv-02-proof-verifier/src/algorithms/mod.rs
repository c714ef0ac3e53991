//! # Algorithms

pub mod merkle;

pub use merkle::{
    build_merkle_branch, check_branch_shape, check_tx_count, compute_merkle_root, verify,
    verify_with_tx_count,
};
