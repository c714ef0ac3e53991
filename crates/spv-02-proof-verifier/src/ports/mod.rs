//! # Ports

pub mod outbound;

pub use outbound::{HeaderLookup, ProofAnchor};
