//! # SPV-02 Proof Verifier
//!
//! Confirms that a transaction id is included in a main-chain block by folding
//! a Merkle branch up to the header's merkle root.
//!
//! ## Fail-closed rules
//!
//! | Input | Result |
//! |-------|--------|
//! | Branch longer than `MAX_BRANCH_LENGTH` | not verified |
//! | Position bits beyond the branch length | not verified |
//! | Branch depth inconsistent with a known tx count | not verified |
//! | No main-chain header at the claimed height | `HeaderUnavailable` |
//!
//! ## Module Structure
//!
//! ```text
//! spv-02-proof-verifier/
//! ├── domain/          # ProofRequest, MerkleBranch, ProofResult, ProofFailure
//! ├── algorithms/      # verify, fold, root and branch construction
//! ├── ports/           # HeaderLookup (implemented for the chain store)
//! └── application/     # ProofVerifier
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algorithms;
pub mod application;
pub mod domain;
pub mod ports;

// Re-exports
pub use algorithms::{build_merkle_branch, compute_merkle_root, verify, verify_with_tx_count};
pub use application::ProofVerifier;
pub use domain::{MerkleBranch, ProofFailure, ProofRequest, ProofResult, MAX_BRANCH_LENGTH};
pub use ports::{HeaderLookup, ProofAnchor};
