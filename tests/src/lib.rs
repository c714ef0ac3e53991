//! # SPV Wallet Core Test Suite
//!
//! Whole-pool scenarios: a real chain store, verifier and coordinator
//! talking to scripted Electrum servers over in-memory pipes.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs      # Pool harness, chain builders
//!     ├── reorg.rs         # Server-side reorganizations
//!     ├── lying_server.rs  # Unbacked tips, bans
//!     ├── failover.rs      # Primary loss, address resubscription
//!     └── proofs.rs        # Inclusion proofs end to end
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All scenarios
//! cargo test -p spv-tests
//!
//! # By area
//! cargo test -p spv-tests integration::reorg::
//! cargo test -p spv-tests integration::failover::
//! ```

pub mod integration;
