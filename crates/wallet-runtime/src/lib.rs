//! # Wallet Runtime Library
//!
//! Configuration loading and process wiring for the `spv-wallet` binary,
//! exposed as a library for testing.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod runtime;

pub use config::{ConfigError, WalletConfig};
pub use runtime::WalletRuntime;
