//! # SPV Telemetry
//!
//! `tracing` subscriber setup for the wallet runtime and shared log macros
//! for the library crates.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use spv_telemetry::{init_logging, TelemetryConfig};
//!
//! fn main() {
//!     init_logging(&TelemetryConfig::from_env()).expect("logging");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RUST_LOG` | unset | Full filter, overrides `SPV_LOG_LEVEL` |
//! | `SPV_LOG_LEVEL` | `info` | Log level filter |
//! | `SPV_JSON_LOGS` | `false` | JSON lines instead of pretty output |
//! | `SPV_SERVICE_NAME` | `spv-wallet` | Service name |

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::init_logging;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The level or filter directive does not parse.
    #[error("Invalid log filter: {0}")]
    Filter(String),

    /// A global subscriber is already installed.
    #[error("Failed to install subscriber: {0}")]
    Init(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "spv-wallet");
    }
}
