//! # Session Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Electrum protocol version requested during the handshake.
pub const PROTOCOL_VERSION: &str = "1.4";

/// Largest accepted line. A full `blockchain.block.headers` chunk of 2016
/// headers is about 320 KiB of hex.
pub const DEFAULT_MAX_LINE_BYTES: usize = 2 * 1024 * 1024;

/// Per-connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Client name sent in `server.version`.
    pub client_name: String,
    /// Protocol version sent in `server.version`.
    pub protocol_version: String,
    /// Deadline for the TCP connect.
    pub connect_timeout: Duration,
    /// Default deadline for one request attempt.
    pub request_timeout: Duration,
    /// Extra attempts (each with a fresh id) after a timeout.
    pub max_retries: u32,
    /// Interval between `server.ping` keep-alives.
    pub ping_interval: Duration,
    /// Lines longer than this close the session.
    pub max_line_bytes: usize,
    /// Buffered notifications per subscriber before it lags.
    pub notification_buffer: usize,
    /// Outbound request queue depth.
    pub outbound_queue: usize,
    /// Weight of the newest latency sample in the moving average.
    pub latency_alpha: f64,
    /// Suspicion scoring.
    pub health: HealthConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_name: format!("spv-wallet/{}", env!("CARGO_PKG_VERSION")),
            protocol_version: PROTOCOL_VERSION.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(20),
            max_retries: 2,
            ping_interval: Duration::from_secs(60),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            notification_buffer: 256,
            outbound_queue: 64,
            latency_alpha: 0.2,
            health: HealthConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Short deadlines for tests.
    pub fn for_testing() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_millis(300),
            max_retries: 1,
            ping_interval: Duration::from_secs(3600),
            health: HealthConfig::for_testing(),
            ..Self::default()
        }
    }
}

/// Suspicion weights and thresholds.
///
/// Suspicion starts at zero. Successes lower it, failures raise it; at or
/// above `degrade_threshold` the session is demoted for `cooldown`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Subtracted on each successful response.
    pub success_reward: u32,
    /// Added on a request timeout.
    pub timeout_penalty: u32,
    /// Added on an unparseable or out-of-protocol message.
    pub malformed_penalty: u32,
    /// Added when the server's data contradicts validated headers.
    pub inconsistency_penalty: u32,
    /// Added when the connection drops.
    pub disconnect_penalty: u32,
    /// Demotion threshold.
    pub degrade_threshold: u32,
    /// Ceiling (also the value of a proven liar).
    pub max_suspicion: u32,
    /// Time spent demoted before the session gets another chance.
    pub cooldown: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            success_reward: 1,
            timeout_penalty: 10,
            malformed_penalty: 50,
            inconsistency_penalty: 40,
            disconnect_penalty: 20,
            degrade_threshold: 50,
            max_suspicion: 100,
            cooldown: Duration::from_secs(300),
        }
    }
}

impl HealthConfig {
    /// Short cooldown for tests.
    pub fn for_testing() -> Self {
        Self {
            cooldown: Duration::from_millis(200),
            ..Self::default()
        }
    }
}
