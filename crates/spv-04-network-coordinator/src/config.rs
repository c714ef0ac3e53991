//! # Coordinator Configuration

use serde::{Deserialize, Serialize};
use spv_03_server_session::{ServerEndpoint, SessionConfig};
use std::time::Duration;

/// Pool and routing settings.
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// Candidate servers.
    pub servers: Vec<ServerEndpoint>,
    /// Per-session settings.
    pub session: SessionConfig,
    /// Sessions kept open at once.
    pub target_sessions: usize,
    /// Concurrent caller requests admitted per session.
    pub max_in_flight_per_session: usize,
    /// Headers per `blockchain.block.headers` request during catch-up.
    pub header_chunk: u32,
    /// Deadline for requests the coordinator issues on its own behalf.
    pub fetch_timeout: Duration,
    /// Headers with unknown parents kept for a later retry.
    pub orphan_capacity: usize,
    /// How long an orphan is kept.
    pub orphan_ttl: Duration,
    /// Wait before re-checking a tip whose headers are dated ahead of the
    /// local clock.
    pub clock_retry: Duration,
    /// Verified proofs cached.
    pub proof_cache_size: usize,
    /// Housekeeping interval (reconnects, cooldowns, orphan expiry).
    pub tick_interval: Duration,
    /// Reconnect backoff.
    pub backoff: BackoffConfig,
    /// Inbound channel depth of the decision loop.
    pub inbox_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            session: SessionConfig::default(),
            target_sessions: 4,
            max_in_flight_per_session: 8,
            header_chunk: 2016,
            fetch_timeout: Duration::from_secs(30),
            orphan_capacity: 256,
            orphan_ttl: Duration::from_secs(600),
            clock_retry: Duration::from_secs(60),
            proof_cache_size: 1024,
            tick_interval: Duration::from_secs(1),
            backoff: BackoffConfig::default(),
            inbox_capacity: 1024,
        }
    }
}

impl CoordinatorConfig {
    /// Small bounds and short timers for tests.
    pub fn for_testing() -> Self {
        Self {
            session: SessionConfig::for_testing(),
            max_in_flight_per_session: 2,
            header_chunk: 16,
            fetch_timeout: Duration::from_millis(500),
            orphan_capacity: 8,
            orphan_ttl: Duration::from_secs(5),
            clock_retry: Duration::from_millis(50),
            proof_cache_size: 16,
            tick_interval: Duration::from_millis(20),
            backoff: BackoffConfig::for_testing(),
            inbox_capacity: 64,
            ..Self::default()
        }
    }

    /// Builder-style server list.
    pub fn with_servers(mut self, servers: Vec<ServerEndpoint>) -> Self {
        self.servers = servers;
        self
    }
}

/// Exponential reconnect backoff with random jitter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay after the first failure.
    pub initial: Duration,
    /// Upper bound on the delay.
    pub max: Duration,
    /// Growth factor per consecutive failure.
    pub multiplier: f64,
    /// Random extra delay as a fraction of the computed delay (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(300),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

impl BackoffConfig {
    /// Millisecond delays for tests.
    pub fn for_testing() -> Self {
        Self {
            initial: Duration::from_millis(20),
            max: Duration::from_millis(200),
            multiplier: 2.0,
            jitter: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert!(config.servers.is_empty());
        assert_eq!(config.max_in_flight_per_session, 8);
        assert!(config.backoff.initial < config.backoff.max);
    }

    #[test]
    fn test_with_servers() {
        let config = CoordinatorConfig::for_testing()
            .with_servers(vec![ServerEndpoint::tcp("a.example", 50001)]);
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.backoff.jitter, 0.0);
    }
}
