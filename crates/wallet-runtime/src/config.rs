//! # Wallet Configuration
//!
//! TOML file with one section per concern. Every section and every key is
//! optional; missing values take the defaults below.
//!
//! ```toml
//! [network]
//! chain = "mainnet"
//! header_file = "headers.bin"
//!
//! [[servers]]
//! address = "electrum.blockstream.info:50001:t"
//!
//! [[checkpoints]]
//! height = 840000
//! hash = "0000000000000000000320283a032748cef8227873ff4872689bf23f1cda83a5"
//!
//! [pool]
//! target_sessions = 4
//!
//! [scoring]
//! degrade_threshold = 50
//!
//! [backoff]
//! initial_ms = 1000
//! ```

use serde::{Deserialize, Serialize};
use spv_01_chain_store::{ChainParams, ChainStoreConfig, Checkpoint};
use spv_03_server_session::{EndpointParseError, HealthConfig, ServerEndpoint, SessionConfig};
use spv_04_network_coordinator::{BackoffConfig, CoordinatorConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// No preset with this name.
    #[error("unknown chain {0:?} (expected mainnet or regtest)")]
    UnknownChain(String),

    /// A server address does not parse.
    #[error("invalid server {address:?}: {source}")]
    Server {
        /// Address as written.
        address: String,
        /// Parse failure.
        #[source]
        source: EndpointParseError,
    },

    /// A value is out of range.
    #[error("invalid value for {key}: {reason}")]
    Invalid {
        /// Offending key.
        key: &'static str,
        /// What is wrong.
        reason: &'static str,
    },
}

/// Complete wallet configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WalletConfig {
    /// Chain and storage.
    pub network: NetworkSection,
    /// Electrum servers.
    pub servers: Vec<ServerEntry>,
    /// Checkpoints added to the preset's.
    pub checkpoints: Vec<Checkpoint>,
    /// Pool sizing and deadlines.
    pub pool: PoolSection,
    /// Suspicion weights.
    pub scoring: ScoringSection,
    /// Reconnect backoff.
    pub backoff: BackoffSection,
}

/// `[network]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkSection {
    /// Chain preset name.
    pub chain: String,
    /// Where the main chain is persisted.
    pub header_file: PathBuf,
    /// Forks deeper than this are pruned.
    pub fork_prune_depth: u64,
    /// Forks retained at most.
    pub max_forks_retained: usize,
}

impl Default for NetworkSection {
    fn default() -> Self {
        let store = ChainStoreConfig::default();
        Self {
            chain: "mainnet".to_string(),
            header_file: PathBuf::from("headers.bin"),
            fork_prune_depth: store.fork_prune_depth,
            max_forks_retained: store.max_forks_retained,
        }
    }
}

/// `[[servers]]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerEntry {
    /// `host:port:t` or `host:port:s`.
    pub address: String,
}

/// `[pool]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSection {
    /// Sessions kept open.
    pub target_sessions: usize,
    /// Concurrent wallet requests per session.
    pub max_in_flight_per_session: usize,
    /// Headers per batch request.
    pub header_chunk: u32,
    /// Per-request deadline.
    pub request_timeout_secs: u64,
    /// Deadline for coordinator-initiated fetches.
    pub fetch_timeout_secs: u64,
    /// Keep-alive interval.
    pub ping_interval_secs: u64,
    /// Unconnected headers buffered.
    pub orphan_capacity: usize,
    /// Verified proofs cached.
    pub proof_cache_size: usize,
}

impl Default for PoolSection {
    fn default() -> Self {
        let coordinator = CoordinatorConfig::default();
        let session = SessionConfig::default();
        Self {
            target_sessions: coordinator.target_sessions,
            max_in_flight_per_session: coordinator.max_in_flight_per_session,
            header_chunk: coordinator.header_chunk,
            request_timeout_secs: session.request_timeout.as_secs(),
            fetch_timeout_secs: coordinator.fetch_timeout.as_secs(),
            ping_interval_secs: session.ping_interval.as_secs(),
            orphan_capacity: coordinator.orphan_capacity,
            proof_cache_size: coordinator.proof_cache_size,
        }
    }
}

/// `[scoring]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringSection {
    /// Suspicion added on a request timeout.
    pub timeout_penalty: u32,
    /// Suspicion added on a malformed message.
    pub malformed_penalty: u32,
    /// Suspicion added on a contradicted claim.
    pub inconsistency_penalty: u32,
    /// Suspicion added on a disconnect.
    pub disconnect_penalty: u32,
    /// Suspicion at which a session is demoted.
    pub degrade_threshold: u32,
    /// Suspicion ceiling.
    pub max_suspicion: u32,
    /// Demotion length.
    pub cooldown_secs: u64,
}

impl Default for ScoringSection {
    fn default() -> Self {
        let health = HealthConfig::default();
        Self {
            timeout_penalty: health.timeout_penalty,
            malformed_penalty: health.malformed_penalty,
            inconsistency_penalty: health.inconsistency_penalty,
            disconnect_penalty: health.disconnect_penalty,
            degrade_threshold: health.degrade_threshold,
            max_suspicion: health.max_suspicion,
            cooldown_secs: health.cooldown.as_secs(),
        }
    }
}

/// `[backoff]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackoffSection {
    /// First delay.
    pub initial_ms: u64,
    /// Delay cap.
    pub max_secs: u64,
    /// Growth per failure.
    pub multiplier: f64,
    /// Random extra fraction.
    pub jitter: f64,
}

impl Default for BackoffSection {
    fn default() -> Self {
        let backoff = BackoffConfig::default();
        Self {
            initial_ms: backoff.initial.as_millis() as u64,
            max_secs: backoff.max.as_secs(),
            multiplier: backoff.multiplier,
            jitter: backoff.jitter,
        }
    }
}

impl WalletConfig {
    /// Read and parse `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Range checks the schema cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.target_sessions == 0 {
            return Err(ConfigError::Invalid {
                key: "pool.target_sessions",
                reason: "must be at least 1",
            });
        }
        if self.pool.header_chunk == 0 {
            return Err(ConfigError::Invalid {
                key: "pool.header_chunk",
                reason: "must be at least 1",
            });
        }
        if self.scoring.degrade_threshold > self.scoring.max_suspicion {
            return Err(ConfigError::Invalid {
                key: "scoring.degrade_threshold",
                reason: "must not exceed max_suspicion",
            });
        }
        if self.backoff.multiplier < 1.0 {
            return Err(ConfigError::Invalid {
                key: "backoff.multiplier",
                reason: "must be at least 1.0",
            });
        }
        if !(0.0..=1.0).contains(&self.backoff.jitter) {
            return Err(ConfigError::Invalid {
                key: "backoff.jitter",
                reason: "must be between 0.0 and 1.0",
            });
        }
        Ok(())
    }

    /// Chain preset with the configured checkpoints merged in.
    pub fn chain_params(&self) -> Result<ChainParams, ConfigError> {
        let mut params = ChainParams::by_name(&self.network.chain)
            .ok_or_else(|| ConfigError::UnknownChain(self.network.chain.clone()))?;
        for checkpoint in &self.checkpoints {
            params.checkpoints.retain(|cp| cp.height != checkpoint.height);
            params.checkpoints.push(*checkpoint);
        }
        Ok(params)
    }

    /// Chain store settings.
    pub fn chain_store_config(&self) -> Result<ChainStoreConfig, ConfigError> {
        Ok(ChainStoreConfig {
            params: self.chain_params()?,
            fork_prune_depth: self.network.fork_prune_depth,
            max_forks_retained: self.network.max_forks_retained,
        })
    }

    /// Parsed server list.
    pub fn endpoints(&self) -> Result<Vec<ServerEndpoint>, ConfigError> {
        self.servers
            .iter()
            .map(|entry| {
                entry
                    .address
                    .parse()
                    .map_err(|source| ConfigError::Server {
                        address: entry.address.clone(),
                        source,
                    })
            })
            .collect()
    }

    /// Coordinator settings, session and scoring included.
    pub fn coordinator_config(&self) -> Result<CoordinatorConfig, ConfigError> {
        let defaults = CoordinatorConfig::default();
        let health = HealthConfig {
            timeout_penalty: self.scoring.timeout_penalty,
            malformed_penalty: self.scoring.malformed_penalty,
            inconsistency_penalty: self.scoring.inconsistency_penalty,
            disconnect_penalty: self.scoring.disconnect_penalty,
            degrade_threshold: self.scoring.degrade_threshold,
            max_suspicion: self.scoring.max_suspicion,
            cooldown: Duration::from_secs(self.scoring.cooldown_secs),
            ..HealthConfig::default()
        };
        let session = SessionConfig {
            request_timeout: Duration::from_secs(self.pool.request_timeout_secs),
            ping_interval: Duration::from_secs(self.pool.ping_interval_secs),
            health,
            ..SessionConfig::default()
        };

        Ok(CoordinatorConfig {
            servers: self.endpoints()?,
            session,
            target_sessions: self.pool.target_sessions,
            max_in_flight_per_session: self.pool.max_in_flight_per_session,
            header_chunk: self.pool.header_chunk,
            fetch_timeout: Duration::from_secs(self.pool.fetch_timeout_secs),
            orphan_capacity: self.pool.orphan_capacity,
            proof_cache_size: self.pool.proof_cache_size,
            backoff: BackoffConfig {
                initial: Duration::from_millis(self.backoff.initial_ms),
                max: Duration::from_secs(self.backoff.max_secs),
                multiplier: self.backoff.multiplier,
                jitter: self.backoff.jitter,
            },
            ..defaults
        })
    }
}
