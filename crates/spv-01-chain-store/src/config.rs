//! # Chain Store Configuration
//!
//! Consensus parameters (`ChainParams`) and retention tunables
//! (`ChainStoreConfig`).

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use shared_types::{BlockHeader, Hash256};

use crate::algorithms::compact_to_u256;

/// Headers between difficulty adjustments.
pub const RETARGET_INTERVAL: u64 = 2016;

/// Intended duration of one retarget interval in seconds (two weeks).
pub const TARGET_TIMESPAN_SECS: u64 = 14 * 24 * 60 * 60;

/// Number of ancestors used for median-time-past.
pub const MEDIAN_TIME_SPAN: usize = 11;

/// How far into the future a header timestamp may be.
pub const MAX_FUTURE_DRIFT_SECS: u64 = 2 * 60 * 60;

/// Default depth after which a fork is dropped.
pub const DEFAULT_FORK_PRUNE_DEPTH: u64 = 144;

/// Default upper bound on retained forks.
pub const DEFAULT_MAX_FORKS_RETAINED: usize = 8;

const GENESIS_MERKLE_ROOT: &str =
    "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

/// A trusted `(height, hash)` pair compiled into or configured for the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Block height.
    pub height: u64,
    /// Expected header hash at that height.
    pub hash: Hash256,
}

/// Consensus parameters of one network.
#[derive(Clone, Debug)]
pub struct ChainParams {
    /// Network name, used in logs.
    pub name: String,
    /// Genesis header (root of the chain at height 0).
    pub genesis: BlockHeader,
    /// Easiest allowed target.
    pub pow_limit: U256,
    /// Headers between difficulty adjustments.
    pub retarget_interval: u64,
    /// Intended duration of one retarget interval.
    pub target_timespan: u64,
    /// Keep the parent's bits forever (regtest).
    pub no_retargeting: bool,
    /// Ancestors used for median-time-past.
    pub median_time_span: usize,
    /// Allowed future drift for timestamps.
    pub max_future_drift: u64,
    /// Trusted checkpoints, any order.
    pub checkpoints: Vec<Checkpoint>,
}

impl ChainParams {
    /// Bitcoin mainnet.
    pub fn mainnet() -> Self {
        Self {
            name: "mainnet".to_string(),
            genesis: genesis_header(1_231_006_505, 0x1d00_ffff, 2_083_236_893),
            pow_limit: compact_to_u256(0x1d00_ffff).unwrap_or_default(),
            retarget_interval: RETARGET_INTERVAL,
            target_timespan: TARGET_TIMESPAN_SECS,
            no_retargeting: false,
            median_time_span: MEDIAN_TIME_SPAN,
            max_future_drift: MAX_FUTURE_DRIFT_SECS,
            checkpoints: mainnet_checkpoints(),
        }
    }

    /// Bitcoin regtest: trivial proof-of-work and no retargeting.
    pub fn regtest() -> Self {
        Self {
            name: "regtest".to_string(),
            genesis: genesis_header(1_296_688_602, 0x207f_ffff, 2),
            pow_limit: compact_to_u256(0x207f_ffff).unwrap_or_default(),
            retarget_interval: RETARGET_INTERVAL,
            target_timespan: TARGET_TIMESPAN_SECS,
            no_retargeting: true,
            median_time_span: MEDIAN_TIME_SPAN,
            max_future_drift: MAX_FUTURE_DRIFT_SECS,
            checkpoints: Vec::new(),
        }
    }

    /// Look up a preset by name.
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "mainnet" | "bitcoin" => Some(Self::mainnet()),
            "regtest" => Some(Self::regtest()),
            _ => None,
        }
    }

    /// Checkpoint hash at `height`, if any.
    pub fn checkpoint_at(&self, height: u64) -> Option<Hash256> {
        self.checkpoints
            .iter()
            .find(|cp| cp.height == height)
            .map(|cp| cp.hash)
    }

    /// Highest checkpoint at or below `height`.
    pub fn highest_checkpoint_at_or_below(&self, height: u64) -> Option<u64> {
        self.checkpoints
            .iter()
            .map(|cp| cp.height)
            .filter(|h| *h <= height)
            .max()
    }

    /// True if `height` starts a new difficulty period.
    pub fn is_retarget_height(&self, height: u64) -> bool {
        !self.no_retargeting && height > 0 && height % self.retarget_interval == 0
    }
}

impl Default for ChainParams {
    fn default() -> Self {
        Self::mainnet()
    }
}

fn genesis_header(timestamp: u32, bits: u32, nonce: u32) -> BlockHeader {
    BlockHeader {
        version: 1,
        prev_hash: Hash256::ZERO,
        merkle_root: Hash256::from_hex(GENESIS_MERKLE_ROOT).unwrap_or_default(),
        timestamp,
        bits,
        nonce,
    }
}

fn mainnet_checkpoints() -> Vec<Checkpoint> {
    [
        (
            11_111,
            "0000000069e244f73d78e8fd29ba2fd2ed618bd6fa2ee92559f542fdb26e7c1d",
        ),
        (
            33_333,
            "000000002dd5588a74784eaa7ab0507a18ad16a236e7b1ce69f00d7ddfb5d0a6",
        ),
    ]
    .iter()
    .filter_map(|(height, hash)| {
        Hash256::from_hex(hash).ok().map(|hash| Checkpoint {
            height: *height,
            hash,
        })
    })
    .collect()
}

/// Chain store configuration.
#[derive(Clone, Debug)]
pub struct ChainStoreConfig {
    /// Consensus parameters.
    pub params: ChainParams,
    /// Forks whose fork point is more than this many headers behind the
    /// main tip are pruned.
    pub fork_prune_depth: u64,
    /// Maximum number of non-main chains kept.
    pub max_forks_retained: usize,
}

impl Default for ChainStoreConfig {
    fn default() -> Self {
        Self {
            params: ChainParams::mainnet(),
            fork_prune_depth: DEFAULT_FORK_PRUNE_DEPTH,
            max_forks_retained: DEFAULT_MAX_FORKS_RETAINED,
        }
    }
}

impl ChainStoreConfig {
    /// Regtest parameters with small retention bounds.
    pub fn for_testing() -> Self {
        Self {
            params: ChainParams::regtest(),
            fork_prune_depth: 20,
            max_forks_retained: 3,
        }
    }
}
