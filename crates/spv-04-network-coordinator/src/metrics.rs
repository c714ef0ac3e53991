//! # Network Metrics
//!
//! Prometheus metrics for the server pool and the header pipeline.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! spv-04-network-coordinator = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `spv_headers_accepted_total` - Counter of headers stored
//! - `spv_headers_rejected_total` - Counter of rejected headers (by reason)
//! - `spv_reorgs_total` - Counter of reorganizations
//! - `spv_failovers_total` - Counter of primary changes
//! - `spv_servers_banned_total` - Counter of servers caught lying
//! - `spv_proofs_total` - Counter of proof checks (by result)
//! - `spv_sessions_connected` - Gauge of open sessions
//! - `spv_best_height` - Gauge of the best validated height

use spv_01_chain_store::RejectReason;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Headers stored by the chain store
    pub static ref HEADERS_ACCEPTED: IntCounter = register_int_counter!(
        "spv_headers_accepted_total",
        "Total number of headers stored"
    )
    .expect("Failed to create HEADERS_ACCEPTED metric");

    /// Headers rejected, labeled by reason
    pub static ref HEADERS_REJECTED: IntCounterVec = register_int_counter_vec!(
        "spv_headers_rejected_total",
        "Total number of headers rejected",
        &["reason"]
    )
    .expect("Failed to create HEADERS_REJECTED metric");

    /// Reorganizations
    pub static ref REORGS: IntCounter = register_int_counter!(
        "spv_reorgs_total",
        "Total number of chain reorganizations"
    )
    .expect("Failed to create REORGS metric");

    /// Primary changes
    pub static ref FAILOVERS: IntCounter = register_int_counter!(
        "spv_failovers_total",
        "Total number of primary server changes"
    )
    .expect("Failed to create FAILOVERS metric");

    /// Servers marked as liars
    pub static ref SERVERS_BANNED: IntCounter = register_int_counter!(
        "spv_servers_banned_total",
        "Total number of servers caught making unverifiable claims"
    )
    .expect("Failed to create SERVERS_BANNED metric");

    /// Proof checks, labeled by result
    pub static ref PROOFS: IntCounterVec = register_int_counter_vec!(
        "spv_proofs_total",
        "Total number of inclusion proof checks",
        &["result"]
    )
    .expect("Failed to create PROOFS metric");

    /// Open sessions
    pub static ref SESSIONS_CONNECTED: IntGauge = register_int_gauge!(
        "spv_sessions_connected",
        "Number of open server sessions"
    )
    .expect("Failed to create SESSIONS_CONNECTED metric");

    /// Best validated height
    pub static ref BEST_HEIGHT: IntGauge = register_int_gauge!(
        "spv_best_height",
        "Height of the best validated chain"
    )
    .expect("Failed to create BEST_HEIGHT metric");
}

/// Short label for a rejection reason.
pub fn reason_label(reason: &RejectReason) -> &'static str {
    match reason {
        RejectReason::InsufficientProofOfWork => "insufficient_pow",
        RejectReason::InvalidTarget { .. } => "invalid_target",
        RejectReason::UnknownParent(_) => "unknown_parent",
        RejectReason::HeightMismatch { .. } => "height_mismatch",
        RejectReason::CheckpointMismatch { .. } => "checkpoint_mismatch",
        RejectReason::ForkBelowCheckpoint { .. } => "fork_below_checkpoint",
        RejectReason::UnexpectedDifficulty { .. } => "unexpected_difficulty",
        RejectReason::TimestampTooOld { .. } => "timestamp_too_old",
        RejectReason::TimestampTooFarInFuture { .. } => "timestamp_in_future",
    }
}

// =============================================================================
// METRIC RECORDING FUNCTIONS
// =============================================================================

/// Record stored headers
#[cfg(feature = "metrics")]
pub fn record_headers_accepted(count: u64) {
    HEADERS_ACCEPTED.inc_by(count);
}

/// Record a rejected header
#[cfg(feature = "metrics")]
pub fn record_header_rejected(reason: &RejectReason) {
    HEADERS_REJECTED
        .with_label_values(&[reason_label(reason)])
        .inc();
}

/// Record a reorganization
#[cfg(feature = "metrics")]
pub fn record_reorg() {
    REORGS.inc();
}

/// Record a primary change
#[cfg(feature = "metrics")]
pub fn record_failover() {
    FAILOVERS.inc();
}

/// Record a banned server
#[cfg(feature = "metrics")]
pub fn record_server_banned() {
    SERVERS_BANNED.inc();
}

/// Record a proof check
#[cfg(feature = "metrics")]
pub fn record_proof(included: bool) {
    let label = if included { "included" } else { "not_proven" };
    PROOFS.with_label_values(&[label]).inc();
}

/// Update open sessions gauge
#[cfg(feature = "metrics")]
pub fn set_sessions_connected(count: usize) {
    SESSIONS_CONNECTED.set(count as i64);
}

/// Update best height gauge
#[cfg(feature = "metrics")]
pub fn set_best_height(height: u64) {
    BEST_HEIGHT.set(height as i64);
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_headers_accepted(_count: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_header_rejected(_reason: &RejectReason) {}

#[cfg(not(feature = "metrics"))]
pub fn record_reorg() {}

#[cfg(not(feature = "metrics"))]
pub fn record_failover() {}

#[cfg(not(feature = "metrics"))]
pub fn record_server_banned() {}

#[cfg(not(feature = "metrics"))]
pub fn record_proof(_included: bool) {}

#[cfg(not(feature = "metrics"))]
pub fn set_sessions_connected(_count: usize) {}

#[cfg(not(feature = "metrics"))]
pub fn set_best_height(_height: u64) {}
