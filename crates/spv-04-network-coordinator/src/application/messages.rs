//! Messages into the decision loop.

use shared_types::BlockHeader;
use spv_01_chain_store::RejectReason;
use spv_03_server_session::{ClaimedTip, ConnectError, Penalty, ServerSession};
use tokio::sync::oneshot;

use super::catch_up::CatchUpError;

/// One connection of one pool slot. A reconnect gets a new generation, so
/// messages about a previous connection are recognisably stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionKey {
    /// Index into the server list.
    pub slot: usize,
    /// Connection counter.
    pub generation: u64,
}

/// Result of offering headers to the chain store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OfferReport {
    /// Headers newly stored.
    pub stored: usize,
    /// First rejection other than an unknown parent.
    pub rejected: Option<RejectReason>,
    /// Some header did not connect and was buffered as an orphan.
    pub unconnected: bool,
    /// Some header is dated past the local clock's drift limit. Nothing
    /// after it was offered.
    pub deferred: bool,
}

/// Everything the decision loop reacts to.
pub(crate) enum Inbound {
    /// A connect attempt finished.
    Connected {
        key: SessionKey,
        result: Result<ServerSession, ConnectError>,
    },
    /// A session's notification stream ended.
    Closed { key: SessionKey },
    /// A session announced a tip.
    TipAnnounced { key: SessionKey, tip: ClaimedTip },
    /// A script hash status arrived.
    AddressStatus {
        key: SessionKey,
        script_hash: String,
        status: Option<String>,
    },
    /// Headers fetched by a catch-up task or a caller.
    Offer {
        source: Option<SessionKey>,
        headers: Vec<(BlockHeader, u64)>,
        reply: oneshot::Sender<OfferReport>,
    },
    /// A catch-up task is done.
    CatchUpFinished {
        key: SessionKey,
        tip: ClaimedTip,
        result: Result<(), CatchUpError>,
    },
    /// A caller caught a session misbehaving.
    Penalize { key: SessionKey, penalty: Penalty },
    /// Start following a script hash. Replies with the last known status.
    WatchAddress {
        script_hash: String,
        reply: oneshot::Sender<Option<Option<String>>>,
    },
}
