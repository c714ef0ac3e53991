//! # Catch-up
//!
//! Validates a claimed tip that does not connect to any stored header.
//!
//! The fork point is found by probing backwards from the local tip with an
//! exponentially growing step until the first fetched header's parent is
//! stored. Everything from there up to the claimed height is fetched in
//! chunks and offered to the decision loop, which alone calls `accept`.

use shared_types::BlockHeader;
use spv_01_chain_store::{ChainStoreApi, ChainStoreService, RejectReason};
use spv_03_server_session::{ClaimedTip, RpcError, ServerSession};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::{Inbound, OfferReport, SessionKey};

/// Why a claimed tip could not be validated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatchUpError {
    /// Nothing the server serves links to a stored header.
    #[error("no header down to height {lowest} connects to the validated chain")]
    Unconnectable {
        /// Lowest height tried.
        lowest: u64,
    },

    /// The claimed height is below the oldest stored header.
    #[error("claimed height {height} is below the store root")]
    BelowRoot {
        /// Claimed height.
        height: u64,
    },

    /// The chain store rejected a served header.
    #[error("served header rejected: {0}")]
    Rejected(RejectReason),

    /// Served headers failed to link to each other.
    #[error("served headers do not link at height {height}")]
    Broken {
        /// Height of the first unlinked header.
        height: u64,
    },

    /// The server ran out of headers below its own claimed tip.
    #[error("server has no header at height {height}")]
    ShortChain {
        /// First missing height.
        height: u64,
    },

    /// A served header is dated too far ahead of the local clock.
    #[error("header at height {height} is ahead of the local clock")]
    AheadOfClock {
        /// Height of the header.
        height: u64,
    },

    /// Transport or protocol failure.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// The decision loop is gone.
    #[error("coordinator stopped")]
    Stopped,
}

impl CatchUpError {
    /// True if the failure proves the server's claim false.
    pub fn is_unverifiable_claim(&self) -> bool {
        matches!(
            self,
            CatchUpError::Unconnectable { .. }
                | CatchUpError::Rejected(_)
                | CatchUpError::Broken { .. }
                | CatchUpError::ShortChain { .. }
        )
    }
}

/// One catch-up job against one session.
pub(crate) struct CatchUp {
    pub key: SessionKey,
    pub session: ServerSession,
    pub chain: Arc<ChainStoreService>,
    pub inbox: mpsc::Sender<Inbound>,
    pub tip: ClaimedTip,
    pub chunk: u32,
    pub timeout: Duration,
}

impl CatchUp {
    /// Run to completion and report to the decision loop.
    pub async fn run(self) {
        let result = self.sync().await;
        debug!(
            endpoint = %self.session.endpoint(),
            height = self.tip.height,
            ok = result.is_ok(),
            "Catch-up finished"
        );
        let _ = self
            .inbox
            .send(Inbound::CatchUpFinished {
                key: self.key,
                tip: self.tip,
                result,
            })
            .await;
    }

    async fn sync(&self) -> Result<(), CatchUpError> {
        let (mut next, first) = self.find_fork_point().await?;
        let mut batch = Some(first);

        while next <= self.tip.height {
            let headers = match batch.take() {
                Some(headers) => headers,
                None => self.fetch(next).await?,
            };
            if headers.is_empty() {
                return Err(CatchUpError::ShortChain { height: next });
            }
            let count = headers.len() as u64;
            let report = self.offer(next, headers).await?;
            if report.deferred {
                return Err(CatchUpError::AheadOfClock {
                    height: next + report.stored as u64,
                });
            }
            if let Some(reason) = report.rejected {
                return Err(CatchUpError::Rejected(reason));
            }
            if report.unconnected {
                return Err(CatchUpError::Broken { height: next });
            }
            next += count;
        }
        Ok(())
    }

    /// First height whose served header links to a stored parent, with the
    /// chunk starting there.
    async fn find_fork_point(&self) -> Result<(u64, Vec<BlockHeader>), CatchUpError> {
        let (root, local) = {
            let store = self.chain.read();
            (store.root_height(), store.height())
        };
        if self.tip.height <= root {
            return Err(CatchUpError::BelowRoot {
                height: self.tip.height,
            });
        }

        let lowest = root + 1;
        let mut start = (local + 1).min(self.tip.height).max(lowest);
        let mut step = 1u64;
        loop {
            let headers = self.fetch(start).await?;
            let first = headers
                .first()
                .ok_or(CatchUpError::ShortChain { height: start })?;
            if self.chain.contains(&first.prev_hash) {
                debug!(
                    endpoint = %self.session.endpoint(),
                    fork_height = start,
                    "Found connection point"
                );
                return Ok((start, headers));
            }
            if start == lowest {
                return Err(CatchUpError::Unconnectable { lowest });
            }
            start = start.saturating_sub(step).max(lowest);
            step = step.saturating_mul(2);
        }
    }

    async fn fetch(&self, start: u64) -> Result<Vec<BlockHeader>, CatchUpError> {
        let remaining = self.tip.height.saturating_sub(start) + 1;
        let count = remaining.min(u64::from(self.chunk)) as u32;
        Ok(self
            .session
            .block_headers(start, count, self.timeout)
            .await?)
    }

    async fn offer(&self, start: u64, headers: Vec<BlockHeader>) -> Result<OfferReport, CatchUpError> {
        let (reply, report) = oneshot::channel();
        let headers = headers
            .into_iter()
            .zip(start..)
            .collect();
        self.inbox
            .send(Inbound::Offer {
                source: Some(self.key),
                headers,
                reply,
            })
            .await
            .map_err(|_| CatchUpError::Stopped)?;
        report.await.map_err(|_| CatchUpError::Stopped)
    }
}
