//! # Network Coordinator
//!
//! Handle to the server pool. Starting it spawns the [`DecisionLoop`]; the
//! handle routes wallet requests to the elected primary and checks every
//! answer against the chain store before returning it.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_bus::EventPublisher;
use shared_types::{BlockHeader, Hash256};
use spv_01_chain_store::{ChainStoreApi, ChainStoreService};
use spv_02_proof_verifier::{MerkleBranch, ProofRequest, ProofResult, ProofVerifier};
use spv_03_server_session::{MerkleResponse, Penalty, RpcError, ServerEndpoint};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use super::addresses::{AddressStatus, AddressSubscription};
use super::decision_loop::{DecisionLoop, LoopOutputs, RoutedSession};
use super::messages::{Inbound, OfferReport, SessionKey};
use crate::config::CoordinatorConfig;
use crate::domain::{CoordinatorError, PoolSnapshot, PoolStatus, ProofCache};
use crate::metrics;
use crate::ports::{SessionConnector, WalletNetworkApi};

/// Address updates buffered per subscriber.
const ADDRESS_BUFFER: usize = 256;

/// Outcome of one attempt against the current primary.
enum Attempt {
    /// The primary failed; try again on whichever session is primary next.
    Retry,
    /// Final answer for the caller.
    Fail(CoordinatorError),
}

fn retryable(error: &RpcError) -> bool {
    !matches!(error, RpcError::Server { .. })
}

/// Wallet-facing handle to the server pool.
pub struct NetworkCoordinator {
    config: Arc<CoordinatorConfig>,
    chain: Arc<ChainStoreService>,
    verifier: ProofVerifier,
    inbox: mpsc::Sender<Inbound>,
    primary: watch::Receiver<Option<RoutedSession>>,
    status: watch::Receiver<PoolSnapshot>,
    proof_cache: Arc<Mutex<ProofCache>>,
    addresses: broadcast::Sender<AddressStatus>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkCoordinator {
    /// Spawn the decision loop and return its handle.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        config: CoordinatorConfig,
        chain: Arc<ChainStoreService>,
        connector: Arc<dyn SessionConnector>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        let config = Arc::new(config);
        let best = chain.best_chain();

        let (inbox_tx, inbox_rx) = mpsc::channel(config.inbox_capacity.max(1));
        let (primary_tx, primary_rx) = watch::channel(None);
        let (status_tx, status_rx) =
            watch::channel(PoolSnapshot::bootstrapping(best.height, best.tip_hash));
        let (addresses, _) = broadcast::channel(ADDRESS_BUFFER);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let proof_cache = Arc::new(Mutex::new(ProofCache::new(config.proof_cache_size)));

        let outputs = LoopOutputs {
            primary: primary_tx,
            status: status_tx,
            proof_cache: proof_cache.clone(),
            addresses: addresses.clone(),
        };
        let decision_loop = DecisionLoop::new(
            config.clone(),
            chain.clone(),
            connector,
            events,
            (inbox_tx.clone(), inbox_rx),
            outputs,
        );
        let task = tokio::spawn(decision_loop.run(shutdown_rx));

        Self {
            config,
            chain,
            verifier: ProofVerifier::new(),
            inbox: inbox_tx,
            primary: primary_rx,
            status: status_rx,
            proof_cache,
            addresses,
            shutdown,
            task: Mutex::new(Some(task)),
        }
    }

    /// The chain store the pool feeds.
    pub fn chain(&self) -> &Arc<ChainStoreService> {
        &self.chain
    }

    /// Current primary server.
    pub fn primary(&self) -> Option<ServerEndpoint> {
        self.primary
            .borrow()
            .as_ref()
            .map(|routed| routed.session.endpoint().clone())
    }

    /// Receiver that sees every snapshot change.
    pub fn watch_status(&self) -> watch::Receiver<PoolSnapshot> {
        self.status.clone()
    }

    /// Wait until a snapshot satisfies `predicate`.
    pub async fn wait_for<F>(&self, mut predicate: F, deadline: Instant) -> Result<PoolSnapshot, CoordinatorError>
    where
        F: FnMut(&PoolSnapshot) -> bool,
    {
        let mut status = self.status.clone();
        let outcome = match timeout_at(deadline, status.wait_for(|snapshot| predicate(snapshot))).await {
            Ok(Ok(snapshot)) => Ok(snapshot.clone()),
            Ok(Err(_)) => Err(CoordinatorError::Stopped),
            Err(_) => Err(CoordinatorError::Timeout("waiting for pool status")),
        };
        outcome
    }

    /// Stop the decision loop and close every session.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    fn request_timeout(&self, deadline: Instant) -> Duration {
        deadline
            .saturating_duration_since(Instant::now())
            .min(self.config.fetch_timeout)
    }

    /// The primary, waiting for one to be elected. Fails fast with
    /// `NoConnectivity` once the pool is offline; a deadline passing while
    /// sessions are still syncing is a `Timeout`.
    async fn wait_primary(&self, deadline: Instant) -> Result<RoutedSession, CoordinatorError> {
        let mut primary = self.primary.clone();
        let mut status = self.status.clone();
        let wait = async {
            loop {
                let current = primary.borrow_and_update().clone();
                if let Some(routed) = current {
                    if !routed.session.is_closed() {
                        return Ok(routed);
                    }
                }
                if status.borrow_and_update().status == PoolStatus::Offline {
                    return Err(CoordinatorError::NoConnectivity);
                }
                tokio::select! {
                    changed = primary.changed() => changed.map_err(|_| CoordinatorError::Stopped)?,
                    changed = status.changed() => changed.map_err(|_| CoordinatorError::Stopped)?,
                }
            }
        };
        timeout_at(deadline, wait)
            .await
            .unwrap_or(Err(CoordinatorError::Timeout("waiting for a primary")))
    }

    async fn offer(
        &self,
        key: SessionKey,
        start: u64,
        headers: Vec<BlockHeader>,
    ) -> Result<OfferReport, CoordinatorError> {
        let (reply, report) = oneshot::channel();
        let headers = headers.into_iter().zip(start..).collect();
        self.inbox
            .send(Inbound::Offer {
                source: Some(key),
                headers,
                reply,
            })
            .await
            .map_err(|_| CoordinatorError::Stopped)?;
        report.await.map_err(|_| CoordinatorError::Stopped)
    }

    fn penalize(&self, key: SessionKey, penalty: Penalty) {
        // Dropped when the loop is saturated; the answer was rejected anyway.
        let _ = self.inbox.try_send(Inbound::Penalize { key, penalty });
    }

    async fn fetch_header(&self, height: u64, deadline: Instant) -> Result<BlockHeader, CoordinatorError> {
        loop {
            if let Some(header) = self.chain.header_at(height) {
                return Ok(header);
            }
            let best = self.chain.height();
            if height <= best {
                return Err(CoordinatorError::HeaderUnavailable { height });
            }

            let routed = self.wait_primary(deadline).await?;
            match self.fetch_range(&routed, best + 1, height, deadline).await {
                Ok(0) => {
                    return self
                        .chain
                        .header_at(height)
                        .ok_or(CoordinatorError::HeaderUnavailable { height })
                }
                Ok(_) | Err(Attempt::Retry) => continue,
                Err(Attempt::Fail(error)) => return Err(error),
            }
        }
    }

    /// Fetch `from..=to` from the primary in chunks and offer each chunk.
    /// Returns the number of headers stored.
    async fn fetch_range(
        &self,
        routed: &RoutedSession,
        from: u64,
        to: u64,
        deadline: Instant,
    ) -> Result<usize, Attempt> {
        let chunk = u64::from(self.config.header_chunk.max(1));
        let mut next = from;
        let mut stored = 0;

        while next <= to {
            let count = (to - next + 1).min(chunk) as u32;
            let fetched = {
                let _permit = routed.permits.acquire().await.map_err(|_| Attempt::Retry)?;
                routed
                    .session
                    .block_headers(next, count, self.request_timeout(deadline))
                    .await
            };
            let headers = match fetched {
                Ok(headers) => headers,
                Err(error) if retryable(&error) => return Err(Attempt::Retry),
                Err(_) => return Err(Attempt::Fail(CoordinatorError::HeaderUnavailable { height: to })),
            };
            if headers.is_empty() {
                break;
            }

            let served = headers.len() as u64;
            let report = self
                .offer(routed.key, next, headers)
                .await
                .map_err(Attempt::Fail)?;
            stored += report.stored;
            if report.rejected.is_some() {
                // The loop banned the source.
                return Err(Attempt::Retry);
            }
            if report.deferred {
                return Err(Attempt::Fail(CoordinatorError::HeaderUnavailable {
                    height: next + report.stored as u64,
                }));
            }
            if report.unconnected {
                break;
            }
            next += served;
        }
        Ok(stored)
    }

    async fn prove(&self, tx_id: Hash256, height: u64, deadline: Instant) -> Result<ProofResult, CoordinatorError> {
        let cached = self.proof_cache.lock().get(&tx_id, height, self.chain.height());
        if let Some(result) = cached {
            debug!(%tx_id, height, "Proof served from cache");
            return Ok(result);
        }
        if self.chain.header_at(height).is_none() {
            self.fetch_header(height, deadline).await?;
        }

        loop {
            let routed = self.wait_primary(deadline).await?;
            let response = {
                let Ok(_permit) = routed.permits.acquire().await else {
                    continue;
                };
                routed
                    .session
                    .get_merkle(tx_id, height, self.request_timeout(deadline))
                    .await
            };
            return match response {
                Ok(response) => self.check(&routed, tx_id, height, response),
                Err(error) if retryable(&error) => continue,
                Err(error) => {
                    debug!(%tx_id, height, %error, "Server has no proof");
                    metrics::record_proof(false);
                    Err(CoordinatorError::InclusionNotProven { tx_id, height })
                }
            };
        }
    }

    fn check(
        &self,
        routed: &RoutedSession,
        tx_id: Hash256,
        height: u64,
        response: MerkleResponse,
    ) -> Result<ProofResult, CoordinatorError> {
        let not_proven = CoordinatorError::InclusionNotProven { tx_id, height };
        if response.block_height != height {
            warn!(
                endpoint = %routed.session.endpoint(),
                %tx_id,
                height,
                served_height = response.block_height,
                "Proof for a different height"
            );
            self.penalize(routed.key, Penalty::InconsistentClaim);
            metrics::record_proof(false);
            return Err(not_proven);
        }

        let request = ProofRequest {
            tx_id,
            claimed_height: height,
        };
        let branch = MerkleBranch {
            branch: response.branch,
            position: response.position,
        };
        match self.verifier.check(self.chain.as_ref(), &request, &branch) {
            Ok(result) if result.included => {
                metrics::record_proof(true);
                self.proof_cache.lock().insert(tx_id, height, result);
                Ok(result)
            }
            Ok(_) => {
                warn!(
                    endpoint = %routed.session.endpoint(),
                    %tx_id,
                    height,
                    "Branch does not reach the merkle root"
                );
                self.penalize(routed.key, Penalty::InconsistentClaim);
                metrics::record_proof(false);
                Err(not_proven)
            }
            Err(failure) => {
                debug!(%tx_id, height, %failure, "Proof rejected");
                metrics::record_proof(false);
                Err(CoordinatorError::from_proof(failure, tx_id, height))
            }
        }
    }
}

#[async_trait]
impl WalletNetworkApi for NetworkCoordinator {
    async fn get_header(&self, height: u64, deadline: Instant) -> Result<BlockHeader, CoordinatorError> {
        timeout_at(deadline, self.fetch_header(height, deadline))
            .await
            .unwrap_or(Err(CoordinatorError::Timeout("fetching a header")))
    }

    async fn get_merkle_proof(
        &self,
        tx_id: Hash256,
        height: u64,
        deadline: Instant,
    ) -> Result<ProofResult, CoordinatorError> {
        timeout_at(deadline, self.prove(tx_id, height, deadline))
            .await
            .unwrap_or(Err(CoordinatorError::Timeout("proving inclusion")))
    }

    async fn subscribe_address(&self, script_hash: &str) -> Result<AddressSubscription, CoordinatorError> {
        let receiver = self.addresses.subscribe();
        let (reply, known) = oneshot::channel();
        self.inbox
            .send(Inbound::WatchAddress {
                script_hash: script_hash.to_string(),
                reply,
            })
            .await
            .map_err(|_| CoordinatorError::Stopped)?;
        let known = known.await.map_err(|_| CoordinatorError::Stopped)?;
        Ok(AddressSubscription::new(script_hash.to_string(), known, receiver))
    }

    fn status(&self) -> PoolSnapshot {
        self.status.borrow().clone()
    }
}
