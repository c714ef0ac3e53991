//! # Decision Loop
//!
//! The single task that owns the pool. Connect results, tip announcements,
//! fetched headers and caller reports all arrive on one inbox, so every
//! decision (accept, ban, elect, reconnect) is taken in one place and in
//! arrival order.
//!
//! ```text
//! sessions ──TipAnnounced──┐
//! catch-up ──Offer─────────┤
//! callers  ──Offer/Penalize┼──► inbox ──► DecisionLoop ──► ChainStore
//! connector──Connected─────┘                 │
//!                                            ├──► primary (watch)
//!                                            ├──► status  (watch)
//!                                            └──► SpvEvent (bus)
//! ```

use parking_lot::Mutex;
use shared_bus::{EventPublisher, SpvEvent};
use shared_types::{BlockHeader, Hash256};
use spv_01_chain_store::{
    AcceptOutcome, ChainStoreApi, ChainStoreService, RejectReason, ReorgEvent,
};
use spv_03_server_session::{
    ClaimedTip, ConnectError, HealthScore, Notification, Penalty, ServerEndpoint, ServerSession,
    SessionState, Topic,
};
use spv_telemetry::{log_header_event, log_pool_event, log_session_event};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::StreamExt;
use tracing::debug;

use super::addresses::AddressStatus;
use super::catch_up::{CatchUp, CatchUpError};
use super::messages::{Inbound, OfferReport, SessionKey};
use crate::config::CoordinatorConfig;
use crate::domain::{
    choose_primary, next_status, Backoff, Candidate, OrphanPool, PoolSnapshot, PoolStatus,
    ProofCache, StatusInputs,
};
use crate::metrics;

/// The primary as handed to callers: the session plus its admission permits.
#[derive(Clone)]
pub(crate) struct RoutedSession {
    pub key: SessionKey,
    pub session: ServerSession,
    pub permits: Arc<Semaphore>,
}

enum Link {
    Idle { retry_at: Instant },
    Connecting { generation: u64 },
    Up(Box<Live>),
    Banned,
}

struct Live {
    generation: u64,
    session: ServerSession,
    permits: Arc<Semaphore>,
    tasks: Vec<JoinHandle<()>>,
}

impl Live {
    fn shut_down(self) -> HealthScore {
        self.permits.close();
        for task in self.tasks {
            task.abort();
        }
        self.session.close();
        self.session.health()
    }
}

struct Slot {
    endpoint: ServerEndpoint,
    health: HealthScore,
    backoff: Backoff,
    link: Link,
    validated: Option<Hash256>,
    catching_up: bool,
    pending_tip: Option<ClaimedTip>,
    /// Tip whose headers were ahead of the local clock, and when to retry it.
    deferred: Option<(ClaimedTip, Instant)>,
    clock_penalized: bool,
    published_score: Option<u32>,
}

impl Slot {
    fn live(&self, key: SessionKey) -> Option<&Live> {
        match &self.link {
            Link::Up(live) if live.generation == key.generation => Some(live),
            _ => None,
        }
    }

    fn live_mut(&mut self, key: SessionKey) -> Option<&mut Live> {
        match &mut self.link {
            Link::Up(live) if live.generation == key.generation => Some(live),
            _ => None,
        }
    }

    fn suspicion(&self) -> u32 {
        match &self.link {
            Link::Up(live) => live.session.suspicion(),
            _ => self.health.suspicion(),
        }
    }

    fn live_key(&self, index: usize) -> Option<SessionKey> {
        match &self.link {
            Link::Up(live) => Some(SessionKey {
                slot: index,
                generation: live.generation,
            }),
            _ => None,
        }
    }

    fn set_validated(&mut self, hash: Hash256) {
        self.validated = Some(hash);
        self.deferred = None;
        self.clock_penalized = false;
    }

    fn forget_tips(&mut self) {
        self.validated = None;
        self.catching_up = false;
        self.pending_tip = None;
        self.deferred = None;
        self.clock_penalized = false;
    }
}

/// Channels the loop publishes on and the handle reads from.
pub(crate) struct LoopOutputs {
    pub primary: watch::Sender<Option<RoutedSession>>,
    pub status: watch::Sender<PoolSnapshot>,
    pub proof_cache: Arc<Mutex<ProofCache>>,
    pub addresses: broadcast::Sender<AddressStatus>,
}

pub(crate) struct DecisionLoop {
    config: Arc<CoordinatorConfig>,
    chain: Arc<ChainStoreService>,
    connector: Arc<dyn crate::ports::SessionConnector>,
    events: Arc<dyn EventPublisher>,
    inbox_tx: mpsc::Sender<Inbound>,
    inbox: mpsc::Receiver<Inbound>,
    slots: Vec<Slot>,
    primary: Option<SessionKey>,
    outputs: LoopOutputs,
    status: PoolStatus,
    orphans: OrphanPool,
    watched: HashMap<String, Option<Option<String>>>,
    address_tasks: Vec<JoinHandle<()>>,
    next_generation: u64,
    best_tip: Hash256,
    reorged: bool,
    outbox: Vec<SpvEvent>,
}

impl DecisionLoop {
    pub fn new(
        config: Arc<CoordinatorConfig>,
        chain: Arc<ChainStoreService>,
        connector: Arc<dyn crate::ports::SessionConnector>,
        events: Arc<dyn EventPublisher>,
        inbox: (mpsc::Sender<Inbound>, mpsc::Receiver<Inbound>),
        outputs: LoopOutputs,
    ) -> Self {
        let now = Instant::now();
        let slots = config
            .servers
            .iter()
            .map(|endpoint| Slot {
                endpoint: endpoint.clone(),
                health: HealthScore::new(config.session.health.clone()),
                backoff: Backoff::new(config.backoff.clone()),
                link: Link::Idle { retry_at: now },
                validated: None,
                catching_up: false,
                pending_tip: None,
                deferred: None,
                clock_penalized: false,
                published_score: None,
            })
            .collect();
        let best_tip = chain.best_chain().tip_hash;
        let orphans = OrphanPool::new(config.orphan_capacity, config.orphan_ttl);

        Self {
            config,
            chain,
            connector,
            events,
            inbox_tx: inbox.0,
            inbox: inbox.1,
            slots,
            primary: None,
            outputs,
            status: PoolStatus::Bootstrapping,
            orphans,
            watched: HashMap::new(),
            address_tasks: Vec::new(),
            next_generation: 0,
            best_tip,
            reorged: false,
            outbox: Vec::new(),
        }
    }

    /// Run until `shutdown` flips to true or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        log_pool_event!(info, "Network coordinator started", servers = self.slots.len());
        let mut tick = tokio::time::interval(self.config.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tick.tick() => self.on_tick(),
                Some(message) = self.inbox.recv() => self.handle(message),
            }
            self.settle().await;
        }

        self.stop_all();
        log_pool_event!(info, "Network coordinator stopped");
    }

    fn handle(&mut self, message: Inbound) {
        match message {
            Inbound::Connected { key, result } => self.on_connected(key, result),
            Inbound::Closed { key } => self.on_closed(key),
            Inbound::TipAnnounced { key, tip } => self.on_tip(key, tip),
            Inbound::AddressStatus {
                key,
                script_hash,
                status,
            } => self.on_address_status(key, script_hash, status),
            Inbound::Offer {
                source,
                headers,
                reply,
            } => {
                let report = self.accept_batch(source, headers);
                let _ = reply.send(report);
            }
            Inbound::CatchUpFinished { key, tip, result } => {
                self.on_catch_up_finished(key, tip, result)
            }
            Inbound::Penalize { key, penalty } => {
                if let Some(live) = self.slot(key.slot).and_then(|s| s.live(key)) {
                    log_session_event!(debug, live.session.endpoint(), "Penalized", ?penalty);
                    live.session.penalize(penalty);
                }
            }
            Inbound::WatchAddress { script_hash, reply } => self.on_watch(script_hash, reply),
        }
    }

    fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    fn live_session(&self, key: SessionKey) -> Option<ServerSession> {
        self.slot(key.slot)
            .and_then(|slot| slot.live(key))
            .map(|live| live.session.clone())
    }

    // -------------------------------------------------------------------------
    // Connections
    // -------------------------------------------------------------------------

    fn on_tick(&mut self) {
        let expired = self.orphans.expire(std::time::Instant::now());
        if expired > 0 {
            debug!(expired, "Orphan headers expired");
        }

        let now = Instant::now();
        let active = self
            .slots
            .iter()
            .filter(|slot| matches!(slot.link, Link::Up(_) | Link::Connecting { .. }))
            .count();
        let mut budget = self.config.target_sessions.saturating_sub(active);
        for index in 0..self.slots.len() {
            if budget == 0 {
                break;
            }
            if matches!(self.slots[index].link, Link::Idle { retry_at } if retry_at <= now) {
                self.start_connect(index);
                budget -= 1;
            }
        }

        let due: Vec<(SessionKey, ClaimedTip)> = self
            .slots
            .iter_mut()
            .enumerate()
            .filter(|(_, slot)| !slot.catching_up)
            .filter(|(_, slot)| matches!(slot.deferred, Some((_, retry_at)) if retry_at <= now))
            .filter_map(|(index, slot)| {
                let key = slot.live_key(index)?;
                slot.deferred.take().map(|(tip, _)| (key, tip))
            })
            .collect();
        for (key, tip) in due {
            self.validate_tip(key, tip);
        }
    }

    fn start_connect(&mut self, index: usize) {
        self.next_generation += 1;
        let key = SessionKey {
            slot: index,
            generation: self.next_generation,
        };
        let slot = &mut self.slots[index];
        slot.link = Link::Connecting {
            generation: key.generation,
        };
        log_session_event!(debug, slot.endpoint, "Connecting", generation = key.generation);

        let connector = self.connector.clone();
        let endpoint = slot.endpoint.clone();
        let health = slot.health.clone();
        let session_config = self.config.session.clone();
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            let result = connector.connect(&endpoint, &session_config, health).await;
            let _ = inbox.send(Inbound::Connected { key, result }).await;
        });
    }

    fn on_connected(&mut self, key: SessionKey, result: Result<ServerSession, ConnectError>) {
        let Some(slot) = self.slots.get_mut(key.slot) else {
            return;
        };
        if !matches!(slot.link, Link::Connecting { generation } if generation == key.generation) {
            if let Ok(session) = result {
                session.close();
            }
            return;
        }

        match result {
            Ok(session) => {
                slot.backoff.reset();
                if let Some((software, protocol)) = session.server_version() {
                    log_session_event!(info, slot.endpoint, "Session connected", %software, %protocol);
                }
                let permits = Arc::new(Semaphore::new(self.config.max_in_flight_per_session.max(1)));
                let forwarder = tokio::spawn(forward_headers(key, session.clone(), self.inbox_tx.clone()));
                slot.link = Link::Up(Box::new(Live {
                    generation: key.generation,
                    session,
                    permits,
                    tasks: vec![forwarder],
                }));
            }
            Err(error) => {
                slot.health
                    .record_failure(Penalty::Disconnected, std::time::Instant::now());
                let delay = slot.backoff.next_delay();
                log_session_event!(warn, slot.endpoint, "Connect failed", %error, retry_in = ?delay);
                slot.link = Link::Idle {
                    retry_at: Instant::now() + delay,
                };
            }
        }
    }

    fn on_closed(&mut self, key: SessionKey) {
        let Some(slot) = self.slots.get_mut(key.slot) else {
            return;
        };
        if slot.live(key).is_none() {
            return;
        }
        let delay = slot.backoff.next_delay();
        let previous = std::mem::replace(
            &mut slot.link,
            Link::Idle {
                retry_at: Instant::now() + delay,
            },
        );
        if let Link::Up(live) = previous {
            let mut health = live.shut_down();
            health.record_failure(Penalty::Disconnected, std::time::Instant::now());
            slot.health = health;
        }
        slot.forget_tips();
        log_session_event!(warn, slot.endpoint, "Session lost", retry_in = ?delay);
    }

    /// Permanently drop a server that made a claim its own headers cannot
    /// back.
    fn ban(&mut self, key: SessionKey, reason: &str) {
        let Some(slot) = self.slots.get_mut(key.slot) else {
            return;
        };
        let Some(live) = slot.live(key) else {
            return;
        };
        live.session.mark_liar();
        if let Link::Up(live) = std::mem::replace(&mut slot.link, Link::Banned) {
            slot.health = live.shut_down();
        }
        slot.forget_tips();
        log_session_event!(warn, slot.endpoint, "Server banned", reason);
        metrics::record_server_banned();
    }

    fn stop_all(&mut self) {
        for task in self.address_tasks.drain(..) {
            task.abort();
        }
        for slot in &mut self.slots {
            if let Link::Up(live) = std::mem::replace(&mut slot.link, Link::Banned) {
                slot.health = live.shut_down();
            }
        }
        self.outputs.primary.send_replace(None);
    }

    // -------------------------------------------------------------------------
    // Tips and headers
    // -------------------------------------------------------------------------

    fn on_tip(&mut self, key: SessionKey, tip: ClaimedTip) {
        let Some(slot) = self.slots.get_mut(key.slot) else {
            return;
        };
        if slot.live(key).is_none() {
            return;
        }
        log_header_event!(debug, tip.height, tip.hash, "Tip announced", endpoint = %slot.endpoint);
        // A newer announcement supersedes a tip waiting on the clock.
        slot.deferred = None;
        if slot.catching_up {
            slot.pending_tip = Some(tip);
            return;
        }
        self.validate_tip(key, tip);
    }

    fn validate_tip(&mut self, key: SessionKey, tip: ClaimedTip) {
        if let Some(height) = self.chain.height_of(&tip.hash) {
            if height == tip.height {
                self.slots[key.slot].set_validated(tip.hash);
            } else {
                self.ban(key, "announced height contradicts the stored header");
            }
            return;
        }

        if self.chain.contains(&tip.header.prev_hash) {
            let report = self.accept_batch(Some(key), vec![(tip.header, tip.height)]);
            if report.deferred {
                self.defer(key, tip);
            } else if report.rejected.is_none() && self.chain.contains(&tip.hash) {
                self.slots[key.slot].set_validated(tip.hash);
            }
            return;
        }

        self.orphans.insert(
            tip.header,
            Some(tip.height),
            Some(key.slot),
            std::time::Instant::now(),
        );
        self.spawn_catch_up(key, tip);
    }

    fn spawn_catch_up(&mut self, key: SessionKey, tip: ClaimedTip) {
        let job = {
            let Some(live) = self.slot(key.slot).and_then(|s| s.live(key)) else {
                return;
            };
            CatchUp {
                key,
                session: live.session.clone(),
                chain: self.chain.clone(),
                inbox: self.inbox_tx.clone(),
                tip,
                chunk: self.config.header_chunk.max(1),
                timeout: self.config.fetch_timeout,
            }
        };
        let slot = &mut self.slots[key.slot];
        log_header_event!(info, tip.height, tip.hash, "Catching up to announced tip", endpoint = %slot.endpoint);
        slot.catching_up = true;
        if let Some(live) = slot.live_mut(key) {
            live.tasks.retain(|task| !task.is_finished());
            live.tasks.push(tokio::spawn(job.run()));
        }
    }

    fn on_catch_up_finished(
        &mut self,
        key: SessionKey,
        tip: ClaimedTip,
        result: Result<(), CatchUpError>,
    ) {
        let Some(slot) = self.slots.get_mut(key.slot) else {
            return;
        };
        if slot.live(key).is_none() {
            return;
        }
        slot.catching_up = false;
        let superseded = slot.pending_tip.is_some();

        match result {
            Ok(()) if self.chain.height_of(&tip.hash) == Some(tip.height) => {
                slot.set_validated(tip.hash);
            }
            Ok(()) if superseded => {
                // The server moved on while we fetched; judge the newer tip.
                if let Some(live) = slot.live(key) {
                    live.session.penalize(Penalty::InconsistentClaim);
                }
            }
            Ok(()) => self.ban(key, "served chain does not contain the announced tip"),
            Err(CatchUpError::AheadOfClock { .. }) => self.defer(key, tip),
            Err(error) if error.is_unverifiable_claim() => {
                let reason = error.to_string();
                self.ban(key, &reason);
            }
            Err(error) => {
                log_session_event!(debug, slot.endpoint, "Catch-up abandoned", %error);
            }
        }

        let next = self
            .slots
            .get_mut(key.slot)
            .filter(|slot| slot.live(key).is_some())
            .and_then(|slot| slot.pending_tip.take());
        if let Some(next) = next {
            self.validate_tip(key, next);
        }
    }

    /// Park `tip` until the local clock may have caught up with its headers.
    fn defer(&mut self, key: SessionKey, tip: ClaimedTip) {
        let retry_in = self.config.clock_retry;
        let Some(slot) = self.slots.get_mut(key.slot) else {
            return;
        };
        if slot.live(key).is_none() {
            return;
        }
        log_header_event!(debug, tip.height, tip.hash, "Tip deferred", endpoint = %slot.endpoint, ?retry_in);
        slot.deferred = Some((tip, Instant::now() + retry_in));
    }

    /// Hold a session responsible for a header the store refused.
    ///
    /// A header dated ahead of our clock may be honest: it costs one
    /// inconsistency until the session's next tip validates. Anything else
    /// is a ban.
    fn blame(&mut self, key: SessionKey, reason: &RejectReason) {
        if !reason.is_clock_dependent() {
            self.ban(key, &reason.to_string());
            return;
        }
        let Some(slot) = self.slots.get_mut(key.slot) else {
            return;
        };
        if slot.clock_penalized {
            return;
        }
        if let Some(live) = slot.live(key) {
            live.session.penalize(Penalty::InconsistentClaim);
            slot.clock_penalized = true;
            log_session_event!(warn, slot.endpoint, "Header ahead of local clock", %reason);
        }
    }

    /// Feed headers to the chain store in order.
    ///
    /// Stops at the first header that does not connect (buffered as an
    /// orphan), that is dated ahead of the local clock (retried later), or
    /// that breaks a rule (the source is banned).
    fn accept_batch(&mut self, source: Option<SessionKey>, headers: Vec<(BlockHeader, u64)>) -> OfferReport {
        let mut report = OfferReport::default();

        for (header, height) in headers {
            let result = self.chain.accept(header, Some(height));
            if let Some(reorg) = result.reorg {
                self.on_reorg(reorg);
            }
            match result.outcome {
                AcceptOutcome::Rejected(RejectReason::UnknownParent(_)) => {
                    self.orphans.insert(
                        header,
                        Some(height),
                        source.map(|key| key.slot),
                        std::time::Instant::now(),
                    );
                    report.unconnected = true;
                    break;
                }
                AcceptOutcome::Rejected(reason) => {
                    metrics::record_header_rejected(&reason);
                    if reason.is_clock_dependent() {
                        report.deferred = true;
                    } else {
                        report.rejected = Some(reason);
                    }
                    if let Some(key) = source {
                        self.blame(key, &reason);
                    }
                    break;
                }
                AcceptOutcome::AlreadyKnown => {}
                _ => {
                    report.stored += 1;
                    self.adopt_orphans(header.hash());
                }
            }
        }

        metrics::record_headers_accepted(report.stored as u64);
        self.note_best_tip();
        report
    }

    /// Retry buffered headers whose parent just arrived.
    ///
    /// A buffered header that now breaks a rule is blamed on the server that
    /// sent it, if that server is still connected.
    fn adopt_orphans(&mut self, parent: Hash256) {
        let mut parents = vec![parent];
        while let Some(parent) = parents.pop() {
            for orphan in self.orphans.take_children(&parent) {
                let hash = orphan.header.hash();
                let result = self.chain.accept(orphan.header, orphan.height_hint);
                if let Some(reorg) = result.reorg {
                    self.on_reorg(reorg);
                }
                match result.outcome {
                    AcceptOutcome::Rejected(reason) => {
                        metrics::record_header_rejected(&reason);
                        log_header_event!(
                            debug,
                            orphan.height_hint.unwrap_or_default(),
                            hash,
                            "Buffered header rejected",
                            %reason
                        );
                        let key = orphan
                            .source
                            .and_then(|index| self.slots.get(index)?.live_key(index));
                        if let Some(key) = key {
                            self.blame(key, &reason);
                        }
                    }
                    _ => {
                        metrics::record_headers_accepted(1);
                        parents.push(hash);
                    }
                }
            }
        }
    }

    fn on_reorg(&mut self, reorg: ReorgEvent) {
        let invalidated = self
            .outputs
            .proof_cache
            .lock()
            .invalidate_above(reorg.common_ancestor_height);
        log_header_event!(
            warn,
            reorg.common_ancestor_height,
            reorg.new_tip,
            "Chain reorganized",
            old_tip = %reorg.old_tip,
            invalidated_proofs = invalidated
        );
        metrics::record_reorg();
        self.reorged = true;
        self.outbox.push(SpvEvent::Reorg {
            common_ancestor_height: reorg.common_ancestor_height,
            old_tip: reorg.old_tip,
            new_tip: reorg.new_tip,
        });
    }

    fn note_best_tip(&mut self) {
        let best = self.chain.best_chain();
        if best.tip_hash == self.best_tip {
            return;
        }
        self.best_tip = best.tip_hash;
        log_header_event!(info, best.height, best.tip_hash, "New best tip");
        metrics::set_best_height(best.height);
        self.outbox.push(SpvEvent::NewTip {
            height: best.height,
            hash: best.tip_hash,
        });
    }

    // -------------------------------------------------------------------------
    // Addresses
    // -------------------------------------------------------------------------

    fn on_watch(&mut self, script_hash: String, reply: oneshot::Sender<Option<Option<String>>>) {
        if let Some(known) = self.watched.get(&script_hash) {
            let _ = reply.send(known.clone());
            return;
        }
        self.watched.insert(script_hash.clone(), None);
        if let Some(key) = self.primary {
            if let Some(session) = self.live_session(key) {
                let task = tokio::spawn(forward_address(key, session, script_hash, self.inbox_tx.clone()));
                self.address_tasks.push(task);
            }
        }
        let _ = reply.send(None);
    }

    fn on_address_status(&mut self, key: SessionKey, script_hash: String, status: Option<String>) {
        if self.primary != Some(key) {
            return;
        }
        let Some(known) = self.watched.get_mut(&script_hash) else {
            return;
        };
        if known.as_ref() == Some(&status) {
            return;
        }
        *known = Some(status.clone());
        let _ = self.outputs.addresses.send(AddressStatus {
            script_hash,
            status,
        });
    }

    // -------------------------------------------------------------------------
    // After every event
    // -------------------------------------------------------------------------

    async fn settle(&mut self) {
        self.reelect();
        self.track_health();
        self.update_status();

        for event in std::mem::take(&mut self.outbox) {
            self.events.publish(event).await;
        }
    }

    fn candidates(&self) -> Vec<Candidate> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                let (eligible, suspicion, latency) = match &slot.link {
                    Link::Up(live) => (
                        live.session.state() == SessionState::Ready,
                        live.session.suspicion(),
                        live.session.latency(),
                    ),
                    _ => (false, slot.health.suspicion(), None),
                };
                let validated = slot
                    .validated
                    .and_then(|hash| self.chain.cumulative_work(&hash).map(|work| (hash, work)));
                Candidate {
                    slot: index,
                    host: slot.endpoint.host.clone(),
                    eligible,
                    validated,
                    suspicion,
                    latency,
                }
            })
            .collect()
    }

    fn reelect(&mut self) {
        let candidates = self.candidates();
        let chosen = choose_primary(self.primary.map(|key| key.slot), &candidates).and_then(|index| {
            match &self.slots[index].link {
                Link::Up(live) => Some(SessionKey {
                    slot: index,
                    generation: live.generation,
                }),
                _ => None,
            }
        });
        if chosen != self.primary {
            self.switch_primary(chosen);
        }
    }

    fn switch_primary(&mut self, next: Option<SessionKey>) {
        for task in self.address_tasks.drain(..) {
            task.abort();
        }
        let previous = std::mem::replace(&mut self.primary, next);

        let routed = next.and_then(|key| {
            let live = self.slots[key.slot].live(key)?;
            Some(RoutedSession {
                key,
                session: live.session.clone(),
                permits: live.permits.clone(),
            })
        });
        let Some(routed) = routed else {
            self.primary = None;
            self.outputs.primary.send_replace(None);
            if previous.is_some() {
                log_pool_event!(warn, "No eligible primary");
            }
            return;
        };

        if let Some(previous) = previous {
            metrics::record_failover();
            log_session_event!(
                warn,
                routed.session.endpoint(),
                "Primary changed",
                previous = %self.slots[previous.slot].endpoint
            );
        } else {
            log_session_event!(info, routed.session.endpoint(), "Primary elected");
        }

        for script_hash in self.watched.keys() {
            let task = tokio::spawn(forward_address(
                routed.key,
                routed.session.clone(),
                script_hash.clone(),
                self.inbox_tx.clone(),
            ));
            self.address_tasks.push(task);
        }
        self.outputs.primary.send_replace(Some(routed));
    }

    fn track_health(&mut self) {
        for slot in &mut self.slots {
            let score = slot.suspicion();
            if slot.published_score != Some(score) {
                slot.published_score = Some(score);
                self.outbox.push(SpvEvent::ServerHealthChanged {
                    endpoint: slot.endpoint.to_string(),
                    score,
                });
            }
        }
    }

    fn update_status(&mut self) {
        let connected = self
            .slots
            .iter()
            .filter(|slot| matches!(slot.link, Link::Up(_)))
            .count();
        let connecting = self
            .slots
            .iter()
            .filter(|slot| matches!(slot.link, Link::Connecting { .. }))
            .count();
        let banned = self
            .slots
            .iter()
            .filter(|slot| matches!(slot.link, Link::Banned))
            .count();
        let validating = self.slots.iter().any(|slot| slot.catching_up) || std::mem::take(&mut self.reorged);
        let best = self.chain.best_chain();
        let primary_at_best = self
            .primary
            .map(|key| self.slots[key.slot].validated == Some(best.tip_hash))
            .unwrap_or(false);

        let status = next_status(
            self.status,
            StatusInputs {
                connected,
                connecting,
                validating,
                primary_at_best,
            },
        );
        if status != self.status {
            log_pool_event!(info, "Pool status changed", from = %self.status, to = %status);
            self.status = status;
        }
        metrics::set_sessions_connected(connected);

        let snapshot = PoolSnapshot {
            status,
            primary: self.primary.map(|key| self.slots[key.slot].endpoint.to_string()),
            connected,
            banned,
            best_height: best.height,
            best_hash: best.tip_hash,
        };
        self.outputs.status.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

/// Forward a session's tip announcements, then report the session gone.
async fn forward_headers(key: SessionKey, session: ServerSession, inbox: mpsc::Sender<Inbound>) {
    match session.subscribe(Topic::Headers).await {
        Ok(mut stream) => {
            while let Some(notification) = stream.next().await {
                if let Notification::HeadersTip(tip) = notification {
                    if inbox.send(Inbound::TipAnnounced { key, tip }).await.is_err() {
                        return;
                    }
                }
            }
        }
        Err(error) => {
            log_session_event!(debug, session.endpoint(), "Headers subscription failed", %error);
        }
    }
    session.close();
    let _ = inbox.send(Inbound::Closed { key }).await;
}

/// Forward status changes of one script hash from the primary.
async fn forward_address(
    key: SessionKey,
    session: ServerSession,
    script_hash: String,
    inbox: mpsc::Sender<Inbound>,
) {
    let mut stream = match session.subscribe(Topic::ScriptHash(script_hash.clone())).await {
        Ok(stream) => stream,
        Err(error) => {
            log_session_event!(debug, session.endpoint(), "Address subscription failed", %error, %script_hash);
            return;
        }
    };
    while let Some(notification) = stream.next().await {
        if let Notification::ScriptHashStatus {
            script_hash,
            status,
        } = notification
        {
            let message = Inbound::AddressStatus {
                key,
                script_hash,
                status,
            };
            if inbox.send(message).await.is_err() {
                return;
            }
        }
    }
}
