//! # Chain Store
//!
//! Arena of headers keyed by hash plus lightweight chain records. Each chain
//! holds only its tip, fork point and cumulative work; header walks are
//! reconstructed from `prev_hash` links when needed. The main chain is also
//! indexed by height for constant-time `header_at`.

use primitive_types::U256;
use shared_types::{BlockHeader, Hash256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use super::entities::{
    AcceptOutcome, AcceptResult, ChainMeta, ChainSnapshot, ForkId, HeaderEntry, ReorgEvent,
};
use super::errors::{ChainStoreError, RejectReason};
use crate::algorithms::{
    block_proof, compact_to_u256, hash_meets_target, median_time_past, retarget, u256_to_compact,
};
use crate::config::{ChainParams, ChainStoreConfig};
use crate::ports::TimeSource;

/// Main chain plus competing forks.
pub struct ChainStore {
    config: ChainStoreConfig,
    clock: Arc<dyn TimeSource>,
    arena: HashMap<Hash256, HeaderEntry>,
    main: ChainMeta,
    /// Non-main chains keyed by tip hash.
    forks: HashMap<Hash256, ChainMeta>,
    /// `main_index[i]` is the main-chain hash at `root_height + i`.
    main_index: Vec<Hash256>,
    root_height: u64,
    next_fork_id: u64,
    next_seq: u64,
}

impl ChainStore {
    /// Create a store rooted at the network's genesis header.
    pub fn new(config: ChainStoreConfig, clock: Arc<dyn TimeSource>) -> Self {
        let genesis = config.params.genesis;
        Self::rooted(config, clock, genesis, 0)
    }

    /// Create a store rooted at a trusted header other than genesis.
    ///
    /// On retargeting networks the root must open a difficulty period so the
    /// first retarget inside the store can be recomputed.
    pub fn with_root(
        config: ChainStoreConfig,
        clock: Arc<dyn TimeSource>,
        root: BlockHeader,
        height: u64,
    ) -> Result<Self, ChainStoreError> {
        let interval = config.params.retarget_interval;
        if !config.params.no_retargeting && height % interval != 0 {
            return Err(ChainStoreError::MisalignedRoot { height, interval });
        }
        Ok(Self::rooted(config, clock, root, height))
    }

    fn rooted(
        config: ChainStoreConfig,
        clock: Arc<dyn TimeSource>,
        root: BlockHeader,
        height: u64,
    ) -> Self {
        let hash = root.hash();
        let work = compact_to_u256(root.bits)
            .map(block_proof)
            .unwrap_or_default();
        let entry = HeaderEntry {
            header: root,
            hash,
            height,
            chain_work: work,
        };
        let mut arena = HashMap::new();
        arena.insert(hash, entry);

        Self {
            config,
            clock,
            arena,
            main: ChainMeta {
                id: ForkId(0),
                tip: hash,
                height,
                fork_point: height,
                work,
                created_seq: 0,
            },
            forks: HashMap::new(),
            main_index: vec![hash],
            root_height: height,
            next_fork_id: 1,
            next_seq: 1,
        }
    }

    /// Consensus parameters in force.
    pub fn params(&self) -> &ChainParams {
        &self.config.params
    }

    /// Full configuration.
    pub fn config(&self) -> &ChainStoreConfig {
        &self.config
    }

    /// Validate and store one header.
    ///
    /// `height_hint` is the height the source claims for the header; when
    /// present it must agree with the parent linkage.
    pub fn accept(&mut self, header: BlockHeader, height_hint: Option<u64>) -> AcceptResult {
        let hash = header.hash();
        if self.arena.contains_key(&hash) {
            return AcceptResult::plain(AcceptOutcome::AlreadyKnown);
        }

        let params = &self.config.params;
        let target = match compact_to_u256(header.bits) {
            Ok(t) if !t.is_zero() && t <= params.pow_limit => t,
            _ => return AcceptResult::rejected(RejectReason::InvalidTarget { bits: header.bits }),
        };
        if !hash_meets_target(&hash, target) {
            return AcceptResult::rejected(RejectReason::InsufficientProofOfWork);
        }

        let parent = match self.arena.get(&header.prev_hash) {
            Some(parent) => parent.clone(),
            None => return AcceptResult::rejected(RejectReason::UnknownParent(header.prev_hash)),
        };
        let height = parent.height + 1;

        if let Some(hinted) = height_hint {
            if hinted != height {
                return AcceptResult::rejected(RejectReason::HeightMismatch {
                    hinted,
                    linked: height,
                });
            }
        }

        if let Some(expected) = params.checkpoint_at(height) {
            if expected != hash {
                return AcceptResult::rejected(RejectReason::CheckpointMismatch { height });
            }
        }

        let expected_bits = self.expected_bits(&parent, height);
        if expected_bits != header.bits {
            return AcceptResult::rejected(RejectReason::UnexpectedDifficulty {
                expected: expected_bits,
                got: header.bits,
            });
        }

        if let Err(reason) = self.check_timestamp(&parent, header.timestamp) {
            return AcceptResult::rejected(reason);
        }

        // Where would this header sit?
        let extends_main = header.prev_hash == self.main.tip;
        let fork_point = if extends_main {
            None
        } else if let Some(meta) = self.forks.get(&header.prev_hash) {
            Some(meta.fork_point)
        } else {
            Some(self.common_ancestor_height(&parent))
        };

        if let Some(fork_point) = fork_point {
            if let Some(checkpoint) = self.passed_checkpoint() {
                if fork_point < checkpoint {
                    return AcceptResult::rejected(RejectReason::ForkBelowCheckpoint {
                        height,
                        checkpoint,
                    });
                }
            }
        }

        let chain_work = parent.chain_work.saturating_add(block_proof(target));
        self.arena.insert(
            hash,
            HeaderEntry {
                header,
                hash,
                height,
                chain_work,
            },
        );

        let outcome = if extends_main {
            self.main.tip = hash;
            self.main.height = height;
            self.main.work = chain_work;
            self.main_index.push(hash);
            AcceptOutcome::ExtendedMain
        } else if let Some(mut meta) = self.forks.remove(&header.prev_hash) {
            meta.tip = hash;
            meta.height = height;
            meta.work = chain_work;
            let id = meta.id;
            self.forks.insert(hash, meta);
            AcceptOutcome::ExtendedFork(id)
        } else {
            let id = ForkId(self.next_fork_id);
            self.next_fork_id += 1;
            let meta = ChainMeta {
                id,
                tip: hash,
                height,
                fork_point: fork_point.unwrap_or(parent.height),
                work: chain_work,
                created_seq: self.next_seq,
            };
            self.next_seq += 1;
            self.forks.insert(hash, meta);
            debug!(%id, height, fork_point = parent.height, "Fork started");
            AcceptOutcome::StartedFork(id)
        };

        let reorg = if extends_main {
            None
        } else {
            self.maybe_reorg(hash)
        };
        self.prune();

        AcceptResult { outcome, reorg }
    }

    /// The chain with the most cumulative work.
    pub fn best_chain(&self) -> ChainSnapshot {
        self.main.snapshot(true)
    }

    /// Main chain tip height.
    pub fn height(&self) -> u64 {
        self.main.height
    }

    /// Lowest stored height.
    pub fn root_height(&self) -> u64 {
        self.root_height
    }

    /// Hash of the root header.
    pub fn root_hash(&self) -> Hash256 {
        self.main_index.first().copied().unwrap_or_default()
    }

    /// Main-chain header at `height`.
    pub fn header_at(&self, height: u64) -> Option<BlockHeader> {
        self.hash_at(height)
            .and_then(|hash| self.arena.get(&hash))
            .map(|entry| entry.header)
    }

    /// Main-chain hash at `height`.
    pub fn hash_at(&self, height: u64) -> Option<Hash256> {
        let index = height.checked_sub(self.root_height)?;
        self.main_index.get(usize::try_from(index).ok()?).copied()
    }

    /// Cumulative work up to and including the header with this hash.
    pub fn cumulative_work(&self, hash: &Hash256) -> Option<U256> {
        self.arena.get(hash).map(|entry| entry.chain_work)
    }

    /// Stored entry for any known header.
    pub fn entry(&self, hash: &Hash256) -> Option<&HeaderEntry> {
        self.arena.get(hash)
    }

    /// True if the header is stored on any chain.
    pub fn contains(&self, hash: &Hash256) -> bool {
        self.arena.contains_key(hash)
    }

    /// True if the header is part of the main chain.
    pub fn is_on_main_chain(&self, hash: &Hash256) -> bool {
        self.arena
            .get(hash)
            .is_some_and(|entry| on_main(&self.main_index, self.root_height, entry))
    }

    /// Snapshots of all retained forks, heaviest first.
    pub fn forks(&self) -> Vec<ChainSnapshot> {
        let mut forks: Vec<ChainSnapshot> =
            self.forks.values().map(|meta| meta.snapshot(false)).collect();
        forks.sort_by(|a, b| b.work.cmp(&a.work));
        forks
    }

    /// Number of retained forks.
    pub fn fork_count(&self) -> usize {
        self.forks.len()
    }

    /// Number of stored headers across all chains.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Always false: the root is never removed.
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Main-chain headers from `from_height` (inclusive) to the tip.
    pub fn main_headers_from(&self, from_height: u64) -> impl Iterator<Item = &BlockHeader> + '_ {
        let start = from_height.saturating_sub(self.root_height) as usize;
        self.main_index
            .iter()
            .skip(start)
            .filter_map(|hash| self.arena.get(hash).map(|entry| &entry.header))
    }

    fn expected_bits(&self, parent: &HeaderEntry, height: u64) -> u32 {
        let params = &self.config.params;
        if !params.is_retarget_height(height) {
            return parent.header.bits;
        }

        let first_height = height - params.retarget_interval;
        let Some(first) = self.ancestor(parent, first_height) else {
            return parent.header.bits;
        };
        let Ok(previous) = compact_to_u256(parent.header.bits) else {
            return parent.header.bits;
        };

        let actual = i64::from(parent.header.timestamp) - i64::from(first.header.timestamp);
        let next = retarget(
            previous,
            u64::try_from(actual).unwrap_or(0),
            params.target_timespan,
            params.pow_limit,
        );
        u256_to_compact(next)
    }

    fn check_timestamp(&self, parent: &HeaderEntry, timestamp: u32) -> Result<(), RejectReason> {
        let params = &self.config.params;

        let mut window = Vec::with_capacity(params.median_time_span);
        let mut cursor = Some(parent);
        while let Some(entry) = cursor {
            if window.len() == params.median_time_span {
                break;
            }
            window.push(entry.header.timestamp);
            cursor = self.arena.get(&entry.header.prev_hash);
        }

        if let Some(median) = median_time_past(&window) {
            if timestamp <= median {
                return Err(RejectReason::TimestampTooOld { timestamp, median });
            }
        }

        let limit = self.clock.now().saturating_add(params.max_future_drift);
        if u64::from(timestamp) > limit {
            return Err(RejectReason::TimestampTooFarInFuture { timestamp, limit });
        }
        Ok(())
    }

    /// Ancestor of `from` at `height`, following `prev_hash` links.
    fn ancestor<'a>(&'a self, from: &'a HeaderEntry, height: u64) -> Option<&'a HeaderEntry> {
        let mut cursor = from;
        while cursor.height > height {
            if on_main(&self.main_index, self.root_height, cursor) {
                return self.hash_at(height).and_then(|hash| self.arena.get(&hash));
            }
            cursor = self.arena.get(&cursor.header.prev_hash)?;
        }
        (cursor.height == height).then_some(cursor)
    }

    /// Height of the last main-chain header in the ancestry of `entry`.
    fn common_ancestor_height(&self, entry: &HeaderEntry) -> u64 {
        let mut cursor = entry;
        loop {
            if on_main(&self.main_index, self.root_height, cursor) {
                return cursor.height;
            }
            match self.arena.get(&cursor.header.prev_hash) {
                Some(parent) => cursor = parent,
                None => return self.root_height,
            }
        }
    }

    /// Highest checkpoint the main chain has reached.
    fn passed_checkpoint(&self) -> Option<u64> {
        self.config
            .params
            .highest_checkpoint_at_or_below(self.main.height)
    }

    fn maybe_reorg(&mut self, fork_tip: Hash256) -> Option<ReorgEvent> {
        let fork_work = self.forks.get(&fork_tip)?.work;
        // Equal work keeps the current main chain.
        if fork_work <= self.main.work {
            return None;
        }

        let mut new_main = self.forks.remove(&fork_tip)?;
        let ancestor = new_main.fork_point;

        // Collect the branch from the new tip down to the common ancestor.
        let mut branch = Vec::new();
        let mut cursor = self.arena.get(&fork_tip);
        while let Some(entry) = cursor {
            if entry.height <= ancestor {
                break;
            }
            branch.push(entry.hash);
            cursor = self.arena.get(&entry.header.prev_hash);
        }
        branch.reverse();

        let keep = (ancestor - self.root_height + 1) as usize;
        self.main_index.truncate(keep);
        self.main_index.extend(branch);

        new_main.fork_point = self.root_height;
        let mut old_main = std::mem::replace(&mut self.main, new_main);
        old_main.fork_point = ancestor;
        let event = ReorgEvent {
            common_ancestor_height: ancestor,
            old_tip: old_main.tip,
            new_tip: self.main.tip,
        };
        self.forks.insert(old_main.tip, old_main);

        // Fork points are relative to main; recompute them all.
        let tips: Vec<Hash256> = self.forks.keys().copied().collect();
        for tip in tips {
            let fork_point = self
                .arena
                .get(&tip)
                .map(|entry| self.common_ancestor_height(entry));
            if let (Some(fork_point), Some(meta)) = (fork_point, self.forks.get_mut(&tip)) {
                meta.fork_point = fork_point;
            }
        }

        info!(
            common_ancestor_height = event.common_ancestor_height,
            old_tip = %event.old_tip,
            new_tip = %event.new_tip,
            height = self.main.height,
            "Chain reorganization"
        );
        Some(event)
    }

    fn prune(&mut self) {
        let main_height = self.main.height;
        let depth = self.config.fork_prune_depth;
        let checkpoint = self.passed_checkpoint();

        let mut doomed: Vec<Hash256> = self
            .forks
            .values()
            .filter(|meta| {
                meta.fork_point.saturating_add(depth) < main_height
                    || checkpoint.is_some_and(|cp| meta.fork_point < cp)
            })
            .map(|meta| meta.tip)
            .collect();

        let surviving = self.forks.len() - doomed.len();
        if surviving > self.config.max_forks_retained {
            let mut ranked: Vec<&ChainMeta> = self
                .forks
                .values()
                .filter(|meta| !doomed.contains(&meta.tip))
                .collect();
            ranked.sort_by(|a, b| a.work.cmp(&b.work).then(a.created_seq.cmp(&b.created_seq)));
            let excess = surviving - self.config.max_forks_retained;
            doomed.extend(ranked.iter().take(excess).map(|meta| meta.tip));
        }

        if doomed.is_empty() {
            return;
        }

        for tip in &doomed {
            if let Some(meta) = self.forks.remove(tip) {
                debug!(id = %meta.id, fork_point = meta.fork_point, "Fork pruned");
            }
        }
        self.collect_garbage();
    }

    /// Drop arena entries that are on neither main nor a retained fork.
    fn collect_garbage(&mut self) {
        let mut keep = HashSet::new();
        for tip in self.forks.keys() {
            let mut cursor = self.arena.get(tip);
            while let Some(entry) = cursor {
                if on_main(&self.main_index, self.root_height, entry) || !keep.insert(entry.hash) {
                    break;
                }
                cursor = self.arena.get(&entry.header.prev_hash);
            }
        }

        let main_index = &self.main_index;
        let root_height = self.root_height;
        self.arena
            .retain(|hash, entry| keep.contains(hash) || on_main(main_index, root_height, entry));
    }
}

fn on_main(main_index: &[Hash256], root_height: u64, entry: &HeaderEntry) -> bool {
    entry
        .height
        .checked_sub(root_height)
        .and_then(|index| main_index.get(index as usize))
        .is_some_and(|hash| *hash == entry.hash)
}
