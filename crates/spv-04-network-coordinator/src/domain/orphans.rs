//! # Orphan Pool
//!
//! Headers whose parent is not stored yet. Bounded in count and age; when
//! full, the oldest entry is evicted.

use shared_types::{BlockHeader, Hash256};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// A buffered header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Orphan {
    /// The header.
    pub header: BlockHeader,
    /// Height the server gave for it.
    pub height_hint: Option<u64>,
    /// Pool slot of the server that offered it.
    pub source: Option<usize>,
    received: Instant,
}

/// Bounded, time-limited buffer of unconnected headers.
#[derive(Debug)]
pub struct OrphanPool {
    capacity: usize,
    ttl: Duration,
    by_hash: HashMap<Hash256, Orphan>,
    /// Insertion order, for eviction and expiry.
    order: VecDeque<Hash256>,
}

impl OrphanPool {
    /// Empty pool.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            by_hash: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Buffer a header. Returns false if it was already buffered or the pool
    /// has no capacity at all.
    pub fn insert(
        &mut self,
        header: BlockHeader,
        height_hint: Option<u64>,
        source: Option<usize>,
        now: Instant,
    ) -> bool {
        if self.capacity == 0 {
            return false;
        }
        let hash = header.hash();
        if self.by_hash.contains_key(&hash) {
            return false;
        }
        while self.by_hash.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.by_hash.remove(&oldest);
                }
                None => break,
            }
        }
        self.by_hash.insert(
            hash,
            Orphan {
                header,
                height_hint,
                source,
                received: now,
            },
        );
        self.order.push_back(hash);
        true
    }

    /// Remove and return every orphan whose parent is `parent`.
    pub fn take_children(&mut self, parent: &Hash256) -> Vec<Orphan> {
        let children: Vec<Hash256> = self
            .by_hash
            .iter()
            .filter(|(_, orphan)| orphan.header.prev_hash == *parent)
            .map(|(hash, _)| *hash)
            .collect();
        if children.is_empty() {
            return Vec::new();
        }
        self.order.retain(|hash| !children.contains(hash));
        children
            .iter()
            .filter_map(|hash| self.by_hash.remove(hash))
            .collect()
    }

    /// Drop orphans older than the TTL. Returns how many were dropped.
    pub fn expire(&mut self, now: Instant) -> usize {
        let mut dropped = 0;
        while let Some(hash) = self.order.front().copied() {
            let expired = self
                .by_hash
                .get(&hash)
                .map_or(true, |orphan| now.saturating_duration_since(orphan.received) >= self.ttl);
            if !expired {
                break;
            }
            self.order.pop_front();
            if self.by_hash.remove(&hash).is_some() {
                dropped += 1;
            }
        }
        dropped
    }

    /// Buffered headers.
    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    /// True if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    /// True if `hash` is buffered.
    pub fn contains(&self, hash: &Hash256) -> bool {
        self.by_hash.contains_key(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(prev: Hash256, nonce: u32) -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_hash: prev,
            merkle_root: Hash256::ZERO,
            timestamp: 0,
            bits: 0x207f_ffff,
            nonce,
        }
    }

    #[test]
    fn test_take_children() {
        let now = Instant::now();
        let mut pool = OrphanPool::new(8, Duration::from_secs(60));
        let parent = Hash256::new([7; 32]);
        let a = header(parent, 1);
        let b = header(parent, 2);
        let c = header(a.hash(), 3);
        assert!(pool.insert(a, Some(5), Some(0), now));
        assert!(pool.insert(b, None, None, now));
        assert!(pool.insert(c, None, None, now));
        assert!(!pool.insert(a, None, None, now));

        let mut children = pool.take_children(&parent);
        children.sort_by_key(|o| o.header.nonce);
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].height_hint, Some(5));
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(&c.hash()));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let now = Instant::now();
        let mut pool = OrphanPool::new(2, Duration::from_secs(60));
        let first = header(Hash256::ZERO, 1);
        pool.insert(first, None, None, now);
        pool.insert(header(Hash256::ZERO, 2), None, None, now);
        pool.insert(header(Hash256::ZERO, 3), None, None, now);
        assert_eq!(pool.len(), 2);
        assert!(!pool.contains(&first.hash()));
    }

    #[test]
    fn test_expiry() {
        let start = Instant::now();
        let mut pool = OrphanPool::new(8, Duration::from_secs(10));
        pool.insert(header(Hash256::ZERO, 1), None, None, start);
        pool.insert(header(Hash256::ZERO, 2), None, None, start + Duration::from_secs(5));

        assert_eq!(pool.expire(start + Duration::from_secs(9)), 0);
        assert_eq!(pool.expire(start + Duration::from_secs(11)), 1);
        assert_eq!(pool.expire(start + Duration::from_secs(20)), 1);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_zero_capacity() {
        let mut pool = OrphanPool::new(0, Duration::from_secs(1));
        assert!(!pool.insert(header(Hash256::ZERO, 1), None, None, Instant::now()));
        assert!(pool.is_empty());
    }
}
