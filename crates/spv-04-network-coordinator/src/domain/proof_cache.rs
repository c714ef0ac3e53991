//! # Proof Cache
//!
//! Verified inclusion results keyed by `(tx_id, height)`. Confirmations are
//! recomputed on every hit; a reorg drops every entry above the common
//! ancestor.

use lru::LruCache;
use shared_types::Hash256;
use spv_02_proof_verifier::ProofResult;
use std::num::NonZeroUsize;

/// LRU of proven inclusions.
pub struct ProofCache {
    entries: LruCache<(Hash256, u64), ProofResult>,
}

impl ProofCache {
    /// Cache holding at most `capacity` results (minimum one).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Cached result with confirmations recomputed against `tip_height`.
    pub fn get(&mut self, tx_id: &Hash256, height: u64, tip_height: u64) -> Option<ProofResult> {
        let mut result = *self.entries.get(&(*tx_id, height))?;
        result.confirmations = tip_height.saturating_sub(height) + 1;
        Some(result)
    }

    /// Remember a proven inclusion. Failed proofs are not cached.
    pub fn insert(&mut self, tx_id: Hash256, height: u64, result: ProofResult) {
        if result.included {
            self.entries.put((tx_id, height), result);
        }
    }

    /// Drop every entry strictly above `height`. Returns how many.
    pub fn invalidate_above(&mut self, height: u64) -> usize {
        let stale: Vec<(Hash256, u64)> = self
            .entries
            .iter()
            .filter(|((_, h), _)| *h > height)
            .map(|(key, _)| *key)
            .collect();
        for key in &stale {
            self.entries.pop(key);
        }
        stale.len()
    }

    /// Cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proven(height: u64) -> ProofResult {
        ProofResult {
            included: true,
            matched_header_hash: Hash256::new([height as u8; 32]),
            confirmations: 1,
        }
    }

    #[test]
    fn test_hit_recomputes_confirmations() {
        let mut cache = ProofCache::new(4);
        let tx = Hash256::new([1; 32]);
        cache.insert(tx, 10, proven(10));
        assert_eq!(cache.get(&tx, 10, 15).map(|r| r.confirmations), Some(6));
        assert!(cache.get(&tx, 11, 15).is_none());
    }

    #[test]
    fn test_failed_proofs_not_cached() {
        let mut cache = ProofCache::new(4);
        let mut result = proven(3);
        result.included = false;
        cache.insert(Hash256::ZERO, 3, result);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_above() {
        let mut cache = ProofCache::new(8);
        for height in 1..=6 {
            cache.insert(Hash256::new([height as u8; 32]), height, proven(height));
        }
        assert_eq!(cache.invalidate_above(4), 2);
        assert_eq!(cache.len(), 4);
        assert!(cache.get(&Hash256::new([5; 32]), 5, 10).is_none());
        assert!(cache.get(&Hash256::new([4; 32]), 4, 10).is_some());
    }

    #[test]
    fn test_capacity_bound() {
        let mut cache = ProofCache::new(2);
        for height in 0..5 {
            cache.insert(Hash256::ZERO, height, proven(height));
        }
        assert_eq!(cache.len(), 2);
    }
}
