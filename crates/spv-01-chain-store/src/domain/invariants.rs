//! # Domain Invariants
//!
//! Properties every reachable store state satisfies. Checked by tests and by
//! `HeaderFile::load_into` after a restore.

use super::store::ChainStore;

/// Invariant: every main-chain header links to its predecessor.
pub fn invariant_main_linked(store: &ChainStore) -> bool {
    let mut previous = None;
    for header in store.main_headers_from(store.root_height()) {
        if let Some(prev_hash) = previous {
            if header.prev_hash != prev_hash {
                return false;
            }
        }
        previous = Some(header.hash());
    }
    true
}

/// Invariant: no retained fork has more work than the main chain.
pub fn invariant_main_heaviest(store: &ChainStore) -> bool {
    let main_work = store.best_chain().work;
    store.forks().iter().all(|fork| fork.work <= main_work)
}

/// Invariant: every retained fork walks back through stored headers to the
/// main-chain header at its recorded fork point.
pub fn invariant_forks_linked(store: &ChainStore) -> bool {
    store.forks().iter().all(|fork| {
        let Some(fork_point) = fork.fork_point else {
            return false;
        };
        let mut cursor = store.entry(&fork.tip_hash);
        while let Some(entry) = cursor {
            if store.is_on_main_chain(&entry.hash) {
                return entry.height == fork_point;
            }
            cursor = store.entry(&entry.header.prev_hash);
        }
        false
    })
}

/// Invariant: every checkpoint the main chain has reached is on it.
pub fn invariant_checkpoints_held(store: &ChainStore) -> bool {
    store
        .params()
        .checkpoints
        .iter()
        .filter(|cp| cp.height <= store.height())
        .all(|cp| store.hash_at(cp.height).map_or(true, |hash| hash == cp.hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChainStoreConfig, Checkpoint};
    use crate::domain::entities::AcceptOutcome;
    use crate::ports::FixedTimeSource;
    use crate::testing::mine_chain;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn test_invariants_hold_on_fresh_store() {
        let store = ChainStore::new(
            ChainStoreConfig::for_testing(),
            Arc::new(FixedTimeSource::far_future()),
        );
        assert!(invariant_main_linked(&store));
        assert!(invariant_main_heaviest(&store));
        assert!(invariant_forks_linked(&store));
        assert!(invariant_checkpoints_held(&store));
    }

    #[test]
    fn test_forks_linked_across_reorg() {
        let mut store = ChainStore::new(
            ChainStoreConfig::for_testing(),
            Arc::new(FixedTimeSource::far_future()),
        );
        let genesis = store.params().genesis;
        let trunk = mine_chain(&genesis, 6, 0);
        for header in &trunk {
            store.accept(*header, None);
        }
        // An early side branch, then a heavier branch that takes over.
        for header in mine_chain(&trunk[1], 2, 1) {
            store.accept(header, None);
        }
        for header in mine_chain(&trunk[3], 4, 2) {
            store.accept(header, None);
        }

        assert_eq!(store.height(), 8);
        assert_eq!(store.fork_count(), 2);
        assert!(invariant_forks_linked(&store));
        let mut points: Vec<Option<u64>> = store.forks().iter().map(|f| f.fork_point).collect();
        points.sort();
        assert_eq!(points, vec![Some(2), Some(4)]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        /// Best-chain work never decreases under any accept order.
        #[test]
        fn prop_best_work_monotonic(
            branches in prop::collection::vec((0usize..6, 1usize..5), 1..6),
            order_seed in any::<u64>(),
        ) {
            let mut store = ChainStore::new(
                ChainStoreConfig::for_testing(),
                Arc::new(FixedTimeSource::far_future()),
            );
            let genesis = store.params().genesis;
            let trunk = mine_chain(&genesis, 6, 0);

            let mut headers = trunk.clone();
            for (i, (base, len)) in branches.iter().enumerate() {
                headers.extend(mine_chain(&trunk[*base], *len, i as u32 + 1));
            }

            // Deterministic shuffle; unknown parents are simply rejected.
            let mut seed = order_seed;
            for i in (1..headers.len()).rev() {
                seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
                headers.swap(i, (seed >> 33) as usize % (i + 1));
            }

            let mut best = store.best_chain().work;
            for header in headers {
                store.accept(header, None);
                let now = store.best_chain().work;
                prop_assert!(now >= best);
                best = now;
                prop_assert!(invariant_main_linked(&store));
                prop_assert!(invariant_main_heaviest(&store));
                prop_assert!(invariant_forks_linked(&store));
            }
        }

        /// Once the main chain has passed a checkpoint, no header at or below
        /// its height that differs from main is ever stored.
        #[test]
        fn prop_checkpoint_immutable(
            branches in prop::collection::vec((0usize..4, 1usize..5), 1..6),
        ) {
            let genesis = ChainStoreConfig::for_testing().params.genesis;
            let trunk = mine_chain(&genesis, 5, 0);
            let mut config = ChainStoreConfig::for_testing();
            config.params.checkpoints = vec![Checkpoint {
                height: 3,
                hash: trunk[2].hash(),
            }];
            let mut store = ChainStore::new(config, Arc::new(FixedTimeSource::far_future()));
            for header in &trunk {
                prop_assert_eq!(store.accept(*header, None).outcome, AcceptOutcome::ExtendedMain);
            }

            for (i, (base, len)) in branches.iter().enumerate() {
                let parent = if *base == 0 { genesis } else { trunk[*base - 1] };
                let branch = mine_chain(&parent, *len, i as u32 + 1);
                for (offset, header) in branch.into_iter().enumerate() {
                    let height = (*base + offset + 1) as u64;
                    let outcome = store.accept(header, None).outcome;
                    if height <= 3 {
                        prop_assert!(matches!(outcome, AcceptOutcome::Rejected(_)), "{:?}", outcome);
                    }
                }
            }

            prop_assert_eq!(store.hash_at(3), Some(trunk[2].hash()));
            prop_assert!(invariant_checkpoints_held(&store));
            prop_assert!(invariant_forks_linked(&store));
        }
    }
}
