//! # Primary Election
//!
//! Ranking among eligible sessions with a validated tip:
//!
//! 1. greatest cumulative work of the validated tip
//! 2. lowest suspicion
//! 3. lowest latency (unknown latency ranks last)
//! 4. lowest slot, for determinism
//!
//! A sitting primary is only replaced by a healthy rival when the rival's tip
//! carries strictly more work and a session on a different host has
//! validated the same tip.

use shared_types::{Hash256, U256};
use std::cmp::Ordering;
use std::time::Duration;

/// What the election needs to know about one session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    /// Pool slot.
    pub slot: usize,
    /// Server host, for corroboration.
    pub host: String,
    /// Connected, not degraded, not a liar.
    pub eligible: bool,
    /// Tip accepted into the chain store, with its cumulative work.
    pub validated: Option<(Hash256, U256)>,
    /// Current suspicion.
    pub suspicion: u32,
    /// Round-trip estimate.
    pub latency: Option<Duration>,
}

impl Candidate {
    fn work(&self) -> U256 {
        self.validated.map(|(_, work)| work).unwrap_or_default()
    }

    fn is_electable(&self) -> bool {
        self.eligible && self.validated.is_some()
    }
}

/// Best-first ordering of two electable candidates.
fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.work()
        .cmp(&a.work())
        .then(a.suspicion.cmp(&b.suspicion))
        .then_with(|| match (a.latency, b.latency) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then(a.slot.cmp(&b.slot))
}

/// Best candidate, ignoring any sitting primary.
pub fn elect(candidates: &[Candidate]) -> Option<usize> {
    candidates
        .iter()
        .filter(|c| c.is_electable())
        .min_by(|a, b| rank(a, b))
        .map(|c| c.slot)
}

/// True if another electable session on a different host validated the same
/// tip as `rival`.
pub fn is_corroborated(rival: &Candidate, candidates: &[Candidate]) -> bool {
    let Some((tip, _)) = rival.validated else {
        return false;
    };
    candidates.iter().any(|c| {
        c.slot != rival.slot
            && c.eligible
            && c.host != rival.host
            && c.validated.map(|(hash, _)| hash) == Some(tip)
    })
}

/// The primary after this round.
///
/// Elects from scratch when there is no primary or the sitting one is no
/// longer electable.
pub fn choose_primary(current: Option<usize>, candidates: &[Candidate]) -> Option<usize> {
    let sitting = current.and_then(|slot| {
        candidates
            .iter()
            .find(|c| c.slot == slot && c.is_electable())
    });
    let Some(sitting) = sitting else {
        return elect(candidates);
    };

    let best = candidates
        .iter()
        .filter(|c| c.is_electable() && c.slot != sitting.slot)
        .min_by(|a, b| rank(a, b));
    match best {
        Some(rival) if rival.work() > sitting.work() && is_corroborated(rival, candidates) => {
            Some(rival.slot)
        }
        _ => Some(sitting.slot),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(slot: usize, host: &str, tip: u8, work: u64, suspicion: u32) -> Candidate {
        Candidate {
            slot,
            host: host.to_string(),
            eligible: true,
            validated: Some((Hash256::new([tip; 32]), U256::from(work))),
            suspicion,
            latency: Some(Duration::from_millis(100)),
        }
    }

    #[test]
    fn test_elect_by_work_then_suspicion_then_latency() {
        let mut pool = vec![
            candidate(0, "a", 1, 10, 0),
            candidate(1, "b", 2, 20, 30),
            candidate(2, "c", 2, 20, 5),
            candidate(3, "d", 2, 20, 5),
        ];
        pool[3].latency = Some(Duration::from_millis(10));
        assert_eq!(elect(&pool), Some(3));

        pool[3].suspicion = 6;
        assert_eq!(elect(&pool), Some(2));
    }

    #[test]
    fn test_unvalidated_and_ineligible_skipped() {
        let mut pool = vec![candidate(0, "a", 1, 50, 0), candidate(1, "b", 2, 10, 0)];
        pool[0].eligible = false;
        assert_eq!(elect(&pool), Some(1));
        pool[1].validated = None;
        assert_eq!(elect(&pool), None);
    }

    #[test]
    fn test_sitting_primary_kept_on_tie() {
        let pool = vec![candidate(0, "a", 1, 10, 20), candidate(1, "b", 1, 10, 0)];
        assert_eq!(choose_primary(Some(0), &pool), Some(0));
    }

    #[test]
    fn test_rival_needs_corroboration() {
        let mut pool = vec![candidate(0, "a", 1, 10, 0), candidate(1, "b", 2, 20, 0)];
        assert_eq!(choose_primary(Some(0), &pool), Some(0));

        // Same host does not count.
        pool.push(candidate(2, "b", 2, 20, 0));
        assert_eq!(choose_primary(Some(0), &pool), Some(0));

        pool.push(candidate(3, "c", 2, 20, 0));
        assert_eq!(choose_primary(Some(0), &pool), Some(1));
    }

    #[test]
    fn test_demoted_primary_replaced_without_corroboration() {
        let mut pool = vec![candidate(0, "a", 1, 10, 0), candidate(1, "b", 2, 5, 0)];
        pool[0].eligible = false;
        assert_eq!(choose_primary(Some(0), &pool), Some(1));
        assert_eq!(choose_primary(None, &pool), Some(1));
    }
}
