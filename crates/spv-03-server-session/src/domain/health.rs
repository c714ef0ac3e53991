//! # Health Scoring
//!
//! Suspicion rises with timeouts, malformed messages, dropped connections and
//! contradicted claims, and falls slowly with successful responses. Crossing
//! the threshold demotes the session until a cooldown elapses; a proven liar
//! stays at the ceiling for good.

use std::time::{Duration, Instant};

use crate::config::HealthConfig;

/// Kinds of misbehaviour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Penalty {
    /// Request deadline expired.
    Timeout,
    /// Unparseable or out-of-protocol message.
    Malformed,
    /// Data contradicting validated headers.
    InconsistentClaim,
    /// Connection dropped.
    Disconnected,
}

/// Suspicion state of one server.
#[derive(Clone, Debug)]
pub struct HealthScore {
    config: HealthConfig,
    suspicion: u32,
    degraded_since: Option<Instant>,
    liar: bool,
}

impl HealthScore {
    /// Fresh score with zero suspicion.
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            suspicion: 0,
            degraded_since: None,
            liar: false,
        }
    }

    /// Current suspicion (higher is worse).
    pub fn suspicion(&self) -> u32 {
        self.suspicion
    }

    /// True once the server was caught lying.
    pub fn is_liar(&self) -> bool {
        self.liar
    }

    /// A successful response.
    pub fn record_success(&mut self) {
        if !self.liar {
            self.suspicion = self.suspicion.saturating_sub(self.config.success_reward);
        }
    }

    /// A failure of the given kind.
    pub fn record_failure(&mut self, penalty: Penalty, now: Instant) {
        let amount = match penalty {
            Penalty::Timeout => self.config.timeout_penalty,
            Penalty::Malformed => self.config.malformed_penalty,
            Penalty::InconsistentClaim => self.config.inconsistency_penalty,
            Penalty::Disconnected => self.config.disconnect_penalty,
        };
        self.suspicion = self
            .suspicion
            .saturating_add(amount)
            .min(self.config.max_suspicion);
        if self.suspicion >= self.config.degrade_threshold && self.degraded_since.is_none() {
            self.degraded_since = Some(now);
        }
    }

    /// Claim could not be validated against proof-of-work linked headers.
    pub fn mark_liar(&mut self, now: Instant) {
        self.liar = true;
        self.suspicion = self.config.max_suspicion;
        self.degraded_since.get_or_insert(now);
    }

    /// End the demotion if the cooldown has elapsed.
    ///
    /// A recovered session restarts halfway to the threshold, so a single
    /// further failure of the heavier kinds demotes it again.
    pub fn refresh(&mut self, now: Instant) {
        if self.liar {
            return;
        }
        if let Some(since) = self.degraded_since {
            if now.saturating_duration_since(since) >= self.config.cooldown {
                self.degraded_since = None;
                self.suspicion = self.suspicion.min(self.config.degrade_threshold / 2);
            }
        }
    }

    /// True while demoted.
    pub fn is_degraded(&self) -> bool {
        self.liar || self.degraded_since.is_some()
    }

    /// Remaining demotion time, if demoted and not a liar.
    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        if self.liar {
            return None;
        }
        self.degraded_since
            .map(|since| self.config.cooldown.saturating_sub(now.saturating_duration_since(since)))
    }
}

/// Exponentially weighted round-trip estimate.
#[derive(Clone, Copy, Debug)]
pub struct LatencyEstimate {
    alpha: f64,
    ewma: Option<Duration>,
}

impl LatencyEstimate {
    /// Empty estimate; `alpha` is the weight of each new sample.
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            ewma: None,
        }
    }

    /// Fold in one round-trip sample.
    pub fn observe(&mut self, sample: Duration) {
        self.ewma = Some(match self.ewma {
            None => sample,
            Some(current) => {
                let blended = self.alpha * sample.as_secs_f64()
                    + (1.0 - self.alpha) * current.as_secs_f64();
                Duration::from_secs_f64(blended)
            }
        });
    }

    /// Current estimate, `None` before the first sample.
    pub fn get(&self) -> Option<Duration> {
        self.ewma
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score() -> HealthScore {
        HealthScore::new(HealthConfig::default())
    }

    #[test]
    fn test_success_lowers_suspicion() {
        let mut score = score();
        let now = Instant::now();
        score.record_failure(Penalty::Timeout, now);
        assert_eq!(score.suspicion(), 10);
        score.record_success();
        assert_eq!(score.suspicion(), 9);
    }

    #[test]
    fn test_success_never_underflows() {
        let mut score = score();
        score.record_success();
        assert_eq!(score.suspicion(), 0);
    }

    #[test]
    fn test_threshold_demotes() {
        let mut score = score();
        let now = Instant::now();
        for _ in 0..4 {
            score.record_failure(Penalty::Timeout, now);
        }
        assert!(!score.is_degraded());
        score.record_failure(Penalty::Timeout, now);
        assert!(score.is_degraded());
    }

    #[test]
    fn test_cooldown_restores() {
        let mut score = score();
        let start = Instant::now();
        score.record_failure(Penalty::Malformed, start);
        assert!(score.is_degraded());

        score.refresh(start + Duration::from_secs(10));
        assert!(score.is_degraded());
        assert!(score.cooldown_remaining(start + Duration::from_secs(10)).is_some());

        score.refresh(start + Duration::from_secs(301));
        assert!(!score.is_degraded());
        assert_eq!(score.suspicion(), 25);
    }

    #[test]
    fn test_liar_never_recovers() {
        let mut score = score();
        let start = Instant::now();
        score.mark_liar(start);
        score.refresh(start + Duration::from_secs(100_000));
        score.record_success();
        assert!(score.is_degraded());
        assert!(score.is_liar());
        assert_eq!(score.suspicion(), 100);
    }

    #[test]
    fn test_suspicion_capped() {
        let mut score = score();
        let now = Instant::now();
        for _ in 0..10 {
            score.record_failure(Penalty::Malformed, now);
        }
        assert_eq!(score.suspicion(), 100);
    }

    #[test]
    fn test_latency_ewma() {
        let mut latency = LatencyEstimate::new(0.5);
        assert!(latency.get().is_none());
        latency.observe(Duration::from_millis(100));
        assert_eq!(latency.get(), Some(Duration::from_millis(100)));
        latency.observe(Duration::from_millis(300));
        let estimate = latency.get().unwrap().as_millis();
        assert!((199..=201).contains(&estimate));
    }
}
