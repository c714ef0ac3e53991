//! # Reconnect Backoff
//!
//! `delay = min(initial * multiplier^(failures-1), max)`, plus a random
//! extra of up to `jitter * delay` so that a pool of clients does not retry
//! in lockstep.

use rand::Rng;
use std::time::Duration;

use crate::config::BackoffConfig;

/// Backoff state for one endpoint.
#[derive(Clone, Debug)]
pub struct Backoff {
    config: BackoffConfig,
    failures: u32,
}

impl Backoff {
    /// No failures yet.
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            failures: 0,
        }
    }

    /// Consecutive failures so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failure and return how long to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let base = self.base_delay();
        let jitter = self.config.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || base.is_zero() {
            return base;
        }
        let extra = rand::thread_rng().gen_range(0.0..=jitter);
        base.mul_f64(1.0 + extra)
    }

    /// A connection succeeded.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    fn base_delay(&self) -> Duration {
        let exponent = self.failures.saturating_sub(1).min(63) as i32;
        let factor = self.config.multiplier.max(1.0).powi(exponent);
        let max = self.config.max.as_secs_f64();
        let secs = (self.config.initial.as_secs_f64() * factor).min(max);
        if secs.is_finite() {
            Duration::from_secs_f64(secs)
        } else {
            self.config.max
        }
    }
}
