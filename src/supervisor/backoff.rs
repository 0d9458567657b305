//! Restart delay with a health reset.
//!
//! The delay starts at `initial` and doubles after every restart, capped at
//! `max`. A child that stayed up longer than `healthy_after` is considered
//! healthy, so the next delay drops back to `initial`.

use std::time::Duration;

use crate::config::BackoffConfig;

/// Growth factor applied after each restart
pub const FACTOR: u32 = 2;

#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    healthy_after: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, healthy_after: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            healthy_after,
            current: initial,
        }
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.initial(), config.max(), config.healthy_after())
    }

    /// Delay to wait before the next start
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    /// Account for a finished run. Returns true if the delay was reset.
    pub fn record_run(&mut self, elapsed: Duration) -> bool {
        if elapsed > self.healthy_after {
            self.current = self.initial;
            return true;
        }
        false
    }

    /// Grow the delay for the following restart
    pub fn advance(&mut self) {
        self.current = self.current.saturating_mul(FACTOR).min(self.max);
    }
}
