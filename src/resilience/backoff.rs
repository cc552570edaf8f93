//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Backoff shape shared by retries and the poller's error path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Cap applied before jitter.
    pub max: Duration,
    /// Jitter is drawn from `[0, delay * jitter_factor)`.
    pub jitter_factor: f64,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration, jitter_factor: f64) -> Self {
        Self {
            base,
            max,
            jitter_factor,
        }
    }

    /// `base * 2^attempt`, capped at `max`. Non-decreasing in `attempt`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max)
    }

    /// Capped delay plus random jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        jittered(self.base_delay(attempt), self.jitter_factor)
    }
}

/// Add `[0, delay * factor)` of random jitter to `delay`.
pub fn jittered(delay: Duration, factor: f64) -> Duration {
    let jitter_range = delay.mul_f64(factor.max(0.0)).as_millis() as u64;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    delay + Duration::from_millis(jitter)
}
