//! Retry policy with exponential backoff and jitter
//!
//! Transient API failures (rate limits, 5xx, dropped connections) are
//! retried here and nowhere else: predicates and the lifecycle driver make
//! single round trips and rely on the REST client for backoff.

use rand::Rng;
use std::time::Duration;

/// Backoff configuration for transient failures
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Multiplier applied after each retry
    pub backoff_multiplier: f64,
    /// Whether to randomize delays (0.5x to 1.5x)
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Same attempt budget, but no waiting between attempts.
    ///
    /// Used when replaying: recorded 503s are consumed in order and sleeping
    /// would only slow the test down.
    pub fn without_delay(self) -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
            ..self
        }
    }

    /// Delay before retry number `retry` (0-based), capped at `max_delay`
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = self.backoff_multiplier.powi(retry as i32);
        let base = (self.initial_delay.as_secs_f64() * exp).min(self.max_delay.as_secs_f64());
        if !self.jitter || base == 0.0 {
            return Duration::from_secs_f64(base);
        }
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_secs_f64((base * jitter).min(self.max_delay.as_secs_f64()))
    }
}
