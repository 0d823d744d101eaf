//! Exponential backoff for link reconnect attempts

use std::time::Duration;

use wgs_core::config::BackoffConfig;

/// Exponential backoff with jitter between reconnect attempts
pub struct ExponentialBackoff {
    /// Delay the backoff starts from and resets to
    initial: Duration,
    /// Current delay
    current: Duration,
    /// Maximum delay
    max: Duration,
    /// Multiplier
    multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    jitter: f64,
}

impl ExponentialBackoff {
    /// Create a new backoff from configuration
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.initial, config.max, config.multiplier, config.jitter)
    }

    /// Create a new backoff with custom parameters
    pub fn new(initial: Duration, max: Duration, multiplier: f64, jitter: f64) -> Self {
        Self {
            initial,
            current: initial,
            max,
            multiplier,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Get the next delay and advance the backoff.
    ///
    /// A zero initial delay stays zero, so reconnects are issued immediately.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        if delay.is_zero() {
            return delay;
        }

        let next = Duration::from_secs_f64(self.current.as_secs_f64() * self.multiplier);
        self.current = std::cmp::min(next, self.max);

        let jitter_amount = delay.as_secs_f64() * self.jitter * rand::random::<f64>();
        delay + Duration::from_secs_f64(jitter_amount)
    }

    /// Reset to the initial delay after a successful association
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
