//! Capped exponential backoff for failed status fetches.
//!
//! After a failed fetch the poller waits `interval * multiplier` before
//! retrying; every further consecutive failure multiplies the delay
//! again, up to [`BackoffConfig::max_delay`]. A successful fetch resets
//! the sequence.

use std::time::Duration;

/// Default growth factor per consecutive failure.
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Default ceiling, as a multiple of the base poll interval.
pub const DEFAULT_MAX_FACTOR: u32 = 5;

/// Tunable parameters for the backoff strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
}

impl BackoffConfig {
    /// Defaults derived from the base poll interval: doubling, capped at
    /// five intervals.
    pub fn for_interval(interval: Duration) -> Self {
        Self {
            multiplier: DEFAULT_MULTIPLIER,
            max_delay: interval * DEFAULT_MAX_FACTOR,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`BackoffConfig::max_delay`].
pub fn next_delay(current: Duration, config: &BackoffConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Delay before the retry that follows `consecutive_failures` failures in
/// a row (1 for the first failure).
pub fn retry_delay(interval: Duration, consecutive_failures: u32, config: &BackoffConfig) -> Duration {
    let mut delay = interval;
    for _ in 0..consecutive_failures.max(1) {
        let next = next_delay(delay, config);
        // Stop once the cap is hit or the multiplier no longer grows the delay.
        let settled = next >= config.max_delay || next <= delay;
        delay = next;
        if settled {
            break;
        }
    }
    delay
}
