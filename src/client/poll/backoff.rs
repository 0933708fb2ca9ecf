//! Bounded exponential backoff for polling.

use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_BACKOFF_FACTOR: f64 = 0.25;

/// Wait schedule between polls.
///
/// Every field is optional; unset (or zero) durations fall back to the
/// defaults. [`next_interval`](Self::next_interval) advances the schedule, so
/// a policy is a per-poll value: clone it rather than share it between
/// concurrent waits.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BackoffPolicy {
    timeout: Option<Duration>,
    interval: Option<Duration>,
    max_interval: Option<Duration>,
    backoff_factor: Option<f64>,
}

fn non_zero(value: Option<Duration>) -> Option<Duration> {
    value.filter(|d| !d.is_zero())
}

impl BackoffPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total time to keep polling.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// First wait between polls.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Cap on the wait between polls.
    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }

    /// Growth per poll: each wait is the previous one times `1 + factor`.
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = Some(factor);
        self
    }

    pub fn timeout(&self) -> Duration {
        non_zero(self.timeout).unwrap_or(DEFAULT_TIMEOUT)
    }

    pub fn interval(&self) -> Duration {
        non_zero(self.interval).unwrap_or(DEFAULT_INTERVAL)
    }

    pub fn max_interval(&self) -> Duration {
        non_zero(self.max_interval).unwrap_or(DEFAULT_MAX_INTERVAL)
    }

    pub fn backoff_factor(&self) -> f64 {
        self.backoff_factor
            .filter(|f| f.is_finite() && *f >= 0.0)
            .unwrap_or(DEFAULT_BACKOFF_FACTOR)
    }

    /// Return the current wait and grow the stored one, capped at
    /// [`max_interval`](Self::max_interval).
    pub fn next_interval(&mut self) -> Duration {
        let current = self.interval();
        let max = self.max_interval();

        let grown = (current.as_nanos() as f64 * (1.0 + self.backoff_factor())).round();
        let next = if grown >= max.as_nanos() as f64 {
            max
        } else {
            Duration::from_nanos(grown as u64)
        };
        self.interval = Some(next);
        current
    }
}
