//! Retry budget for failing reconciles.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Upper bound on the delay between retries of one object.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Retry tracker for failed operations.
///
/// An object may fail `max_retries` times within `window` before it is
/// considered exhausted; exhausted objects wait for the next resync.
#[derive(Debug, Clone)]
pub struct RetryTracker {
    max_retries: u32,
    window: Duration,
    /// key -> (count, first_failure_time)
    failures: BTreeMap<String, (u32, Instant)>,
}

impl RetryTracker {
    pub fn new(max_retries: u32, window: Duration) -> Self {
        Self {
            max_retries,
            window,
            failures: BTreeMap::new(),
        }
    }

    /// Record a failure. Returns true if retries are exhausted.
    pub fn record_failure(&mut self, key: &str) -> bool {
        let now = Instant::now();

        let (count, first) = self.failures.entry(key.to_string()).or_insert((0, now));

        // Reset if outside window
        if now.duration_since(*first) > self.window {
            *count = 0;
            *first = now;
        }

        *count += 1;
        *count > self.max_retries
    }

    pub fn is_exhausted(&self, key: &str) -> bool {
        let Some((count, first)) = self.failures.get(key) else {
            return false;
        };

        if Instant::now().duration_since(*first) > self.window {
            return false;
        }

        *count > self.max_retries
    }

    /// Number of failures recorded in the current window.
    pub fn failures(&self, key: &str) -> u32 {
        self.failures.get(key).map(|(count, _)| *count).unwrap_or(0)
    }

    /// Delay before the next attempt: `base` doubled per recorded failure.
    pub fn backoff(&self, key: &str, base: Duration) -> Duration {
        let exponent = self.failures(key).saturating_sub(1).min(16);
        base.saturating_mul(1 << exponent).min(MAX_BACKOFF)
    }

    /// Clear failure tracking for a key (on success).
    pub fn clear(&mut self, key: &str) {
        self.failures.remove(key);
    }

    /// Prune expired entries.
    pub fn prune(&mut self) {
        let now = Instant::now();
        self.failures
            .retain(|_, (_, first)| now.duration_since(*first) <= self.window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_tracker() {
        let mut tracker = RetryTracker::new(3, Duration::from_secs(60));

        assert!(!tracker.record_failure("widgets/default/w1")); // 1st
        assert!(!tracker.record_failure("widgets/default/w1")); // 2nd
        assert!(!tracker.record_failure("widgets/default/w1")); // 3rd
        assert!(tracker.record_failure("widgets/default/w1")); // 4th - exhausted

        assert!(tracker.is_exhausted("widgets/default/w1"));
        assert!(!tracker.is_exhausted("widgets/default/w2"));

        tracker.clear("widgets/default/w1");
        assert!(!tracker.is_exhausted("widgets/default/w1"));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut tracker = RetryTracker::new(100, Duration::from_secs(600));
        let base = Duration::from_millis(100);

        assert_eq!(tracker.backoff("k", base), base);
        tracker.record_failure("k");
        assert_eq!(tracker.backoff("k", base), base);
        tracker.record_failure("k");
        assert_eq!(tracker.backoff("k", base), Duration::from_millis(200));
        tracker.record_failure("k");
        assert_eq!(tracker.backoff("k", base), Duration::from_millis(400));

        for _ in 0..20 {
            tracker.record_failure("k");
        }
        assert_eq!(tracker.backoff("k", base), MAX_BACKOFF);
    }

    #[test]
    fn test_window_expiry_resets_budget() {
        let mut tracker = RetryTracker::new(0, Duration::ZERO);
        assert!(tracker.record_failure("k"));
        std::thread::sleep(Duration::from_millis(2));
        assert!(!tracker.is_exhausted("k"));
        tracker.prune();
        assert_eq!(tracker.failures("k"), 0);
    }
}
