//! The restart ledger: the process-local memory behind the backoff policy.

use tokio::time::{Duration, Instant};

/// The child must stay alive this long for a crash to be treated as a
/// fresh failure streak rather than a continuation of the current one.
pub const MIN_HEALTHY_RUNTIME: Duration = Duration::from_secs(20);

/// Number of consecutive fast failures tolerated before the supervisor
/// gives up and waits for the next `session-logon` event.
pub const MAX_FAILED_STARTS: u32 = 3;

/// `{consecutive_failures, last_start}` — not persisted across service
/// restarts, reset whenever the child demonstrates `min_healthy_runtime`.
/// `min_healthy_runtime`/`max_failed_starts` default to the module constants
/// but are overridable per instance so [`crate::config::SupervisorConfig`]'s
/// matching fields actually drive the policy instead of shadowing it.
#[derive(Debug, Clone, Copy)]
pub struct RestartLedger {
    pub consecutive_failures: u32,
    pub last_start: Option<Instant>,
    min_healthy_runtime: Duration,
    max_failed_starts: u32,
}

impl Default for RestartLedger {
    fn default() -> Self {
        Self {
            consecutive_failures: 0,
            last_start: None,
            min_healthy_runtime: MIN_HEALTHY_RUNTIME,
            max_failed_starts: MAX_FAILED_STARTS,
        }
    }
}

impl RestartLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger whose healthy-runtime/failure-count thresholds come
    /// from a resolved [`crate::config::SupervisorConfig`] rather than the
    /// module defaults.
    pub fn with_policy(min_healthy_runtime: Duration, max_failed_starts: u32) -> Self {
        Self {
            consecutive_failures: 0,
            last_start: None,
            min_healthy_runtime,
            max_failed_starts,
        }
    }

    /// Record that a spawn attempt is about to happen.
    pub fn record_start(&mut self, now: Instant) {
        self.last_start = Some(now);
    }

    /// True if the child has been running long enough that its exit should
    /// be treated as the start of a new failure streak.
    pub fn ran_healthily(&self, now: Instant) -> bool {
        self.last_start
            .map(|t| now.saturating_duration_since(t) >= self.min_healthy_runtime)
            .unwrap_or(false)
    }

    /// A crash (or failed start) after a healthy run resets the streak and
    /// counts this single failure — `consecutive_failures` becomes 1.
    pub fn record_healthy_reset(&mut self) -> u32 {
        self.consecutive_failures = 1;
        self.consecutive_failures
    }

    /// A crash (or failed start) within the failure streak increments it.
    pub fn record_fast_failure(&mut self) -> u32 {
        self.consecutive_failures += 1;
        self.consecutive_failures
    }

    pub fn exceeded_max_failed_starts(&self) -> bool {
        self.consecutive_failures > self.max_failed_starts
    }
}

/// Delay before the next `Starting` attempt for a `Backoff(attempts)` state.
///
/// `attempts` is the post-failure `consecutive_failures` value (1-indexed):
/// the first failure backs off 1s, the second 11s, the third 21s. This is
/// the zero-indexed reading of "n*10s+1s" that reproduces the worked
/// examples in the end-to-end scenarios (see DESIGN.md).
pub fn backoff_delay(attempts: u32) -> Duration {
    Duration::from_secs(u64::from(attempts.saturating_sub(1)) * 10 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_reset_yields_one() {
        let mut ledger = RestartLedger::new();
        ledger.consecutive_failures = 7;
        assert_eq!(ledger.record_healthy_reset(), 1);
    }

    #[test]
    fn fast_failures_increment_monotonically() {
        let mut ledger = RestartLedger::new();
        assert_eq!(ledger.record_fast_failure(), 1);
        assert_eq!(ledger.record_fast_failure(), 2);
        assert_eq!(ledger.record_fast_failure(), 3);
        assert_eq!(ledger.record_fast_failure(), 4);
        assert!(ledger.exceeded_max_failed_starts());
    }

    #[test]
    fn backoff_delay_matches_worked_examples() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(11));
        assert_eq!(backoff_delay(3), Duration::from_secs(21));
    }

    #[test]
    fn ran_healthily_requires_min_runtime() {
        let mut ledger = RestartLedger::new();
        let t0 = Instant::now();
        ledger.record_start(t0);
        assert!(!ledger.ran_healthily(t0 + Duration::from_secs(19)));
        assert!(ledger.ran_healthily(t0 + Duration::from_secs(20)));
    }

    #[test]
    fn with_policy_overrides_the_module_defaults() {
        let mut ledger = RestartLedger::with_policy(Duration::from_secs(5), 1);
        let t0 = Instant::now();
        ledger.record_start(t0);
        assert!(ledger.ran_healthily(t0 + Duration::from_secs(5)));
        assert!(!ledger.ran_healthily(t0 + Duration::from_secs(5) - Duration::from_millis(1)));

        ledger.record_fast_failure();
        assert!(!ledger.exceeded_max_failed_starts());
        ledger.record_fast_failure();
        assert!(ledger.exceeded_max_failed_starts());
    }
}
