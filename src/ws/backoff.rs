//! Reconnect backoff
//!
//! Full jitter bounded by a ceiling:
//! `round(uniform(0,1) * min(ceiling, 2^attempt - 1) + 1)` seconds.

use rand::Rng;
use std::time::Duration;

/// Attempt budget and delay shape for session reconnects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Reconnects stop once the attempt counter reaches this value
    pub max_attempts: u32,
    /// Upper bound of the jittered window, in seconds
    pub max_backoff_secs: u64,
}

impl ReconnectPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;
    pub const DEFAULT_MAX_BACKOFF_SECS: u64 = 60;

    pub fn new(max_attempts: u32, max_backoff_secs: u64) -> Self {
        Self {
            max_attempts,
            max_backoff_secs,
        }
    }

    /// Whether the attempt counter still allows another reconnect
    #[inline]
    pub fn should_reconnect(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Width of the jitter window for `attempt`: `min(ceiling, 2^attempt - 1)`
    #[inline]
    pub fn window_secs(&self, attempt: u32) -> u64 {
        let expo = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        self.max_backoff_secs.min(expo.saturating_sub(1))
    }

    /// Largest delay `attempt` can produce
    pub fn max_delay(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.window_secs(attempt) + 1)
    }

    /// Delay before reconnect number `attempt` using the thread-local RNG
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::thread_rng())
    }

    /// Delay before reconnect number `attempt` using `rng`
    pub fn delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let jitter: f64 = rng.gen();
        let secs = (jitter * self.window_secs(attempt) as f64 + 1.0).round();
        Duration::from_secs(secs as u64)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_MAX_BACKOFF_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_window_grows_then_caps() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.window_secs(1), 1);
        assert_eq!(policy.window_secs(3), 7);
        assert_eq!(policy.window_secs(5), 31);
        assert_eq!(policy.window_secs(6), 60);
        assert_eq!(policy.window_secs(19), 60);
        assert_eq!(policy.window_secs(200), 60);
    }

    #[test]
    fn test_budget() {
        let policy = ReconnectPolicy::default();
        assert!(policy.should_reconnect(19));
        assert!(!policy.should_reconnect(20));
    }

    #[test]
    fn test_first_attempt_is_one_or_two_seconds() {
        let policy = ReconnectPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let delay = policy.delay_with(1, &mut rng);
            assert!(delay == Duration::from_secs(1) || delay == Duration::from_secs(2));
        }
    }

    #[test]
    fn test_mean_delay_non_decreasing() {
        let policy = ReconnectPolicy::default();
        let mut rng = StdRng::seed_from_u64(42);
        let mut mean_of = |attempt: u32| {
            let total: u64 = (0..2000)
                .map(|_| policy.delay_with(attempt, &mut rng).as_secs())
                .sum();
            total as f64 / 2000.0
        };

        let mut previous = 0.0;
        for attempt in 1..=6 {
            let mean = mean_of(attempt);
            assert!(mean > previous, "attempt {} mean {} <= {}", attempt, mean, previous);
            previous = mean;
        }
        // Past the ceiling the window is constant at 60s, mean ~31s
        for attempt in 7..20 {
            let mean = mean_of(attempt);
            assert!((mean - 31.0).abs() < 3.0, "attempt {} mean {}", attempt, mean);
        }
    }

    proptest! {
        #[test]
        fn prop_delay_within_bounds(attempt in 1u32..20, seed in any::<u64>()) {
            let policy = ReconnectPolicy::default();
            let mut rng = StdRng::seed_from_u64(seed);
            let delay = policy.delay_with(attempt, &mut rng);
            let upper = 60u64.min((1u64 << attempt) - 1) + 1;
            prop_assert!(delay >= Duration::from_secs(1));
            prop_assert!(delay <= Duration::from_secs(upper));
            prop_assert!(delay <= policy.max_delay(attempt));
        }
    }
}
