//! Backoff for revision conflicts.

use galley_store::app_config::ReservationConfig;
use rand::Rng;
use std::time::Duration;

/// Bounded retry with exponential, jittered backoff.
///
/// `max_attempts` counts write attempts, the first included.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ReservationConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms),
            ..Self::default()
        }
    }

    /// `initial_delay * multiplier^retry`, capped at `max_delay`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(retry as i32);
        let delay = Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as f64) as u64);
        delay.min(self.max_delay)
    }

    /// Half fixed, half random, so racing seats spread out without ever
    /// retrying immediately.
    pub fn jittered_delay(&self, retry: u32) -> Duration {
        let base = self.delay_for_retry(retry).as_millis() as u64;
        let half = base / 2;
        let jitter = rand::thread_rng().gen_range(0..=half);
        Duration::from_millis(base - half + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
        };

        assert_eq!(policy.delay_for_retry(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(500));
        assert_eq!(policy.delay_for_retry(30), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();
        for retry in 0..6 {
            let base = policy.delay_for_retry(retry);
            let delay = policy.jittered_delay(retry);
            assert!(delay <= base);
            assert!(delay >= base / 2);
        }
    }

    #[test]
    fn test_from_config_never_allows_zero_attempts() {
        let config = ReservationConfig {
            max_attempts: 0,
            ..ReservationConfig::default()
        };
        assert_eq!(RetryPolicy::from_config(&config).max_attempts, 1);
    }
}
