use rand::Rng;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::WonderError;

/// Bounded exponential backoff for opening requests and reconnect probes.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            factor: config.backoff_factor.max(1.0),
            jitter: config.jitter,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.factor.powi(attempt.saturating_sub(1) as i32);
        let base = (self.initial_delay.as_millis() as f64 * exp).min(self.max_delay.as_millis() as f64);
        let millis = if self.jitter {
            base * rand::thread_rng().gen_range(0.9..1.1)
        } else {
            base
        };
        Duration::from_millis(millis as u64)
    }

    pub fn should_retry(&self, attempt: u32, err: &WonderError) -> bool {
        attempt < self.max_attempts && err.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    fn fixed() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            factor: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn delays_grow_then_cap() {
        let policy = fixed();
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for(30), Duration::from_millis(500));
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let policy = RetryPolicy {
            jitter: true,
            ..fixed()
        };
        for _ in 0..50 {
            let d = policy.delay_for(2).as_millis();
            assert!((180..=220).contains(&d), "delay {d} out of range");
        }
    }

    #[test]
    fn stops_at_attempt_cap_and_on_fatal_errors() {
        let policy = fixed();
        let retryable = WonderError::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: String::new(),
        };
        let fatal = WonderError::Status {
            status: StatusCode::UNAUTHORIZED,
            body: String::new(),
        };
        assert!(policy.should_retry(1, &retryable));
        assert!(policy.should_retry(3, &retryable));
        assert!(!policy.should_retry(4, &retryable));
        assert!(!policy.should_retry(1, &fatal));
        assert!(!RetryPolicy::none().should_retry(1, &retryable));
    }
}
