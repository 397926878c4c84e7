//! Retry policy: exponential backoff with jitter and bounded attempts

use crate::PipelineConfig;
use forge_domain::ErrorKind;
use std::time::Duration;

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait for the given delay, then try again
    Retry(Duration),
    /// Stop and report a Failure
    GiveUp,
}

/// Decides whether and when a failed call is retried
///
/// `delay(n) = min(base_delay * 2^(n-1), max_delay)` plus a random jitter in
/// `[0, delay(n) * jitter_fraction]`, where `n` is the attempt that just
/// failed (1-based). Terminal error kinds are never retried.
///
/// # Examples
///
/// ```
/// use forge_domain::ErrorKind;
/// use forge_engine::{RetryDecision, RetryPolicy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(30), 0.0);
///
/// assert_eq!(policy.decide(ErrorKind::Timeout, 1), RetryDecision::Retry(Duration::from_secs(1)));
/// assert_eq!(policy.decide(ErrorKind::Timeout, 2), RetryDecision::Retry(Duration::from_secs(2)));
/// assert_eq!(policy.decide(ErrorKind::Timeout, 3), RetryDecision::GiveUp);
/// assert_eq!(policy.decide(ErrorKind::Authentication, 1), RetryDecision::GiveUp);
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter_fraction: f64,
}

impl RetryPolicy {
    /// Create a policy
    ///
    /// `max_attempts` counts the first attempt; values below 1 are treated as 1.
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        jitter_fraction: f64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            jitter_fraction: jitter_fraction.clamp(0.0, 1.0),
        }
    }

    /// Build the policy described by a pipeline configuration
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.max_attempts,
            config.base_delay(),
            config.max_delay(),
            config.jitter_fraction,
        )
    }

    /// Attempts allowed per task, including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide what follows a failure of kind `kind` on attempt `attempt`
    pub fn decide(&self, kind: ErrorKind, attempt: u32) -> RetryDecision {
        if kind.is_terminal() || attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry(self.with_jitter(self.backoff(attempt)))
    }

    /// Jitter-free delay after failed attempt `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn with_jitter(&self, delay: Duration) -> Duration {
        if self.jitter_fraction <= 0.0 {
            return delay;
        }
        let jitter = rand::random::<f64>() * self.jitter_fraction;
        delay + delay.mul_f64(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: the jitter-free schedule is non-decreasing and capped
        #[test]
        fn test_backoff_monotonic_and_capped(
            base_ms in 1u64..5_000,
            extra_ms in 0u64..120_000,
            attempt in 1u32..64,
        ) {
            let p = RetryPolicy::new(
                100,
                Duration::from_millis(base_ms),
                Duration::from_millis(base_ms + extra_ms),
                0.0,
            );
            prop_assert!(p.backoff(attempt) <= p.backoff(attempt + 1));
            prop_assert!(p.backoff(attempt) <= Duration::from_millis(base_ms + extra_ms));
        }

        /// Property: jitter stays within [delay, delay * (1 + fraction)]
        #[test]
        fn test_jitter_bounds(attempt in 1u32..10, fraction in 0.0f64..1.0) {
            let p = RetryPolicy::new(
                20,
                Duration::from_millis(50),
                Duration::from_secs(10),
                fraction,
            );
            let base = p.backoff(attempt);
            match p.decide(ErrorKind::RateLimited, attempt) {
                RetryDecision::Retry(delay) => {
                    prop_assert!(delay >= base);
                    prop_assert!(delay <= base + base.mul_f64(fraction) + Duration::from_nanos(1));
                }
                RetryDecision::GiveUp => prop_assert!(false, "should retry below max_attempts"),
            }
        }
    }
}
