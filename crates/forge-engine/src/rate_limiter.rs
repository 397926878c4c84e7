//! Token-bucket rate limiter shared by all workers
//!
//! The bucket starts full. Tokens refill continuously at `refill_rate` per
//! second up to `capacity`; each outbound request consumes one. Refill and
//! consumption happen under one lock, so concurrent callers can never lose
//! or double-spend a token.

use crate::EngineError;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Tolerance for float drift in the token count
const TOKEN_EPSILON: f64 = 1e-9;

/// Shortest time a waiting caller sleeps before re-checking the bucket
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Longest single sleep; very slow rates re-check the bucket at this cadence
const MAX_WAIT: Duration = Duration::from_secs(60);

/// Bounds the outbound request rate across all workers
///
/// # Examples
///
/// ```
/// use forge_engine::RateLimiter;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let limiter = RateLimiter::new(5.0, 5).unwrap();
/// limiter.acquire().await;
/// assert!(limiter.available() < 5.0);
/// # }
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_rate: f64,
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant, capacity: f64, rate: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        self.last_refill = now;
    }

    fn try_take(&mut self) -> bool {
        if self.tokens + TOKEN_EPSILON >= 1.0 {
            self.tokens = (self.tokens - 1.0).max(0.0);
            true
        } else {
            false
        }
    }
}

impl RateLimiter {
    /// Create a limiter granting `refill_rate` permits per second with a
    /// burst of at most `capacity`
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if the rate is not a positive number
    /// or the capacity is zero.
    pub fn new(refill_rate: f64, capacity: u32) -> Result<Self, EngineError> {
        if !refill_rate.is_finite() || refill_rate <= 0.0 {
            return Err(EngineError::Config(format!(
                "rate limit must be positive, got {}",
                refill_rate
            )));
        }
        if capacity == 0 {
            return Err(EngineError::Config(
                "rate limiter capacity must be at least 1".to_string(),
            ));
        }

        let capacity = f64::from(capacity);
        Ok(Self {
            capacity,
            refill_rate,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        })
    }

    /// Create a limiter whose capacity equals the rate (rounded up, min 1)
    pub fn per_second(refill_rate: f64) -> Result<Self, EngineError> {
        let capacity = if refill_rate.is_finite() {
            refill_rate.ceil().max(1.0) as u32
        } else {
            1
        };
        Self::new(refill_rate, capacity)
    }

    /// Wait until a permit is available, then consume it
    ///
    /// Never fails; cancellation is handled by dropping the future.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.lock();
                bucket.refill(Instant::now(), self.capacity, self.refill_rate);
                if bucket.try_take() {
                    return;
                }
                let secs = (1.0 - bucket.tokens) / self.refill_rate;
                Duration::try_from_secs_f64(secs).unwrap_or(MAX_WAIT)
            };
            sleep(wait.clamp(MIN_WAIT, MAX_WAIT)).await;
        }
    }

    /// Consume a permit if one is available right now
    pub fn try_acquire(&self) -> bool {
        let mut bucket = self.lock();
        bucket.refill(Instant::now(), self.capacity, self.refill_rate);
        bucket.try_take()
    }

    /// Tokens currently in the bucket
    pub fn available(&self) -> f64 {
        let mut bucket = self.lock();
        bucket.refill(Instant::now(), self.capacity, self.refill_rate);
        bucket.tokens
    }

    /// Maximum burst size
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Permits granted per second in steady state
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Bucket> {
        // Bucket arithmetic cannot panic midway, so a poisoned lock is still consistent
        self.bucket.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_invalid_construction() {
        assert!(matches!(RateLimiter::new(0.0, 1), Err(EngineError::Config(_))));
        assert!(matches!(RateLimiter::new(-3.0, 1), Err(EngineError::Config(_))));
        assert!(matches!(RateLimiter::new(f64::INFINITY, 1), Err(EngineError::Config(_))));
        assert!(matches!(RateLimiter::new(5.0, 0), Err(EngineError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_second_capacity() {
        assert_eq!(RateLimiter::per_second(2.5).unwrap().capacity(), 3.0);
        assert_eq!(RateLimiter::per_second(0.5).unwrap().capacity(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_empty() {
        let limiter = RateLimiter::new(2.0, 3).unwrap();

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire(), "bucket should be empty after the burst");
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_never_exceed_capacity() {
        let limiter = RateLimiter::new(100.0, 4).unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(limiter.available(), 4.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_refill() {
        let limiter = RateLimiter::new(2.0, 1).unwrap();
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        // First permit is immediate, the next two each wait half a second
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1000), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(1100), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tiny_rate_waits_without_overflow() {
        let limiter = RateLimiter::new(1e-20, 1).unwrap();
        limiter.acquire().await;

        let second = tokio::time::timeout(Duration::from_secs(3600), limiter.acquire()).await;
        assert!(second.is_err(), "no token should refill within an hour");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquire_respects_rate_over_windows() {
        let rate = 5.0;
        let limiter = Arc::new(RateLimiter::per_second(rate).unwrap());
        let grants = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let limiter = Arc::clone(&limiter);
            let grants = Arc::clone(&grants);
            handles.push(tokio::spawn(async move {
                for _ in 0..4 {
                    limiter.acquire().await;
                    grants.lock().unwrap().push(start.elapsed());
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut grants = grants.lock().unwrap().clone();
        grants.sort();
        assert_eq!(grants.len(), 200);

        // Any 10-second window holds at most the steady-state budget plus one burst
        let window = Duration::from_secs(10);
        let budget = (rate * window.as_secs_f64() + limiter.capacity()) as usize;
        for (i, t) in grants.iter().enumerate() {
            let in_window = grants[i..].iter().take_while(|g| **g < *t + window).count();
            assert!(
                in_window <= budget,
                "{} grants within 10s of {:?} (budget {})",
                in_window,
                t,
                budget
            );
        }
    }
}
