//! Rate Limiter implementation using token bucket algorithm
//!
//! Keeps the client within the exchange's request limits. Callers block in
//! [`RateLimiter::acquire`] until a token is available.

use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Configuration for the rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum requests allowed per refill interval
    pub max_requests_per_second: usize,
    /// Refill interval for tokens
    pub refill_interval: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests_per_second: 10,
            refill_interval: Duration::from_secs(1),
        }
    }
}

impl RateLimiterConfig {
    /// Create a new configuration with custom rate limit
    pub fn with_rate(mut self, requests_per_second: usize) -> Self {
        self.max_requests_per_second = requests_per_second.max(1);
        self
    }

    /// Create a new configuration with custom refill interval
    pub fn with_refill_interval(mut self, interval: Duration) -> Self {
        self.refill_interval = interval;
        self
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: usize,
    last_refill: Instant,
}

/// Rate limiter using token bucket algorithm
///
/// # Example
///
/// ```
/// use perp_trader::common::{RateLimiter, RateLimiterConfig};
///
/// let limiter = RateLimiter::new(RateLimiterConfig::default().with_rate(5));
///
/// // Acquire a permit before making a request
/// limiter.acquire();
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    max_permits: usize,
    refill_interval: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let max_permits = config.max_requests_per_second.max(1);
        Self {
            bucket: Mutex::new(Bucket {
                tokens: max_permits,
                last_refill: Instant::now(),
            }),
            max_permits,
            refill_interval: config.refill_interval,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Bucket> {
        // The bucket holds plain counters, a poisoned lock is still usable
        self.bucket.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn refill(&self, bucket: &mut Bucket) {
        if bucket.last_refill.elapsed() >= self.refill_interval {
            bucket.tokens = self.max_permits;
            bucket.last_refill = Instant::now();
        }
    }

    /// Block until a permit is available, then consume it
    pub fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.lock();
                self.refill(&mut bucket);
                if bucket.tokens > 0 {
                    bucket.tokens -= 1;
                    return;
                }
                self.refill_interval
                    .saturating_sub(bucket.last_refill.elapsed())
            };

            tracing::debug!("Rate limit reached, waiting {}ms", wait.as_millis());
            thread::sleep(wait);
        }
    }
}
