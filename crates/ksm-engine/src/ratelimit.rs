//! Single-bucket token limiter, process-global.

use std::sync::Mutex;
use std::time::Instant;

struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(tokens: f64, capacity: f64, refill_per_sec: f64) -> Self {
        Self { tokens, capacity, refill_per_sec, last_refill: Instant::now() }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
    }
}

/// Token bucket that starts full at `rate_per_minute` tokens; refill over
/// elapsed wall time can carry it up to a 2x-rate burst ceiling, but the
/// bucket never starts above the plain per-minute rate. Each call to
/// [`RateLimiter::try_acquire`] consumes one token.
///
/// An optional second, hourly bucket can additionally cap the rolling total
/// regardless of how the per-minute bucket refills; a request only succeeds
/// when both buckets have a token available.
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    hourly: Option<Mutex<Bucket>>,
}

impl RateLimiter {
    pub fn new(rate_per_minute: u32) -> Self {
        Self::with_hourly_cap(rate_per_minute, None)
    }

    pub fn with_hourly_cap(rate_per_minute: u32, requests_per_hour: Option<u32>) -> Self {
        let tokens = rate_per_minute as f64;
        let bucket = Mutex::new(Bucket::new(tokens, tokens * 2.0, tokens / 60.0));
        let hourly = requests_per_hour.map(|rph| {
            let rph = rph as f64;
            Mutex::new(Bucket::new(rph, rph, rph / 3600.0))
        });
        Self { bucket, hourly }
    }

    /// Returns `true` if a token was available and consumed from both the
    /// per-minute bucket and, if configured, the hourly bucket.
    pub fn try_acquire(&self) -> bool {
        if let Some(hourly) = &self.hourly {
            let mut h = hourly.lock().expect("rate limiter mutex poisoned");
            h.refill();
            if h.tokens < 1.0 {
                return false;
            }
        }

        let mut bucket = self.bucket.lock().expect("rate limiter mutex poisoned");
        bucket.refill();
        if bucket.tokens < 1.0 {
            return false;
        }
        bucket.tokens -= 1.0;
        drop(bucket);

        if let Some(hourly) = &self.hourly {
            hourly.lock().expect("rate limiter mutex poisoned").tokens -= 1.0;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_requests_succeed_sixth_is_rejected() {
        // rate=5/min => bucket starts with 5 tokens; six consecutive
        // requests within the same minute yield five successes and one
        // rejection.
        let limiter = RateLimiter::new(5);
        for _ in 0..5 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn burst_ceiling_is_2x_rate_after_refill() {
        let limiter = RateLimiter::new(5);
        {
            let mut bucket = limiter.bucket.lock().unwrap();
            bucket.tokens = bucket.capacity; // simulate accumulated refill
        }
        for _ in 0..10 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn refill_happens_over_time() {
        let limiter = RateLimiter::new(60 * 60); // 1 token/sec, capacity 7200
        {
            let mut bucket = limiter.bucket.lock().unwrap();
            bucket.tokens = 0.0;
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(limiter.try_acquire());
    }

    #[test]
    fn hourly_cap_rejects_once_exhausted_even_with_minute_tokens_left() {
        let limiter = RateLimiter::with_hourly_cap(60, Some(3));
        for _ in 0..3 {
            assert!(limiter.try_acquire());
        }
        // the per-minute bucket still has plenty of tokens, but the hourly
        // cap is exhausted.
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn no_hourly_cap_only_enforces_the_per_minute_bucket() {
        let limiter = RateLimiter::with_hourly_cap(5, None);
        for _ in 0..5 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());
    }
}
