//! Per-user token-bucket rate limiter (§4.2).

use dashmap::DashMap;
use searchagent_core::UserId;
use std::sync::Mutex;
use std::time::Instant;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    buckets: DashMap<UserId, Mutex<Bucket>>,
}

impl RateLimiter {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            capacity: capacity as f64,
            refill_per_sec,
            buckets: DashMap::new(),
        }
    }

    /// Attempt to consume one token for `user`. Returns `true` if admitted.
    pub fn try_acquire(&self, user: &UserId) -> bool {
        let entry = self.buckets.entry(user.clone()).or_insert_with(|| {
            Mutex::new(Bucket {
                tokens: self.capacity,
                last_refill: Instant::now(),
            })
        });
        let mut bucket = entry.lock().unwrap();

        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_then_refills() {
        let limiter = RateLimiter::new(2, 1000.0);
        let user = UserId::new("u1");
        assert!(limiter.try_acquire(&user));
        assert!(limiter.try_acquire(&user));
        assert!(!limiter.try_acquire(&user));
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(limiter.try_acquire(&user));
    }

    #[test]
    fn buckets_are_independent_per_user() {
        let limiter = RateLimiter::new(1, 0.0);
        let a = UserId::new("a");
        let b = UserId::new("b");
        assert!(limiter.try_acquire(&a));
        assert!(!limiter.try_acquire(&a));
        assert!(limiter.try_acquire(&b));
    }
}
