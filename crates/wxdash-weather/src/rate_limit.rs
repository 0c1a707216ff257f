//! Minimum spacing between outbound requests, tracked per bucket key.
//!
//! Callers sharing a key queue on one async mutex (FIFO), so each waiter's
//! delay is measured from the previous caller's actual acquisition rather
//! than from when it started waiting.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

type Bucket = Arc<tokio::sync::Mutex<Option<Instant>>>;

#[derive(Debug)]
pub struct RateLimiter<K> {
    default_interval: Duration,
    intervals: HashMap<K, Duration>,
    buckets: Mutex<HashMap<K, Bucket>>,
}

impl<K> RateLimiter<K>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn new(default_interval: Duration) -> Self {
        Self {
            default_interval,
            intervals: HashMap::new(),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Override the interval for one key.
    pub fn with_interval(mut self, key: K, interval: Duration) -> Self {
        self.intervals.insert(key, interval);
        self
    }

    pub fn interval_for(&self, key: &K) -> Duration {
        self.intervals
            .get(key)
            .copied()
            .unwrap_or(self.default_interval)
    }

    /// Wait until `key` may be used again, then mark it used.
    ///
    /// Never fails; it only delays.
    pub async fn acquire(&self, key: &K) {
        let interval = self.interval_for(key);
        if interval.is_zero() {
            return;
        }

        let bucket = {
            let mut buckets = self.buckets.lock();
            buckets
                .entry(key.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(None)))
                .clone()
        };

        // Held across the sleep so later callers queue behind this one.
        let mut last = bucket.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + interval;
            if ready_at > Instant::now() {
                tracing::debug!(
                    "Rate limiting {:?}: waiting {:?}",
                    key,
                    ready_at - Instant::now()
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_acquire_is_spaced() {
        let limiter = RateLimiter::new(Duration::from_secs(1));

        limiter.acquire(&"weather").await;
        let first = Instant::now();
        limiter.acquire(&"weather").await;
        let second = Instant::now();

        assert!(second - first >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_does_not_wait() {
        let limiter = RateLimiter::new(Duration::from_secs(5));
        let start = Instant::now();
        limiter.acquire(&"weather").await;
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_serialize() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(500)));
        let stamps = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let limiter = limiter.clone();
            let stamps = stamps.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire(&"sun_times").await;
                stamps.lock().push(Instant::now());
            }));
        }
        for handle in handles {
            assert!(handle.await.is_ok());
        }

        let mut stamps = stamps.lock().clone();
        stamps.sort();
        assert_eq!(stamps.len(), 5);
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let limiter = RateLimiter::new(Duration::from_secs(10));
        let start = Instant::now();

        limiter.acquire(&"weather").await;
        limiter.acquire(&"geolocation").await;

        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_key_interval_override() {
        let limiter = RateLimiter::new(Duration::from_secs(10))
            .with_interval("fast", Duration::from_millis(100));
        assert_eq!(limiter.interval_for(&"fast"), Duration::from_millis(100));
        assert_eq!(limiter.interval_for(&"other"), Duration::from_secs(10));

        limiter.acquire(&"fast").await;
        let first = Instant::now();
        limiter.acquire(&"fast").await;
        let waited = Instant::now() - first;

        assert!(waited >= Duration::from_millis(100));
        assert!(waited < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_interval_means_no_wait() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        limiter.acquire(&"weather").await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        let before = Instant::now();
        limiter.acquire(&"weather").await;
        assert_eq!(Instant::now(), before);
    }
}
