// SPDX-License-Identifier: Apache-2.0

//! Token-bucket rate limiting keyed by client address. Buckets live in
//! memory only; a restart forgives everyone.

use crate::config::RateLimitConfig;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

// A bucket idle this long has refilled to capacity anyway, so dropping
// it loses nothing; the scan only runs once the map is worth pruning.
const IDLE_EVICT: Duration = Duration::from_secs(600);
const EVICT_SCAN_LEN: usize = 1024;

#[derive(Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    /// Spends one token for `key`, or returns the whole seconds to wait
    /// before a token will be available again.
    pub async fn allow(&self, key: &str, config: &RateLimitConfig) -> Result<(), u64> {
        self.allow_at(key, config, Instant::now()).await
    }

    async fn allow_at(
        &self,
        key: &str,
        config: &RateLimitConfig,
        now: Instant,
    ) -> Result<(), u64> {
        let mut buckets = self.buckets.lock().await;
        if buckets.len() >= EVICT_SCAN_LEN {
            buckets.retain(|_, b| now.saturating_duration_since(b.last_refill) < IDLE_EVICT);
        }
        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: config.capacity,
            last_refill: now,
        });
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * config.refill_per_sec).min(config.capacity);
        bucket.last_refill = now;
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let retry_after = ((1.0 - bucket.tokens) / config.refill_per_sec).ceil() as u64;
            Err(retry_after.max(1))
        }
    }

    #[cfg(test)]
    async fn bucket_count(&self) -> usize {
        self.buckets.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> RateLimitConfig {
        RateLimitConfig {
            capacity: 2.0,
            refill_per_sec: 1.0,
            trust_forwarded_for: false,
        }
    }

    #[tokio::test]
    async fn burst_drains_then_rejects_with_retry_hint() {
        let limiter = RateLimiter::default();
        let config = small();
        assert!(limiter.allow("10.0.0.1", &config).await.is_ok());
        assert!(limiter.allow("10.0.0.1", &config).await.is_ok());
        let retry = limiter.allow("10.0.0.1", &config).await.unwrap_err();
        assert!(retry >= 1);
    }

    #[tokio::test]
    async fn idle_buckets_are_evicted_once_the_map_grows() {
        let limiter = RateLimiter::default();
        let config = small();
        let t0 = Instant::now();
        for n in 0..EVICT_SCAN_LEN {
            assert!(limiter.allow_at(&format!("10.0.{}.{}", n / 256, n % 256), &config, t0).await.is_ok());
        }
        assert_eq!(limiter.bucket_count().await, EVICT_SCAN_LEN);
        // Past the idle horizon, one new arrival sweeps the whole map.
        let later = t0 + IDLE_EVICT + Duration::from_secs(1);
        assert!(limiter.allow_at("203.0.113.9", &config, later).await.is_ok());
        assert_eq!(limiter.bucket_count().await, 1);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = RateLimiter::default();
        let config = small();
        assert!(limiter.allow("10.0.0.1", &config).await.is_ok());
        assert!(limiter.allow("10.0.0.1", &config).await.is_ok());
        assert!(limiter.allow("10.0.0.1", &config).await.is_err());
        assert!(limiter.allow("10.0.0.2", &config).await.is_ok());
    }
}
