//! Per-host rate limiting with adaptive backoff.
//!
//! Each host gets a token bucket replenishing one token per
//! `default_delay_secs` (burst 1). On top of the bucket, hosts that answer
//! 429 accumulate an exponential backoff that successful responses decay
//! back down; below one second the host leaves the backoff table entirely.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use tokio::sync::RwLock;
use tracing::warn;

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Backoff ceiling after repeated 429s.
const MAX_BACKOFF_SECS: f64 = 300.0;

/// Below this the host is dropped from the backoff table.
const MIN_BACKOFF_SECS: f64 = 1.0;

pub struct HostRateLimiter {
    limiter: KeyedLimiter,
    backoff: RwLock<HashMap<String, f64>>,
}

impl HostRateLimiter {
    pub fn new(default_delay_secs: f64) -> Self {
        let period = Duration::from_secs_f64(default_delay_secs.max(0.001));
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(nonzero!(1u32)))
            .allow_burst(NonZeroU32::MIN);

        Self {
            limiter: RateLimiter::keyed(quota),
            backoff: RwLock::new(HashMap::new()),
        }
    }

    /// Wait for the host's token, then serve any pending backoff.
    pub async fn acquire(&self, host: &str) {
        self.limiter.until_key_ready(&host.to_string()).await;

        let pending = { self.backoff.read().await.get(host).copied() };
        if let Some(delay) = pending {
            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
        }
    }

    /// Feed a response status back into the backoff table.
    pub async fn observe(&self, host: &str, status: u16) {
        if status == 429 {
            let mut backoff = self.backoff.write().await;
            let current = backoff.get(host).copied().unwrap_or(MIN_BACKOFF_SECS);
            let next = (current * 2.0).min(MAX_BACKOFF_SECS);
            backoff.insert(host.to_string(), next);
            warn!(host = %host, backoff_secs = next, "Rate limited by host, backing off");
        } else if status < 400 {
            let mut backoff = self.backoff.write().await;
            if let Some(current) = backoff.get(host).copied() {
                let next = current * 0.5;
                if next <= MIN_BACKOFF_SECS {
                    backoff.remove(host);
                } else {
                    backoff.insert(host.to_string(), next);
                }
            }
        }
    }

    /// Current backoff for a host, if any.
    pub async fn backoff_secs(&self, host: &str) -> Option<f64> {
        self.backoff.read().await.get(host).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_backoff_doubles_on_429_and_clamps() {
        let limiter = HostRateLimiter::new(0.01);

        limiter.observe("example.com", 429).await;
        assert_eq!(limiter.backoff_secs("example.com").await, Some(2.0));

        limiter.observe("example.com", 429).await;
        assert_eq!(limiter.backoff_secs("example.com").await, Some(4.0));

        // Drive it to the ceiling
        for _ in 0..10 {
            limiter.observe("example.com", 429).await;
        }
        assert_eq!(limiter.backoff_secs("example.com").await, Some(300.0));
    }

    #[tokio::test]
    async fn test_backoff_halves_on_success_and_clears() {
        let limiter = HostRateLimiter::new(0.01);

        limiter.observe("example.com", 429).await;
        limiter.observe("example.com", 429).await;
        assert_eq!(limiter.backoff_secs("example.com").await, Some(4.0));

        limiter.observe("example.com", 200).await;
        assert_eq!(limiter.backoff_secs("example.com").await, Some(2.0));

        // 2.0 -> 1.0 which is at the floor, so the host leaves the table
        limiter.observe("example.com", 200).await;
        assert_eq!(limiter.backoff_secs("example.com").await, None);
    }

    #[tokio::test]
    async fn test_client_errors_leave_backoff_unchanged() {
        let limiter = HostRateLimiter::new(0.01);
        limiter.observe("example.com", 429).await;
        limiter.observe("example.com", 404).await;
        assert_eq!(limiter.backoff_secs("example.com").await, Some(2.0));
    }

    #[tokio::test]
    async fn test_acquire_spaces_requests() {
        let limiter = HostRateLimiter::new(0.05);

        let start = std::time::Instant::now();
        limiter.acquire("example.com").await;
        limiter.acquire("example.com").await;
        limiter.acquire("example.com").await;

        // Three acquisitions at one token per 50ms: at least ~100ms total
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_hosts_are_independent() {
        let limiter = HostRateLimiter::new(0.01);
        limiter.observe("a.com", 429).await;
        assert_eq!(limiter.backoff_secs("b.com").await, None);
    }
}
