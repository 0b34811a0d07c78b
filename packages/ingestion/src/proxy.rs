//! Rotating proxy pool with a daily cost budget.
//!
//! Proxies rotate round-robin. Every fetch reports transferred bytes back
//! via `record`, which accrues cost at `cost_per_gb`; once the day's spend
//! reaches `daily_budget`, `next()` returns None until the UTC date rolls
//! over. Direct (proxyless) fetching remains available to callers.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::warn;

use crate::config::ProxyConfig;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Per-proxy usage counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProxyCounters {
    pub requests: u64,
    pub bytes: u64,
    pub successes: u64,
    pub failures: u64,
    pub cost: f64,
}

/// Snapshot of pool-wide usage.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyPoolStats {
    pub daily_usage: f64,
    pub daily_budget: f64,
    pub budget_remaining: f64,
    pub per_proxy: HashMap<String, ProxyCounters>,
}

struct PoolState {
    cursor: usize,
    counters: HashMap<String, ProxyCounters>,
    daily_usage: f64,
    last_reset: NaiveDate,
}

pub struct ProxyManager {
    config: ProxyConfig,
    proxies: Vec<String>,
    state: Mutex<PoolState>,
}

impl ProxyManager {
    pub fn new(config: ProxyConfig) -> Self {
        let proxies = config.proxy_urls();
        Self {
            config,
            proxies,
            state: Mutex::new(PoolState {
                cursor: 0,
                counters: HashMap::new(),
                daily_usage: 0.0,
                last_reset: Utc::now().date_naive(),
            }),
        }
    }

    pub fn proxy_urls(&self) -> &[String] {
        &self.proxies
    }

    /// Next proxy in rotation, or None when the pool is empty or the daily
    /// budget is exhausted.
    pub fn next(&self) -> Option<String> {
        let mut state = self.state.lock().expect("proxy state lock");

        let today = Utc::now().date_naive();
        if today > state.last_reset {
            state.daily_usage = 0.0;
            state.last_reset = today;
        }

        if state.daily_usage >= self.config.daily_budget {
            warn!(
                daily_usage = state.daily_usage,
                daily_budget = self.config.daily_budget,
                "Daily proxy budget exceeded"
            );
            return None;
        }

        if self.proxies.is_empty() {
            return None;
        }

        let proxy = self.proxies[state.cursor].clone();
        state.cursor = (state.cursor + 1) % self.proxies.len();
        Some(proxy)
    }

    /// Record a completed request through `proxy`.
    pub fn record(&self, proxy: &str, bytes: u64, success: bool) {
        let mut state = self.state.lock().expect("proxy state lock");

        let counters = state.counters.entry(proxy.to_string()).or_default();
        counters.requests += 1;
        counters.bytes += bytes;
        if success {
            counters.successes += 1;
        } else {
            counters.failures += 1;
        }

        let cost = (bytes as f64 / BYTES_PER_GB) * self.config.cost_per_gb;
        counters.cost += cost;
        state.daily_usage += cost;
    }

    pub fn stats(&self) -> ProxyPoolStats {
        let state = self.state.lock().expect("proxy state lock");
        ProxyPoolStats {
            daily_usage: state.daily_usage,
            daily_budget: self.config.daily_budget,
            budget_remaining: self.config.daily_budget - state.daily_usage,
            per_proxy: state.counters.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ProxyConfig {
        ProxyConfig {
            endpoints: vec!["a.proxy:8000".to_string(), "b.proxy:8001".to_string()],
            username: "u".to_string(),
            password: "p".to_string(),
            daily_budget: 10.0,
            cost_per_gb: 3.0,
        }
    }

    #[test]
    fn test_round_robin_rotation() {
        let manager = ProxyManager::new(test_config());
        let first = manager.next().unwrap();
        let second = manager.next().unwrap();
        let third = manager.next().unwrap();
        assert_ne!(first, second);
        assert_eq!(first, third);
    }

    #[test]
    fn test_empty_pool_returns_none() {
        let manager = ProxyManager::new(ProxyConfig::default());
        assert_eq!(manager.next(), None);
    }

    #[test]
    fn test_budget_exhaustion_stops_rotation() {
        let manager = ProxyManager::new(test_config());
        let proxy = manager.next().unwrap();

        // 4 GiB at $3/GiB = $12, over the $10 budget
        manager.record(&proxy, 4 * 1024 * 1024 * 1024, true);

        assert_eq!(manager.next(), None);
        let stats = manager.stats();
        assert!(stats.daily_usage > stats.daily_budget);
    }

    #[test]
    fn test_counters_accumulate() {
        let manager = ProxyManager::new(test_config());
        let proxy = manager.next().unwrap();

        manager.record(&proxy, 1000, true);
        manager.record(&proxy, 2000, false);

        let stats = manager.stats();
        let counters = stats.per_proxy.get(&proxy).unwrap();
        assert_eq!(counters.requests, 2);
        assert_eq!(counters.bytes, 3000);
        assert_eq!(counters.successes, 1);
        assert_eq!(counters.failures, 1);
    }
}
