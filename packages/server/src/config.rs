//! Application configuration loaded from environment variables.
//!
//! Every section can be overridden with flat `<SECTION>_<FIELD>` keys
//! (`QUALITY_MIN_SCORE`, `CRAWLING_DEFAULT_DELAY`, ...). Missing keys fall
//! back to the documented defaults; only `DATABASE_URL` is required.

use std::str::FromStr;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use ingestion::{CrawlConfig, ProxyConfig};
use std::env;

/// Quality thresholds and reputation bounds.
#[derive(Debug, Clone)]
pub struct QualityConfig {
    pub min_score: f64,
    pub default_threshold: f64,
    pub premium_threshold: f64,
    /// In shadow mode the gate never rejects, only records what it would
    /// have rejected
    pub shadow_mode: bool,
    pub min_reputation: f64,
    pub max_reputation: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_score: 0.3,
            default_threshold: 0.6,
            premium_threshold: 0.8,
            shadow_mode: true,
            min_reputation: 0.1,
            max_reputation: 1.0,
        }
    }
}

/// Trending detection windows and thresholds.
#[derive(Debug, Clone)]
pub struct TrendingConfig {
    pub short_window_hours: i64,
    pub medium_window_hours: i64,
    pub long_window_hours: i64,
    pub min_burst_ratio: f64,
    pub min_trend_score: f64,
    pub min_occurrences: i64,
    pub cooldown_hours: i64,
    pub max_terms: usize,
}

impl Default for TrendingConfig {
    fn default() -> Self {
        Self {
            short_window_hours: 1,
            medium_window_hours: 6,
            long_window_hours: 24,
            min_burst_ratio: 2.0,
            min_trend_score: 0.5,
            min_occurrences: 5,
            cooldown_hours: 6,
            max_terms: 100,
        }
    }
}

/// Search caching and paging defaults.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub cache_ttl_seconds: u64,
    pub cache_enabled: bool,
    pub default_limit: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: 300,
            cache_enabled: true,
            default_limit: 20,
        }
    }
}

/// Worker cycle scheduling and batching.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub batch_size: usize,
    pub max_concurrent_requests: usize,
    pub cycle_delay_seconds: u64,
    pub max_urls_per_cycle: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_concurrent_requests: 10,
            cycle_delay_seconds: 60,
            max_urls_per_cycle: 200,
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub worker_id: Option<String>,
    pub crawling: CrawlConfig,
    pub proxy: ProxyConfig,
    pub quality: QualityConfig,
    pub trending: TrendingConfig,
    pub search: SearchConfig,
    pub worker: WorkerConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let crawl_defaults = CrawlConfig::default();
        let crawling = CrawlConfig {
            user_agent: env_string("CRAWLING_USER_AGENT", &crawl_defaults.user_agent),
            timeout_secs: env_parse("CRAWLING_TIMEOUT", crawl_defaults.timeout_secs),
            max_retries: env_parse("CRAWLING_MAX_RETRIES", crawl_defaults.max_retries),
            retry_delay_secs: env_parse("CRAWLING_RETRY_DELAY", crawl_defaults.retry_delay_secs),
            default_delay_secs: env_parse(
                "CRAWLING_DEFAULT_DELAY",
                crawl_defaults.default_delay_secs,
            ),
            max_concurrent_per_domain: env_parse(
                "CRAWLING_MAX_CONCURRENT_PER_DOMAIN",
                crawl_defaults.max_concurrent_per_domain,
            ),
            respect_robots_txt: env_bool(
                "CRAWLING_RESPECT_ROBOTS_TXT",
                crawl_defaults.respect_robots_txt,
            ),
            max_content_size: env_parse("CRAWLING_MAX_CONTENT_SIZE", crawl_defaults.max_content_size),
            max_redirects: env_parse("CRAWLING_MAX_REDIRECTS", crawl_defaults.max_redirects),
        };

        let proxy = ProxyConfig {
            endpoints: env_list("PROXY_ENDPOINTS"),
            username: env_string("PROXY_USERNAME", ""),
            password: env_string("PROXY_PASSWORD", ""),
            daily_budget: env_parse("PROXY_DAILY_BUDGET", 100.0),
            cost_per_gb: env_parse("PROXY_COST_PER_GB", 3.0),
        };

        let quality_defaults = QualityConfig::default();
        let quality = QualityConfig {
            min_score: env_parse("QUALITY_MIN_SCORE", quality_defaults.min_score),
            default_threshold: env_parse(
                "QUALITY_DEFAULT_THRESHOLD",
                quality_defaults.default_threshold,
            ),
            premium_threshold: env_parse(
                "QUALITY_PREMIUM_THRESHOLD",
                quality_defaults.premium_threshold,
            ),
            shadow_mode: env_bool("QUALITY_SHADOW_MODE", quality_defaults.shadow_mode),
            min_reputation: env_parse("QUALITY_MIN_REPUTATION", quality_defaults.min_reputation),
            max_reputation: env_parse("QUALITY_MAX_REPUTATION", quality_defaults.max_reputation),
        };

        let trending_defaults = TrendingConfig::default();
        let trending = TrendingConfig {
            short_window_hours: env_parse(
                "TRENDING_SHORT_WINDOW_HOURS",
                trending_defaults.short_window_hours,
            ),
            medium_window_hours: env_parse(
                "TRENDING_MEDIUM_WINDOW_HOURS",
                trending_defaults.medium_window_hours,
            ),
            long_window_hours: env_parse(
                "TRENDING_LONG_WINDOW_HOURS",
                trending_defaults.long_window_hours,
            ),
            min_burst_ratio: env_parse("TRENDING_MIN_BURST_RATIO", trending_defaults.min_burst_ratio),
            min_trend_score: env_parse("TRENDING_MIN_TREND_SCORE", trending_defaults.min_trend_score),
            min_occurrences: env_parse("TRENDING_MIN_OCCURRENCES", trending_defaults.min_occurrences),
            cooldown_hours: env_parse("TRENDING_COOLDOWN_HOURS", trending_defaults.cooldown_hours),
            max_terms: env_parse("TRENDING_MAX_TERMS", trending_defaults.max_terms),
        };

        let search_defaults = SearchConfig::default();
        let search = SearchConfig {
            cache_ttl_seconds: env_parse(
                "SEARCH_CACHE_TTL_SECONDS",
                search_defaults.cache_ttl_seconds,
            ),
            cache_enabled: env_bool("SEARCH_CACHE_ENABLED", search_defaults.cache_enabled),
            default_limit: env_parse("SEARCH_DEFAULT_LIMIT", search_defaults.default_limit),
        };

        let worker_defaults = WorkerConfig::default();
        let worker = WorkerConfig {
            batch_size: env_parse("CRAWLING_BATCH_SIZE", worker_defaults.batch_size),
            max_concurrent_requests: env_parse(
                "CRAWLING_MAX_CONCURRENT_REQUESTS",
                worker_defaults.max_concurrent_requests,
            ),
            cycle_delay_seconds: env_parse(
                "CRAWLING_CYCLE_DELAY_SECONDS",
                worker_defaults.cycle_delay_seconds,
            ),
            max_urls_per_cycle: env_parse(
                "CRAWLING_MAX_URLS_PER_CYCLE",
                worker_defaults.max_urls_per_cycle,
            ),
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env_parse("PORT", 8080),
            worker_id: env::var("WORKER_ID").ok(),
            crawling,
            proxy,
            quality,
            trending,
            search,
            worker,
        })
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|value| {
            value
                .split(',')
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_defaults() {
        let quality = QualityConfig::default();
        assert_eq!(quality.min_score, 0.3);
        assert_eq!(quality.default_threshold, 0.6);
        assert!(quality.shadow_mode);
    }

    #[test]
    fn test_trending_defaults() {
        let trending = TrendingConfig::default();
        assert_eq!(trending.min_burst_ratio, 2.0);
        assert_eq!(trending.min_occurrences, 5);
        assert_eq!(trending.cooldown_hours, 6);
    }

    #[test]
    fn test_env_bool_parsing() {
        assert!(env_bool("NON_EXISTENT_KEY_FOR_TEST", true));
        assert!(!env_bool("NON_EXISTENT_KEY_FOR_TEST", false));
    }
}
