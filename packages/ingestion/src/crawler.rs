//! Crawler facade: wires the fetcher, rate limiter, proxy pool, robots
//! checker, and discovery engine together and tracks run statistics.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::config::{CrawlConfig, ProxyConfig};
use crate::discovery::{DiscoveryEngine, SearchProvider, SourceConfig};
use crate::error::{CrawlError, CrawlResult};
use crate::fetcher::{FetchRecord, Fetcher};
use crate::proxy::{ProxyManager, ProxyPoolStats};
use crate::rate_limit::HostRateLimiter;
use crate::robots::RobotsChecker;

/// Counters over a crawler's lifetime.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlerStats {
    pub requests_made: u64,
    pub requests_successful: u64,
    pub requests_failed: u64,
    pub bytes_downloaded: u64,
    pub robots_blocked: u64,
    pub oversize_skipped: u64,
    pub start_time: Option<DateTime<Utc>>,
}

impl CrawlerStats {
    pub fn runtime_seconds(&self) -> f64 {
        self.start_time
            .map(|start| (Utc::now() - start).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0)
    }

    pub fn success_rate(&self) -> f64 {
        self.requests_successful as f64 / (self.requests_made.max(1)) as f64
    }
}

pub struct Crawler {
    config: CrawlConfig,
    fetcher: Arc<Fetcher>,
    discovery: DiscoveryEngine,
    proxy_manager: Arc<ProxyManager>,
    stats: Mutex<CrawlerStats>,
}

impl Crawler {
    pub fn new(config: CrawlConfig, proxy_config: ProxyConfig) -> CrawlResult<Self> {
        let proxy_manager = Arc::new(ProxyManager::new(proxy_config));
        let rate_limiter = Arc::new(HostRateLimiter::new(config.default_delay_secs));
        let robots = Arc::new(RobotsChecker::new(
            reqwest::Client::builder()
                .user_agent(config.user_agent.clone())
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .map_err(CrawlError::Http)?,
        ));

        let fetcher = Arc::new(Fetcher::new(
            config.clone(),
            proxy_manager.clone(),
            rate_limiter,
            robots,
        )?);
        let discovery = DiscoveryEngine::new(fetcher.clone());

        Ok(Self {
            config,
            fetcher,
            discovery,
            proxy_manager,
            stats: Mutex::new(CrawlerStats {
                start_time: Some(Utc::now()),
                ..CrawlerStats::default()
            }),
        })
    }

    pub fn fetcher(&self) -> Arc<Fetcher> {
        self.fetcher.clone()
    }

    /// Register a search-API adaptor for discovery.
    pub fn register_search_provider(&mut self, provider: Box<dyn SearchProvider>) {
        self.discovery.register_provider(provider);
    }

    /// Crawl a single URL, updating stats by outcome.
    pub async fn crawl_url(&self, url: &str) -> CrawlResult<FetchRecord> {
        {
            let mut stats = self.stats.lock().expect("crawler stats lock");
            stats.requests_made += 1;
        }

        let result = self.fetcher.fetch(url).await;

        let mut stats = self.stats.lock().expect("crawler stats lock");
        match &result {
            Ok(record) => {
                if record.is_success() {
                    stats.requests_successful += 1;
                    stats.bytes_downloaded += record.content_size_bytes as u64;
                } else {
                    stats.requests_failed += 1;
                }
            }
            Err(CrawlError::RobotsDisallowed { .. }) => stats.robots_blocked += 1,
            Err(CrawlError::BodyTooLarge { .. }) => stats.oversize_skipped += 1,
            Err(_) => stats.requests_failed += 1,
        }

        result
    }

    /// Crawl many URLs with bounded concurrency. Failures are logged and
    /// skipped; results carry no ordering guarantee.
    pub async fn crawl_urls(&self, urls: &[String], max_concurrent: usize) -> Vec<FetchRecord> {
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

        let mut handles = Vec::with_capacity(urls.len());
        for url in urls {
            let semaphore = semaphore.clone();
            let url = url.clone();
            handles.push(async move {
                let _permit = semaphore.acquire().await.ok()?;
                match self.crawl_url(&url).await {
                    Ok(record) => Some(record),
                    Err(e) => {
                        error!(url = %url, error = %e, "Crawl task failed");
                        None
                    }
                }
            });
        }

        let results = futures::future::join_all(handles).await;
        let records: Vec<FetchRecord> = results.into_iter().flatten().collect();
        info!(
            requested = urls.len(),
            fetched = records.len(),
            "Batch crawl completed"
        );
        records
    }

    /// Discover URLs for a source via feed, sitemap, and search adaptors.
    pub async fn discover(&self, source: &SourceConfig) -> Vec<String> {
        self.discovery.discover(source).await
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    pub fn stats(&self) -> CrawlerStats {
        self.stats.lock().expect("crawler stats lock").clone()
    }

    pub fn proxy_stats(&self) -> ProxyPoolStats {
        self.proxy_manager.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_crawler_builds_with_defaults() {
        let crawler = Crawler::new(CrawlConfig::default(), ProxyConfig::default()).unwrap();
        let stats = crawler.stats();
        assert_eq!(stats.requests_made, 0);
        assert!(stats.start_time.is_some());
    }

    #[tokio::test]
    async fn test_invalid_url_counts_as_failure() {
        let crawler = Crawler::new(CrawlConfig::default(), ProxyConfig::default()).unwrap();
        let result = crawler.crawl_url("::not-a-url::").await;
        assert!(result.is_err());

        let stats = crawler.stats();
        assert_eq!(stats.requests_made, 1);
        assert_eq!(stats.requests_failed, 1);
    }

    #[test]
    fn test_success_rate_with_no_requests() {
        let stats = CrawlerStats::default();
        assert_eq!(stats.success_rate(), 0.0);
    }
}
