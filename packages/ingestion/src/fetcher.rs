//! Resilient HTTP fetching: robots compliance, rate limiting, proxy
//! rotation with retries, and a direct fallback.
//!
//! One `Fetcher` is shared by all of a worker's fetch tasks. Because
//! `reqwest` binds proxies at client construction, the fetcher pre-builds
//! one client per proxy endpoint plus a direct client, and the proxy
//! manager's rotation picks among them per attempt.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::CrawlConfig;
use crate::error::{CrawlError, CrawlResult};
use crate::proxy::ProxyManager;
use crate::rate_limit::HostRateLimiter;
use crate::robots::RobotsChecker;

/// Everything a completed fetch produced, successful or not. Status >= 400
/// still yields a record so callers can log HTTP-level telemetry.
#[derive(Debug, Clone)]
pub struct FetchRecord {
    /// URL as requested
    pub url: String,
    /// URL after redirects
    pub final_url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
    /// Decoded body (lossy UTF-8)
    pub body: String,
    pub content_type: Option<String>,
    pub fetch_time_ms: f64,
    pub content_size_bytes: usize,
    pub proxy_used: bool,
    /// 0-based attempt that produced this record
    pub attempt: u32,
}

impl FetchRecord {
    pub fn is_success(&self) -> bool {
        self.status < 400
    }

    pub fn host(&self) -> Option<String> {
        Url::parse(&self.final_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}

pub struct Fetcher {
    config: CrawlConfig,
    direct: reqwest::Client,
    proxied: HashMap<String, reqwest::Client>,
    proxy_manager: Arc<ProxyManager>,
    rate_limiter: Arc<HostRateLimiter>,
    robots: Arc<RobotsChecker>,
    /// Per-host connection cap; permits release on drop, including on
    /// cancellation
    host_semaphores: tokio::sync::Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Fetcher {
    pub fn new(
        config: CrawlConfig,
        proxy_manager: Arc<ProxyManager>,
        rate_limiter: Arc<HostRateLimiter>,
        robots: Arc<RobotsChecker>,
    ) -> CrawlResult<Self> {
        let direct = build_client(&config, None)?;

        let mut proxied = HashMap::new();
        for proxy_url in proxy_manager.proxy_urls() {
            let client = build_client(&config, Some(proxy_url))?;
            proxied.insert(proxy_url.clone(), client);
        }

        Ok(Self {
            config,
            direct,
            proxied,
            proxy_manager,
            rate_limiter,
            robots,
            host_semaphores: tokio::sync::Mutex::new(HashMap::new()),
        })
    }

    async fn host_permit(&self, host: &str) -> Option<OwnedSemaphorePermit> {
        let semaphore = {
            let mut semaphores = self.host_semaphores.lock().await;
            semaphores
                .entry(host.to_string())
                .or_insert_with(|| {
                    Arc::new(Semaphore::new(self.config.max_concurrent_per_domain.max(1)))
                })
                .clone()
        };
        semaphore.acquire_owned().await.ok()
    }

    /// Fetch a URL with all guardrails applied.
    pub async fn fetch(&self, url: &str) -> CrawlResult<FetchRecord> {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .ok_or_else(|| CrawlError::InvalidUrl {
                url: url.to_string(),
            })?;

        if self.config.respect_robots_txt
            && !self.robots.can_fetch(url, &self.config.user_agent).await
        {
            debug!(url = %url, "Robots.txt disallows fetching");
            return Err(CrawlError::RobotsDisallowed {
                url: url.to_string(),
            });
        }

        // Held for the whole fetch, dropped on every exit path
        let _host_permit = self.host_permit(&host).await;

        self.rate_limiter.acquire(&host).await;

        if let Some(delay) = self.robots.crawl_delay(url, &self.config.user_agent).await {
            tokio::time::sleep(delay).await;
        }

        // Proxied attempts with exponential backoff and jitter
        for attempt in 0..=self.config.max_retries {
            let proxy = self.proxy_manager.next();

            match self.attempt_fetch(url, proxy.as_deref(), attempt).await {
                Ok(record) => {
                    self.rate_limiter.observe(&host, record.status).await;
                    if let Some(proxy_url) = &proxy {
                        self.proxy_manager.record(
                            proxy_url,
                            record.content_size_bytes as u64,
                            record.is_success(),
                        );
                    }
                    return Ok(record);
                }
                // Oversize bodies are dropped outright, never retried
                Err(e @ CrawlError::BodyTooLarge { .. }) => {
                    if let Some(proxy_url) = &proxy {
                        self.proxy_manager.record(proxy_url, 0, false);
                    }
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        url = %url,
                        attempt = attempt + 1,
                        error = %e,
                        "Fetch attempt failed"
                    );
                    if let Some(proxy_url) = &proxy {
                        self.proxy_manager.record(proxy_url, 0, false);
                    }
                    if attempt < self.config.max_retries {
                        tokio::time::sleep(self.retry_delay(attempt)).await;
                    }
                }
            }
        }

        // Direct fallback after all proxied attempts
        info!(url = %url, "Proxied attempts failed, trying direct connection");
        match self
            .attempt_fetch(url, None, self.config.max_retries + 1)
            .await
        {
            Ok(record) => {
                info!(url = %url, status = record.status, "Direct connection succeeded");
                self.rate_limiter.observe(&host, record.status).await;
                Ok(record)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Direct fetch also failed");
                Err(CrawlError::Exhausted {
                    url: url.to_string(),
                    attempts: self.config.max_retries + 2,
                })
            }
        }
    }

    async fn attempt_fetch(
        &self,
        url: &str,
        proxy: Option<&str>,
        attempt: u32,
    ) -> CrawlResult<FetchRecord> {
        let client = proxy
            .and_then(|p| self.proxied.get(p))
            .unwrap_or(&self.direct);

        let start = Instant::now();

        let response = client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                CrawlError::Timeout {
                    url: url.to_string(),
                }
            } else {
                CrawlError::Http(e)
            }
        })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let content_type = headers.get("content-type").cloned();

        // Content-Length pre-check before reading anything
        if let Some(length) = response.content_length() {
            if length as usize > self.config.max_content_size {
                warn!(url = %url, content_length = length, "Content too large");
                return Err(CrawlError::BodyTooLarge {
                    url: url.to_string(),
                    limit: self.config.max_content_size,
                });
            }
        }

        // Streamed read with a hard cap for servers that lie about length
        let mut body_bytes: Vec<u8> = Vec::new();
        let mut response = response;
        while let Some(chunk) = response.chunk().await.map_err(CrawlError::Http)? {
            body_bytes.extend_from_slice(&chunk);
            if body_bytes.len() > self.config.max_content_size {
                warn!(url = %url, bytes = body_bytes.len(), "Content too large (streamed)");
                return Err(CrawlError::BodyTooLarge {
                    url: url.to_string(),
                    limit: self.config.max_content_size,
                });
            }
        }

        if status >= 400 {
            warn!(url = %url, status = status, "HTTP error status");
        }

        let content_size_bytes = body_bytes.len();
        Ok(FetchRecord {
            url: url.to_string(),
            final_url,
            status,
            headers,
            body: String::from_utf8_lossy(&body_bytes).into_owned(),
            content_type,
            fetch_time_ms: start.elapsed().as_secs_f64() * 1000.0,
            content_size_bytes,
            proxy_used: proxy.is_some(),
            attempt,
        })
    }

    /// Exponential backoff with +-10% jitter.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = 2f64.powi(attempt as i32) * self.config.retry_delay_secs;
        let jitter = base * 0.1 * (rand::random::<f64>() * 2.0 - 1.0);
        Duration::from_secs_f64((base + jitter).max(0.0))
    }
}

fn build_client(config: &CrawlConfig, proxy_url: Option<&str>) -> CrawlResult<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

    let mut builder = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeout_secs))
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects));

    if let Some(proxy_url) = proxy_url {
        let proxy = reqwest::Proxy::all(proxy_url).map_err(CrawlError::Http)?;
        builder = builder.proxy(proxy);
    }

    builder.build().map_err(CrawlError::Http)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyConfig;

    fn test_fetcher(config: CrawlConfig) -> Fetcher {
        let proxy_manager = Arc::new(ProxyManager::new(ProxyConfig::default()));
        let rate_limiter = Arc::new(HostRateLimiter::new(config.default_delay_secs));
        let robots = Arc::new(RobotsChecker::new(reqwest::Client::new()));
        Fetcher::new(config, proxy_manager, rate_limiter, robots).unwrap()
    }

    #[test]
    fn test_retry_delay_scales_exponentially() {
        let fetcher = test_fetcher(CrawlConfig {
            retry_delay_secs: 1.0,
            ..CrawlConfig::default()
        });

        let d0 = fetcher.retry_delay(0).as_secs_f64();
        let d2 = fetcher.retry_delay(2).as_secs_f64();

        // Base 1s and 4s, each within +-10%
        assert!((0.9..=1.1).contains(&d0), "d0 = {}", d0);
        assert!((3.6..=4.4).contains(&d2), "d2 = {}", d2);
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let fetcher = test_fetcher(CrawlConfig::default());
        let result = fetcher.fetch("not a url").await;
        assert!(matches!(result, Err(CrawlError::InvalidUrl { .. })));
    }

    #[test]
    fn test_fetch_record_success_flag() {
        let record = FetchRecord {
            url: "https://example.com".to_string(),
            final_url: "https://example.com".to_string(),
            status: 404,
            headers: HashMap::new(),
            body: String::new(),
            content_type: None,
            fetch_time_ms: 1.0,
            content_size_bytes: 0,
            proxy_used: false,
            attempt: 0,
        };
        assert!(!record.is_success());
    }
}
