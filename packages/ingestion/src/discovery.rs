//! URL discovery from feeds, sitemaps, and search adaptors.
//!
//! Each method is idempotent in isolation. Results are unioned with
//! first-seen order preserved; the worker applies the per-cycle cap.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CrawlResult;
use crate::fetcher::Fetcher;

/// Nested sitemap recursion ceiling.
const MAX_SITEMAP_DEPTH: usize = 3;

/// Discovery inputs for one source. Missing fields are skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    pub rss_url: Option<String>,
    pub sitemap_url: Option<String>,
    #[serde(default)]
    pub search_queries: Vec<String>,
}

/// Adaptor interface for search-API discovery, keyed by provider name.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn search(&self, query: &str) -> CrawlResult<Vec<String>>;
}

pub struct DiscoveryEngine {
    fetcher: Arc<Fetcher>,
    providers: HashMap<String, Box<dyn SearchProvider>>,
    sitemap_loc: Regex,
    url_loc: Regex,
}

impl DiscoveryEngine {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self {
            fetcher,
            providers: HashMap::new(),
            sitemap_loc: Regex::new(r"(?s)<sitemap[^>]*>.*?<loc>\s*([^<]+?)\s*</loc>.*?</sitemap>")
                .expect("valid sitemap regex"),
            url_loc: Regex::new(r"(?s)<url[^>]*>.*?<loc>\s*([^<]+?)\s*</loc>.*?</url>")
                .expect("valid url regex"),
        }
    }

    /// Register a search-API adaptor under its provider name.
    pub fn register_provider(&mut self, provider: Box<dyn SearchProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    /// Discover URLs for one source: feed, then sitemap, then search
    /// queries, deduplicated preserving first-seen order.
    pub async fn discover(&self, source: &SourceConfig) -> Vec<String> {
        let mut urls = Vec::new();

        if let Some(rss_url) = &source.rss_url {
            urls.extend(self.discover_from_feed(rss_url).await);
        }

        if let Some(sitemap_url) = &source.sitemap_url {
            urls.extend(self.discover_from_sitemap(sitemap_url).await);
        }

        for query in &source.search_queries {
            urls.extend(self.discover_from_search(query).await);
        }

        let total = urls.len();
        let unique = dedupe_preserving_order(urls);
        info!(unique = unique.len(), total = total, "Discovered URLs");
        unique
    }

    /// Entry links from an RSS/Atom feed.
    pub async fn discover_from_feed(&self, feed_url: &str) -> Vec<String> {
        let record = match self.fetcher.fetch(feed_url).await {
            Ok(record) if record.status == 200 => record,
            Ok(record) => {
                warn!(feed_url = %feed_url, status = record.status, "Feed fetch returned non-200");
                return Vec::new();
            }
            Err(e) => {
                warn!(feed_url = %feed_url, error = %e, "Failed to fetch feed");
                return Vec::new();
            }
        };

        match feed_rs::parser::parse(record.body.as_bytes()) {
            Ok(feed) => {
                let urls: Vec<String> = feed
                    .entries
                    .into_iter()
                    .filter_map(|entry| entry.links.first().map(|link| link.href.clone()))
                    .collect();
                info!(feed_url = %feed_url, count = urls.len(), "Discovered URLs from feed");
                urls
            }
            Err(e) => {
                warn!(feed_url = %feed_url, error = %e, "Failed to parse feed");
                Vec::new()
            }
        }
    }

    /// URLs from an XML sitemap, recursing into nested sitemap indexes.
    pub async fn discover_from_sitemap(&self, sitemap_url: &str) -> Vec<String> {
        let urls = self.sitemap_urls(sitemap_url, 0).await;
        info!(sitemap_url = %sitemap_url, count = urls.len(), "Discovered URLs from sitemap");
        urls
    }

    fn sitemap_urls<'a>(
        &'a self,
        sitemap_url: &'a str,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = Vec<String>> + Send + 'a>> {
        Box::pin(async move {
            if depth > MAX_SITEMAP_DEPTH {
                warn!(sitemap_url = %sitemap_url, "Sitemap nesting too deep, stopping");
                return Vec::new();
            }

            let record = match self.fetcher.fetch(sitemap_url).await {
                Ok(record) if record.status == 200 => record,
                Ok(record) => {
                    warn!(sitemap_url = %sitemap_url, status = record.status, "Sitemap fetch returned non-200");
                    return Vec::new();
                }
                Err(e) => {
                    warn!(sitemap_url = %sitemap_url, error = %e, "Failed to fetch sitemap");
                    return Vec::new();
                }
            };

            let mut urls = Vec::new();

            // Sitemap index entries recurse
            for capture in self.sitemap_loc.captures_iter(&record.body) {
                if let Some(loc) = capture.get(1) {
                    urls.extend(self.sitemap_urls(loc.as_str(), depth + 1).await);
                }
            }

            // Leaf URL entries
            for capture in self.url_loc.captures_iter(&record.body) {
                if let Some(loc) = capture.get(1) {
                    urls.push(loc.as_str().to_string());
                }
            }

            urls
        })
    }

    /// URLs from every registered search provider for one query.
    pub async fn discover_from_search(&self, query: &str) -> Vec<String> {
        let mut urls = Vec::new();

        for provider in self.providers.values() {
            match provider.search(query).await {
                Ok(results) => {
                    info!(
                        provider = provider.name(),
                        query = %query,
                        count = results.len(),
                        "Search discovery results"
                    );
                    urls.extend(results);
                }
                Err(e) => {
                    warn!(provider = provider.name(), query = %query, error = %e, "Search discovery failed");
                }
            }
        }

        urls
    }
}

/// Deduplicate preserving first-seen order.
pub fn dedupe_preserving_order(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter().filter(|url| seen.insert(url.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupe_preserving_order() {
        let urls = vec![
            "https://a.com/1".to_string(),
            "https://a.com/2".to_string(),
            "https://a.com/1".to_string(),
            "https://a.com/3".to_string(),
        ];
        assert_eq!(
            dedupe_preserving_order(urls),
            vec![
                "https://a.com/1".to_string(),
                "https://a.com/2".to_string(),
                "https://a.com/3".to_string(),
            ]
        );
    }

    #[test]
    fn test_sitemap_regexes_extract_locs() {
        let engine_regex =
            Regex::new(r"(?s)<url[^>]*>.*?<loc>\s*([^<]+?)\s*</loc>.*?</url>").unwrap();
        let xml = r#"<?xml version="1.0"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url><loc>https://example.com/story/1</loc><lastmod>2024-01-01</lastmod></url>
              <url><loc> https://example.com/story/2 </loc></url>
            </urlset>"#;

        let locs: Vec<&str> = engine_regex
            .captures_iter(xml)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        assert_eq!(locs, vec!["https://example.com/story/1", "https://example.com/story/2"]);
    }

    #[test]
    fn test_source_config_deserializes_with_missing_fields() {
        let config: SourceConfig = serde_json::from_str(r#"{"rss_url": "https://a.com/rss"}"#).unwrap();
        assert_eq!(config.rss_url.as_deref(), Some("https://a.com/rss"));
        assert!(config.sitemap_url.is_none());
        assert!(config.search_queries.is_empty());
    }
}
