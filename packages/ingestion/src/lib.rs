//! Crawling, extraction, and near-duplicate detection.
//!
//! This crate is the ingestion half of the sports content pipeline. It knows
//! how to discover candidate URLs (feeds, sitemaps, search adaptors), fetch
//! them under politeness and proxy-budget controls, turn raw HTML into a
//! structured article record, and reject near-duplicates. It does not talk
//! to the content store; the application crate wires these pieces into the
//! worker loop.

pub mod canonical;
pub mod config;
pub mod crawler;
pub mod dedup;
pub mod discovery;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod hasher;
pub mod keywords;
pub mod proxy;
pub mod rate_limit;
pub mod robots;

pub use canonical::UrlCanonicalizer;
pub use config::{CrawlConfig, ProxyConfig};
pub use crawler::{Crawler, CrawlerStats};
pub use dedup::NearDuplicateIndex;
pub use discovery::{DiscoveryEngine, SearchProvider, SourceConfig};
pub use error::{CrawlError, CrawlResult};
pub use extractor::{ContentExtractor, ExtractedContent};
pub use fetcher::{FetchRecord, Fetcher};
pub use proxy::ProxyManager;
pub use rate_limit::HostRateLimiter;
pub use robots::RobotsChecker;
