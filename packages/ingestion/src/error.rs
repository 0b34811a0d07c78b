//! Typed errors for the ingestion library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can match
//! on failure kinds and keep per-kind counters.

use thiserror::Error;

/// Errors that can occur while fetching or discovering content.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// HTTP transport failed (DNS, connect, TLS, read)
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    /// Invalid URL format
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Robots.txt disallows crawling this URL
    #[error("robots.txt disallows: {url}")]
    RobotsDisallowed { url: String },

    /// Request exceeded the configured timeout
    #[error("timeout fetching: {url}")]
    Timeout { url: String },

    /// Response body exceeded the configured size limit
    #[error("response body over {limit} bytes: {url}")]
    BodyTooLarge { url: String, limit: usize },

    /// All proxied attempts and the direct fallback failed
    #[error("all {attempts} fetch attempts failed: {url}")]
    Exhausted { url: String, attempts: u32 },
}

/// Result type alias for crawl operations.
pub type CrawlResult<T> = std::result::Result<T, CrawlError>;
