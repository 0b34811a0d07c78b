//! URL canonicalisation for deduplication keys.
//!
//! Two URLs that differ only in tracking parameters, `www.` prefixes, or a
//! trailing slash should collapse to the same canonical form. A page can
//! also declare its own canonical URL via `<link rel="canonical">`, which
//! supersedes anything derived from the fetched URL.

use std::collections::HashSet;

use scraper::{Html, Selector};
use tracing::warn;
use url::Url;

/// UTM campaign parameters stripped from every URL.
const UTM_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "utm_id",
    "utm_source_platform",
    "utm_creative_format",
    "utm_marketing_tactic",
];

/// Ad and click-tracking parameters.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "msclkid", "twclid", "_ga", "_gl", "mc_cid", "mc_eid", "ref",
    "referrer", "source", "campaign", "medium", "content", "term", "affiliate", "partner",
];

/// Session and cache-busting parameters.
const SESSION_PARAMS: &[&str] = &[
    "sessionid",
    "session_id",
    "sid",
    "jsessionid",
    "phpsessid",
    "aspsessionid",
    "cfid",
    "cftoken",
    "_t",
    "timestamp",
    "cache_bust",
];

/// Canonicalises URLs deterministically: identical inputs always produce
/// byte-identical outputs, and the operation is idempotent.
pub struct UrlCanonicalizer {
    params_to_remove: HashSet<&'static str>,
    canonical_selector: Selector,
}

impl Default for UrlCanonicalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlCanonicalizer {
    pub fn new() -> Self {
        let params_to_remove = UTM_PARAMS
            .iter()
            .chain(TRACKING_PARAMS)
            .chain(SESSION_PARAMS)
            .copied()
            .collect();

        Self {
            params_to_remove,
            canonical_selector: Selector::parse(r#"link[rel="canonical"]"#)
                .expect("valid canonical selector"),
        }
    }

    /// Canonicalise a URL. On malformed input the URL is returned unchanged.
    pub fn canonicalize(&self, url: &str) -> String {
        match self.try_canonicalize(url) {
            Ok(canonical) => canonical,
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to canonicalize URL");
                url.to_string()
            }
        }
    }

    fn try_canonicalize(&self, raw: &str) -> Result<String, url::ParseError> {
        let parsed = Url::parse(raw.trim())?;

        let scheme = parsed.scheme().to_lowercase();
        let host = parsed
            .host_str()
            .ok_or(url::ParseError::EmptyHost)?
            .to_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);

        // Empty path collapses to "/"; non-root paths lose trailing slashes
        // (all of them, so canonicalisation stays idempotent)
        let mut path = parsed.path().to_string();
        if path.is_empty() {
            path = "/".to_string();
        }
        while path.len() > 1 && path.ends_with('/') {
            path.pop();
        }

        // Decode the query into key -> first value, drop tracking parameters,
        // then sort for a stable ordering
        let mut params: Vec<(String, String)> = Vec::new();
        for (key, value) in parsed.query_pairs() {
            if self.params_to_remove.contains(key.to_lowercase().as_str()) {
                continue;
            }
            if params.iter().any(|(k, _)| *k == *key) {
                continue;
            }
            params.push((key.into_owned(), value.into_owned()));
        }
        params.sort();

        let query = if params.is_empty() {
            String::new()
        } else {
            let encoded: String = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params)
                .finish();
            format!("?{}", encoded)
        };

        let authority = match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        // Fragment is always dropped
        Ok(format!("{}://{}{}{}", scheme, authority, path, query))
    }

    /// Extract and canonicalise a page's `<link rel="canonical">` href,
    /// resolved against the URL the page was fetched from.
    pub fn canonical_from_html(&self, html: &str, base_url: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let href = document
            .select(&self.canonical_selector)
            .next()?
            .value()
            .attr("href")?;

        let base = Url::parse(base_url).ok()?;
        let resolved = base.join(href).ok()?;

        Some(self.canonicalize(resolved.as_str()))
    }
}
