//! Structured search queries and their canonical cache keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Page size bounds.
const MIN_LIMIT: i64 = 1;
const MAX_LIMIT: i64 = 100;
const DEFAULT_LIMIT: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Relevance,
    Date,
    Quality,
    Popularity,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::Relevance => "relevance",
            SortBy::Date => "date",
            SortBy::Quality => "quality",
            SortBy::Popularity => "popularity",
        }
    }

    /// Unknown sorts fall back to relevance.
    pub fn parse(s: &str) -> Self {
        match s {
            "date" => SortBy::Date,
            "quality" => SortBy::Quality,
            "popularity" => SortBy::Popularity,
            _ => SortBy::Relevance,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Full-text query; empty means filter-only browsing
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub sports: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub content_types: Vec<String>,
    pub quality_threshold: Option<f64>,
    pub date_start: Option<DateTime<Utc>>,
    pub date_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default = "default_limit")]
    pub limit: i64,
    pub cursor: Option<String>,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

impl SearchQuery {
    /// Clamp the limit and trim the query text.
    pub fn normalized(mut self) -> Self {
        self.query = self.query.trim().to_string();
        if self.limit == 0 {
            self.limit = DEFAULT_LIMIT;
        }
        self.limit = self.limit.clamp(MIN_LIMIT, MAX_LIMIT);
        self
    }

    /// Stable cache key: list fields sorted, serialised to JSON with
    /// sorted keys, MD5-hexed. The cursor participates so each page
    /// caches separately.
    pub fn cache_key(&self) -> String {
        let mut sports = self.sports.clone();
        sports.sort();
        let mut sources = self.sources.clone();
        sources.sort();
        let mut content_types = self.content_types.clone();
        content_types.sort();

        let canonical = serde_json::json!({
            "query": self.query,
            "sports": sports,
            "sources": sources,
            "content_types": content_types,
            "quality_threshold": self.quality_threshold,
            "date_start": self.date_start,
            "date_end": self.date_end,
            "sort_by": self.sort_by.as_str(),
            "limit": self.limit,
            "cursor": self.cursor,
        });

        format!("{:x}", md5::compute(canonical.to_string().as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_clamped() {
        let query = SearchQuery {
            limit: 500,
            ..SearchQuery::default()
        }
        .normalized();
        assert_eq!(query.limit, 100);

        let query = SearchQuery {
            limit: -3,
            ..SearchQuery::default()
        }
        .normalized();
        assert_eq!(query.limit, 1);

        let query = SearchQuery::default().normalized();
        assert_eq!(query.limit, 20);
    }

    #[test]
    fn test_cache_key_ignores_list_order() {
        let a = SearchQuery {
            sports: vec!["nba".into(), "mlb".into()],
            ..SearchQuery::default()
        };
        let b = SearchQuery {
            sports: vec!["mlb".into(), "nba".into()],
            ..SearchQuery::default()
        };
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_cache_key_differs_by_page() {
        let first = SearchQuery::default();
        let second = SearchQuery {
            cursor: Some("abc".into()),
            ..SearchQuery::default()
        };
        assert_ne!(first.cache_key(), second.cache_key());
    }

    #[test]
    fn test_sort_parse_fallback() {
        assert_eq!(SortBy::parse("date"), SortBy::Date);
        assert_eq!(SortBy::parse("bogus"), SortBy::Relevance);
    }
}
