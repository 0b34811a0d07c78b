//! Domain entities for the persisted content corpus.
//!
//! These structs mirror the database schema. Relations are held as opaque
//! ids plus store lookups; nothing carries in-memory back-pointers.

use chrono::{DateTime, Utc};
use ingestion::ExtractedContent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An origin domain. Created on the first accepted item from a new domain;
/// never hard-deleted (deactivation via `is_active`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub domain: String,
    pub name: String,
    pub base_url: Option<String>,
    /// feed | sitemap | html | api
    pub kind: String,
    pub is_active: bool,
    /// 1 premium, 2 quality, 3 discovery
    pub quality_tier: i32,
    pub reputation: f64,
    pub success_rate: f64,
    pub rss_url: Option<String>,
    pub sitemap_url: Option<String>,
    pub search_queries: Vec<String>,
    pub last_crawled_at: Option<DateTime<Utc>>,
    pub last_sitemap_crawl: Option<DateTime<Utc>>,
    pub last_feed_crawl: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Source {
    /// A fresh source for a newly seen domain: discovery tier, neutral
    /// reputation, active.
    pub fn for_domain(domain: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            domain: domain.to_string(),
            name: domain.trim_start_matches("www.").to_string(),
            base_url: Some(format!("https://{}", domain)),
            kind: "html".to_string(),
            is_active: true,
            quality_tier: 3,
            reputation: 0.5,
            success_rate: 1.0,
            rss_url: None,
            sitemap_url: None,
            search_queries: Vec::new(),
            last_crawled_at: None,
            last_sitemap_crawl: None,
            last_feed_crawl: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One extracted, scored, accepted article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: Uuid,
    pub source_id: Uuid,
    pub original_url: String,
    pub canonical_url: String,
    pub content_hash: String,
    pub title: String,
    pub text: String,
    pub byline: Option<String>,
    /// Filled by the external summariser; never produced here
    pub summary: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub language: Option<String>,
    pub word_count: i32,
    pub image_url: Option<String>,
    pub sports_keywords: Vec<String>,
    /// Entity names grouped by type
    pub entities: serde_json::Value,
    pub content_type: Option<String>,
    /// success | failed
    pub extraction_status: String,
    pub quality_score: f64,
    pub is_active: bool,
    pub is_duplicate: bool,
    pub is_spam: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentItem {
    /// Build a persistable item from a successful extraction.
    pub fn from_extraction(
        source_id: Uuid,
        extraction: &ExtractedContent,
        quality_score: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            source_id,
            original_url: extraction.url.clone(),
            canonical_url: extraction.canonical_url.clone(),
            content_hash: extraction.content_hash.clone(),
            title: extraction.title.clone(),
            text: extraction.text.clone(),
            byline: extraction.byline.clone(),
            summary: None,
            published_at: extraction.published_at,
            language: Some(extraction.language.clone()),
            word_count: extraction.word_count as i32,
            image_url: extraction.image_url.clone(),
            sports_keywords: extraction.sports_keywords.clone(),
            entities: serde_json::to_value(&extraction.entities)
                .unwrap_or(serde_json::Value::Null),
            content_type: Some(extraction.content_type.clone()),
            extraction_status: "success".to_string(),
            quality_score,
            is_active: true,
            is_duplicate: false,
            is_spam: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One scalar quality signal for one item. Append-only; unique per
/// (item, kind, algorithm version).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitySignalRecord {
    pub content_item_id: Uuid,
    pub signal_kind: String,
    pub value: f64,
    pub weight: f64,
    pub algorithm_version: String,
    pub computed_at: DateTime<Utc>,
}

/// Status of an ingestion job. Never regresses once terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// pending -> running -> terminal; a terminal status never changes.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            JobStatus::Pending => matches!(next, JobStatus::Running | JobStatus::Failed),
            JobStatus::Running => matches!(next, JobStatus::Completed | JobStatus::Failed),
            JobStatus::Completed | JobStatus::Failed => false,
        }
    }
}

/// A discovery/crawl batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    pub id: Uuid,
    pub source_id: Option<Uuid>,
    pub kind: String,
    pub status: JobStatus,
    pub discovered: i32,
    pub processed: i32,
    pub successful: i32,
    pub failed: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub summary: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl IngestionJob {
    pub fn new(kind: &str, source_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id,
            kind: kind.to_string(),
            status: JobStatus::Pending,
            discovered: 0,
            processed: 0,
            successful: 0,
            failed: 0,
            started_at: None,
            completed_at: None,
            summary: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }
}

/// Windowed counters and trend metrics for one normalised term.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingTermRecord {
    pub term: String,
    pub normalized_term: String,
    pub term_type: String,
    pub count_1h: i64,
    pub count_6h: i64,
    pub count_24h: i64,
    pub burst_ratio: f64,
    pub trend_score: f64,
    pub is_trending: bool,
    pub trend_start: Option<DateTime<Utc>>,
    pub trend_peak: Option<DateTime<Utc>>,
    pub last_seen: DateTime<Utc>,
    pub related_terms: Vec<String>,
    pub sports_context: serde_json::Value,
}

impl TrendingTermRecord {
    pub fn new(term: &str, normalized_term: &str, term_type: &str) -> Self {
        Self {
            term: term.to_string(),
            normalized_term: normalized_term.to_string(),
            term_type: term_type.to_string(),
            count_1h: 0,
            count_6h: 0,
            count_24h: 0,
            burst_ratio: 0.0,
            trend_score: 0.0,
            is_trending: false,
            trend_start: None,
            trend_peak: None,
            last_seen: Utc::now(),
            related_terms: Vec::new(),
            sports_context: serde_json::Value::Null,
        }
    }

    /// Non-null, non-empty sports context.
    pub fn has_sports_context(&self) -> bool {
        match &self.sports_context {
            serde_json::Value::Null => false,
            serde_json::Value::Object(map) => !map.is_empty(),
            _ => true,
        }
    }
}
