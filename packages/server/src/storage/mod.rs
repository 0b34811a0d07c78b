//! Persisted content store.
//!
//! The `ContentStore` trait is the pipeline's only storage seam: Postgres
//! in production, in-memory for tests. Uniqueness of `canonical_url` and
//! `content_hash` is enforced by the store; competing inserts across
//! workers resolve to the first writer, and the loser's conflict is
//! reported as a benign `Refreshed` outcome.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::common::{ContentItem, IngestionJob, QualitySignalRecord, Source, TrendingTermRecord};

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Outcome of a content-item upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new row was inserted
    Inserted,
    /// A unique conflict kept the existing row; its `updated_at` and
    /// `quality_score` were refreshed
    Refreshed,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch the source for a domain, creating a discovery-tier source on
    /// first sight. Races resolve to the existing row.
    async fn get_or_create_source(&self, domain: &str) -> Result<Source>;

    async fn active_sources(&self) -> Result<Vec<Source>>;

    /// Apply a reputation batch result to a source.
    async fn update_source_reputation(
        &self,
        source_id: Uuid,
        reputation: f64,
        quality_tier: i32,
        success_rate: f64,
    ) -> Result<()>;

    /// Deactivate a source and, with it, all of its items.
    async fn deactivate_source(&self, source_id: Uuid) -> Result<()>;

    /// Refresh a source's last-crawled timestamp for `kind` (root, feed,
    /// or sitemap).
    async fn mark_source_crawled(&self, source_id: Uuid, kind: &str) -> Result<()>;

    /// Most recent quality scores for a source, newest first.
    async fn recent_quality_scores(&self, source_id: Uuid, limit: i64) -> Result<Vec<f64>>;

    /// Insert an item; on `canonical_url` or `content_hash` conflict keep
    /// the existing row and refresh `updated_at` + `quality_score`.
    async fn upsert_content_item(&self, item: &ContentItem) -> Result<UpsertOutcome>;

    /// Append quality signals for an item (idempotent per signal kind and
    /// algorithm version).
    async fn record_quality_signals(&self, signals: &[QualitySignalRecord]) -> Result<()>;

    async fn create_job(&self, job: &IngestionJob) -> Result<()>;
    async fn update_job(&self, job: &IngestionJob) -> Result<()>;

    /// (count_1h, count_6h, count_24h) of active items tagged with the
    /// term, re-derived from the corpus.
    async fn term_window_counts(&self, normalized_term: &str) -> Result<(i64, i64, i64)>;

    async fn upsert_trending_term(&self, term: &TrendingTermRecord) -> Result<()>;

    /// Terms seen within the last `since_hours`, highest trend score first.
    async fn recent_trending_terms(
        &self,
        since_hours: i64,
        limit: i64,
    ) -> Result<Vec<TrendingTermRecord>>;
}
