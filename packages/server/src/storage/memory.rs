//! In-memory content store for tests.
//!
//! Mirrors the Postgres implementation's semantics: unique
//! `canonical_url` and `content_hash`, upsert-refresh on conflict, and
//! window counts re-derived from stored items.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::common::{
    ContentItem, IngestionJob, JobStatus, QualitySignalRecord, Source, TrendingTermRecord,
};
use crate::storage::{ContentStore, UpsertOutcome};

#[derive(Default)]
struct Inner {
    sources: HashMap<Uuid, Source>,
    items: HashMap<Uuid, ContentItem>,
    signals: Vec<QualitySignalRecord>,
    jobs: HashMap<Uuid, IngestionJob>,
    terms: HashMap<String, TrendingTermRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an item directly, bypassing pipeline checks. Test helper for
    /// building corpora with chosen timestamps.
    pub async fn insert_raw_item(&self, item: ContentItem) {
        self.inner.write().await.items.insert(item.id, item);
    }

    pub async fn item_count(&self) -> usize {
        self.inner.read().await.items.len()
    }

    pub async fn items_with_content_hash(&self, content_hash: &str) -> Vec<ContentItem> {
        self.inner
            .read()
            .await
            .items
            .values()
            .filter(|item| item.content_hash == content_hash)
            .cloned()
            .collect()
    }

    pub async fn signals_for_item(&self, item_id: Uuid) -> Vec<QualitySignalRecord> {
        self.inner
            .read()
            .await
            .signals
            .iter()
            .filter(|signal| signal.content_item_id == item_id)
            .cloned()
            .collect()
    }

    pub async fn get_job(&self, job_id: Uuid) -> Option<IngestionJob> {
        self.inner.read().await.jobs.get(&job_id).cloned()
    }

    pub async fn get_term(&self, normalized_term: &str) -> Option<TrendingTermRecord> {
        self.inner.read().await.terms.get(normalized_term).cloned()
    }
}

fn window_count(items: &[&ContentItem], term: &str, since: DateTime<Utc>) -> i64 {
    items
        .iter()
        .filter(|item| {
            item.is_active
                && item.created_at >= since
                && item.sports_keywords.iter().any(|k| k == term)
        })
        .count() as i64
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn get_or_create_source(&self, domain: &str) -> Result<Source> {
        let mut inner = self.inner.write().await;
        if let Some(source) = inner.sources.values().find(|s| s.domain == domain) {
            return Ok(source.clone());
        }
        let source = Source::for_domain(domain);
        inner.sources.insert(source.id, source.clone());
        Ok(source)
    }

    async fn active_sources(&self) -> Result<Vec<Source>> {
        Ok(self
            .inner
            .read()
            .await
            .sources
            .values()
            .filter(|s| s.is_active)
            .cloned()
            .collect())
    }

    async fn update_source_reputation(
        &self,
        source_id: Uuid,
        reputation: f64,
        quality_tier: i32,
        success_rate: f64,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(source) = inner.sources.get_mut(&source_id) {
            source.reputation = reputation;
            source.quality_tier = quality_tier;
            source.success_rate = success_rate;
            source.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn deactivate_source(&self, source_id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(source) = inner.sources.get_mut(&source_id) {
            source.is_active = false;
        }
        for item in inner.items.values_mut() {
            if item.source_id == source_id {
                item.is_active = false;
            }
        }
        Ok(())
    }

    async fn mark_source_crawled(&self, source_id: Uuid, kind: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(source) = inner.sources.get_mut(&source_id) {
            let now = Some(Utc::now());
            match kind {
                "feed" => source.last_feed_crawl = now,
                "sitemap" => source.last_sitemap_crawl = now,
                _ => source.last_crawled_at = now,
            }
        }
        Ok(())
    }

    async fn recent_quality_scores(&self, source_id: Uuid, limit: i64) -> Result<Vec<f64>> {
        let inner = self.inner.read().await;
        let mut items: Vec<&ContentItem> = inner
            .items
            .values()
            .filter(|item| item.source_id == source_id)
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items
            .iter()
            .take(limit as usize)
            .map(|item| item.quality_score)
            .collect())
    }

    async fn upsert_content_item(&self, item: &ContentItem) -> Result<UpsertOutcome> {
        let mut inner = self.inner.write().await;

        let existing = inner
            .items
            .values()
            .find(|candidate| {
                candidate.canonical_url == item.canonical_url
                    || candidate.content_hash == item.content_hash
            })
            .map(|candidate| candidate.id);

        if let Some(existing_id) = existing {
            let existing = inner.items.get_mut(&existing_id).expect("existing item");
            existing.updated_at = Utc::now();
            existing.quality_score = item.quality_score;
            return Ok(UpsertOutcome::Refreshed);
        }

        inner.items.insert(item.id, item.clone());
        Ok(UpsertOutcome::Inserted)
    }

    async fn record_quality_signals(&self, signals: &[QualitySignalRecord]) -> Result<()> {
        let mut inner = self.inner.write().await;
        for signal in signals {
            let duplicate = inner.signals.iter().any(|existing| {
                existing.content_item_id == signal.content_item_id
                    && existing.signal_kind == signal.signal_kind
                    && existing.algorithm_version == signal.algorithm_version
            });
            if !duplicate {
                inner.signals.push(signal.clone());
            }
        }
        Ok(())
    }

    async fn create_job(&self, job: &IngestionJob) -> Result<()> {
        self.inner.write().await.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn update_job(&self, job: &IngestionJob) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.jobs.get_mut(&job.id) {
            // Terminal status never regresses
            if matches!(existing.status, JobStatus::Completed | JobStatus::Failed) {
                return Ok(());
            }
            *existing = job.clone();
        }
        Ok(())
    }

    async fn term_window_counts(&self, normalized_term: &str) -> Result<(i64, i64, i64)> {
        let inner = self.inner.read().await;
        let items: Vec<&ContentItem> = inner.items.values().collect();
        let now = Utc::now();

        Ok((
            window_count(&items, normalized_term, now - Duration::hours(1)),
            window_count(&items, normalized_term, now - Duration::hours(6)),
            window_count(&items, normalized_term, now - Duration::hours(24)),
        ))
    }

    async fn upsert_trending_term(&self, term: &TrendingTermRecord) -> Result<()> {
        self.inner
            .write()
            .await
            .terms
            .insert(term.normalized_term.clone(), term.clone());
        Ok(())
    }

    async fn recent_trending_terms(
        &self,
        since_hours: i64,
        limit: i64,
    ) -> Result<Vec<TrendingTermRecord>> {
        let since = Utc::now() - Duration::hours(since_hours);
        let inner = self.inner.read().await;

        let mut terms: Vec<TrendingTermRecord> = inner
            .terms
            .values()
            .filter(|term| term.last_seen >= since)
            .cloned()
            .collect();
        terms.sort_by(|a, b| {
            b.trend_score
                .partial_cmp(&a.trend_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        terms.truncate(limit as usize);
        Ok(terms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingestion::ExtractedContent;

    fn item(canonical: &str, hash: &str) -> ContentItem {
        let extraction = ExtractedContent {
            url: canonical.to_string(),
            canonical_url: canonical.to_string(),
            content_hash: hash.to_string(),
            title: "Title".to_string(),
            text: "Body text".to_string(),
            language: "en".to_string(),
            word_count: 2,
            content_type: "general".to_string(),
            success: true,
            ..ExtractedContent::default()
        };
        ContentItem::from_extraction(Uuid::new_v4(), &extraction, 0.5)
    }

    #[tokio::test]
    async fn test_canonical_url_uniqueness() {
        let store = MemoryStore::new();
        let first = item("https://a.com/x", "hash-1");
        let second = item("https://a.com/x", "hash-2");

        assert_eq!(
            store.upsert_content_item(&first).await.unwrap(),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            store.upsert_content_item(&second).await.unwrap(),
            UpsertOutcome::Refreshed
        );
        assert_eq!(store.item_count().await, 1);
    }

    #[tokio::test]
    async fn test_content_hash_uniqueness() {
        let store = MemoryStore::new();
        let first = item("https://a.com/x", "same-hash");
        let second = item("https://b.com/y", "same-hash");

        store.upsert_content_item(&first).await.unwrap();
        assert_eq!(
            store.upsert_content_item(&second).await.unwrap(),
            UpsertOutcome::Refreshed
        );
        assert_eq!(store.items_with_content_hash("same-hash").await.len(), 1);
    }

    #[tokio::test]
    async fn test_source_created_once_per_domain() {
        let store = MemoryStore::new();
        let a = store.get_or_create_source("espn.com").await.unwrap();
        let b = store.get_or_create_source("espn.com").await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_deactivating_source_deactivates_items() {
        let store = MemoryStore::new();
        let source = store.get_or_create_source("espn.com").await.unwrap();

        let mut owned = item("https://espn.com/x", "h1");
        owned.source_id = source.id;
        store.upsert_content_item(&owned).await.unwrap();

        store.deactivate_source(source.id).await.unwrap();

        let items = store.items_with_content_hash("h1").await;
        assert!(!items[0].is_active);
    }

    #[tokio::test]
    async fn test_job_terminal_status_never_regresses() {
        let store = MemoryStore::new();
        let mut job = IngestionJob::new("crawl", None);
        store.create_job(&job).await.unwrap();

        job.status = JobStatus::Completed;
        store.update_job(&job).await.unwrap();

        job.status = JobStatus::Running;
        store.update_job(&job).await.unwrap();

        let stored = store.get_job(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
    }
}
