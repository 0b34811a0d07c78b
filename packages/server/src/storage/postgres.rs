//! Postgres implementation of the content store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::common::{ContentItem, IngestionJob, QualitySignalRecord, Source, TrendingTermRecord};
use crate::storage::{ContentStore, UpsertOutcome};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn source_from_row(row: &sqlx::postgres::PgRow) -> Source {
        Source {
            id: row.get("id"),
            domain: row.get("domain"),
            name: row.get("name"),
            base_url: row.get("base_url"),
            kind: row.get("kind"),
            is_active: row.get("is_active"),
            quality_tier: row.get("quality_tier"),
            reputation: row.get("reputation"),
            success_rate: row.get("success_rate"),
            rss_url: row.get("rss_url"),
            sitemap_url: row.get("sitemap_url"),
            search_queries: row.get("search_queries"),
            last_crawled_at: row.get("last_crawled_at"),
            last_sitemap_crawl: row.get("last_sitemap_crawl"),
            last_feed_crawl: row.get("last_feed_crawl"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    fn term_from_row(row: &sqlx::postgres::PgRow) -> TrendingTermRecord {
        TrendingTermRecord {
            term: row.get("term"),
            normalized_term: row.get("normalized_term"),
            term_type: row.get("term_type"),
            count_1h: row.get("count_1h"),
            count_6h: row.get("count_6h"),
            count_24h: row.get("count_24h"),
            burst_ratio: row.get("burst_ratio"),
            trend_score: row.get("trend_score"),
            is_trending: row.get("is_trending"),
            trend_start: row.get("trend_start"),
            trend_peak: row.get("trend_peak"),
            last_seen: row.get("last_seen"),
            related_terms: row.get("related_terms"),
            sports_context: row.get("sports_context"),
        }
    }
}

#[async_trait]
impl ContentStore for PostgresStore {
    async fn get_or_create_source(&self, domain: &str) -> Result<Source> {
        if let Some(row) = sqlx::query("SELECT * FROM sources WHERE domain = $1")
            .bind(domain)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up source")?
        {
            return Ok(Self::source_from_row(&row));
        }

        let source = Source::for_domain(domain);
        sqlx::query(
            r#"
            INSERT INTO sources (
                id, domain, name, base_url, kind, is_active, quality_tier,
                reputation, success_rate, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())
            ON CONFLICT (domain) DO NOTHING
            "#,
        )
        .bind(source.id)
        .bind(&source.domain)
        .bind(&source.name)
        .bind(&source.base_url)
        .bind(&source.kind)
        .bind(source.is_active)
        .bind(source.quality_tier)
        .bind(source.reputation)
        .bind(source.success_rate)
        .execute(&self.pool)
        .await
        .context("Failed to create source")?;

        // Re-select so a racing insert resolves to the winning row
        let row = sqlx::query("SELECT * FROM sources WHERE domain = $1")
            .bind(domain)
            .fetch_one(&self.pool)
            .await
            .context("Failed to fetch source after insert")?;
        Ok(Self::source_from_row(&row))
    }

    async fn active_sources(&self) -> Result<Vec<Source>> {
        let rows = sqlx::query("SELECT * FROM sources WHERE is_active = true ORDER BY quality_tier, domain")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list active sources")?;
        Ok(rows.iter().map(Self::source_from_row).collect())
    }

    async fn update_source_reputation(
        &self,
        source_id: Uuid,
        reputation: f64,
        quality_tier: i32,
        success_rate: f64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sources
            SET reputation = $2, quality_tier = $3, success_rate = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(source_id)
        .bind(reputation)
        .bind(quality_tier)
        .bind(success_rate)
        .execute(&self.pool)
        .await
        .context("Failed to update source reputation")?;
        Ok(())
    }

    async fn deactivate_source(&self, source_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query("UPDATE sources SET is_active = false, updated_at = NOW() WHERE id = $1")
            .bind(source_id)
            .execute(&mut *tx)
            .await
            .context("Failed to deactivate source")?;

        // A source owns its items: deactivation cascades
        sqlx::query("UPDATE content_items SET is_active = false, updated_at = NOW() WHERE source_id = $1")
            .bind(source_id)
            .execute(&mut *tx)
            .await
            .context("Failed to deactivate source items")?;

        tx.commit().await.context("Failed to commit deactivation")?;
        Ok(())
    }

    async fn mark_source_crawled(&self, source_id: Uuid, kind: &str) -> Result<()> {
        let column = match kind {
            "feed" => "last_feed_crawl",
            "sitemap" => "last_sitemap_crawl",
            _ => "last_crawled_at",
        };
        let query = format!(
            "UPDATE sources SET {} = NOW(), updated_at = NOW() WHERE id = $1",
            column
        );
        sqlx::query(&query)
            .bind(source_id)
            .execute(&self.pool)
            .await
            .context("Failed to mark source crawled")?;
        Ok(())
    }

    async fn recent_quality_scores(&self, source_id: Uuid, limit: i64) -> Result<Vec<f64>> {
        let rows = sqlx::query(
            r#"
            SELECT quality_score
            FROM content_items
            WHERE source_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(source_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch recent quality scores")?;

        Ok(rows.iter().map(|row| row.get("quality_score")).collect())
    }

    async fn upsert_content_item(&self, item: &ContentItem) -> Result<UpsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO content_items (
                id, source_id, original_url, canonical_url, content_hash,
                title, text, byline, summary, published_at, language,
                word_count, image_url, sports_keywords, entities, content_type,
                extraction_status, quality_score, is_active, is_duplicate,
                is_spam, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                $15, $16, $17, $18, $19, $20, $21, NOW(), NOW()
            )
            ON CONFLICT (canonical_url) DO UPDATE SET
                updated_at = NOW(),
                quality_score = EXCLUDED.quality_score
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(item.id)
        .bind(item.source_id)
        .bind(&item.original_url)
        .bind(&item.canonical_url)
        .bind(&item.content_hash)
        .bind(&item.title)
        .bind(&item.text)
        .bind(&item.byline)
        .bind(&item.summary)
        .bind(item.published_at)
        .bind(&item.language)
        .bind(item.word_count)
        .bind(&item.image_url)
        .bind(&item.sports_keywords)
        .bind(&item.entities)
        .bind(&item.content_type)
        .bind(&item.extraction_status)
        .bind(item.quality_score)
        .bind(item.is_active)
        .bind(item.is_duplicate)
        .bind(item.is_spam)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => {
                let inserted: bool = row.get("inserted");
                Ok(if inserted {
                    UpsertOutcome::Inserted
                } else {
                    UpsertOutcome::Refreshed
                })
            }
            // A content_hash conflict (different canonical URL, same body)
            // lands here: keep the existing row, refresh its score
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("23505") => {
                sqlx::query(
                    r#"
                    UPDATE content_items
                    SET updated_at = NOW(), quality_score = $2
                    WHERE content_hash = $1
                    "#,
                )
                .bind(&item.content_hash)
                .bind(item.quality_score)
                .execute(&self.pool)
                .await
                .context("Failed to refresh conflicting item")?;
                Ok(UpsertOutcome::Refreshed)
            }
            Err(e) => Err(e).context("Failed to upsert content item"),
        }
    }

    async fn record_quality_signals(&self, signals: &[QualitySignalRecord]) -> Result<()> {
        for signal in signals {
            sqlx::query(
                r#"
                INSERT INTO quality_signals (
                    content_item_id, signal_kind, value, weight,
                    algorithm_version, computed_at
                ) VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (content_item_id, signal_kind, algorithm_version) DO NOTHING
                "#,
            )
            .bind(signal.content_item_id)
            .bind(&signal.signal_kind)
            .bind(signal.value)
            .bind(signal.weight)
            .bind(&signal.algorithm_version)
            .bind(signal.computed_at)
            .execute(&self.pool)
            .await
            .context("Failed to record quality signal")?;
        }
        Ok(())
    }

    async fn create_job(&self, job: &IngestionJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ingestion_jobs (
                id, source_id, kind, status, discovered, processed,
                successful, failed, started_at, completed_at, summary, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(job.id)
        .bind(job.source_id)
        .bind(&job.kind)
        .bind(job.status.as_str())
        .bind(job.discovered)
        .bind(job.processed)
        .bind(job.successful)
        .bind(job.failed)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.summary)
        .bind(job.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to create ingestion job")?;
        Ok(())
    }

    async fn update_job(&self, job: &IngestionJob) -> Result<()> {
        // Status never regresses: terminal rows are left alone
        sqlx::query(
            r#"
            UPDATE ingestion_jobs
            SET status = $2, discovered = $3, processed = $4, successful = $5,
                failed = $6, started_at = $7, completed_at = $8, summary = $9
            WHERE id = $1 AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(job.discovered)
        .bind(job.processed)
        .bind(job.successful)
        .bind(job.failed)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.summary)
        .execute(&self.pool)
        .await
        .context("Failed to update ingestion job")?;
        Ok(())
    }

    async fn term_window_counts(&self, normalized_term: &str) -> Result<(i64, i64, i64)> {
        let row = sqlx::query(
            r#"
            WITH occurrences AS (
                SELECT created_at
                FROM content_items
                WHERE sports_keywords @> ARRAY[$1]
                  AND created_at >= NOW() - INTERVAL '24 hours'
                  AND is_active = true
            )
            SELECT
                COUNT(*) FILTER (WHERE created_at >= NOW() - INTERVAL '1 hour') AS count_1h,
                COUNT(*) FILTER (WHERE created_at >= NOW() - INTERVAL '6 hours') AS count_6h,
                COUNT(*) AS count_24h
            FROM occurrences
            "#,
        )
        .bind(normalized_term)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count term occurrences")?;

        Ok((
            row.get("count_1h"),
            row.get("count_6h"),
            row.get("count_24h"),
        ))
    }

    async fn upsert_trending_term(&self, term: &TrendingTermRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trending_terms (
                term, normalized_term, term_type, count_1h, count_6h, count_24h,
                burst_ratio, trend_score, is_trending, trend_start, trend_peak,
                last_seen, related_terms, sports_context, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, NOW(), NOW())
            ON CONFLICT (normalized_term) DO UPDATE SET
                term = EXCLUDED.term,
                term_type = EXCLUDED.term_type,
                count_1h = EXCLUDED.count_1h,
                count_6h = EXCLUDED.count_6h,
                count_24h = EXCLUDED.count_24h,
                burst_ratio = EXCLUDED.burst_ratio,
                trend_score = EXCLUDED.trend_score,
                is_trending = EXCLUDED.is_trending,
                trend_start = EXCLUDED.trend_start,
                trend_peak = EXCLUDED.trend_peak,
                last_seen = EXCLUDED.last_seen,
                related_terms = EXCLUDED.related_terms,
                sports_context = EXCLUDED.sports_context,
                updated_at = NOW()
            "#,
        )
        .bind(&term.term)
        .bind(&term.normalized_term)
        .bind(&term.term_type)
        .bind(term.count_1h)
        .bind(term.count_6h)
        .bind(term.count_24h)
        .bind(term.burst_ratio)
        .bind(term.trend_score)
        .bind(term.is_trending)
        .bind(term.trend_start)
        .bind(term.trend_peak)
        .bind(term.last_seen)
        .bind(&term.related_terms)
        .bind(&term.sports_context)
        .execute(&self.pool)
        .await
        .context("Failed to upsert trending term")?;
        Ok(())
    }

    async fn recent_trending_terms(
        &self,
        since_hours: i64,
        limit: i64,
    ) -> Result<Vec<TrendingTermRecord>> {
        let since = Utc::now() - chrono::Duration::hours(since_hours);
        let rows = sqlx::query(
            r#"
            SELECT term, normalized_term, term_type, count_1h, count_6h, count_24h,
                   burst_ratio, trend_score, is_trending, trend_start, trend_peak,
                   last_seen, related_terms, sports_context
            FROM trending_terms
            WHERE last_seen >= $1
            ORDER BY trend_score DESC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch recent trending terms")?;

        Ok(rows.iter().map(Self::term_from_row).collect())
    }
}
