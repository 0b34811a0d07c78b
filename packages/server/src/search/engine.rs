//! Query planning, ranking, and cursor pagination over Postgres.
//!
//! Two queries run per search: the filtered primary query with the
//! ranking expression, and a filters-only count query. `limit + 1` rows
//! decide `has_more`; the next cursor encodes the full sort tuple of the
//! last returned row. Null publication dates sort as the epoch so every
//! sort is a total order and pages never overlap.

use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::search::cache::SearchCache;
use crate::search::cursor::SearchCursor;
use crate::search::query::{SearchQuery, SortBy};

/// Results slower than this get cached.
const CACHE_THRESHOLD_MS: f64 = 100.0;

/// Suggestion prefixes shorter than this return nothing.
const MIN_SUGGEST_PREFIX: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchItem {
    pub id: Uuid,
    pub title: String,
    pub byline: Option<String>,
    pub summary: Option<String>,
    pub canonical_url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub quality_score: f64,
    pub sports_keywords: Vec<String>,
    pub content_type: Option<String>,
    pub image_url: Option<String>,
    pub word_count: i32,
    pub language: Option<String>,
    pub source_name: String,
    pub source_domain: String,
    pub search_score: f64,
    pub search_rank: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub items: Vec<SearchItem>,
    pub total_count: i64,
    pub has_more: bool,
    pub next_cursor: Option<String>,
    pub search_time_ms: f64,
    pub engine: String,
    pub from_cache: bool,
}

pub struct SearchEngine {
    pool: PgPool,
    cache: SearchCache,
}

impl SearchEngine {
    pub fn new(pool: PgPool, cache: SearchCache) -> Self {
        Self { pool, cache }
    }

    pub async fn search(&self, query: SearchQuery) -> Result<SearchResponse> {
        let query = query.normalized();
        let cache_key = query.cache_key();

        if let Some(mut cached) = self.cache.get(&cache_key).await {
            cached.from_cache = true;
            return Ok(cached);
        }

        let start = Instant::now();
        let cursor = query
            .cursor
            .as_deref()
            .and_then(|encoded| SearchCursor::decode(encoded, query.sort_by));

        let mut main_builder = build_main_query(&query, cursor.as_ref());
        let mut count_builder = build_count_query(&query);

        let main_query = main_builder.build();
        let count_query = count_builder.build();

        let (rows, count_row) = tokio::try_join!(
            main_query.fetch_all(&self.pool),
            count_query.fetch_one(&self.pool),
        )
        .context("Search query failed")?;

        let total_count: i64 = count_row.get("total_count");

        let mut items: Vec<SearchItem> = rows
            .iter()
            .enumerate()
            .map(|(rank, row)| item_from_row(row, rank + 1))
            .collect();

        // limit + 1 rows were requested; the extra row only signals more
        let has_more = items.len() as i64 > query.limit;
        items.truncate(query.limit as usize);

        let next_cursor = if has_more {
            items.last().map(|last| {
                SearchCursor {
                    sort_by: query.sort_by.as_str().to_string(),
                    id: last.id,
                    published_at: last.published_at,
                    quality_score: Some(last.quality_score),
                    search_score: Some(last.search_score),
                }
                .encode()
            })
        } else {
            None
        };

        let search_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        let response = SearchResponse {
            items,
            total_count,
            has_more,
            next_cursor,
            search_time_ms,
            engine: "postgres".to_string(),
            from_cache: false,
        };

        if search_time_ms > CACHE_THRESHOLD_MS {
            self.cache.set(&cache_key, &response).await;
        }

        Ok(response)
    }

    /// Sports-keyword suggestions for a prefix, ranked by recent frequency.
    pub async fn suggest(&self, prefix: &str, limit: i64) -> Result<Vec<String>> {
        let prefix = prefix.trim();
        if prefix.chars().count() < MIN_SUGGEST_PREFIX {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT k.keyword AS suggestion, COUNT(*) AS freq
            FROM content_items ci
            CROSS JOIN LATERAL unnest(ci.sports_keywords) AS k(keyword)
            WHERE ci.is_active = true
              AND ci.created_at >= NOW() - INTERVAL '7 days'
              AND k.keyword ILIKE $1
            GROUP BY k.keyword
            ORDER BY freq DESC, k.keyword
            LIMIT $2
            "#,
        )
        .bind(format!("{}%", prefix))
        .bind(limit.clamp(1, 50))
        .fetch_all(&self.pool)
        .await
        .context("Suggestion query failed")?;

        Ok(rows.iter().map(|row| row.get("suggestion")).collect())
    }
}

fn item_from_row(row: &sqlx::postgres::PgRow, rank: usize) -> SearchItem {
    SearchItem {
        id: row.get("id"),
        title: row.get("title"),
        byline: row.get("byline"),
        summary: row.get("summary"),
        canonical_url: row.get("canonical_url"),
        published_at: row.get("published_at"),
        quality_score: row.get("quality_score"),
        sports_keywords: row.get("sports_keywords"),
        content_type: row.get("content_type"),
        image_url: row.get("image_url"),
        word_count: row.get("word_count"),
        language: row.get("language"),
        source_name: row.get("source_name"),
        source_domain: row.get("source_domain"),
        search_score: row.get("search_score"),
        search_rank: rank,
    }
}

fn like_pattern(query: &str) -> String {
    format!("%{}%", query)
}

/// The ranking expression: text match tiers when a query is present,
/// otherwise the quality score.
fn push_score_expr(builder: &mut QueryBuilder<Postgres>, query_text: Option<&str>) {
    match query_text {
        Some(text) => {
            // Cast to float8 so the column decodes as f64
            builder.push("(CASE WHEN ci.title ILIKE ");
            builder.push_bind(like_pattern(text));
            builder.push(" THEN 3.0 WHEN ci.summary ILIKE ");
            builder.push_bind(like_pattern(text));
            builder.push(" THEN 2.0 ELSE 1.0 END)::float8");
        }
        None => {
            builder.push("ci.quality_score");
        }
    }
}

/// Shared filter clauses (everything except the cursor).
fn push_filters(builder: &mut QueryBuilder<Postgres>, query: &SearchQuery) {
    builder.push(" WHERE ci.is_active = true AND ci.is_duplicate = false AND ci.is_spam = false");

    if !query.query.is_empty() {
        builder.push(" AND (ci.title ILIKE ");
        builder.push_bind(like_pattern(&query.query));
        builder.push(" OR ci.summary ILIKE ");
        builder.push_bind(like_pattern(&query.query));
        builder.push(" OR array_to_string(ci.sports_keywords, ' ') ILIKE ");
        builder.push_bind(like_pattern(&query.query));
        builder.push(")");
    }

    if !query.sports.is_empty() {
        builder.push(" AND ci.sports_keywords && ");
        builder.push_bind(query.sports.clone());
    }

    if !query.sources.is_empty() {
        builder.push(" AND s.domain = ANY(");
        builder.push_bind(query.sources.clone());
        builder.push(")");
    }

    if !query.content_types.is_empty() {
        builder.push(" AND ci.content_type = ANY(");
        builder.push_bind(query.content_types.clone());
        builder.push(")");
    }

    if let Some(threshold) = query.quality_threshold {
        builder.push(" AND ci.quality_score >= ");
        builder.push_bind(threshold);
    }

    if let Some(start) = query.date_start {
        builder.push(" AND ci.published_at >= ");
        builder.push_bind(start);
    }

    if let Some(end) = query.date_end {
        builder.push(" AND ci.published_at <= ");
        builder.push_bind(end);
    }
}

/// Cursor predicate: strict tuple comparison over the sort tuple. All
/// sorts are descending on every component, so `<` resumes exactly after
/// the cursor row.
fn push_cursor_condition(
    builder: &mut QueryBuilder<Postgres>,
    query: &SearchQuery,
    cursor: &SearchCursor,
) {
    let published = cursor
        .published_at
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    match query.sort_by {
        SortBy::Relevance => {
            builder.push(" AND (");
            push_score_expr(builder, text_query(query));
            builder.push(", COALESCE(ci.published_at, 'epoch'::timestamptz), ci.id) < (");
            builder.push_bind(cursor.search_score.unwrap_or(0.0));
            builder.push(", ");
            builder.push_bind(published);
            builder.push(", ");
            builder.push_bind(cursor.id);
            builder.push(")");
        }
        SortBy::Date => {
            builder.push(" AND (COALESCE(ci.published_at, 'epoch'::timestamptz), ci.quality_score, ci.id) < (");
            builder.push_bind(published);
            builder.push(", ");
            builder.push_bind(cursor.quality_score.unwrap_or(0.0));
            builder.push(", ");
            builder.push_bind(cursor.id);
            builder.push(")");
        }
        SortBy::Quality | SortBy::Popularity => {
            builder.push(" AND (ci.quality_score, COALESCE(ci.published_at, 'epoch'::timestamptz), ci.id) < (");
            builder.push_bind(cursor.quality_score.unwrap_or(0.0));
            builder.push(", ");
            builder.push_bind(published);
            builder.push(", ");
            builder.push_bind(cursor.id);
            builder.push(")");
        }
    }
}

fn push_order_clause(builder: &mut QueryBuilder<Postgres>, sort_by: SortBy) {
    let clause = match sort_by {
        SortBy::Relevance => {
            " ORDER BY search_score DESC, COALESCE(ci.published_at, 'epoch'::timestamptz) DESC, ci.id DESC"
        }
        SortBy::Date => {
            " ORDER BY COALESCE(ci.published_at, 'epoch'::timestamptz) DESC, ci.quality_score DESC, ci.id DESC"
        }
        SortBy::Quality | SortBy::Popularity => {
            " ORDER BY ci.quality_score DESC, COALESCE(ci.published_at, 'epoch'::timestamptz) DESC, ci.id DESC"
        }
    };
    builder.push(clause);
}

fn text_query(query: &SearchQuery) -> Option<&str> {
    (!query.query.is_empty()).then_some(query.query.as_str())
}

fn build_main_query<'a>(
    query: &'a SearchQuery,
    cursor: Option<&'a SearchCursor>,
) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(
        "SELECT ci.id, ci.title, ci.byline, ci.summary, ci.canonical_url, ci.published_at, \
         ci.quality_score, ci.sports_keywords, ci.content_type, ci.image_url, ci.word_count, \
         ci.language, s.name AS source_name, s.domain AS source_domain, ",
    );

    push_score_expr(&mut builder, text_query(query));
    builder.push(" AS search_score FROM content_items ci JOIN sources s ON ci.source_id = s.id");

    push_filters(&mut builder, query);

    if let Some(cursor) = cursor {
        push_cursor_condition(&mut builder, query, cursor);
    }

    push_order_clause(&mut builder, query.sort_by);

    builder.push(" LIMIT ");
    builder.push_bind(query.limit + 1);

    builder
}

fn build_count_query(query: &SearchQuery) -> QueryBuilder<'_, Postgres> {
    let mut builder = QueryBuilder::new(
        "SELECT COUNT(*) AS total_count FROM content_items ci JOIN sources s ON ci.source_id = s.id",
    );
    push_filters(&mut builder, query);
    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_query() -> SearchQuery {
        SearchQuery {
            query: "Lakers".to_string(),
            sports: vec!["nba".to_string()],
            sort_by: SortBy::Date,
            limit: 10,
            ..SearchQuery::default()
        }
        .normalized()
    }

    #[test]
    fn test_main_query_includes_hidden_filters() {
        let query = base_query();
        let builder = build_main_query(&query, None);
        let sql = builder.sql();

        assert!(sql.contains("ci.is_active = true"));
        assert!(sql.contains("ci.is_duplicate = false"));
        assert!(sql.contains("ci.is_spam = false"));
        assert!(sql.contains("sports_keywords &&"));
        assert!(sql.contains("ORDER BY COALESCE(ci.published_at"));
        assert!(sql.contains("LIMIT"));
    }

    #[test]
    fn test_relevance_sort_uses_case_expression() {
        let query = SearchQuery {
            query: "Lakers".to_string(),
            sort_by: SortBy::Relevance,
            limit: 10,
            ..SearchQuery::default()
        }
        .normalized();

        let builder = build_main_query(&query, None);
        let sql = builder.sql();
        assert!(sql.contains("CASE WHEN ci.title ILIKE"));
        assert!(sql.contains("ORDER BY search_score DESC"));
    }

    #[test]
    fn test_empty_query_ranks_by_quality() {
        let query = SearchQuery {
            sort_by: SortBy::Relevance,
            limit: 10,
            ..SearchQuery::default()
        }
        .normalized();

        let builder = build_main_query(&query, None);
        assert!(builder.sql().contains("ci.quality_score AS search_score"));
    }

    #[test]
    fn test_cursor_condition_present_for_valid_cursor() {
        let query = base_query();
        let cursor = SearchCursor {
            sort_by: "date".to_string(),
            id: Uuid::new_v4(),
            published_at: Some(Utc::now()),
            quality_score: Some(0.8),
            search_score: None,
        };

        let builder = build_main_query(&query, Some(&cursor));
        assert!(builder.sql().contains("ci.quality_score, ci.id) <"));
    }

    #[test]
    fn test_count_query_has_filters_but_no_cursor_or_order() {
        let query = base_query();
        let builder = build_count_query(&query);
        let sql = builder.sql();

        assert!(sql.starts_with("SELECT COUNT(*)"));
        assert!(sql.contains("ci.is_active = true"));
        assert!(!sql.contains("ORDER BY"));
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn test_mismatched_cursor_ignored_end_to_end() {
        // A cursor generated under quality sort must not constrain a date
        // sort query
        let cursor = SearchCursor {
            sort_by: "quality".to_string(),
            id: Uuid::new_v4(),
            published_at: None,
            quality_score: Some(0.5),
            search_score: None,
        };
        let encoded = cursor.encode();
        assert!(SearchCursor::decode(&encoded, SortBy::Date).is_none());
    }
}
