//! Trending detection over the accepted content stream.
//!
//! Counts are re-derived from the persisted corpus on every pass, so a
//! missed in-memory update can never violate the window monotonicity
//! invariant. Terms that pass the burst, score, and volume thresholds
//! (and are not cooling down) are reported trending, with `trend_start`
//! latched on the rising edge and `trend_peak` refreshed while trending.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::common::TrendingTermRecord;
use crate::config::TrendingConfig;
use crate::storage::ContentStore;
use crate::trending::terms::TermExtractor;

#[derive(Debug, Clone, Default, Serialize)]
pub struct TrendingStats {
    pub terms_processed: u64,
    pub trending_detected: usize,
    pub queries_generated: u64,
    pub last_update: Option<DateTime<Utc>>,
}

pub struct TrendingDetector {
    config: TrendingConfig,
    store: Arc<dyn ContentStore>,
    extractor: TermExtractor,
    /// Normalised term -> latest known state
    terms: HashMap<String, TrendingTermRecord>,
    /// Normalised term -> cooldown expiry
    cooldowns: HashMap<String, DateTime<Utc>>,
    stats: TrendingStats,
}

impl TrendingDetector {
    pub fn new(config: TrendingConfig, store: Arc<dyn ContentStore>) -> Self {
        Self {
            config,
            store,
            extractor: TermExtractor::new(),
            terms: HashMap::new(),
            cooldowns: HashMap::new(),
            stats: TrendingStats::default(),
        }
    }

    pub fn config(&self) -> &TrendingConfig {
        &self.config
    }

    /// Feed one accepted item through term extraction, updating counters
    /// for every extracted term. Returns the normalised terms seen.
    pub async fn process_content(
        &mut self,
        title: &str,
        text: &str,
        sports_keywords: &[String],
    ) -> Result<Vec<String>> {
        let extracted = self.extractor.extract(title, text, sports_keywords);
        let mut processed = Vec::with_capacity(extracted.len());

        for term in extracted {
            let record = self
                .terms
                .entry(term.normalized.clone())
                .or_insert_with(|| {
                    TrendingTermRecord::new(&term.term, &term.normalized, &term.term_type)
                });

            let (count_1h, count_6h, count_24h) =
                self.store.term_window_counts(&term.normalized).await?;
            record.count_1h = count_1h;
            record.count_6h = count_6h;
            record.count_24h = count_24h;
            record.last_seen = Utc::now();

            compute_metrics(record, &self.config);
            self.store.upsert_trending_term(record).await?;

            processed.push(term.normalized);
        }

        self.stats.terms_processed += processed.len() as u64;
        Ok(processed)
    }

    /// Detect currently trending terms: refresh from the store, apply the
    /// thresholds and cooldowns, rank by trend score, cap at `max_terms`.
    pub async fn detect_trending(&mut self) -> Result<Vec<TrendingTermRecord>> {
        let recent = self
            .store
            .recent_trending_terms(self.config.long_window_hours, 1000)
            .await?;

        for stored in recent {
            let entry = self
                .terms
                .entry(stored.normalized_term.clone())
                .or_insert_with(|| stored.clone());
            entry.count_1h = stored.count_1h;
            entry.count_6h = stored.count_6h;
            entry.count_24h = stored.count_24h;
            entry.last_seen = stored.last_seen;
            entry.related_terms = stored.related_terms;
            entry.sports_context = stored.sports_context;
        }

        let mut trending = Vec::new();
        for record in self.terms.values_mut() {
            let was_trending = record.is_trending;
            compute_metrics(record, &self.config);

            if record.is_trending && !was_trending {
                debug!(term = %record.normalized_term, burst = record.burst_ratio, "Term started trending");
            }

            let cooling = self
                .cooldowns
                .get(&record.normalized_term)
                .map(|until| Utc::now() < *until)
                .unwrap_or(false);

            if record.is_trending && !cooling {
                trending.push(record.clone());
            }

            self.store.upsert_trending_term(record).await?;
        }

        trending.sort_by(|a, b| {
            b.trend_score
                .partial_cmp(&a.trend_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        trending.truncate(self.config.max_terms);

        self.stats.trending_detected = trending.len();
        self.stats.last_update = Some(Utc::now());

        Ok(trending)
    }

    /// Suppress a term for `cooldown_hours` after it produced queries.
    pub fn start_cooldown(&mut self, normalized_term: &str) {
        self.cooldowns.insert(
            normalized_term.to_string(),
            Utc::now() + chrono::Duration::hours(self.config.cooldown_hours),
        );
    }

    pub fn is_in_cooldown(&self, normalized_term: &str) -> bool {
        self.cooldowns
            .get(normalized_term)
            .map(|until| Utc::now() < *until)
            .unwrap_or(false)
    }

    pub fn note_queries_generated(&mut self, count: u64) {
        self.stats.queries_generated += count;
    }

    pub fn stats(&self) -> TrendingStats {
        self.stats.clone()
    }
}

/// Recompute burst ratio, trend score, and the trending flag in place.
fn compute_metrics(record: &mut TrendingTermRecord, config: &TrendingConfig) {
    // Short-window rate over long-window rate; the 2h count is estimated
    // from the 1h and 6h windows
    record.burst_ratio = if record.count_24h == 0 {
        0.0
    } else {
        let count_2h = (2 * record.count_1h).min(record.count_6h);
        let rate_2h = count_2h as f64 / 2.0;
        let rate_24h = record.count_24h as f64 / 24.0;
        if rate_24h == 0.0 {
            0.0
        } else {
            rate_2h / rate_24h
        }
    };

    let burst_score = (record.burst_ratio / 10.0).min(1.0);
    let volume_score = ((record.count_1h.max(1) as f64).log10() / 3.0).min(1.0);
    let hours_since_seen = (Utc::now() - record.last_seen).num_seconds() as f64 / 3600.0;
    let recency_score = (1.0 - hours_since_seen / 6.0).max(0.0);
    let context_score = if record.has_sports_context() { 1.0 } else { 0.0 };

    record.trend_score =
        burst_score * 0.4 + volume_score * 0.3 + recency_score * 0.2 + context_score * 0.1;

    let was_trending = record.is_trending;
    record.is_trending = record.burst_ratio >= config.min_burst_ratio
        && record.trend_score >= config.min_trend_score
        && record.count_1h >= config.min_occurrences;

    if record.is_trending && !was_trending {
        record.trend_start = Some(Utc::now());
    }
    if record.is_trending {
        record.trend_peak = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(count_1h: i64, count_6h: i64, count_24h: i64) -> TrendingTermRecord {
        let mut record = TrendingTermRecord::new("lakers trade", "lakers trade", "phrase");
        record.count_1h = count_1h;
        record.count_6h = count_6h;
        record.count_24h = count_24h;
        record
    }

    #[test]
    fn test_burst_ratio_zero_denominator() {
        let mut r = record(0, 0, 0);
        compute_metrics(&mut r, &TrendingConfig::default());
        assert_eq!(r.burst_ratio, 0.0);
        assert!(!r.is_trending);
    }

    #[test]
    fn test_burst_ratio_estimates_two_hour_window() {
        let mut r = record(40, 45, 64);
        compute_metrics(&mut r, &TrendingConfig::default());

        // count_2h = min(80, 45) = 45; (45/2) / (64/24)
        let expected = (45.0 / 2.0) / (64.0 / 24.0);
        assert!((r.burst_ratio - expected).abs() < 1e-9);
    }

    #[test]
    fn test_trending_requires_all_three_thresholds() {
        let config = TrendingConfig::default();

        // Bursty and voluminous: trending
        let mut hot = record(40, 45, 64);
        compute_metrics(&mut hot, &config);
        assert!(hot.is_trending);
        assert!(hot.burst_ratio >= config.min_burst_ratio);
        assert!(hot.trend_score >= config.min_trend_score);
        assert!(hot.count_1h >= config.min_occurrences);

        // Below min_occurrences: not trending despite the burst
        let mut thin = record(2, 2, 2);
        compute_metrics(&mut thin, &config);
        assert!(!thin.is_trending);
    }

    #[test]
    fn test_steady_rate_is_not_trending() {
        // Flat 4/hour all day: burst ratio ~1
        let mut flat = record(4, 24, 96);
        compute_metrics(&mut flat, &TrendingConfig::default());
        assert!(flat.burst_ratio < 2.0);
        assert!(!flat.is_trending);
    }

    #[test]
    fn test_trend_start_latches_and_peak_refreshes() {
        let config = TrendingConfig::default();
        let mut r = record(40, 45, 64);

        compute_metrics(&mut r, &config);
        let started = r.trend_start;
        assert!(started.is_some());

        compute_metrics(&mut r, &config);
        assert_eq!(r.trend_start, started);
        assert!(r.trend_peak >= started);
    }

    #[test]
    fn test_window_monotonicity_preserved() {
        let mut r = record(40, 45, 64);
        compute_metrics(&mut r, &TrendingConfig::default());
        assert!(r.count_1h <= r.count_6h);
        assert!(r.count_6h <= r.count_24h);
    }
}
