//! Discovery-query generation from trending terms.
//!
//! Each trending term yields a base query, three standard variations, and
//! up to two related-term combinations, prioritised by trend score with
//! burst/type/recency boosts. Queries queue in a bounded FIFO the worker
//! drains into its discovery feed; emitting for a term starts its
//! cooldown.

use std::collections::VecDeque;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::common::TrendingTermRecord;
use crate::config::TrendingConfig;
use crate::trending::detector::TrendingDetector;

/// Queue bound; the oldest queries fall off first.
const MAX_QUEUE_SIZE: usize = 1000;

/// Related-term combinations per base query.
const MAX_RELATED_TERMS: usize = 2;

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryQuery {
    pub query: String,
    pub trending_term: String,
    pub trend_score: f64,
    pub burst_ratio: f64,
    pub priority: f64,
    pub generated_at: DateTime<Utc>,
    pub cooldown_until: DateTime<Utc>,
}

/// Summary of one detection + generation cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub trending_terms: usize,
    pub queries_generated: usize,
    pub queue_size: usize,
}

pub struct TrendingDiscoveryLoop {
    config: TrendingConfig,
    queue: VecDeque<DiscoveryQuery>,
}

impl TrendingDiscoveryLoop {
    pub fn new(config: TrendingConfig) -> Self {
        Self {
            config,
            queue: VecDeque::new(),
        }
    }

    /// One full cycle: detect trending terms, generate queries, enqueue.
    pub async fn run_cycle(&mut self, detector: &mut TrendingDetector) -> Result<CycleSummary> {
        let trending = detector.detect_trending().await?;
        let queries = self.generate_queries(detector, &trending);

        let generated = queries.len();
        for query in queries {
            if self.queue.len() >= MAX_QUEUE_SIZE {
                self.queue.pop_front();
            }
            self.queue.push_back(query);
        }

        detector.note_queries_generated(generated as u64);

        info!(
            trending_terms = trending.len(),
            queries_generated = generated,
            queue_size = self.queue.len(),
            "Trending discovery cycle complete"
        );

        Ok(CycleSummary {
            trending_terms: trending.len(),
            queries_generated: generated,
            queue_size: self.queue.len(),
        })
    }

    /// Generate prioritised queries for trending terms and start their
    /// cooldowns.
    pub fn generate_queries(
        &self,
        detector: &mut TrendingDetector,
        trending: &[TrendingTermRecord],
    ) -> Vec<DiscoveryQuery> {
        let mut queries = Vec::new();
        let now = Utc::now();
        let cooldown_until = now + chrono::Duration::hours(self.config.cooldown_hours);

        for term in trending {
            if detector.is_in_cooldown(&term.normalized_term) {
                continue;
            }

            // Sport context prefixes the base query when known
            let base = match term
                .sports_context
                .get("sport")
                .and_then(|sport| sport.as_str())
            {
                Some(sport) => format!("{} {}", sport, term.term),
                None => term.term.clone(),
            };

            let mut variations = vec![
                base.clone(),
                format!("{} news", base),
                format!("{} update", base),
                format!("{} latest", base),
            ];
            for related in term.related_terms.iter().take(MAX_RELATED_TERMS) {
                variations.push(format!("{} {}", base, related));
            }

            let priority = query_priority(term);
            for query in variations {
                queries.push(DiscoveryQuery {
                    query,
                    trending_term: term.normalized_term.clone(),
                    trend_score: term.trend_score,
                    burst_ratio: term.burst_ratio,
                    priority,
                    generated_at: now,
                    cooldown_until,
                });
            }

            detector.start_cooldown(&term.normalized_term);
        }

        queries.sort_by(|a, b| {
            b.priority
                .partial_cmp(&a.priority)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        queries
    }

    /// Drain up to `limit` queries, highest priority first.
    pub fn pop_queries(&mut self, limit: usize) -> Vec<DiscoveryQuery> {
        let mut pending: Vec<DiscoveryQuery> = self.queue.drain(..).collect();
        pending.sort_by(|a, b| {
            b.priority
                .partial_cmp(&a.priority)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let remainder = pending.split_off(limit.min(pending.len()));
        self.queue.extend(remainder);
        pending
    }

    pub fn queue_size(&self) -> usize {
        self.queue.len()
    }
}

/// Priority: trend score boosted by burst, entity type, and peak recency;
/// capped at 1.0.
fn query_priority(term: &TrendingTermRecord) -> f64 {
    let mut priority = term.trend_score;

    if term.burst_ratio > 5.0 {
        priority *= 1.5;
    }

    if matches!(term.term_type.as_str(), "teams" | "players" | "events") {
        priority *= 1.3;
    }

    if let Some(peak) = term.trend_peak {
        let hours_since_peak = (Utc::now() - peak).num_seconds() as f64 / 3600.0;
        if hours_since_peak < 1.0 {
            priority *= 1.4;
        } else if hours_since_peak < 6.0 {
            priority *= 1.2;
        }
    }

    priority.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    fn trending_term(normalized: &str, score: f64, burst: f64) -> TrendingTermRecord {
        let mut term = TrendingTermRecord::new(normalized, normalized, "phrase");
        term.trend_score = score;
        term.burst_ratio = burst;
        term.is_trending = true;
        term.trend_peak = Some(Utc::now());
        term
    }

    fn detector() -> TrendingDetector {
        TrendingDetector::new(TrendingConfig::default(), Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_generates_standard_variations() {
        let loop_ = TrendingDiscoveryLoop::new(TrendingConfig::default());
        let mut detector = detector();

        let queries = loop_.generate_queries(&mut detector, &[trending_term("lakers trade", 0.7, 8.0)]);

        let texts: Vec<&str> = queries.iter().map(|q| q.query.as_str()).collect();
        assert!(texts.contains(&"lakers trade"));
        assert!(texts.contains(&"lakers trade news"));
        assert!(texts.contains(&"lakers trade update"));
        assert!(texts.contains(&"lakers trade latest"));
    }

    #[test]
    fn test_sport_context_prefixes_query() {
        let loop_ = TrendingDiscoveryLoop::new(TrendingConfig::default());
        let mut detector = detector();

        let mut term = trending_term("lakers trade", 0.7, 8.0);
        term.sports_context = serde_json::json!({"sport": "basketball"});

        let queries = loop_.generate_queries(&mut detector, &[term]);
        assert!(queries.iter().any(|q| q.query == "basketball lakers trade"));
    }

    #[test]
    fn test_related_terms_capped_at_two() {
        let loop_ = TrendingDiscoveryLoop::new(TrendingConfig::default());
        let mut detector = detector();

        let mut term = trending_term("lakers trade", 0.7, 8.0);
        term.related_terms = vec!["westbrook".into(), "deadline".into(), "rumors".into()];

        let queries = loop_.generate_queries(&mut detector, &[term]);
        // base + 3 variations + 2 related combinations
        assert_eq!(queries.len(), 6);
    }

    #[test]
    fn test_emission_starts_cooldown() {
        let loop_ = TrendingDiscoveryLoop::new(TrendingConfig::default());
        let mut detector = detector();
        let term = trending_term("lakers trade", 0.7, 8.0);

        let first = loop_.generate_queries(&mut detector, std::slice::from_ref(&term));
        assert!(!first.is_empty());
        assert!(detector.is_in_cooldown("lakers trade"));

        let second = loop_.generate_queries(&mut detector, &[term]);
        assert!(second.is_empty());
    }

    #[test]
    fn test_priority_boosts_and_cap() {
        // High burst + entity type + fresh peak: boosted but capped at 1.0
        let mut term = trending_term("lakers", 0.7, 8.0);
        term.term_type = "teams".to_string();
        assert_eq!(query_priority(&term), 1.0);

        // Modest score, no boosts beyond recency
        let mut quiet = trending_term("roster moves", 0.4, 2.0);
        quiet.trend_peak = Some(Utc::now() - chrono::Duration::hours(8));
        assert!((query_priority(&quiet) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_queue_bounded_fifo() {
        let mut loop_ = TrendingDiscoveryLoop::new(TrendingConfig::default());
        for i in 0..(MAX_QUEUE_SIZE + 50) {
            if loop_.queue.len() >= MAX_QUEUE_SIZE {
                loop_.queue.pop_front();
            }
            loop_.queue.push_back(DiscoveryQuery {
                query: format!("q{}", i),
                trending_term: "t".into(),
                trend_score: 0.5,
                burst_ratio: 1.0,
                priority: 0.5,
                generated_at: Utc::now(),
                cooldown_until: Utc::now(),
            });
        }
        assert_eq!(loop_.queue_size(), MAX_QUEUE_SIZE);
        assert_eq!(loop_.queue.front().unwrap().query, "q50");
    }

    #[test]
    fn test_pop_queries_highest_priority_first() {
        let mut loop_ = TrendingDiscoveryLoop::new(TrendingConfig::default());
        let mut detector = detector();

        let terms = vec![
            trending_term("quiet term", 0.4, 2.0),
            trending_term("hot term", 0.9, 9.0),
        ];
        let queries = loop_.generate_queries(&mut detector, &terms);
        for query in queries {
            loop_.queue.push_back(query);
        }

        let popped = loop_.pop_queries(2);
        assert_eq!(popped.len(), 2);
        assert!(popped.iter().all(|q| q.trending_term == "hot term"));
    }
}
