//! Acceptance gate over the quality score.
//!
//! Shadow mode accepts everything and records what enforcement would have
//! rejected, so thresholds can be tuned against live traffic before being
//! turned on. Reasons are structured `<mode>_<decision>_<score>` strings
//! for downstream tracing.

use std::sync::Mutex;

use ingestion::ExtractedContent;
use serde::Serialize;
use tracing::info;

use crate::common::Source;
use crate::config::QualityConfig;
use crate::quality::scorer::{QualityResult, QualityScorer};

#[derive(Debug, Clone)]
pub struct GateDecision {
    pub accepted: bool,
    pub reason: String,
    pub result: QualityResult,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GateStats {
    pub total_processed: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub shadow_would_reject: u64,
    /// Ten equal-width score buckets over [0, 1]
    pub histogram: [u64; 10],
    pub score_sum: f64,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
}

impl GateStats {
    pub fn avg_score(&self) -> Option<f64> {
        (self.total_processed > 0).then(|| self.score_sum / self.total_processed as f64)
    }

    pub fn acceptance_rate(&self) -> Option<f64> {
        (self.total_processed > 0).then(|| self.accepted as f64 / self.total_processed as f64)
    }

    fn observe(&mut self, score: f64) {
        self.total_processed += 1;
        self.score_sum += score;
        self.min_score = Some(self.min_score.map_or(score, |m| m.min(score)));
        self.max_score = Some(self.max_score.map_or(score, |m| m.max(score)));

        let bucket = ((score * 10.0) as usize).min(9);
        self.histogram[bucket] += 1;
    }
}

pub struct QualityGate {
    scorer: QualityScorer,
    shadow_mode: bool,
    min_score: f64,
    default_threshold: f64,
    stats: Mutex<GateStats>,
}

impl QualityGate {
    pub fn new(config: QualityConfig) -> Self {
        let shadow_mode = config.shadow_mode;
        let min_score = config.min_score;
        let default_threshold = config.default_threshold;
        Self {
            scorer: QualityScorer::new(config),
            shadow_mode,
            min_score,
            default_threshold,
            stats: Mutex::new(GateStats::default()),
        }
    }

    /// Score and decide. Shadow mode always accepts.
    pub fn process(&self, content: &ExtractedContent, source: &Source) -> GateDecision {
        let result = self.scorer.score(content, source);
        let score = result.score;

        let (accepted, reason) = if self.shadow_mode {
            if score < self.default_threshold {
                info!(score = score, "Shadow mode: would reject content");
                (true, format!("shadow_mode_would_reject_{:.3}", score))
            } else {
                (true, format!("shadow_mode_accept_{:.3}", score))
            }
        } else if score < self.min_score {
            (false, format!("quality_too_low_{:.3}", score))
        } else {
            (true, format!("quality_acceptable_{:.3}", score))
        };

        {
            let mut stats = self.stats.lock().expect("gate stats lock");
            stats.observe(score);
            if accepted {
                stats.accepted += 1;
            } else {
                stats.rejected += 1;
            }
            if reason.starts_with("shadow_mode_would_reject") {
                stats.shadow_would_reject += 1;
            }
        }

        GateDecision {
            accepted,
            reason,
            result,
        }
    }

    pub fn stats(&self) -> GateStats {
        self.stats.lock().expect("gate stats lock").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingestion::ExtractedContent;

    fn thin_content() -> ExtractedContent {
        // Scores well below any threshold: unknown date, tiny body, weak title
        ExtractedContent {
            title: "x y".to_string(),
            text: "tiny".to_string(),
            word_count: 1,
            language: "en".to_string(),
            content_type: "general".to_string(),
            ..ExtractedContent::default()
        }
    }

    fn weak_source() -> Source {
        let mut source = Source::for_domain("blog.example.com");
        source.quality_tier = 3;
        source.reputation = 0.1;
        source.success_rate = 0.5;
        source
    }

    fn config(shadow: bool) -> QualityConfig {
        QualityConfig {
            min_score: 0.5,
            default_threshold: 0.6,
            shadow_mode: shadow,
            ..QualityConfig::default()
        }
    }

    #[test]
    fn test_shadow_mode_accepts_with_would_reject_reason() {
        let gate = QualityGate::new(config(true));
        let decision = gate.process(&thin_content(), &weak_source());

        assert!(decision.accepted);
        assert!(
            decision.reason.starts_with("shadow_mode_would_reject_"),
            "reason: {}",
            decision.reason
        );

        let stats = gate.stats();
        assert_eq!(stats.total_processed, 1);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.shadow_would_reject, 1);
    }

    #[test]
    fn test_enforce_mode_rejects_below_min_score() {
        let gate = QualityGate::new(config(false));
        let decision = gate.process(&thin_content(), &weak_source());

        assert!(!decision.accepted);
        assert!(
            decision.reason.starts_with("quality_too_low_"),
            "reason: {}",
            decision.reason
        );

        let stats = gate.stats();
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.shadow_would_reject, 0);
    }

    #[test]
    fn test_histogram_buckets_scores() {
        let gate = QualityGate::new(config(true));
        gate.process(&thin_content(), &weak_source());

        let stats = gate.stats();
        assert_eq!(stats.histogram.iter().sum::<u64>(), 1);
        assert!(stats.min_score.is_some());
        assert_eq!(stats.min_score, stats.max_score);
    }

    #[test]
    fn test_reason_embeds_three_decimal_score() {
        let gate = QualityGate::new(config(false));
        let decision = gate.process(&thin_content(), &weak_source());

        let suffix = decision
            .reason
            .rsplit('_')
            .next()
            .and_then(|s| s.parse::<f64>().ok())
            .expect("score suffix parses");
        assert!((suffix - decision.result.score).abs() < 0.001);
    }
}
