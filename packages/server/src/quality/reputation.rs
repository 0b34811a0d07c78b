//! Rolling source reputation and tier assignment.
//!
//! Reputation is `avg(last N quality scores) * 0.95` minus an error-rate
//! penalty, clamped to the configured bounds. The 0.95 factor is
//! regression-to-mean, applied per batch: a source that consistently
//! scores q settles just below q, so tier 1 requires sustained 0.85+
//! scoring rather than a single good run.

use serde::Serialize;

use crate::config::QualityConfig;

/// Regression factor applied to the rolling average.
const AVG_DECAY: f64 = 0.95;

/// Error-rate penalty cap.
const MAX_ERROR_PENALTY: f64 = 0.3;

#[derive(Debug, Clone, Serialize)]
pub struct ReputationUpdate {
    pub reputation: f64,
    pub quality_tier: i32,
    pub avg_quality: f64,
    pub error_rate: f64,
    pub sample_size: usize,
}

pub struct SourceReputationManager {
    min_reputation: f64,
    max_reputation: f64,
}

impl SourceReputationManager {
    pub fn new(config: &QualityConfig) -> Self {
        Self {
            min_reputation: config.min_reputation,
            max_reputation: config.max_reputation,
        }
    }

    /// Compute the new reputation and tier from recent quality scores and
    /// the measured error rate.
    pub fn update(&self, quality_scores: &[f64], error_rate: f64) -> ReputationUpdate {
        if quality_scores.is_empty() {
            return ReputationUpdate {
                reputation: 0.5,
                quality_tier: 2,
                avg_quality: 0.0,
                error_rate,
                sample_size: 0,
            };
        }

        let avg_quality = quality_scores.iter().sum::<f64>() / quality_scores.len() as f64;

        let error_penalty = (error_rate * 0.5).min(MAX_ERROR_PENALTY);
        let raw = avg_quality * AVG_DECAY - error_penalty;

        let quality_tier = if raw >= 0.8 && error_rate < 0.05 {
            1
        } else if raw >= 0.6 && error_rate < 0.15 {
            2
        } else {
            3
        };

        ReputationUpdate {
            reputation: raw.clamp(self.min_reputation, self.max_reputation),
            quality_tier,
            avg_quality,
            error_rate,
            sample_size: quality_scores.len(),
        }
    }

    /// Crawl priority from tier and reputation, floored at 0.1.
    pub fn crawl_priority(&self, quality_tier: i32, reputation: f64) -> f64 {
        let tier_priority = match quality_tier {
            1 => 1.0,
            2 => 0.7,
            _ => 0.4,
        };

        (tier_priority * (0.5 + 0.5 * reputation)).clamp(0.1, 1.0)
    }
}
