//! Worker statistics and heartbeat payloads.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Observations kept for rolling averages.
const ROLLING_WINDOW: usize = 100;

/// Rolling average over the last N observations.
#[derive(Debug, Clone, Default)]
pub struct RollingAverage {
    samples: VecDeque<f64>,
}

impl RollingAverage {
    pub fn push(&mut self, value: f64) {
        if self.samples.len() == ROLLING_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Initializing,
    Running,
    Cycling,
    Idle,
    Draining,
    Stopped,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Initializing => "initializing",
            WorkerStatus::Running => "running",
            WorkerStatus::Cycling => "cycling",
            WorkerStatus::Idle => "idle",
            WorkerStatus::Draining => "draining",
            WorkerStatus::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerStats {
    pub worker_id: String,
    pub start_time: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub status: WorkerStatus,
    pub pages_crawled: u64,
    pub content_extracted: u64,
    pub extraction_failures: u64,
    pub duplicates_filtered: u64,
    pub quality_filtered: u64,
    pub robots_blocked: u64,
    pub errors: u64,
    pub fetch_times_ms: RollingAverage,
    pub extract_times_ms: RollingAverage,
}

impl WorkerStats {
    pub fn new(worker_id: &str) -> Self {
        let now = Utc::now();
        Self {
            worker_id: worker_id.to_string(),
            start_time: now,
            last_heartbeat: now,
            status: WorkerStatus::Initializing,
            pages_crawled: 0,
            content_extracted: 0,
            extraction_failures: 0,
            duplicates_filtered: 0,
            quality_filtered: 0,
            robots_blocked: 0,
            errors: 0,
            fetch_times_ms: RollingAverage::default(),
            extract_times_ms: RollingAverage::default(),
        }
    }

    /// Flattened fields for the registry heartbeat hash.
    pub fn heartbeat_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("worker_id".to_string(), self.worker_id.clone()),
            ("start_time".to_string(), self.start_time.to_rfc3339()),
            ("last_heartbeat".to_string(), self.last_heartbeat.to_rfc3339()),
            ("status".to_string(), self.status.as_str().to_string()),
            ("pages_crawled".to_string(), self.pages_crawled.to_string()),
            (
                "content_extracted".to_string(),
                self.content_extracted.to_string(),
            ),
            (
                "duplicates_filtered".to_string(),
                self.duplicates_filtered.to_string(),
            ),
            (
                "quality_filtered".to_string(),
                self.quality_filtered.to_string(),
            ),
            ("robots_blocked".to_string(), self.robots_blocked.to_string()),
            ("errors".to_string(), self.errors.to_string()),
            (
                "avg_fetch_time_ms".to_string(),
                format!("{:.1}", self.fetch_times_ms.average()),
            ),
            (
                "avg_extract_time_ms".to_string(),
                format!("{:.1}", self.extract_times_ms.average()),
            ),
        ];

        if let Some(memory_mb) = resident_memory_mb() {
            fields.push(("memory_usage_mb".to_string(), format!("{:.1}", memory_mb)));
        }

        fields
    }
}

/// Resident set size in MiB, from /proc on Linux.
#[cfg(target_os = "linux")]
fn resident_memory_mb() -> Option<f64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: f64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages * 4096.0 / (1024.0 * 1024.0))
}

#[cfg(not(target_os = "linux"))]
fn resident_memory_mb() -> Option<f64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_average_basic() {
        let mut avg = RollingAverage::default();
        avg.push(10.0);
        avg.push(20.0);
        assert_eq!(avg.average(), 15.0);
    }

    #[test]
    fn test_rolling_average_windows_at_100() {
        let mut avg = RollingAverage::default();
        for _ in 0..100 {
            avg.push(0.0);
        }
        for _ in 0..100 {
            avg.push(10.0);
        }
        assert_eq!(avg.len(), 100);
        assert_eq!(avg.average(), 10.0);
    }

    #[test]
    fn test_empty_average_is_zero() {
        assert_eq!(RollingAverage::default().average(), 0.0);
    }

    #[test]
    fn test_heartbeat_fields_complete() {
        let stats = WorkerStats::new("worker-1");
        let fields = stats.heartbeat_fields();

        let keys: Vec<&str> = fields.iter().map(|(k, _)| k.as_str()).collect();
        for expected in [
            "worker_id",
            "status",
            "pages_crawled",
            "content_extracted",
            "duplicates_filtered",
            "quality_filtered",
            "errors",
            "avg_fetch_time_ms",
            "avg_extract_time_ms",
        ] {
            assert!(keys.contains(&expected), "missing {}", expected);
        }
    }
}
