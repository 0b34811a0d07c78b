//! The continuous ingestion worker.

pub mod stats;
#[allow(clippy::module_inception)]
pub mod worker;

pub use stats::{RollingAverage, WorkerStats, WorkerStatus};
pub use worker::CrawlerWorker;
