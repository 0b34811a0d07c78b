//! The crawler worker: one continuous pipeline instance.
//!
//! State machine: initializing -> running -> cycling <-> idle -> draining
//! -> stopped. A shutdown signal flips the cancellation token; the cycle
//! loop stops accepting URLs at the next batch boundary, in-flight batches
//! finish, background tasks complete their current iteration, and the
//! worker releases its resources.
//!
//! Per URL the sequence fetch -> extract -> dedupe -> gate -> persist ->
//! trending is strictly ordered and runs on the fetching task; across URLs
//! there is no ordering, and store-level uniqueness resolves races. No
//! error escapes `process_url`: failures become a counter increment plus
//! one structured log line.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use ingestion::discovery::{dedupe_preserving_order, SourceConfig};
use ingestion::{ContentExtractor, CrawlError, Crawler, NearDuplicateIndex};
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::common::{ContentItem, IngestionJob, JobStatus};
use crate::config::Config;
use crate::quality::{QualityGate, SourceReputationManager};
use crate::registry::{FeatureFlags, Registry};
use crate::storage::{ContentStore, UpsertOutcome};
use crate::trending::{TrendingDetector, TrendingDiscoveryLoop};
use crate::worker::stats::{WorkerStats, WorkerStatus};

/// Heartbeat cadence and registry TTL.
const HEARTBEAT_INTERVAL_SECS: u64 = 30;
const HEARTBEAT_TTL_SECS: u64 = 300;

/// Trending discovery cadence.
const TRENDING_INTERVAL_SECS: u64 = 300;

/// Near-duplicate index bound.
const MAX_DEDUP_ENTRIES: usize = 100_000;

/// Quality scores per source considered in a reputation pass.
const REPUTATION_SAMPLE: i64 = 20;

/// Trending queries pulled into the discovery feed per trending cycle.
const TRENDING_QUERY_BATCH: usize = 50;

/// What happened to one URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessOutcome {
    Persisted,
    Refreshed,
    Duplicate,
    QualityRejected,
    ExtractionFailed,
    HttpError,
    RobotsBlocked,
    FetchFailed,
    Error,
}

impl ProcessOutcome {
    fn is_success(self) -> bool {
        matches!(self, ProcessOutcome::Persisted | ProcessOutcome::Refreshed)
    }
}

#[derive(Default)]
struct DomainErrors {
    requests: u64,
    server_errors: u64,
}

pub struct CrawlerWorker {
    worker_id: String,
    config: Config,
    store: Arc<dyn ContentStore>,
    registry: Arc<dyn Registry>,
    crawler: Crawler,
    extractor: ContentExtractor,
    dedup: Mutex<NearDuplicateIndex>,
    gate: QualityGate,
    reputation: SourceReputationManager,
    detector: Mutex<TrendingDetector>,
    discovery_loop: Mutex<TrendingDiscoveryLoop>,
    pending_queries: Mutex<VecDeque<String>>,
    domain_errors: Mutex<HashMap<String, DomainErrors>>,
    flags: FeatureFlags,
    stats: Mutex<WorkerStats>,
    shutdown: CancellationToken,
}

impl CrawlerWorker {
    pub fn new(
        config: Config,
        store: Arc<dyn ContentStore>,
        registry: Arc<dyn Registry>,
    ) -> Result<Self> {
        let worker_id = config
            .worker_id
            .clone()
            .unwrap_or_else(|| format!("crawler-{}", Uuid::new_v4()));

        let crawler = Crawler::new(config.crawling.clone(), config.proxy.clone())
            .context("Failed to build crawler")?;

        let detector = TrendingDetector::new(config.trending.clone(), store.clone());
        let discovery_loop = TrendingDiscoveryLoop::new(config.trending.clone());
        let gate = QualityGate::new(config.quality.clone());
        let reputation = SourceReputationManager::new(&config.quality);

        Ok(Self {
            stats: Mutex::new(WorkerStats::new(&worker_id)),
            flags: FeatureFlags::new(registry.clone()),
            worker_id,
            store,
            registry,
            crawler,
            extractor: ContentExtractor::new(),
            dedup: Mutex::new(NearDuplicateIndex::default()),
            gate,
            reputation,
            detector: Mutex::new(detector),
            discovery_loop: Mutex::new(discovery_loop),
            pending_queries: Mutex::new(VecDeque::new()),
            domain_errors: Mutex::new(HashMap::new()),
            config,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Handle for signal handlers; cancelling it drains the worker.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn stats(&self) -> WorkerStats {
        self.stats.lock().await.clone()
    }

    /// Run until the shutdown token is cancelled.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        info!(worker_id = %self.worker_id, "Crawler worker starting");

        self.set_status(WorkerStatus::Running).await;
        self.publish_heartbeat().await;

        let heartbeat = tokio::spawn(self.clone().heartbeat_loop());
        let trending = tokio::spawn(self.clone().trending_loop());

        let mut consecutive_errors: u32 = 0;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            match self.run_cycle().await {
                Ok(()) => {
                    consecutive_errors = 0;
                    let delay = Duration::from_secs(self.config.worker.cycle_delay_seconds);
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    error!(worker_id = %self.worker_id, error = %e, "Crawl cycle failed");
                    consecutive_errors += 1;
                    self.stats.lock().await.errors += 1;

                    let backoff =
                        Duration::from_secs(60u64.min(1u64 << consecutive_errors.min(6)));
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        // Drain: background tasks see the cancelled token and finish their
        // current iteration
        info!(worker_id = %self.worker_id, "Draining worker");
        self.set_status(WorkerStatus::Draining).await;

        let _ = heartbeat.await;
        let _ = trending.await;

        self.set_status(WorkerStatus::Stopped).await;
        self.publish_heartbeat().await;
        info!(worker_id = %self.worker_id, "Crawler worker stopped");
        Ok(())
    }

    /// One discovery + crawl cycle, recorded as an IngestionJob.
    async fn run_cycle(&self) -> Result<()> {
        self.set_status(WorkerStatus::Cycling).await;
        let cycle_start = Instant::now();

        let mut job = IngestionJob::new("crawl_cycle", None);
        self.store.create_job(&job).await?;
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        self.store.update_job(&job).await?;

        let urls = self.discover_urls(&mut job).await?;

        if urls.is_empty() {
            job.status = JobStatus::Completed;
            job.completed_at = Some(Utc::now());
            self.store.update_job(&job).await?;
            self.set_status(WorkerStatus::Idle).await;
            return Ok(());
        }

        info!(
            worker_id = %self.worker_id,
            urls = urls.len(),
            "Starting crawl cycle"
        );

        for batch in urls.chunks(self.config.worker.batch_size.max(1)) {
            // Draining: stop accepting new URLs at the batch boundary
            if self.shutdown.is_cancelled() {
                info!(worker_id = %self.worker_id, "Shutdown requested, stopping at batch boundary");
                break;
            }

            let outcomes = self.process_batch(batch).await;
            job.processed += outcomes.len() as i32;
            job.successful += outcomes.iter().filter(|o| o.is_success()).count() as i32;
            job.failed += outcomes.iter().filter(|o| !o.is_success()).count() as i32;
        }

        self.update_reputations().await;

        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        job.summary = serde_json::json!({
            "cycle_time_ms": cycle_start.elapsed().as_millis() as u64,
            "gate": self.gate.stats(),
            "crawler": self.crawler.stats(),
        });
        self.store.update_job(&job).await?;

        info!(
            worker_id = %self.worker_id,
            processed = job.processed,
            successful = job.successful,
            cycle_time_ms = cycle_start.elapsed().as_millis() as u64,
            "Crawl cycle complete"
        );

        self.set_status(WorkerStatus::Idle).await;
        Ok(())
    }

    /// Union of per-source feed/sitemap discovery and pending trending
    /// queries, deduplicated and capped. Higher-priority sources discover
    /// first so the per-cycle cap favors them.
    async fn discover_urls(&self, job: &mut IngestionJob) -> Result<Vec<String>> {
        let mut sources = self.store.active_sources().await?;
        sources.sort_by(|a, b| {
            let pa = self.reputation.crawl_priority(a.quality_tier, a.reputation);
            let pb = self.reputation.crawl_priority(b.quality_tier, b.reputation);
            pb.partial_cmp(&pa).unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut urls = Vec::new();

        for source in &sources {
            if self.shutdown.is_cancelled() {
                break;
            }
            if source.rss_url.is_none()
                && source.sitemap_url.is_none()
                && source.search_queries.is_empty()
            {
                continue;
            }

            let source_config = SourceConfig {
                rss_url: source.rss_url.clone(),
                sitemap_url: source.sitemap_url.clone(),
                search_queries: source.search_queries.clone(),
            };
            let discovered = self.crawler.discover(&source_config).await;

            if source.rss_url.is_some() {
                self.store.mark_source_crawled(source.id, "feed").await?;
            }
            if source.sitemap_url.is_some() {
                self.store.mark_source_crawled(source.id, "sitemap").await?;
            }

            urls.extend(discovered);
        }

        // Trending-fed queries enter through search-API discovery
        let pending: Vec<String> = self.pending_queries.lock().await.drain(..).collect();
        if !pending.is_empty() {
            let trending_config = SourceConfig {
                rss_url: None,
                sitemap_url: None,
                search_queries: pending,
            };
            urls.extend(self.crawler.discover(&trending_config).await);
        }

        let mut unique = dedupe_preserving_order(urls);
        unique.truncate(self.config.worker.max_urls_per_cycle);
        job.discovered = unique.len() as i32;

        Ok(unique)
    }

    /// Fan a batch out to bounded concurrent `process_url` tasks.
    async fn process_batch(&self, urls: &[String]) -> Vec<ProcessOutcome> {
        let semaphore = Arc::new(Semaphore::new(
            self.config.worker.max_concurrent_requests.max(1),
        ));

        let tasks = urls.iter().map(|url| {
            let semaphore = semaphore.clone();
            async move {
                match semaphore.acquire().await {
                    Ok(_permit) => self.process_url(url).await,
                    Err(_) => ProcessOutcome::Error,
                }
            }
        });

        futures::future::join_all(tasks).await
    }

    /// Per-URL guard: no error escapes. Failures become a counter bump and
    /// one structured log line with url, stage, elapsed time, and kind.
    async fn process_url(&self, url: &str) -> ProcessOutcome {
        let started = Instant::now();

        match self.process_inner(url).await {
            Ok(outcome) => {
                debug!(url = %url, outcome = ?outcome, elapsed_ms = started.elapsed().as_millis() as u64, "Processed URL");
                outcome
            }
            Err((stage, e)) => {
                self.stats.lock().await.errors += 1;
                error!(
                    url = %url,
                    stage = stage,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %e,
                    "URL processing failed"
                );
                ProcessOutcome::Error
            }
        }
    }

    async fn process_inner(
        &self,
        url: &str,
    ) -> std::result::Result<ProcessOutcome, (&'static str, anyhow::Error)> {
        // Fetch
        let record = match self.crawler.crawl_url(url).await {
            Ok(record) => record,
            Err(CrawlError::RobotsDisallowed { .. }) => {
                self.stats.lock().await.robots_blocked += 1;
                return Ok(ProcessOutcome::RobotsBlocked);
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Fetch failed, dropping URL for this cycle");
                return Ok(ProcessOutcome::FetchFailed);
            }
        };

        {
            let mut stats = self.stats.lock().await;
            stats.fetch_times_ms.push(record.fetch_time_ms);
            stats.pages_crawled += 1;
        }

        self.note_domain_result(url, record.status).await;

        if !record.is_success() {
            return Ok(ProcessOutcome::HttpError);
        }

        // Extract (inline CPU work on the fetching task)
        let extract_start = Instant::now();
        let extraction = self.extractor.extract(&record.body, url, &record.final_url);
        self.stats
            .lock()
            .await
            .extract_times_ms
            .push(extract_start.elapsed().as_secs_f64() * 1000.0);

        if !extraction.success {
            self.stats.lock().await.extraction_failures += 1;
            debug!(url = %url, errors = ?extraction.errors, "Extraction failed");
            return Ok(ProcessOutcome::ExtractionFailed);
        }

        // Near-duplicate check
        let unique = {
            let mut dedup = self.dedup.lock().await;
            let unique = dedup.add(&extraction.content_hash, &extraction.title, &extraction.text);
            dedup.evict_oldest(MAX_DEDUP_ENTRIES);
            unique
        };
        if !unique {
            self.stats.lock().await.duplicates_filtered += 1;
            return Ok(ProcessOutcome::Duplicate);
        }

        // Source
        let domain = domain_of(&extraction.canonical_url)
            .or_else(|| domain_of(&record.final_url))
            .ok_or_else(|| {
                (
                    "persist",
                    anyhow::anyhow!("no host in canonical URL {}", extraction.canonical_url),
                )
            })?;
        let source = self
            .store
            .get_or_create_source(&domain)
            .await
            .map_err(|e| ("persist", e))?;

        // Quality gate
        let decision = self.gate.process(&extraction, &source);
        if !decision.accepted {
            self.stats.lock().await.quality_filtered += 1;
            debug!(url = %url, reason = %decision.reason, "Quality gate rejected content");
            return Ok(ProcessOutcome::QualityRejected);
        }

        // Persist
        let item = ContentItem::from_extraction(source.id, &extraction, decision.result.score);
        let outcome = self
            .store
            .upsert_content_item(&item)
            .await
            .map_err(|e| ("persist", e))?;

        if outcome == UpsertOutcome::Inserted {
            self.store
                .record_quality_signals(&decision.result.signal_records(item.id))
                .await
                .map_err(|e| ("persist", e))?;
        }

        // Trending counters are eventually consistent; a failed update is
        // logged, never fatal to the URL
        if let Err(e) = self
            .detector
            .lock()
            .await
            .process_content(&extraction.title, &extraction.text, &extraction.sports_keywords)
            .await
        {
            warn!(url = %url, error = %e, "Trending update failed");
        }

        self.stats.lock().await.content_extracted += 1;

        Ok(match outcome {
            UpsertOutcome::Inserted => ProcessOutcome::Persisted,
            UpsertOutcome::Refreshed => ProcessOutcome::Refreshed,
        })
    }

    async fn note_domain_result(&self, url: &str, status: u16) {
        let Some(domain) = domain_of(url) else {
            return;
        };
        let mut errors = self.domain_errors.lock().await;
        let entry = errors.entry(domain).or_default();
        entry.requests += 1;
        // 5xx counts against the source; 4xx does not
        if status >= 500 {
            entry.server_errors += 1;
        }
    }

    /// Reputation pass over the sources touched this cycle.
    async fn update_reputations(&self) {
        let observed: HashMap<String, (u64, u64)> = {
            let mut errors = self.domain_errors.lock().await;
            errors
                .drain()
                .map(|(domain, e)| (domain, (e.requests, e.server_errors)))
                .collect()
        };

        for (domain, (requests, server_errors)) in observed {
            if requests == 0 {
                continue;
            }
            let error_rate = server_errors as f64 / requests as f64;

            let source = match self.store.get_or_create_source(&domain).await {
                Ok(source) => source,
                Err(e) => {
                    warn!(domain = %domain, error = %e, "Reputation pass: source lookup failed");
                    continue;
                }
            };

            let scores = match self
                .store
                .recent_quality_scores(source.id, REPUTATION_SAMPLE)
                .await
            {
                Ok(scores) => scores,
                Err(e) => {
                    warn!(domain = %domain, error = %e, "Reputation pass: score fetch failed");
                    continue;
                }
            };
            if scores.is_empty() {
                continue;
            }

            let update = self.reputation.update(&scores, error_rate);
            if let Err(e) = self
                .store
                .update_source_reputation(
                    source.id,
                    update.reputation,
                    update.quality_tier,
                    1.0 - error_rate,
                )
                .await
            {
                warn!(domain = %domain, error = %e, "Reputation pass: update failed");
            }
        }
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(HEARTBEAT_INTERVAL_SECS)) => {
                    self.publish_heartbeat().await;
                }
            }
        }
    }

    async fn publish_heartbeat(&self) {
        let fields = {
            let mut stats = self.stats.lock().await;
            stats.last_heartbeat = Utc::now();
            stats.heartbeat_fields()
        };

        if let Err(e) = self
            .registry
            .set_hash(
                &format!("worker:{}", self.worker_id),
                &fields,
                Duration::from_secs(HEARTBEAT_TTL_SECS),
            )
            .await
        {
            warn!(worker_id = %self.worker_id, error = %e, "Heartbeat publish failed");
        }
    }

    async fn trending_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(TRENDING_INTERVAL_SECS)) => {
                    self.run_trending_cycle().await;
                }
            }
        }
    }

    async fn run_trending_cycle(&self) {
        if !self.flags.is_enabled("trending_discovery", true).await {
            debug!(worker_id = %self.worker_id, "Trending discovery disabled by feature flag");
            return;
        }

        let mut discovery_loop = self.discovery_loop.lock().await;
        let mut detector = self.detector.lock().await;

        match discovery_loop.run_cycle(&mut detector).await {
            Ok(summary) => {
                let queries = discovery_loop.pop_queries(TRENDING_QUERY_BATCH);
                if !queries.is_empty() {
                    let mut pending = self.pending_queries.lock().await;
                    pending.extend(queries.into_iter().map(|q| q.query));
                }
                debug!(
                    trending_terms = summary.trending_terms,
                    queries = summary.queries_generated,
                    "Trending cycle complete"
                );
            }
            Err(e) => {
                warn!(worker_id = %self.worker_id, error = %e, "Trending cycle failed");
            }
        }
    }

    async fn set_status(&self, status: WorkerStatus) {
        self.stats.lock().await.status = status;
    }
}

/// Source domain for a URL: the host with any `www.` prefix stripped, so
/// error telemetry and canonical URLs key the same source row.
fn domain_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;
    use crate::storage::MemoryStore;

    fn test_config() -> Config {
        Config {
            database_url: "postgres://unused".to_string(),
            port: 8080,
            worker_id: Some("worker-test".to_string()),
            crawling: ingestion::CrawlConfig::default(),
            proxy: ingestion::ProxyConfig::default(),
            quality: crate::config::QualityConfig::default(),
            trending: crate::config::TrendingConfig::default(),
            search: crate::config::SearchConfig::default(),
            worker: crate::config::WorkerConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_worker_builds_and_reports_id() {
        let worker = CrawlerWorker::new(
            test_config(),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryRegistry::new()),
        )
        .unwrap();

        assert_eq!(worker.worker_id(), "worker-test");
        let stats = worker.stats().await;
        assert_eq!(stats.status, WorkerStatus::Initializing);
    }

    #[tokio::test]
    async fn test_heartbeat_lands_in_registry() {
        let registry = Arc::new(MemoryRegistry::new());
        let worker = CrawlerWorker::new(
            test_config(),
            Arc::new(MemoryStore::new()),
            registry.clone(),
        )
        .unwrap();

        worker.publish_heartbeat().await;

        let heartbeat = registry.get_hash("worker:worker-test").await.unwrap().unwrap();
        assert_eq!(heartbeat.get("status").map(String::as_str), Some("initializing"));
        assert!(heartbeat.contains_key("pages_crawled"));
    }

    #[tokio::test]
    async fn test_shutdown_token_drains_run_loop() {
        let worker = Arc::new(
            CrawlerWorker::new(
                test_config(),
                Arc::new(MemoryStore::new()),
                Arc::new(MemoryRegistry::new()),
            )
            .unwrap(),
        );

        let token = worker.shutdown_token();
        let handle = tokio::spawn(worker.clone().run());

        // Let the loop start, then request drain
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker drained in time")
            .expect("worker task not cancelled")
            .expect("worker run returned ok");

        let stats = worker.stats().await;
        assert_eq!(stats.status, WorkerStatus::Stopped);
    }

    #[tokio::test]
    async fn test_domain_of_strips_www() {
        assert_eq!(domain_of("https://www.espn.com/nba/x"), Some("espn.com".to_string()));
        assert_eq!(domain_of("https://espn.com/nba/x"), Some("espn.com".to_string()));
        assert_eq!(domain_of("not a url"), None);
    }
}
