use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::backoff::ExponentialBackoff;
use crate::config::{ConfigError, CrawlerConfig};
use crate::context::CrawlContext;
use crate::frontier::Frontier;
use crate::liveness::{HttpProbe, LivenessProbe};
use crate::metrics::{CrawlMetrics, CrawlSummary};
use crate::network::{Downloader, FetchError, HttpClient};
use crate::parser::{HtmlExtractor, HtmlParser};
use crate::robots::{PolicyChecker, RobotsPolicy};
use crate::shutdown::{Shutdown, ShutdownSignal};
use crate::snapshot::SnapshotError;
use crate::state::{FrontierStore, StateError};
use crate::url_utils::UrlFilter;
use crate::worker::{Worker, WorkerSettings, WorkerShared};

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Frontier store error: {0}")]
    State(#[from] StateError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("HTTP client error: {0}")]
    Fetch(#[from] FetchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker {0} panicked")]
    WorkerPanicked(usize),
}

/// The pluggable pieces a crawl talks to.
pub struct Collaborators {
    pub downloader: Arc<dyn Downloader>,
    pub extractor: Arc<dyn HtmlExtractor>,
    pub policy: Arc<dyn PolicyChecker>,
    pub probe: Option<Arc<dyn LivenessProbe>>,
}

impl Collaborators {
    /// Live HTTP stack: reqwest downloader, robots.txt policy, scraper extractor.
    pub fn http(config: &CrawlerConfig) -> Result<Self, CrawlError> {
        let client = Arc::new(HttpClient::new(&config.user_agent, config.request_timeout_secs)?);
        let filter = UrlFilter::new(config.allowed_domains.clone());
        let downloader: Arc<dyn Downloader> = client.clone();
        let policy = RobotsPolicy::new(Arc::clone(&downloader), filter, config.user_agent.clone());
        let probe = config
            .probe_url
            .as_ref()
            .map(|url| Arc::new(HttpProbe::new(Arc::clone(&client), url.clone())) as Arc<dyn LivenessProbe>);

        Ok(Self {
            downloader,
            extractor: Arc::new(HtmlParser::new()),
            policy: Arc::new(policy),
            probe,
        })
    }
}

/// Owns the crawl lifecycle: startup recovery, the worker pool, and the final snapshot.
pub struct Crawler {
    config: CrawlerConfig,
    frontier: Arc<Frontier>,
    context: Arc<CrawlContext>,
    metrics: Arc<CrawlMetrics>,
    collaborators: Collaborators,
    shutdown: Shutdown,
}

impl Crawler {
    /// Open the durable store and snapshot under `config.data_dir`.
    ///
    /// With `restart` both are deleted first and the crawl starts from the seeds.
    pub fn new(config: CrawlerConfig, collaborators: Collaborators, restart: bool) -> Result<Self, CrawlError> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)?;

        let snapshot_path = config.snapshot_path();
        if restart {
            tracing::info!(data_dir = %config.data_dir.display(), "Restart requested, discarding saved crawl state");
            FrontierStore::remove(&config.data_dir)?;
            if snapshot_path.exists() {
                std::fs::remove_file(&snapshot_path)?;
            }
        }

        let context = CrawlContext::new(
            config.fingerprint_width()?,
            config.near_duplicate_threshold,
            snapshot_path,
            config.snapshot_interval,
            config.subdomain_root.clone(),
        );
        context.restore_from_disk()?;

        let store = FrontierStore::open(&config.data_dir)?;
        let filter = UrlFilter::new(config.allowed_domains.clone());
        let frontier = Frontier::open(store, filter, config.url_similarity_threshold, &config.seed_urls)?;
        tracing::info!("{}", frontier.stats());

        Ok(Self {
            config,
            frontier: Arc::new(frontier),
            context: Arc::new(context),
            metrics: Arc::new(CrawlMetrics::new()),
            collaborators,
            shutdown: Shutdown::new(),
        })
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.signal()
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn context(&self) -> &CrawlContext {
        &self.context
    }

    fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            politeness_delay: self.config.politeness_delay(),
            url_similarity_threshold: self.config.url_similarity_threshold,
            probe_backoff: ExponentialBackoff::new(
                Duration::from_millis(self.config.probe_backoff_base_ms),
                Duration::from_millis(self.config.probe_backoff_max_ms),
            ),
            probe_max_attempts: self.config.probe_max_attempts,
        }
    }

    /// Run the pool until every worker stops, then write the final snapshot.
    pub fn run(&self) -> Result<CrawlSummary, CrawlError> {
        let started = Instant::now();
        let shared = Arc::new(WorkerShared {
            frontier: Arc::clone(&self.frontier),
            context: Arc::clone(&self.context),
            downloader: Arc::clone(&self.collaborators.downloader),
            extractor: Arc::clone(&self.collaborators.extractor),
            policy: Arc::clone(&self.collaborators.policy),
            probe: self.collaborators.probe.clone(),
            metrics: Arc::clone(&self.metrics),
            settings: self.worker_settings(),
            shutdown: self.shutdown.signal(),
        });

        tracing::info!(workers = self.config.workers, "Starting crawl");
        let mut handles = Vec::with_capacity(self.config.workers);
        for id in 0..self.config.workers {
            let worker = Worker::new(id, Arc::clone(&shared));
            let handle = thread::Builder::new()
                .name(format!("worker-{}", id))
                .spawn(move || worker.run())?;
            handles.push((id, handle));
        }

        let mut first_error = None;
        for (id, handle) in handles {
            match handle.join() {
                Ok(Ok(exit)) => tracing::debug!(worker = id, ?exit, "Worker finished"),
                Ok(Err(e)) => {
                    tracing::error!(worker = id, error = %e, "Worker failed");
                    // One broken worker stops the rest; their claimed URLs stay pending on disk.
                    self.shutdown.trigger();
                    first_error.get_or_insert(e);
                }
                Err(_) => {
                    tracing::error!(worker = id, "Worker panicked");
                    self.shutdown.trigger();
                    first_error.get_or_insert(CrawlError::WorkerPanicked(id));
                }
            }
        }

        self.context.write_snapshot()?;
        if let Some(e) = first_error {
            return Err(e);
        }

        let summary = self.metrics.summarize(
            self.context.stats().unique_pages(),
            self.config.workers,
            started.elapsed(),
        );
        tracing::info!(
            unique_pages = summary.unique_pages,
            fetched = summary.urls_fetched,
            failed = summary.urls_failed,
            duplicates = summary.duplicates_skipped,
            "Crawl complete. {}",
            self.frontier.stats()
        );
        Ok(summary)
    }
}

