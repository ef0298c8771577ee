//! The per-thread crawl loop.

use std::sync::Arc;
use std::time::Duration;

use crate::backoff::ExponentialBackoff;
use crate::context::CrawlContext;
use crate::crawler::CrawlError;
use crate::fingerprint::DedupVerdict;
use crate::frontier::{AddOutcome, Frontier, FrontierEntry};
use crate::liveness::{self, LivenessProbe, ProbeError};
use crate::metrics::CrawlMetrics;
use crate::network::Downloader;
use crate::parser::HtmlExtractor;
use crate::robots::PolicyChecker;
use crate::shutdown::ShutdownSignal;
use crate::similarity;

#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub politeness_delay: Duration,
    pub url_similarity_threshold: f64,
    pub probe_backoff: ExponentialBackoff,
    pub probe_max_attempts: u32,
}

/// Everything a worker touches, shared by reference across the pool.
pub struct WorkerShared {
    pub frontier: Arc<Frontier>,
    pub context: Arc<CrawlContext>,
    pub downloader: Arc<dyn Downloader>,
    pub extractor: Arc<dyn HtmlExtractor>,
    pub policy: Arc<dyn PolicyChecker>,
    pub probe: Option<Arc<dyn LivenessProbe>>,
    pub metrics: Arc<CrawlMetrics>,
    pub settings: WorkerSettings,
    pub shutdown: ShutdownSignal,
}

/// Why a worker left its loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    FrontierEmpty,
    ShutdownRequested,
    TargetUnreachable { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Unique { unique_pages: u64, links_added: usize },
    /// Counted by an earlier run that stopped before completing it.
    Resumed { links_added: usize },
    NearDuplicate,
    Failed,
}

pub struct Worker {
    id: usize,
    shared: Arc<WorkerShared>,
}

impl Worker {
    pub fn new(id: usize, shared: Arc<WorkerShared>) -> Self {
        Self { id, shared }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn run(&self) -> Result<WorkerExit, CrawlError> {
        let shared = &self.shared;
        tracing::debug!(worker = self.id, "Worker started");

        loop {
            if shared.shutdown.is_triggered() {
                tracing::info!(worker = self.id, "Shutdown requested, worker stopping");
                return Ok(WorkerExit::ShutdownRequested);
            }

            if let Some(probe) = &shared.probe {
                match liveness::wait_until_reachable(
                    probe.as_ref(),
                    &shared.settings.probe_backoff,
                    shared.settings.probe_max_attempts,
                    &shared.shutdown,
                ) {
                    Ok(()) => {}
                    Err(ProbeError::Cancelled) => return Ok(WorkerExit::ShutdownRequested),
                    Err(ProbeError::Unreachable { attempts }) => {
                        tracing::error!(worker = self.id, attempts, "Target unreachable, worker stopping");
                        return Ok(WorkerExit::TargetUnreachable { attempts });
                    }
                }
            }

            let entry = match shared.frontier.next() {
                Some(entry) => entry,
                None => {
                    tracing::info!(worker = self.id, "Frontier is empty, worker stopping");
                    return Ok(WorkerExit::FrontierEmpty);
                }
            };

            self.process(&entry)?;

            if !shared.shutdown.sleep(shared.settings.politeness_delay) {
                return Ok(WorkerExit::ShutdownRequested);
            }
        }
    }

    /// Fetch, dedup, record and expand one URL.
    pub fn process(&self, entry: &FrontierEntry) -> Result<PageOutcome, CrawlError> {
        let shared = &self.shared;
        let url = entry.url.as_str();

        let page = match shared.downloader.fetch(url) {
            Ok(page) => page,
            Err(e) => {
                shared.metrics.urls_failed.inc();
                tracing::warn!(
                    worker = self.id,
                    url = %url,
                    error = %e,
                    transient = e.is_transient(),
                    "Fetch failed, dropping URL"
                );
                return Ok(PageOutcome::Failed);
            }
        };
        shared.metrics.urls_fetched.inc();

        if !page.is_success() {
            shared.metrics.urls_failed.inc();
            tracing::warn!(worker = self.id, url = %url, status = page.status, "Unexpected status, dropping URL");
            return Ok(PageOutcome::Failed);
        }
        if !page.is_html() {
            shared.metrics.urls_failed.inc();
            tracing::debug!(worker = self.id, url = %url, content_type = ?page.content_type, "Not HTML, dropping URL");
            return Ok(PageOutcome::Failed);
        }

        let tokens = shared.extractor.text(&page.content);
        let unique_pages = match shared.context.check_content(url, &tokens) {
            DedupVerdict::NearDuplicate {
                similarity,
                matched_url,
            } => {
                shared.metrics.duplicates_skipped.inc();
                tracing::info!(
                    worker = self.id,
                    url = %url,
                    similarity,
                    matched = matched_url.as_deref().unwrap_or("<restored>"),
                    "Near-duplicate content, skipping"
                );
                return Ok(PageOutcome::NearDuplicate);
            }
            DedupVerdict::AlreadyRecorded(_) => {
                tracing::info!(
                    worker = self.id,
                    url = %url,
                    "Page counted before the last stop, completing it"
                );
                None
            }
            DedupVerdict::Novel(_) => {
                let unique_pages = shared.context.record_unique_page(url, &tokens);
                tracing::info!(
                    worker = self.id,
                    url = %url,
                    status = page.status,
                    words = tokens.len(),
                    unique_pages,
                    "Downloaded page"
                );
                Some(unique_pages)
            }
        };

        let links = shared.extractor.links(&page.content, &page.url);
        let children = self.filter_children(links);

        let mut links_added = 0;
        for child in &children {
            match shared.frontier.add(child)? {
                AddOutcome::Added => links_added += 1,
                outcome => tracing::trace!(url = %child, ?outcome, "Child not queued"),
            }
        }
        shared.frontier.mark_complete(url)?;

        // Periodic snapshots only after completion. Pages still in flight on other
        // workers come back as AlreadyRecorded after a crash.
        match unique_pages {
            Some(unique_pages) => {
                shared.context.maybe_write_snapshot(unique_pages)?;
                Ok(PageOutcome::Unique {
                    unique_pages,
                    links_added,
                })
            }
            None => Ok(PageOutcome::Resumed { links_added }),
        }
    }

    /// Valid, allowed, and not too similar to a sibling accepted earlier from the same page.
    fn filter_children(&self, links: Vec<String>) -> Vec<String> {
        let shared = &self.shared;
        let threshold = shared.settings.url_similarity_threshold;
        let mut accepted: Vec<String> = Vec::new();

        for link in links {
            let link = crate::url_utils::normalize(&link);
            let keep = shared.frontier.filter().is_valid(&link)
                && !accepted
                    .iter()
                    .any(|sibling| similarity::is_near_duplicate(&link, sibling, threshold))
                && shared.policy.allowed(&link);

            if keep {
                accepted.push(link);
            } else {
                shared.metrics.links_rejected.inc();
            }
        }

        shared.metrics.links_accepted.add(accepted.len() as u64);
        accepted
    }
}
