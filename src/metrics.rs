use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

// Atomic counter for lock-free metric updates
#[derive(Debug)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self { value: AtomicU64::new(0) }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-run counters shared by every worker.
#[derive(Debug, Default)]
pub struct CrawlMetrics {
    pub urls_fetched: Counter,
    pub urls_failed: Counter,
    pub duplicates_skipped: Counter,
    pub links_accepted: Counter,
    pub links_rejected: Counter,
}

impl CrawlMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summarize(&self, unique_pages: u64, workers: usize, elapsed: Duration) -> CrawlSummary {
        CrawlSummary {
            workers,
            unique_pages,
            urls_fetched: self.urls_fetched.get(),
            urls_failed: self.urls_failed.get(),
            duplicates_skipped: self.duplicates_skipped.get(),
            links_accepted: self.links_accepted.get(),
            links_rejected: self.links_rejected.get(),
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlSummary {
    pub workers: usize,
    /// Total including pages restored from a previous run's snapshot.
    pub unique_pages: u64,
    pub urls_fetched: u64,
    pub urls_failed: u64,
    pub duplicates_skipped: u64,
    pub links_accepted: u64,
    pub links_rejected: u64,
    pub elapsed_secs: f64,
}

impl fmt::Display for CrawlSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Crawl finished in {:.1}s with {} workers", self.elapsed_secs, self.workers)?;
        writeln!(f, "  unique pages:       {}", self.unique_pages)?;
        writeln!(f, "  fetched this run:   {}", self.urls_fetched)?;
        writeln!(f, "  failed fetches:     {}", self.urls_failed)?;
        writeln!(f, "  near-duplicates:    {}", self.duplicates_skipped)?;
        write!(
            f,
            "  links accepted/rejected: {}/{}",
            self.links_accepted, self.links_rejected
        )
    }
}
