use std::path::PathBuf;

use crate::fingerprint::{DedupVerdict, FingerprintEngine, FingerprintWidth};
use crate::snapshot::{Snapshot, SnapshotError, SnapshotWriter};
use crate::stats::StatsStore;

/// Crawl-wide mutable state, built once by the crawler and shared with every worker.
pub struct CrawlContext {
    stats: StatsStore,
    engine: FingerprintEngine,
    snapshots: SnapshotWriter,
    subdomain_root: String,
}

impl CrawlContext {
    pub fn new(
        width: FingerprintWidth,
        near_duplicate_threshold: f64,
        snapshot_path: PathBuf,
        snapshot_interval: u64,
        subdomain_root: impl Into<String>,
    ) -> Self {
        Self {
            stats: StatsStore::new(),
            engine: FingerprintEngine::new(width, near_duplicate_threshold),
            snapshots: SnapshotWriter::new(snapshot_path, snapshot_interval),
            subdomain_root: subdomain_root.into(),
        }
    }

    pub fn stats(&self) -> &StatsStore {
        &self.stats
    }

    pub fn engine(&self) -> &FingerprintEngine {
        &self.engine
    }

    pub fn snapshot_path(&self) -> &std::path::Path {
        self.snapshots.path()
    }

    /// Load the snapshot written by a previous run, if any.
    pub fn restore_from_disk(&self) -> Result<bool, SnapshotError> {
        match Snapshot::load(self.snapshots.path())? {
            Some(snapshot) => {
                self.restore(snapshot)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn restore(&self, snapshot: Snapshot) -> Result<(), SnapshotError> {
        let fingerprints = snapshot.parsed_fingerprints()?;
        let total = fingerprints.len();
        self.stats.restore(snapshot.aggregate());
        self.engine
            .word_hashes()
            .restore(snapshot.word_hash_cache.into_iter());
        let accepted = self.engine.restore(fingerprints);

        if accepted < total {
            tracing::warn!(
                skipped = total - accepted,
                width = self.engine.width().bits(),
                "Snapshot fingerprints with a different width were ignored"
            );
        }
        tracing::info!(
            unique_pages = snapshot.unique_pages,
            fingerprints = accepted,
            "Restored crawl statistics from snapshot"
        );
        Ok(())
    }

    pub fn check_content(&self, url: &str, tokens: &[String]) -> DedupVerdict {
        self.engine.check_and_register(url, tokens)
    }

    /// Stats for one novel page. Returns the unique-page count after this page.
    pub fn record_unique_page(&self, url: &str, tokens: &[String]) -> u64 {
        self.stats.record_page(url, tokens, &self.subdomain_root)
    }

    /// Periodic snapshot, once the page that brought the count to `unique_pages`
    /// has been completed in the frontier.
    pub fn maybe_write_snapshot(&self, unique_pages: u64) -> Result<bool, SnapshotError> {
        self.snapshots
            .maybe_write(unique_pages, &self.stats, &self.engine)
    }

    pub fn write_snapshot(&self) -> Result<(), SnapshotError> {
        self.snapshots.write_now(&self.stats, &self.engine)
    }
}
