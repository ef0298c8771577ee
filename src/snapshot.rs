//! Durable snapshot of the stats aggregate, word hash cache and fingerprint list.

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::fingerprint::{Fingerprint, FingerprintEngine, FingerprintError, StoredFingerprint};
use crate::stats::{top_n_from, LongestPage, StatsAggregate, StatsStore};

pub const TOP_WORDS_IN_SNAPSHOT: usize = 50;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Snapshot fingerprint error: {0}")]
    Fingerprint(#[from] FingerprintError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub unique_pages: u64,
    pub longest_page: LongestPage,
    pub top_50_words: IndexMap<String, u64>,
    pub subdomain_counts: BTreeMap<String, u64>,
    pub word_count: IndexMap<String, u64>,
    pub word_hash_cache: BTreeMap<String, u64>,
    /// Bitstrings in registration order.
    pub fingerprints: Vec<String>,
    /// Owning URL of each entry in `fingerprints`, same order.
    #[serde(default)]
    pub fingerprint_urls: Vec<Option<String>>,
}

impl Snapshot {
    pub fn capture(stats: &StatsStore, engine: &FingerprintEngine) -> Self {
        let aggregate = stats.aggregate();
        let (fingerprint_urls, fingerprints) = engine
            .stored()
            .into_iter()
            .map(|stored| (stored.url, stored.fingerprint.to_bitstring()))
            .unzip();
        let top_50_words = top_n_from(&aggregate.word_count, TOP_WORDS_IN_SNAPSHOT)
            .into_iter()
            .collect();

        Self {
            unique_pages: aggregate.unique_pages,
            longest_page: aggregate.longest_page,
            top_50_words,
            subdomain_counts: aggregate.subdomain_counts,
            word_count: aggregate.word_count,
            word_hash_cache: engine.word_hashes().entries().into_iter().collect(),
            fingerprints,
            fingerprint_urls,
        }
    }

    /// `Ok(None)` when no snapshot has been written yet.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Option<Self>, SnapshotError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let reader = BufReader::new(File::open(path)?);
        Ok(Some(serde_json::from_reader(reader)?))
    }

    /// Write to a sibling temp file, then rename over the target.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), SnapshotError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("json.tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn aggregate(&self) -> StatsAggregate {
        StatsAggregate {
            unique_pages: self.unique_pages,
            subdomain_counts: self.subdomain_counts.clone(),
            word_count: self.word_count.clone(),
            longest_page: self.longest_page.clone(),
        }
    }

    /// Entries without a recorded owner come back with `url: None`.
    pub fn parsed_fingerprints(&self) -> Result<Vec<StoredFingerprint>, SnapshotError> {
        self.fingerprints
            .iter()
            .enumerate()
            .map(|(i, bits)| -> Result<StoredFingerprint, SnapshotError> {
                Ok(StoredFingerprint {
                    url: self.fingerprint_urls.get(i).cloned().flatten(),
                    fingerprint: Fingerprint::from_bitstring(bits)?,
                })
            })
            .collect()
    }
}

/// Writes a snapshot every `interval` unique pages and on demand.
#[derive(Debug)]
pub struct SnapshotWriter {
    path: PathBuf,
    interval: u64,
    write_lock: Mutex<()>,
}

impl SnapshotWriter {
    pub fn new(path: PathBuf, interval: u64) -> Self {
        Self {
            path,
            interval,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_due(&self, unique_pages: u64) -> bool {
        self.interval > 0 && unique_pages > 0 && unique_pages % self.interval == 0
    }

    pub fn write_now(&self, stats: &StatsStore, engine: &FingerprintEngine) -> Result<(), SnapshotError> {
        let _serialized = self.write_lock.lock();
        let snapshot = Snapshot::capture(stats, engine);
        snapshot.write(&self.path)?;
        tracing::info!(
            path = %self.path.display(),
            unique_pages = snapshot.unique_pages,
            fingerprints = snapshot.fingerprints.len(),
            "Snapshot written"
        );
        Ok(())
    }

    /// Returns whether a snapshot was written.
    pub fn maybe_write(
        &self,
        unique_pages: u64,
        stats: &StatsStore,
        engine: &FingerprintEngine,
    ) -> Result<bool, SnapshotError> {
        if !self.is_due(unique_pages) {
            return Ok(false);
        }
        self.write_now(stats, engine)?;
        Ok(true)
    }
}
