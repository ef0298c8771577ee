use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashSet;

use crate::similarity;
use crate::state::{FrontierRecord, FrontierStore, StateError};
use crate::url_utils::{self, UrlFilter, UrlKey};

/// A URL handed out by [`Frontier::next`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub url: String,
    pub key: UrlKey,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    Added,
    /// Key is already pending, handed out this session, or completed.
    Known,
    TooSimilar { pending_url: String },
    Malformed,
}

impl AddOutcome {
    pub fn is_added(&self) -> bool {
        matches!(self, AddOutcome::Added)
    }
}

#[derive(Debug, Default)]
struct FrontierInner {
    pending: Vec<FrontierEntry>,
    pending_keys: HashSet<UrlKey>,
    /// Returned by `next()` this session and not (yet) completed.
    claimed: HashSet<UrlKey>,
    completed: HashSet<UrlKey>,
}

impl FrontierInner {
    fn is_known(&self, key: &UrlKey) -> bool {
        self.pending_keys.contains(key) || self.claimed.contains(key) || self.completed.contains(key)
    }

    fn push_pending(&mut self, entry: FrontierEntry) {
        self.pending_keys.insert(entry.key);
        self.pending.push(entry);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontierStats {
    pub pending: usize,
    pub claimed: usize,
    pub completed: usize,
}

impl std::fmt::Display for FrontierStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Frontier: {} pending, {} in flight or dropped, {} completed",
            self.pending, self.claimed, self.completed
        )
    }
}

/// Durable, deduplicated URL queue.
///
/// One mutex covers the in-memory sets and every write to the durable store, so
/// `next()` and `add()` can never hand the same key to two workers.
pub struct Frontier {
    inner: Mutex<FrontierInner>,
    store: FrontierStore,
    filter: UrlFilter,
    similarity_threshold: f64,
}

impl Frontier {
    /// Rebuild pending work from `store`, falling back to `seeds` when nothing is pending.
    pub fn open(
        store: FrontierStore,
        filter: UrlFilter,
        similarity_threshold: f64,
        seeds: &[String],
    ) -> Result<Self, StateError> {
        let frontier = Self {
            inner: Mutex::new(FrontierInner::default()),
            store,
            filter,
            similarity_threshold,
        };

        let had_records = !frontier.store.is_empty()?;
        frontier.rebuild()?;

        let pending = frontier.inner.lock().pending.len();
        if pending == 0 {
            if had_records {
                tracing::info!("Frontier store has no pending URLs, seeding from configuration");
            } else {
                tracing::info!("No frontier store found, seeding from configuration");
            }
            for seed in seeds {
                match frontier.add(seed)? {
                    AddOutcome::Added => tracing::debug!(url = %seed, "Seed queued"),
                    outcome => tracing::info!(url = %seed, ?outcome, "Seed not queued"),
                }
            }
        } else {
            tracing::info!(pending, "Resumed frontier from durable store");
        }

        Ok(frontier)
    }

    fn rebuild(&self) -> Result<(), StateError> {
        let mut inner = self.inner.lock();
        let mut skipped = 0usize;

        self.store.for_each(|record| {
            let key = match UrlKey::for_url(&record.url) {
                Ok(key) => key,
                Err(e) => {
                    tracing::warn!(url = %record.url, error = %e, "Unreadable URL in frontier store");
                    return Ok(());
                }
            };

            if record.completed {
                inner.completed.insert(key);
            } else if self.filter.is_valid(&record.url) {
                if !inner.pending_keys.contains(&key) {
                    inner.push_pending(FrontierEntry {
                        url: record.url,
                        key,
                    });
                }
            } else {
                skipped += 1;
            }
            Ok(())
        })?;

        // A key may have been written pending and then completed under different spellings.
        let FrontierInner {
            pending,
            pending_keys,
            completed,
            ..
        } = &mut *inner;
        pending.retain(|entry| !completed.contains(&entry.key));
        pending_keys.retain(|key| !completed.contains(key));

        if skipped > 0 {
            tracing::info!(skipped, "Pending URLs no longer valid for this session");
        }
        Ok(())
    }

    pub fn add(&self, url: &str) -> Result<AddOutcome, StateError> {
        let normalized = url_utils::normalize(url);
        let key = match UrlKey::for_url(&normalized) {
            Ok(key) => key,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Rejected malformed URL");
                return Ok(AddOutcome::Malformed);
            }
        };

        let mut inner = self.inner.lock();
        if inner.is_known(&key) {
            return Ok(AddOutcome::Known);
        }

        if let Some(similar) = inner.pending.iter().find(|entry| {
            similarity::is_near_duplicate(&normalized, &entry.url, self.similarity_threshold)
        }) {
            return Ok(AddOutcome::TooSimilar {
                pending_url: similar.url.clone(),
            });
        }

        self.store
            .upsert(&key, &FrontierRecord::pending(normalized.clone()))?;
        inner.push_pending(FrontierEntry {
            url: normalized,
            key,
        });
        Ok(AddOutcome::Added)
    }

    /// Uniformly random pending URL, or `None` once nothing is pending.
    pub fn next(&self) -> Option<FrontierEntry> {
        let mut inner = self.inner.lock();
        if inner.pending.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..inner.pending.len());
        let entry = inner.pending.swap_remove(index);
        inner.pending_keys.remove(&entry.key);
        inner.claimed.insert(entry.key);
        Some(entry)
    }

    pub fn mark_complete(&self, url: &str) -> Result<(), StateError> {
        let normalized = url_utils::normalize(url);
        let key = match UrlKey::for_url(&normalized) {
            Ok(key) => key,
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Cannot complete malformed URL");
                return Ok(());
            }
        };

        let mut inner = self.inner.lock();
        if !inner.is_known(&key) && !self.store.contains(&key)? {
            tracing::error!(url = %normalized, key = %key, "Completed URL was never added to the frontier");
        }

        self.store
            .upsert(&key, &FrontierRecord::completed(normalized))?;
        inner.claimed.remove(&key);
        if inner.pending_keys.remove(&key) {
            inner.pending.retain(|entry| entry.key != key);
        }
        inner.completed.insert(key);
        Ok(())
    }

    pub fn is_completed(&self, url: &str) -> bool {
        UrlKey::for_url(url)
            .map(|key| self.inner.lock().completed.contains(&key))
            .unwrap_or(false)
    }

    pub fn stats(&self) -> FrontierStats {
        let inner = self.inner.lock();
        FrontierStats {
            pending: inner.pending.len(),
            claimed: inner.claimed.len(),
            completed: inner.completed.len(),
        }
    }

    pub fn filter(&self) -> &UrlFilter {
        &self.filter
    }
}
