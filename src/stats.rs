//! Crawl-wide aggregate counters behind one reentrant lock.

use indexmap::IndexMap;
use parking_lot::ReentrantMutex;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::stopwords::is_stopword;
use crate::url_utils;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongestPage {
    pub url: Option<String>,
    pub word_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsAggregate {
    pub unique_pages: u64,
    pub subdomain_counts: BTreeMap<String, u64>,
    /// Every token seen on a unique page, stopwords included, in first-seen order.
    pub word_count: IndexMap<String, u64>,
    pub longest_page: LongestPage,
}

/// Only mutated through these methods; every one takes the same lock.
#[derive(Debug, Default)]
pub struct StatsStore {
    inner: ReentrantMutex<RefCell<StatsAggregate>>,
}

impl StatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_aggregate(aggregate: StatsAggregate) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(aggregate)),
        }
    }

    /// Returns the count after the increment.
    pub fn increment_unique_pages(&self) -> u64 {
        let guard = self.inner.lock();
        let mut stats = guard.borrow_mut();
        stats.unique_pages += 1;
        stats.unique_pages
    }

    pub fn increment_subdomain(&self, name: &str) {
        let guard = self.inner.lock();
        let mut stats = guard.borrow_mut();
        *stats.subdomain_counts.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn increment_words<S: AsRef<str>>(&self, words: &[S]) {
        let guard = self.inner.lock();
        let mut stats = guard.borrow_mut();
        for word in words {
            let word = word.as_ref();
            if let Some(count) = stats.word_count.get_mut(word) {
                *count += 1;
            } else {
                stats.word_count.insert(word.to_string(), 1);
            }
        }
    }

    /// Replaces the record only on a strictly greater count.
    pub fn set_longest_page_if_greater(&self, url: &str, word_count: u64) -> bool {
        let guard = self.inner.lock();
        let mut stats = guard.borrow_mut();
        if word_count > stats.longest_page.word_count {
            stats.longest_page = LongestPage {
                url: Some(url.to_string()),
                word_count,
            };
            true
        } else {
            false
        }
    }

    /// All per-page updates for one unique page as a single critical section.
    /// Returns the new unique-page count.
    pub fn record_page<S: AsRef<str>>(&self, url: &str, words: &[S], subdomain_root: &str) -> u64 {
        let _guard = self.inner.lock();
        let unique_pages = self.increment_unique_pages();
        if let Some(subdomain) = url_utils::subdomain_under(url, subdomain_root) {
            self.increment_subdomain(&subdomain);
        }
        self.increment_words(words);
        self.set_longest_page_if_greater(url, words.len() as u64);
        unique_pages
    }

    /// Highest counts first; stopwords removed from a copy, ties keep first-seen order.
    pub fn top_n_words(&self, n: usize) -> Vec<(String, u64)> {
        let histogram = {
            let guard = self.inner.lock();
            let stats = guard.borrow();
            stats.word_count.clone()
        };
        top_n_from(&histogram, n)
    }

    pub fn unique_pages(&self) -> u64 {
        self.inner.lock().borrow().unique_pages
    }

    pub fn longest_page(&self) -> LongestPage {
        self.inner.lock().borrow().longest_page.clone()
    }

    pub fn subdomain_counts(&self) -> BTreeMap<String, u64> {
        self.inner.lock().borrow().subdomain_counts.clone()
    }

    pub fn aggregate(&self) -> StatsAggregate {
        self.inner.lock().borrow().clone()
    }

    pub fn restore(&self, aggregate: StatsAggregate) {
        let guard = self.inner.lock();
        *guard.borrow_mut() = aggregate;
    }
}

pub(crate) fn top_n_from(histogram: &IndexMap<String, u64>, n: usize) -> Vec<(String, u64)> {
    let mut words: Vec<(String, u64)> = histogram
        .iter()
        .filter(|(word, _)| !is_stopword(word))
        .map(|(word, count)| (word.clone(), *count))
        .collect();
    // sort_by is stable: equal counts stay in insertion order.
    words.sort_by(|a, b| b.1.cmp(&a.1));
    words.truncate(n);
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn words(text: &str) -> Vec<String> {
        text.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_concurrent_unique_page_increments() {
        let store = Arc::new(StatsStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        store.increment_unique_pages();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.unique_pages(), 8000);
    }

    #[test]
    fn test_words_keep_stopwords_until_report() {
        let store = StatsStore::new();
        store.increment_words(&words("the crawler the frontier the"));
        let aggregate = store.aggregate();
        assert_eq!(aggregate.word_count.get("the"), Some(&3));

        let top = store.top_n_words(10);
        assert_eq!(
            top,
            vec![("crawler".to_string(), 1), ("frontier".to_string(), 1)]
        );
        // The live histogram is untouched by the report.
        assert_eq!(store.aggregate().word_count.get("the"), Some(&3));
    }

    #[test]
    fn test_top_n_ties_break_by_insertion_order() {
        let store = StatsStore::new();
        store.increment_words(&words("zeta alpha mu alpha zeta beta"));
        let top = store.top_n_words(3);
        assert_eq!(
            top,
            vec![
                ("zeta".to_string(), 2),
                ("alpha".to_string(), 2),
                ("mu".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_longest_page_only_grows() {
        let store = StatsStore::new();
        assert!(store.set_longest_page_if_greater("http://x.edu/a", 10));
        assert!(!store.set_longest_page_if_greater("http://x.edu/b", 10));
        assert!(!store.set_longest_page_if_greater("http://x.edu/c", 3));
        assert!(store.set_longest_page_if_greater("http://x.edu/d", 11));
        assert_eq!(
            store.longest_page(),
            LongestPage {
                url: Some("http://x.edu/d".to_string()),
                word_count: 11
            }
        );
    }

    #[test]
    fn test_record_page_updates_everything_once() {
        let store = StatsStore::new();
        let count = store.record_page(
            "https://vision.ics.uci.edu/people",
            &words("vision group people"),
            "ics.uci.edu",
        );
        assert_eq!(count, 1);
        store.record_page("https://stat.uci.edu/", &words("statistics"), "ics.uci.edu");

        let aggregate = store.aggregate();
        assert_eq!(aggregate.unique_pages, 2);
        assert_eq!(aggregate.subdomain_counts.len(), 1);
        assert_eq!(aggregate.subdomain_counts["vision.ics.uci.edu"], 1);
        assert_eq!(aggregate.longest_page.word_count, 3);
        assert_eq!(aggregate.word_count.len(), 4);
    }

    #[test]
    fn test_restore_replaces_aggregate() {
        let store = StatsStore::new();
        store.increment_unique_pages();

        let mut aggregate = StatsAggregate::default();
        aggregate.unique_pages = 49;
        store.restore(aggregate);
        assert_eq!(store.increment_unique_pages(), 50);
    }
}
