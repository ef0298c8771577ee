use serde::Serialize;
use std::fmt;

use crate::snapshot::{Snapshot, TOP_WORDS_IN_SNAPSHOT};
use crate::stats::{top_n_from, LongestPage};

/// Human-facing crawl results derived from a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlReport {
    pub unique_pages: u64,
    pub longest_page: LongestPage,
    pub top_words: Vec<(String, u64)>,
    /// Alphabetical.
    pub subdomains: Vec<(String, u64)>,
}

impl CrawlReport {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            unique_pages: snapshot.unique_pages,
            longest_page: snapshot.longest_page.clone(),
            top_words: top_n_from(&snapshot.word_count, TOP_WORDS_IN_SNAPSHOT),
            subdomains: snapshot
                .subdomain_counts
                .iter()
                .map(|(name, count)| (name.clone(), *count))
                .collect(),
        }
    }
}

impl fmt::Display for CrawlReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Unique pages: {}", self.unique_pages)?;
        match &self.longest_page.url {
            Some(url) => writeln!(f, "Longest page: {} ({} words)", url, self.longest_page.word_count)?,
            None => writeln!(f, "Longest page: none")?,
        }

        writeln!(f)?;
        writeln!(f, "Top {} words:", self.top_words.len())?;
        for (rank, (word, count)) in self.top_words.iter().enumerate() {
            writeln!(f, "{:>3}. {} - {}", rank + 1, word, count)?;
        }

        writeln!(f)?;
        writeln!(f, "Subdomains ({}):", self.subdomains.len())?;
        for (name, count) in &self.subdomains {
            writeln!(f, "{}, {}", name, count)?;
        }
        Ok(())
    }
}
