//! SimHash-style page fingerprints and the shared near-duplicate store.
//!
//! A page's tokens become a word histogram (stopwords excluded). Every distinct
//! word contributes `+count` to each bit position its cached hash has set and
//! `-count` to the others; positive sums become 1-bits. Fingerprints are only
//! ever compared by Hamming similarity, never by equality.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use xxhash_rust::xxh3::xxh3_64;

use crate::stopwords::is_stopword;

/// Default Hamming similarity at or above which a page is a near-duplicate.
pub const DEFAULT_NEAR_DUPLICATE_THRESHOLD: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum FingerprintWidth {
    Bits16,
    Bits64,
}

impl FingerprintWidth {
    pub const fn bits(self) -> u32 {
        match self {
            FingerprintWidth::Bits16 => 16,
            FingerprintWidth::Bits64 => 64,
        }
    }

    pub const fn mask(self) -> u64 {
        match self {
            FingerprintWidth::Bits16 => 0xFFFF,
            FingerprintWidth::Bits64 => u64::MAX,
        }
    }
}

impl Default for FingerprintWidth {
    fn default() -> Self {
        FingerprintWidth::Bits64
    }
}

impl TryFrom<u32> for FingerprintWidth {
    type Error = FingerprintError;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        match bits {
            16 => Ok(FingerprintWidth::Bits16),
            64 => Ok(FingerprintWidth::Bits64),
            other => Err(FingerprintError::UnsupportedWidth(other)),
        }
    }
}

impl From<FingerprintWidth> for u32 {
    fn from(width: FingerprintWidth) -> Self {
        width.bits()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    #[error("Unsupported fingerprint width {0} (expected 16 or 64)")]
    UnsupportedWidth(u32),

    #[error("Invalid fingerprint bitstring: {0:?}")]
    InvalidBitstring(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    bits: u64,
    width: FingerprintWidth,
}

impl Fingerprint {
    pub fn new(bits: u64, width: FingerprintWidth) -> Self {
        Self {
            bits: bits & width.mask(),
            width,
        }
    }

    pub fn bits(&self) -> u64 {
        self.bits
    }

    pub fn width(&self) -> FingerprintWidth {
        self.width
    }

    /// Fraction of matching bit positions. Fingerprints of different widths never match.
    pub fn similarity(&self, other: &Fingerprint) -> f64 {
        if self.width != other.width {
            return 0.0;
        }
        let width = self.width.bits();
        let differing = ((self.bits ^ other.bits) & self.width.mask()).count_ones();
        (width - differing) as f64 / width as f64
    }

    /// Most significant bit first, exactly `width` characters of '0'/'1'.
    pub fn to_bitstring(&self) -> String {
        let width = self.width.bits();
        (0..width)
            .rev()
            .map(|i| if (self.bits >> i) & 1 == 1 { '1' } else { '0' })
            .collect()
    }

    pub fn from_bitstring(s: &str) -> Result<Self, FingerprintError> {
        let width = u32::try_from(s.len())
            .ok()
            .and_then(|len| FingerprintWidth::try_from(len).ok())
            .ok_or_else(|| FingerprintError::InvalidBitstring(s.to_string()))?;

        let mut bits = 0u64;
        for c in s.chars() {
            bits <<= 1;
            match c {
                '1' => bits |= 1,
                '0' => {}
                _ => return Err(FingerprintError::InvalidBitstring(s.to_string())),
            }
        }
        Ok(Self::new(bits, width))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_bitstring())
    }
}

/// Process-wide word -> k-bit hash table. Insert-on-miss is atomic per word.
#[derive(Debug, Default)]
pub struct WordHashCache {
    hashes: DashMap<String, u64>,
}

impl WordHashCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash_for(&self, word: &str, width: FingerprintWidth) -> u64 {
        if let Some(hash) = self.hashes.get(word) {
            return *hash & width.mask();
        }
        let hash = *self
            .hashes
            .entry(word.to_string())
            .or_insert_with(|| xxh3_64(word.as_bytes()) & width.mask());
        hash & width.mask()
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Copy for snapshots, sorted by word so snapshot files diff cleanly.
    pub fn entries(&self) -> Vec<(String, u64)> {
        let mut entries: Vec<(String, u64)> = self
            .hashes
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Restored hashes win over fresh ones so words keep their original signature.
    pub fn restore<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, u64)>,
    {
        for (word, hash) in entries {
            self.hashes.insert(word, hash);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredFingerprint {
    /// Owning URL; unknown for snapshots written without owners.
    pub url: Option<String>,
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DedupVerdict {
    /// Stored; the caller should process the page.
    Novel(Fingerprint),
    /// Matches this URL's own fingerprint from an earlier run. Its stats are already
    /// counted, but the page was never completed.
    AlreadyRecorded(Fingerprint),
    NearDuplicate {
        similarity: f64,
        matched_url: Option<String>,
    },
}

impl DedupVerdict {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, DedupVerdict::NearDuplicate { .. })
    }
}

/// Single shared owner of the fingerprint list and word hash cache.
pub struct FingerprintEngine {
    width: FingerprintWidth,
    threshold: f64,
    word_hashes: WordHashCache,
    store: Mutex<Vec<StoredFingerprint>>,
}

impl FingerprintEngine {
    pub fn new(width: FingerprintWidth, threshold: f64) -> Self {
        Self {
            width,
            threshold,
            word_hashes: WordHashCache::new(),
            store: Mutex::new(Vec::new()),
        }
    }

    pub fn width(&self) -> FingerprintWidth {
        self.width
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn word_hashes(&self) -> &WordHashCache {
        &self.word_hashes
    }

    pub fn fingerprint<S: AsRef<str>>(&self, tokens: &[S]) -> Fingerprint {
        let mut histogram: HashMap<&str, i64> = HashMap::new();
        for token in tokens {
            let word = token.as_ref();
            if word.is_empty() || is_stopword(word) {
                continue;
            }
            *histogram.entry(word).or_insert(0) += 1;
        }

        let width = self.width.bits();
        let hashes: Vec<(u64, i64)> = histogram
            .into_iter()
            .map(|(word, count)| (self.word_hashes.hash_for(word, self.width), count))
            .collect();

        let mut bits = 0u64;
        for i in (0..width).rev() {
            let weighted_sum: i64 = hashes
                .iter()
                .map(|(hash, count)| if (hash >> i) & 1 == 1 { *count } else { -*count })
                .sum();
            if weighted_sum > 0 {
                bits |= 1 << i;
            }
        }

        Fingerprint::new(bits, self.width)
    }

    /// Compare against every stored fingerprint and store the new one only when
    /// nothing reaches the threshold. The whole check-then-insert holds one lock.
    ///
    /// A match against a fingerprint owned by `url` itself wins over matches
    /// against other pages.
    pub fn check_and_register<S: AsRef<str>>(&self, url: &str, tokens: &[S]) -> DedupVerdict {
        let fingerprint = self.fingerprint(tokens);

        let mut store = self.store.lock();
        let mut first_match = None;
        for stored in store.iter() {
            let similarity = fingerprint.similarity(&stored.fingerprint);
            if similarity < self.threshold {
                continue;
            }
            if stored.url.as_deref() == Some(url) {
                return DedupVerdict::AlreadyRecorded(stored.fingerprint);
            }
            if first_match.is_none() {
                first_match = Some(DedupVerdict::NearDuplicate {
                    similarity,
                    matched_url: stored.url.clone(),
                });
            }
        }
        if let Some(verdict) = first_match {
            return verdict;
        }

        store.push(StoredFingerprint {
            url: Some(url.to_string()),
            fingerprint,
        });
        DedupVerdict::Novel(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }

    /// Stored fingerprints in registration order.
    pub fn fingerprints(&self) -> Vec<Fingerprint> {
        self.store.lock().iter().map(|s| s.fingerprint).collect()
    }

    /// Fingerprints with their owning URLs, in registration order.
    pub fn stored(&self) -> Vec<StoredFingerprint> {
        self.store.lock().clone()
    }

    /// Returns how many fingerprints were accepted; other widths are skipped.
    pub fn restore<I>(&self, fingerprints: I) -> usize
    where
        I: IntoIterator<Item = StoredFingerprint>,
    {
        let mut store = self.store.lock();
        let before = store.len();
        store.extend(
            fingerprints
                .into_iter()
                .filter(|stored| stored.fingerprint.width() == self.width),
        );
        store.len() - before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn tokens(text: &str) -> Vec<String> {
        text.split_whitespace().map(|s| s.to_lowercase()).collect()
    }

    #[test]
    fn test_width_conversion() {
        assert_eq!(FingerprintWidth::try_from(16).unwrap(), FingerprintWidth::Bits16);
        assert_eq!(FingerprintWidth::try_from(64).unwrap(), FingerprintWidth::Bits64);
        assert!(FingerprintWidth::try_from(32).is_err());
        assert_eq!(u32::from(FingerprintWidth::Bits16), 16);
    }

    #[test]
    fn test_bitstring_parsing() {
        let fp = Fingerprint::new(0b1010_0000_0000_0001, FingerprintWidth::Bits16);
        assert_eq!(fp.to_bitstring(), "1010000000000001");
        assert_eq!(Fingerprint::from_bitstring("1010000000000001").unwrap(), fp);
        assert!(Fingerprint::from_bitstring("10102").is_err());
        assert!(Fingerprint::from_bitstring("101000000000000x").is_err());
        assert_eq!(Fingerprint::new(u64::MAX, FingerprintWidth::Bits64).to_bitstring().len(), 64);
    }

    #[test]
    fn test_hamming_similarity() {
        let a = Fingerprint::new(0xFFFF, FingerprintWidth::Bits16);
        let b = Fingerprint::new(0xFF00, FingerprintWidth::Bits16);
        assert_eq!(a.similarity(&a), 1.0);
        assert_eq!(a.similarity(&b), 0.5);
        assert_eq!(a.similarity(&Fingerprint::new(0, FingerprintWidth::Bits16)), 0.0);

        let wide = Fingerprint::new(0xFFFF, FingerprintWidth::Bits64);
        assert_eq!(a.similarity(&wide), 0.0);
    }

    #[test]
    fn test_single_word_fingerprint_is_its_hash() {
        let engine = FingerprintEngine::new(FingerprintWidth::Bits64, 0.9);
        let fp = engine.fingerprint(&["crawler"]);
        assert_eq!(fp.bits(), xxh3_64(b"crawler"));
    }

    #[test]
    fn test_stopwords_do_not_contribute() {
        let engine = FingerprintEngine::new(FingerprintWidth::Bits64, 0.9);
        let with = engine.fingerprint(&tokens("the crawler and the frontier"));
        let without = engine.fingerprint(&tokens("crawler frontier"));
        assert_eq!(with, without);
        assert_eq!(engine.fingerprint(&tokens("the and of")).bits(), 0);
    }

    #[test]
    fn test_identical_tokens_are_near_duplicates() {
        let engine = FingerprintEngine::new(FingerprintWidth::Bits64, 0.9);
        let page = tokens("informatics research seminar schedule spring quarter seminar");

        let first = engine.check_and_register("http://x.edu/a", &page);
        assert!(matches!(first, DedupVerdict::Novel(_)));

        let second = engine.check_and_register("http://x.edu/b", &page);
        assert_eq!(
            second,
            DedupVerdict::NearDuplicate {
                similarity: 1.0,
                matched_url: Some("http://x.edu/a".to_string()),
            }
        );
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_disjoint_vocabularies_are_not_duplicates() {
        let engine = FingerprintEngine::new(FingerprintWidth::Bits64, 0.9);
        // Equal total weight, no shared words.
        let left: Vec<String> = (0..200).map(|i| format!("left{}", i)).collect();
        let right: Vec<String> = (0..200).map(|i| format!("right{}", i)).collect();

        let a = engine.fingerprint(&left);
        let b = engine.fingerprint(&right);
        let similarity = a.similarity(&b);
        assert!(similarity > 0.3 && similarity < 0.7, "similarity {}", similarity);

        assert!(!engine.check_and_register("http://x.edu/l", &left).is_duplicate());
        assert!(!engine.check_and_register("http://x.edu/r", &right).is_duplicate());
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn test_word_hash_cache_is_stable() {
        let cache = WordHashCache::new();
        let first = cache.hash_for("seminar", FingerprintWidth::Bits16);
        let second = cache.hash_for("seminar", FingerprintWidth::Bits16);
        assert_eq!(first, second);
        assert!(first <= 0xFFFF);
        assert_eq!(cache.len(), 1);

        cache.restore(vec![("restored".to_string(), 7)]);
        assert_eq!(cache.hash_for("restored", FingerprintWidth::Bits16), 7);
        assert_eq!(cache.entries()[0].0, "restored");
    }

    #[test]
    fn test_word_hash_cache_concurrent_misses_agree() {
        let cache = Arc::new(WordHashCache::new());
        let words: Vec<String> = (0..64).map(|i| format!("fresh{}", i)).collect();
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let words = words.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    words
                        .iter()
                        .map(|word| cache.hash_for(word, FingerprintWidth::Bits64))
                        .collect::<Vec<u64>>()
                })
            })
            .collect();

        let seen: Vec<Vec<u64>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(seen.iter().all(|hashes| hashes == &seen[0]));
        assert_eq!(cache.len(), words.len());
    }

    #[test]
    fn test_restore_skips_foreign_widths() {
        let engine = FingerprintEngine::new(FingerprintWidth::Bits16, 0.9);
        let accepted = engine.restore(vec![
            StoredFingerprint {
                url: None,
                fingerprint: Fingerprint::new(0xAAAA, FingerprintWidth::Bits16),
            },
            StoredFingerprint {
                url: None,
                fingerprint: Fingerprint::new(0xAAAA, FingerprintWidth::Bits64),
            },
        ]);
        assert_eq!(accepted, 1);
        assert_eq!(engine.fingerprints(), vec![Fingerprint::new(0xAAAA, FingerprintWidth::Bits16)]);
    }

    #[test]
    fn test_own_restored_fingerprint_is_already_recorded() {
        let page = tokens("undergraduate advising office hours and walk in appointments");
        let earlier = FingerprintEngine::new(FingerprintWidth::Bits64, 0.9);
        let other = earlier.check_and_register("http://x.edu/advising-old", &page);
        assert!(matches!(other, DedupVerdict::Novel(_)));
        let fp = earlier.fingerprint(&page);

        let engine = FingerprintEngine::new(FingerprintWidth::Bits64, 0.9);
        engine.restore(vec![
            StoredFingerprint {
                url: Some("http://x.edu/advising-old".to_string()),
                fingerprint: fp,
            },
            StoredFingerprint {
                url: Some("http://x.edu/advising".to_string()),
                fingerprint: fp,
            },
        ]);

        // The own-URL entry wins even though another owner matches first.
        assert_eq!(
            engine.check_and_register("http://x.edu/advising", &page),
            DedupVerdict::AlreadyRecorded(fp)
        );
        assert_eq!(
            engine.check_and_register("http://x.edu/advising-copy", &page),
            DedupVerdict::NearDuplicate {
                similarity: 1.0,
                matched_url: Some("http://x.edu/advising-old".to_string()),
            }
        );
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn test_concurrent_registration_stores_one_copy() {
        let engine = Arc::new(FingerprintEngine::new(FingerprintWidth::Bits64, 0.9));
        let page = tokens("same page content registered from many workers at once");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = Arc::clone(&engine);
                let page = page.clone();
                thread::spawn(move || {
                    engine
                        .check_and_register(&format!("http://x.edu/{}", i), &page)
                        .is_duplicate()
                })
            })
            .collect();

        let novel = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|duplicate| !duplicate)
            .count();
        assert_eq!(novel, 1);
        assert_eq!(engine.len(), 1);
    }
}
