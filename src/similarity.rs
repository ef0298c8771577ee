//! Edit-distance URL similarity used to suppress crawler traps and near-identical sibling links.

use url::Url;

/// Default score at or above which two URLs count as near-duplicates.
pub const DEFAULT_URL_SIMILARITY_THRESHOLD: f64 = 0.8;

/// `1 - levenshtein / max_len`, or 1.0 when both sides are empty.
fn component_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - strsim::levenshtein(a, b) as f64 / max_len as f64
}

/// Score two URLs in `[0, 1]`.
///
/// Different hosts (or an unparseable side) score 0. Otherwise the path and
/// query similarities are averaged.
pub fn similarity(url_a: &str, url_b: &str) -> f64 {
    let (a, b) = match (Url::parse(url_a), Url::parse(url_b)) {
        (Ok(a), Ok(b)) => (a, b),
        _ => return 0.0,
    };

    if a.host_str() != b.host_str() || a.port() != b.port() {
        return 0.0;
    }

    let path_score = component_similarity(a.path(), b.path());
    let query_score = component_similarity(a.query().unwrap_or(""), b.query().unwrap_or(""));

    (path_score + query_score) / 2.0
}

/// Inclusive: a score equal to the threshold is too similar.
pub fn is_near_duplicate(url_a: &str, url_b: &str, threshold: f64) -> bool {
    similarity(url_a, url_b) >= threshold
}
