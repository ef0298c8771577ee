//! URL normalization, frontier keys and validity rules shared by the frontier and the workers.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum UrlError {
    #[error("Unparseable URL {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("URL has no host: {0}")]
    MissingHost(String),
}

/// Strip the fragment, then every trailing slash.
///
/// Defragmenting first keeps the operation idempotent: `http://a.edu/x/#top`
/// becomes `http://a.edu/x`, not `http://a.edu/x/`.
pub fn normalize(url: &str) -> String {
    let trimmed = url.trim();
    let without_fragment = match trimmed.find('#') {
        Some(pos) => &trimmed[..pos],
        None => trimmed,
    };
    without_fragment.trim_end_matches('/').to_string()
}

/// 256-bit digest of a URL's scheme-independent components.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UrlKey([u8; 32]);

impl UrlKey {
    /// Key for `url` after normalization. `http` and `https` variants hash identically.
    pub fn for_url(url: &str) -> Result<Self, UrlError> {
        let normalized = normalize(url);
        let parsed = parse(&normalized)?;
        let host = parsed
            .host_str()
            .ok_or_else(|| UrlError::MissingHost(normalized.clone()))?;

        let netloc = match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        // Url::parse reports "/" for a bare host; drop it so "a.edu" and "a.edu/" agree.
        let path = parsed.path().trim_end_matches('/');
        let query = parsed.query().unwrap_or("");
        let fragment = parsed.fragment().unwrap_or("");

        let digest = Sha256::digest(format!("{}/{}/{}/{}", netloc, path, query, fragment).as_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for UrlKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for UrlKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UrlKey({})", &self.to_hex()[..12])
    }
}

pub fn parse(url: &str) -> Result<Url, UrlError> {
    Url::parse(url).map_err(|source| UrlError::Parse {
        url: url.to_string(),
        source,
    })
}

pub fn extract_host(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|s| s.to_string()))
}

/// True when `host` is `domain` itself or any subdomain of it.
pub fn is_within_domain(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.');
    host.eq_ignore_ascii_case(domain)
        || host
            .to_ascii_lowercase()
            .ends_with(&format!(".{}", domain.to_ascii_lowercase()))
}

const EXCLUDED_EXTENSIONS: &str = concat!(
    r".*\.(css|js|bmp|gif|jpe?g|ico",
    r"|png|tiff?|mid|mp2|mp3|mp4",
    r"|wav|avi|mov|mpeg|ram|m4v|mkv|ogg|ogv|pdf",
    r"|ps|eps|tex|ppt|pptx|doc|docx|xls|xlsx|names",
    r"|data|dat|exe|bz2|tar|msi|bin|7z|psd|dmg|iso",
    r"|epub|dll|cnf|tgz|sha1",
    r"|thmx|mso|arff|rtf|jar|csv",
    r"|rm|smil|wmv|swf|wma|zip|rar|gz)$",
);

/// Session validity rules: scheme, allowed domains, and non-HTML asset suffixes.
#[derive(Debug, Clone)]
pub struct UrlFilter {
    allowed_domains: Vec<String>,
    excluded: Regex,
}

impl UrlFilter {
    pub fn new(allowed_domains: Vec<String>) -> Self {
        Self {
            allowed_domains: allowed_domains
                .into_iter()
                .map(|d| d.trim().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            excluded: Regex::new(EXCLUDED_EXTENSIONS).expect("static extension pattern"),
        }
    }

    pub fn allowed_domains(&self) -> &[String] {
        &self.allowed_domains
    }

    pub fn is_allowed_host(&self, host: &str) -> bool {
        self.allowed_domains
            .iter()
            .any(|domain| is_within_domain(host, domain))
    }

    /// Malformed URLs, foreign hosts and asset links are all simply invalid.
    pub fn is_valid(&self, url: &str) -> bool {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(_) => return false,
        };

        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }

        match parsed.host_str() {
            Some(host) if self.is_allowed_host(host) => {}
            _ => return false,
        }

        !self.excluded.is_match(&parsed.path().to_ascii_lowercase())
    }
}

/// The subdomain under `root` that `url` belongs to, e.g. `vision.ics.uci.edu`.
pub fn subdomain_under(url: &str, root: &str) -> Option<String> {
    let host = extract_host(url)?;
    if is_within_domain(&host, root) {
        Some(host.trim_start_matches("www.").to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> UrlFilter {
        UrlFilter::new(vec!["ics.uci.edu".to_string(), "stat.uci.edu".to_string()])
    }

    #[test]
    fn test_normalize_strips_slash_and_fragment() {
        assert_eq!(normalize("http://x.edu/"), "http://x.edu");
        assert_eq!(normalize("http://x.edu/a/#top"), "http://x.edu/a");
        assert_eq!(normalize("http://x.edu/a#b/"), "http://x.edu/a");
        assert_eq!(normalize("http://x.edu/a?q=1"), "http://x.edu/a?q=1");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for url in [
            "http://x.edu/",
            "http://x.edu//",
            "http://x.edu/a/#frag/",
            "https://x.edu/a/b?c=d#e",
            "  http://x.edu/a/  ",
            "",
        ] {
            let once = normalize(url);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", url);
        }
    }

    #[test]
    fn test_url_key_ignores_scheme_and_trailing_slash() {
        let a = UrlKey::for_url("http://x.edu/").unwrap();
        let b = UrlKey::for_url("http://x.edu").unwrap();
        let c = UrlKey::for_url("https://x.edu").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);

        let d = UrlKey::for_url("http://x.edu/a/").unwrap();
        let e = UrlKey::for_url("http://x.edu/a").unwrap();
        assert_eq!(d, e);
    }

    #[test]
    fn test_url_key_is_deterministic() {
        let first = UrlKey::for_url("http://x.edu/a?id=1").unwrap();
        let second = UrlKey::for_url("http://x.edu/a?id=1").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_hex().len(), 64);
        // Known digest of "x.edu//a/id=1/" pins the key across process restarts.
        let expected = Sha256::digest(b"x.edu//a/id=1/");
        assert_eq!(first.0.as_slice(), expected.as_slice());
    }

    #[test]
    fn test_url_key_distinguishes_query_and_port() {
        let a = UrlKey::for_url("http://x.edu/a?id=1").unwrap();
        let b = UrlKey::for_url("http://x.edu/a?id=2").unwrap();
        let c = UrlKey::for_url("http://x.edu:8080/a?id=1").unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_url_key_rejects_garbage() {
        assert!(UrlKey::for_url("not a url").is_err());
        assert!(UrlKey::for_url("mailto:someone@x.edu").is_err());
    }

    #[test]
    fn test_is_within_domain() {
        assert!(is_within_domain("ics.uci.edu", "ics.uci.edu"));
        assert!(is_within_domain("www.ics.uci.edu", "ics.uci.edu"));
        assert!(is_within_domain("Vision.ICS.uci.edu", "ics.uci.edu"));
        assert!(!is_within_domain("physics.uci.edu", "ics.uci.edu"));
        assert!(!is_within_domain("uci.edu", "ics.uci.edu"));
    }

    #[test]
    fn test_filter_validity() {
        let filter = filter();
        assert!(filter.is_valid("https://www.ics.uci.edu/about"));
        assert!(filter.is_valid("http://stat.uci.edu/"));
        assert!(!filter.is_valid("ftp://ics.uci.edu/file"));
        assert!(!filter.is_valid("https://example.com/page"));
        assert!(!filter.is_valid("https://ics.uci.edu/paper.PDF"));
        assert!(!filter.is_valid("https://ics.uci.edu/style.css"));
        assert!(!filter.is_valid("not a url"));
    }

    #[test]
    fn test_subdomain_under() {
        assert_eq!(
            subdomain_under("https://vision.ics.uci.edu/people", "ics.uci.edu"),
            Some("vision.ics.uci.edu".to_string())
        );
        assert_eq!(
            subdomain_under("https://www.ics.uci.edu/", "ics.uci.edu"),
            Some("ics.uci.edu".to_string())
        );
        assert_eq!(subdomain_under("https://stat.uci.edu/", "ics.uci.edu"), None);
    }
}
