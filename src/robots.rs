use dashmap::DashMap;
use robotstxt::DefaultMatcher;
use std::sync::Arc;
use url::Url;

use crate::network::Downloader;
use crate::url_utils::UrlFilter;

/// Decides whether a URL may be fetched at all.
pub trait PolicyChecker: Send + Sync {
    fn allowed(&self, url: &str) -> bool;
}

/// Allows everything; for tests and for crawls that skip robots.txt.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl PolicyChecker for AllowAll {
    fn allowed(&self, _url: &str) -> bool {
        true
    }
}

/// Cached robots.txt body for one origin. `None` means no usable file: allow everything.
type RobotsBody = Option<Arc<String>>;

/// robots.txt evaluation plus the allowed-domain check.
///
/// Each origin's robots.txt is fetched once through the shared downloader and
/// cached for the rest of the crawl.
pub struct RobotsPolicy {
    downloader: Arc<dyn Downloader>,
    filter: UrlFilter,
    user_agent: String,
    cache: DashMap<String, RobotsBody>,
}

impl RobotsPolicy {
    pub fn new(downloader: Arc<dyn Downloader>, filter: UrlFilter, user_agent: impl Into<String>) -> Self {
        Self {
            downloader,
            filter,
            user_agent: user_agent.into(),
            cache: DashMap::new(),
        }
    }

    fn origin(url: &Url) -> Option<String> {
        let host = url.host_str()?;
        Some(match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        })
    }

    fn robots_for(&self, origin: &str) -> RobotsBody {
        if let Some(cached) = self.cache.get(origin) {
            return cached.value().clone();
        }

        let robots_url = format!("{}/robots.txt", origin);
        let body = match self.downloader.fetch(&robots_url) {
            Ok(page) if page.is_success() => Some(Arc::new(page.content)),
            Ok(page) => {
                tracing::debug!(url = %robots_url, status = page.status, "No robots.txt, allowing all");
                None
            }
            Err(e) => {
                tracing::debug!(url = %robots_url, error = %e, "robots.txt fetch failed, allowing all");
                None
            }
        };

        // Two workers may race to fetch the same file; the first insert wins.
        self.cache
            .entry(origin.to_string())
            .or_insert(body)
            .value()
            .clone()
    }

    pub fn cached_origins(&self) -> usize {
        self.cache.len()
    }
}

impl PolicyChecker for RobotsPolicy {
    fn allowed(&self, url: &str) -> bool {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(_) => return false,
        };
        match parsed.host_str() {
            Some(host) if self.filter.is_allowed_host(host) => {}
            _ => return false,
        }
        let origin = match Self::origin(&parsed) {
            Some(origin) => origin,
            None => return false,
        };

        match self.robots_for(&origin) {
            Some(body) => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(&body, &self.user_agent, url)
            }
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{FetchError, FetchedPage};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MapDownloader {
        pages: HashMap<String, String>,
        requests: AtomicUsize,
    }

    impl Downloader for MapDownloader {
        fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            match self.pages.get(url) {
                Some(body) => Ok(FetchedPage {
                    url: url.to_string(),
                    status: 200,
                    content: body.clone(),
                    content_type: Some("text/plain".into()),
                }),
                None => Ok(FetchedPage {
                    url: url.to_string(),
                    status: 404,
                    content: String::new(),
                    content_type: None,
                }),
            }
        }
    }

    fn policy(robots: &[(&str, &str)]) -> (RobotsPolicy, Arc<MapDownloader>) {
        let downloader = Arc::new(MapDownloader {
            pages: robots
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            requests: AtomicUsize::new(0),
        });
        let filter = UrlFilter::new(vec!["ics.uci.edu".to_string()]);
        let policy = RobotsPolicy::new(downloader.clone(), filter, "polite-crawler");
        (policy, downloader)
    }

    #[test]
    fn test_disallow_rules_apply() {
        let (policy, _) = policy(&[(
            "https://www.ics.uci.edu/robots.txt",
            "User-agent: *\nDisallow: /private/\n",
        )]);
        assert!(!policy.allowed("https://www.ics.uci.edu/private/grades"));
        assert!(policy.allowed("https://www.ics.uci.edu/about"));
    }

    #[test]
    fn test_missing_robots_allows_and_is_cached() {
        let (policy, downloader) = policy(&[]);
        assert!(policy.allowed("https://vision.ics.uci.edu/a"));
        assert!(policy.allowed("https://vision.ics.uci.edu/b"));
        assert_eq!(downloader.requests.load(Ordering::SeqCst), 1);
        assert_eq!(policy.cached_origins(), 1);
    }

    #[test]
    fn test_foreign_host_denied_without_fetch() {
        let (policy, downloader) = policy(&[]);
        assert!(!policy.allowed("https://www.example.com/"));
        assert!(!policy.allowed("not a url"));
        assert_eq!(downloader.requests.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_agent_specific_group() {
        let (policy, _) = policy(&[(
            "https://www.ics.uci.edu/robots.txt",
            "User-agent: polite-crawler\nDisallow: /\n\nUser-agent: *\nAllow: /\n",
        )]);
        assert!(!policy.allowed("https://www.ics.uci.edu/anything"));
    }
}
