pub mod backoff;
pub mod cli;
pub mod config;
pub mod context;
pub mod crawler;
pub mod fingerprint;
pub mod frontier;
pub mod liveness;
pub mod logging;
pub mod metrics;
pub mod network;
pub mod parser;
pub mod report;
pub mod robots;
pub mod shutdown;
pub mod similarity;
pub mod snapshot;
pub mod state;
pub mod stats;
pub mod stopwords;
pub mod url_utils;
pub mod worker;

// Re-export main types for library usage
pub use config::{Config, CrawlerConfig};
pub use context::CrawlContext;
pub use crawler::{Collaborators, CrawlError, Crawler};
pub use fingerprint::{DedupVerdict, Fingerprint, FingerprintEngine, FingerprintWidth};
pub use frontier::{AddOutcome, Frontier, FrontierEntry};
pub use metrics::CrawlSummary;
pub use network::{Downloader, FetchError, FetchedPage, HttpClient};
pub use parser::{HtmlExtractor, HtmlParser};
pub use robots::{AllowAll, PolicyChecker, RobotsPolicy};
pub use snapshot::Snapshot;
pub use state::FrontierStore;
pub use stats::StatsStore;
