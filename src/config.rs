// Global configuration constants - single source of truth

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::fingerprint::FingerprintWidth;

pub struct Config;

impl Config {
    // Crawl pacing
    pub const WORKER_COUNT: usize = 4;
    pub const POLITENESS_DELAY_MS: u64 = 500;
    pub const SHUTDOWN_POLL_MS: u64 = 100;

    // Dedup
    pub const NEAR_DUPLICATE_THRESHOLD: f64 = 0.9;
    pub const URL_SIMILARITY_THRESHOLD: f64 = 0.8;
    pub const FINGERPRINT_BITS: u32 = 64;
    pub const SNAPSHOT_INTERVAL: u64 = 50;

    // Liveness probe
    pub const PROBE_BACKOFF_BASE_MS: u64 = 1_000;
    pub const PROBE_BACKOFF_MAX_MS: u64 = 60_000;
    pub const PROBE_MAX_ATTEMPTS: u32 = 10;

    // HTTP/Network config
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;
    pub const MAX_CONTENT_SIZE: usize = 10 * 1024 * 1024; // 10MB
    pub const MAX_REDIRECTS: usize = 5;
    pub const POOL_IDLE_PER_HOST: usize = 16;
    pub const POOL_IDLE_TIMEOUT_SECS: u64 = 30;

    pub const USER_AGENT: &'static str = "polite-crawler/0.1";
    pub const SUBDOMAIN_ROOT: &'static str = "ics.uci.edu";
    pub const DATA_DIR: &'static str = "data";
    pub const SNAPSHOT_FILE: &'static str = "snapshot.json";
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Runtime settings. Every field has a default so a JSON file may set only a few.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub seed_urls: Vec<String>,
    pub allowed_domains: Vec<String>,
    /// Host whose subdomains are counted in the report.
    pub subdomain_root: String,
    pub workers: usize,
    pub politeness_delay_ms: u64,
    pub near_duplicate_threshold: f64,
    pub url_similarity_threshold: f64,
    pub fingerprint_bits: u32,
    pub snapshot_interval: u64,
    /// Liveness probe target; `None` skips probing.
    pub probe_url: Option<String>,
    pub probe_backoff_base_ms: u64,
    pub probe_backoff_max_ms: u64,
    pub probe_max_attempts: u32,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub data_dir: PathBuf,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            seed_urls: vec![
                "https://www.ics.uci.edu".to_string(),
                "https://www.cs.uci.edu".to_string(),
                "https://www.informatics.uci.edu".to_string(),
                "https://www.stat.uci.edu".to_string(),
            ],
            allowed_domains: vec![
                "ics.uci.edu".to_string(),
                "cs.uci.edu".to_string(),
                "informatics.uci.edu".to_string(),
                "stat.uci.edu".to_string(),
            ],
            subdomain_root: Config::SUBDOMAIN_ROOT.to_string(),
            workers: Config::WORKER_COUNT,
            politeness_delay_ms: Config::POLITENESS_DELAY_MS,
            near_duplicate_threshold: Config::NEAR_DUPLICATE_THRESHOLD,
            url_similarity_threshold: Config::URL_SIMILARITY_THRESHOLD,
            fingerprint_bits: Config::FINGERPRINT_BITS,
            snapshot_interval: Config::SNAPSHOT_INTERVAL,
            probe_url: None,
            probe_backoff_base_ms: Config::PROBE_BACKOFF_BASE_MS,
            probe_backoff_max_ms: Config::PROBE_BACKOFF_MAX_MS,
            probe_max_attempts: Config::PROBE_MAX_ATTEMPTS,
            user_agent: Config::USER_AGENT.to_string(),
            request_timeout_secs: Config::REQUEST_TIMEOUT_SECS,
            data_dir: PathBuf::from(Config::DATA_DIR),
        }
    }
}

impl CrawlerConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seed_urls.is_empty() {
            return Err(ConfigError::Invalid("at least one seed URL is required".into()));
        }
        if self.allowed_domains.is_empty() {
            return Err(ConfigError::Invalid("at least one allowed domain is required".into()));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        for (name, value) in [
            ("near_duplicate_threshold", self.near_duplicate_threshold),
            ("url_similarity_threshold", self.url_similarity_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        self.fingerprint_width()?;
        if self.probe_max_attempts == 0 {
            return Err(ConfigError::Invalid("probe_max_attempts must be at least 1".into()));
        }
        if self.probe_backoff_base_ms > self.probe_backoff_max_ms {
            return Err(ConfigError::Invalid(
                "probe_backoff_base_ms exceeds probe_backoff_max_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn fingerprint_width(&self) -> Result<FingerprintWidth, ConfigError> {
        FingerprintWidth::try_from(self.fingerprint_bits)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay_ms)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(Config::SNAPSHOT_FILE)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}
