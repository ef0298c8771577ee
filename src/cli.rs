use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{Config, ConfigError, CrawlerConfig};

/// Exit codes: 0=success, 2=invalid arguments, 3=I/O or config error, 4=crawl error
#[derive(Parser, Debug)]
#[command(name = "polite-crawler")]
#[command(about = "A polite, crash-recoverable crawler for a fixed set of domains")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl from the seeds, resuming saved progress unless --restart is given.
    Crawl(CrawlArgs),

    /// Print unique pages, longest page, top words and subdomains from the latest snapshot.
    Report {
        #[arg(short, long, default_value = Config::DATA_DIR, help = "Directory containing crawl state")]
        data_dir: PathBuf,

        #[arg(long, help = "Print the report as JSON")]
        json: bool,
    },
}

/// Flags given explicitly override values from `--config`.
#[derive(Args, Debug)]
pub struct CrawlArgs {
    #[arg(short, long, help = "JSON config file")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Discard the saved frontier and snapshot before crawling")]
    pub restart: bool,

    #[arg(short, long, help = "Directory for frontier store, snapshot and logs")]
    pub data_dir: Option<PathBuf>,

    #[arg(short, long = "seed", help = "Seed URL (repeatable)")]
    pub seeds: Vec<String>,

    #[arg(short, long, help = "Worker threads")]
    pub workers: Option<usize>,

    #[arg(long, help = "Delay between a worker's requests in milliseconds")]
    pub delay_ms: Option<u64>,

    #[arg(short, long, help = "User agent string for requests and robots.txt")]
    pub user_agent: Option<String>,

    #[arg(short, long, help = "Request timeout in seconds")]
    pub timeout: Option<u64>,

    #[arg(long, help = "URL probed before each fetch")]
    pub probe_url: Option<String>,

    #[arg(long, help = "Fingerprint width in bits (16 or 64)")]
    pub fingerprint_bits: Option<u32>,
}

impl CrawlArgs {
    /// File config (or defaults) with explicit flags layered on top.
    pub fn resolve(&self) -> Result<CrawlerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => CrawlerConfig::from_json_file(path)?,
            None => CrawlerConfig::default(),
        };

        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if !self.seeds.is_empty() {
            config.seed_urls = self.seeds.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(delay) = self.delay_ms {
            config.politeness_delay_ms = delay;
        }
        if let Some(agent) = &self.user_agent {
            config.user_agent = agent.clone();
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout_secs = timeout;
        }
        if let Some(url) = &self.probe_url {
            config.probe_url = Some(url.clone());
        }
        if let Some(bits) = self.fingerprint_bits {
            config.fingerprint_bits = bits;
        }

        config.validate()?;
        Ok(config)
    }
}

impl Cli {
    /// On error, clap prints help and exits with code 2 (usage error).
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn crawl_args(args: &[&str]) -> CrawlArgs {
        let mut argv = vec!["polite-crawler", "crawl"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Crawl(args) => args,
            _ => panic!("Expected Crawl command"),
        }
    }

    #[test]
    fn test_crawl_defaults() {
        let args = crawl_args(&[]);
        assert!(!args.restart);
        let config = args.resolve().unwrap();
        assert_eq!(config, CrawlerConfig::default());
    }

    #[test]
    fn test_crawl_with_options() {
        let args = crawl_args(&[
            "--restart",
            "--seed",
            "https://www.ics.uci.edu",
            "--seed",
            "https://www.stat.uci.edu",
            "--workers",
            "8",
            "--delay-ms",
            "250",
            "--data-dir",
            "/tmp/crawl",
            "--fingerprint-bits",
            "16",
        ]);
        assert!(args.restart);

        let config = args.resolve().unwrap();
        assert_eq!(config.seed_urls.len(), 2);
        assert_eq!(config.workers, 8);
        assert_eq!(config.politeness_delay_ms, 250);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/crawl"));
        assert_eq!(config.fingerprint_bits, 16);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crawler.json");
        std::fs::write(&path, r#"{"workers": 2, "politeness_delay_ms": 900}"#).unwrap();

        let args = crawl_args(&["--config", path.to_str().unwrap(), "--workers", "6"]);
        let config = args.resolve().unwrap();
        assert_eq!(config.workers, 6);
        assert_eq!(config.politeness_delay_ms, 900);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let args = crawl_args(&["--fingerprint-bits", "32"]);
        assert!(args.resolve().is_err());
    }

    #[test]
    fn test_report_command() {
        let cli = Cli::try_parse_from(["polite-crawler", "report", "--data-dir", "./state", "--json"]).unwrap();
        match cli.command {
            Commands::Report { data_dir, json } => {
                assert_eq!(data_dir, PathBuf::from("./state"));
                assert!(json);
            }
            _ => panic!("Expected Report command"),
        }
    }

    #[test]
    fn test_invalid_command() {
        assert!(Cli::try_parse_from(["polite-crawler", "invalid-command"]).is_err());
    }

    #[test]
    fn test_help_does_not_panic() {
        let err = Cli::try_parse_from(["polite-crawler", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
