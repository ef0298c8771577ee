use polite_crawler::cli::{Cli, Commands, CrawlArgs};
use polite_crawler::config::Config;
use polite_crawler::crawler::{Collaborators, CrawlError, Crawler};
use polite_crawler::logging;
use polite_crawler::report::CrawlReport;
use polite_crawler::shutdown;
use polite_crawler::snapshot::{Snapshot, SnapshotError};
use std::path::Path;
use std::process::ExitCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MainError {
    #[error("{0}")]
    Config(#[from] polite_crawler::config::ConfigError),

    #[error("Crawler error: {0}")]
    Crawl(#[from] CrawlError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No snapshot found in {0}")]
    NoSnapshot(String),

    #[error("Logging error: {0}")]
    Logging(String),
}

impl MainError {
    fn exit_code(&self) -> u8 {
        match self {
            MainError::Crawl(_) => 4,
            _ => 3,
        }
    }
}

fn run_crawl(args: CrawlArgs) -> Result<(), MainError> {
    let config = args.resolve()?;
    let _log_guards = logging::init_logging(config.log_dir()).map_err(|e| MainError::Logging(e.to_string()))?;

    let collaborators = Collaborators::http(&config)?;
    let crawler = Crawler::new(config, collaborators, args.restart)?;
    shutdown::install_ctrl_c_handler(crawler.shutdown())?;

    let summary = crawler.run()?;
    println!("{}", summary);
    Ok(())
}

fn run_report(data_dir: &Path, json: bool) -> Result<(), MainError> {
    let path = data_dir.join(Config::SNAPSHOT_FILE);
    let snapshot =
        Snapshot::load(&path)?.ok_or_else(|| MainError::NoSnapshot(data_dir.display().to_string()))?;
    let report = CrawlReport::from_snapshot(&snapshot);

    if json {
        let rendered = serde_json::to_string_pretty(&report).map_err(SnapshotError::from)?;
        println!("{}", rendered);
    } else {
        print!("{}", report);
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    let result = match cli.command {
        Commands::Crawl(args) => run_crawl(args),
        Commands::Report { data_dir, json } => run_report(&data_dir, json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
