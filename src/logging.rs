//! Multi-layer tracing setup: rolling text and JSON files plus compact stdout.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const TEXT_LOG_FILE: &str = "crawler.log";
pub const JSON_LOG_FILE: &str = "crawler.json.log";

/// Keeps the non-blocking writers alive; dropping it flushes buffered lines.
#[must_use = "logs stop being written once the guards are dropped"]
pub struct LogGuards {
    _text: WorkerGuard,
    _json: WorkerGuard,
}

/// Install the global subscriber writing daily-rotated logs under `log_dir`.
///
/// `RUST_LOG` controls filtering and defaults to `info`, e.g.
/// `RUST_LOG=polite_crawler=debug,reqwest=warn`.
pub fn init_logging<P: AsRef<Path>>(log_dir: P) -> Result<LogGuards, Box<dyn std::error::Error>> {
    let log_path = log_dir.as_ref();
    std::fs::create_dir_all(log_path)?;

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let text_file_appender = tracing_appender::rolling::daily(log_path, TEXT_LOG_FILE);
    let (text_writer, text_guard) = tracing_appender::non_blocking(text_file_appender);

    let json_file_appender = tracing_appender::rolling::daily(log_path, JSON_LOG_FILE);
    let (json_writer, json_guard) = tracing_appender::non_blocking(json_file_appender);

    // Thread names carry the worker id (worker-N).
    let text_layer = fmt::layer()
        .with_writer(text_writer)
        .with_target(true)
        .with_thread_names(true)
        .with_line_number(true)
        .with_ansi(false)
        .compact()
        .with_filter(env_filter.clone());

    let json_layer = fmt::layer()
        .json()
        .with_writer(json_writer)
        .with_target(true)
        .with_thread_names(true)
        .with_line_number(true)
        .with_current_span(true)
        .with_span_list(true)
        .with_filter(env_filter.clone());

    let stdout_layer = fmt::layer()
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(text_layer)
        .with(json_layer)
        .with(stdout_layer)
        .try_init()?;

    tracing::info!("Logging initialized - logs will be written to {}", log_path.display());

    Ok(LogGuards {
        _text: text_guard,
        _json: json_guard,
    })
}
