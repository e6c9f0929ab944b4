//! Diagnostic logging setup.
//!
//! Two sinks: stderr, filtered by `HAVEN_LOG` / `RUST_LOG` (default `warn`),
//! and a daily-rolling `haven.log` under the data directory at debug level.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub const LOG_ENV: &str = "HAVEN_LOG";

const VERBOSE_FILTER: &str = "haven=debug,warn";
const FILE_FILTER: &str = "haven=debug";

/// Filter directives for stderr. `--verbose` wins over the environment.
pub fn stderr_directives(verbose: bool, haven_log: Option<String>, rust_log: Option<String>) -> String {
    if verbose {
        return VERBOSE_FILTER.to_string();
    }
    let set = |s: &String| !s.trim().is_empty();
    haven_log
        .filter(set)
        .or(rust_log.filter(set))
        .unwrap_or_else(|| "warn".to_string())
}

/// Install the global subscriber. Keep the returned guard alive until exit so
/// buffered file output is flushed.
pub fn init(verbose: bool, logs_dir: &Path) -> Option<WorkerGuard> {
    let directives = stderr_directives(
        verbose,
        dotenvy::var(LOG_ENV).ok(),
        dotenvy::var("RUST_LOG").ok(),
    );
    let stderr_filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_filter);

    let (file_layer, guard) = match file_writer(logs_dir) {
        Some((writer, guard)) => {
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new(FILE_FILTER));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
    guard
}

fn file_writer(
    logs_dir: &Path,
) -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(logs_dir).ok()?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("haven.log")
        .build(logs_dir)
        .ok()?;
    Some(tracing_appender::non_blocking(appender))
}
