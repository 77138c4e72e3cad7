//! Logging setup: daily rolling file under the storage root, stderr fallback.
//!
//! `RUST_LOG` controls the filter; `SLEEP_TRACKER_DEBUG_LOG=1` forces debug.

use std::env;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "sleep-tracker.log";

/// Keep the returned guard alive for the whole process or buffered lines are lost.
///
/// `None` for `logs_dir` logs to stderr.
pub fn init(logs_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = env_filter();

    let Some(logs_dir) = logs_dir else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return None;
    };

    let appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}

fn env_filter() -> EnvFilter {
    let debug_enabled = env::var("SLEEP_TRACKER_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}
