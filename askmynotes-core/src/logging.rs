//! Logging for askmynotes
//!
//! Both binaries log to daily files under `~/.local/state/askmynotes/`
//! (`askmynotes.log.YYYY-MM-DD`). The TUI owns the terminal and the CLI's
//! stdout is its output, so nothing is ever logged to the console.

use std::path::Path;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};

/// Prefix of the rotated log files
const LOG_FILE_PREFIX: &str = "askmynotes.log";

/// Filter used by tests when `RUST_LOG` is unset
const TEST_FILTER: &str = "warn,askmynotes_core=debug";

/// Initialize file logging.
///
/// `RUST_LOG` wins over `config.level`. A level that is not a valid filter
/// directive is a configuration error rather than silently dropped.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let log_dir = Config::state_dir();
    let filter = filter_for(&config.level)?;
    let appender = file_appender(&log_dir, config.max_files)?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %config.level,
        max_files = config.max_files,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Route store and client logs to the test harness.
///
/// Store reconciliation is the interesting part when an integration test
/// fails, so `askmynotes_core` logs at debug unless `RUST_LOG` says otherwise.
pub fn init_test() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(TEST_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .compact()
        .with_target(false)
        .try_init();
}

/// Keeps the background log writer alive; pending lines flush on drop.
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

fn filter_for(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level)
        .map_err(|e| Error::Config(format!("invalid log level {:?}: {}", level, e)))
}

/// Daily appender in `dir` keeping at most `max_files` files (at least one).
fn file_appender(dir: &Path, max_files: usize) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(dir)?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(max_files.max(1))
        .build(dir)
        .map_err(|e| Error::Config(format!("failed to create log file: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_filter_rejects_garbage_level() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert!(filter_for("debug").is_ok());
        assert!(filter_for("askmynotes_core=trace,warn").is_ok());
        assert!(matches!(filter_for("askmynotes_core=loud"), Err(Error::Config(_))));
    }

    #[test]
    fn test_file_appender_writes_prefixed_file() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("state").join("askmynotes");

        let mut appender = file_appender(&nested, 0).unwrap();
        appender.write_all(b"subject added\n").unwrap();
        appender.flush().unwrap();

        let names: Vec<String> = std::fs::read_dir(&nested)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("askmynotes.log"));
    }
}
