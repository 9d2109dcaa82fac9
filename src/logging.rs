//! Subscriber setup for the CLI. Console output always goes to stderr so
//! stdout carries nothing but the JSON result; a daily rolling file is added
//! when [`Config::log_dir`] is set.

use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

const LOG_FILE_PREFIX: &str = "adaptive-quiz.log";
const FALLBACK_FILTER: &str = "info";

/// Keeps the file writer flushing until dropped at the end of `main`.
#[must_use]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Parses a `RUST_LOG` style directive, falling back to `info` when it is malformed.
pub fn filter_for(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(FALLBACK_FILTER))
}

/// Creates `dir` if needed and opens a non-blocking daily appender inside it.
pub fn file_writer(dir: &Path) -> std::io::Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(dir)?;
    let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
    Ok(tracing_appender::non_blocking(appender))
}

pub fn init_tracing(config: &Config) -> LogGuard {
    let file = config.log_dir.as_deref().and_then(|dir| match file_writer(dir) {
        Ok(writer) => Some(writer),
        Err(err) => {
            eprintln!("failed to create log directory {}: {err}", dir.display());
            None
        }
    });
    let (file_layer, guard) = match file {
        Some((writer, guard)) => (
            Some(fmt::layer().with_writer(writer).with_ansi(false).with_target(true)),
            Some(guard),
        ),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter_for(&config.log_level))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(file_layer)
        .init();

    if let Some(dir) = &config.log_dir {
        tracing::debug!(dir = %dir.display(), enabled = guard.is_some(), "file logging");
    }
    LogGuard { _file: guard }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_directive_falls_back_to_info() {
        assert_eq!(filter_for("adaptive_quiz=loud").to_string(), FALLBACK_FILTER);
        assert_eq!(filter_for("adaptive_quiz=debug").to_string(), "adaptive_quiz=debug");
    }

    #[test]
    fn file_writer_creates_nested_log_dir() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("nested").join("logs");
        let (_writer, _guard) = file_writer(&dir).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn file_writer_reports_unusable_dir() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("occupied");
        std::fs::write(&blocker, b"not a directory").unwrap();
        assert!(file_writer(&blocker.join("logs")).is_err());
    }
}
