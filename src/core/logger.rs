//! Application log file.
//!
//! One appender writing `[ISO-8601 UTC] [LEVEL] message` lines to
//! `.teamflow/logs/team-flow.log`. Every message is passed through the
//! secret masker first, and a failed write is swallowed: logging must never
//! take a phase down with it.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};

use super::config::{Config, LogLevel};
use crate::security::masking;

/// File name of the application log.
pub const LOG_FILE_NAME: &str = "team-flow.log";

/// Handle to the append-only application log.
///
/// Cloneable; explicitly passed to components instead of living in a
/// process-global.
#[derive(Debug, Clone)]
pub struct Logger {
    path: PathBuf,
    level: LogLevel,
}

impl Logger {
    /// Create a logger from configuration, creating the log directory
    /// best-effort.
    pub fn new(config: &Config) -> Self {
        let dir = config.log_dir();
        let _ = std::fs::create_dir_all(&dir);
        Self { path: dir.join(LOG_FILE_NAME), level: config.log_level }
    }

    /// Create a logger writing to an explicit path (tests).
    pub fn at_path(path: PathBuf, level: LogLevel) -> Self {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        Self { path, level }
    }

    /// Path of the log file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Append one line at the given level.
    pub fn log(&self, level: LogLevel, message: &str) {
        if level > self.level {
            return;
        }
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let line = format!("[{}] [{}] {}\n", timestamp, level.label(), masking::mask_message(message));

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if result.is_err() {
            // Mirror to diagnostics only; callers never see log I/O errors.
            tracing::debug!("log write failed: {}", self.path.display());
        }
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_logger(level: LogLevel) -> (tempfile::TempDir, Logger) {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::at_path(dir.path().join(LOG_FILE_NAME), level);
        (dir, logger)
    }

    #[test]
    fn test_line_format() {
        let (_dir, logger) = temp_logger(LogLevel::Debug);
        logger.info("starting work");

        let content = std::fs::read_to_string(logger.path()).unwrap();
        let line = content.lines().next().unwrap();
        assert!(line.starts_with('['), "line: {line}");
        assert!(line.contains("] [INFO] starting work"));
        // Timestamp is UTC RFC 3339.
        assert!(line.contains('T') && line.contains('Z'));
    }

    #[test]
    fn test_level_filtering() {
        let (_dir, logger) = temp_logger(LogLevel::Warn);
        logger.info("hidden");
        logger.warn("shown");

        let content = std::fs::read_to_string(logger.path()).unwrap();
        assert!(!content.contains("hidden"));
        assert!(content.contains("shown"));
    }

    #[test]
    fn test_secrets_masked() {
        let (_dir, logger) = temp_logger(LogLevel::Debug);
        logger.info(&format!("auth with ghp_{}", "X".repeat(36)));

        let content = std::fs::read_to_string(logger.path()).unwrap();
        assert!(content.contains("ghp_***masked***"));
        assert!(!content.contains(&"X".repeat(36)));
    }

    #[test]
    fn test_write_failure_is_silent() {
        // A directory path cannot be opened for append; the call must not panic.
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::at_path(dir.path().to_path_buf(), LogLevel::Debug);
        logger.info("dropped");
    }

    #[test]
    fn test_append_only() {
        let (_dir, logger) = temp_logger(LogLevel::Debug);
        logger.info("first");
        logger.info("second");

        let content = std::fs::read_to_string(logger.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("first"));
        assert!(lines[1].contains("second"));
    }
}
