//! Core types and functionality for Teamflow.
//!
//! This module contains the fundamentals shared by every phase: layered
//! configuration, the masking file logger, retry/backoff, and the offline
//! mode flag.

mod config;
mod logger;
mod offline;
mod retry;

pub use config::{
    parse_env_file, Config, ConfigReport, Environment, LogLevel, DEFAULT_ENV_TEMPLATE,
    STATE_DIR_NAME,
};
pub use logger::{Logger, LOG_FILE_NAME};
pub use offline::{OfflineMode, OfflineState};
pub use retry::{retry, retry_with_sleep, RetryConfig, RetryResult};
