//! # Teamflow
//!
//! Interactive team development workflow for Git and GitHub.
//!
//! Teamflow guides engineers through a standardized development lifecycle
//! (start work, continue work, finish work, inspect team state, recover from
//! failure) with pre-operation backups, classified error handling,
//! automatic recovery, and rate-limited GitHub API access.
//!
//! ## Quick Start
//!
//! ```bash
//! # Install
//! cargo install teamflow
//!
//! # First-time setup
//! teamflow --setup
//!
//! # Begin a piece of work
//! teamflow start
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::return_self_not_must_use)]

pub mod app;
pub mod backup;
pub mod core;
pub mod diagnosis;
pub mod git;
pub mod integrations;
pub mod recovery;
pub mod security;
pub mod workflow;

pub use crate::app::{App, Phase};
pub use crate::backup::{BackupError, BackupKind, BackupRecord, BackupStore};
pub use crate::core::{Config, Environment, LogLevel, Logger, OfflineMode, RetryConfig};
pub use crate::git::{ChangeKind, ChangedFile, GitAdapter, GitError, GitStatus};
pub use crate::integrations::{
    GatewayError, GithubGateway, NotificationMessage, Notifier, RateLimitState,
};
pub use crate::recovery::{Classification, ErrorHandler, ErrorTag, RecoveryManager, Severity};
pub use crate::workflow::{
    BranchPlan, PhaseResult, PhaseStatus, Prompter, ScriptedAnswer, ScriptedPrompter,
    StdinPrompter, WorkType,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "teamflow";
