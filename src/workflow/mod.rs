//! Workflow phases.
//!
//! One state machine per user-facing command: Start, Continue, Finish, Team,
//! and Help-Flow. Each phase takes the shared context plus a [`Prompter`]
//! and returns a structured [`PhaseResult`]; all observable side effects
//! (Git mutations, API calls, notifications, backups, log writes) happen
//! through the adapters in the context.

mod continue_flow;
mod finish;
mod help_flow;
mod prompt;
mod start;
mod team;

use std::path::Path;

pub use continue_flow::run_continue;
pub use finish::{run_finish, ON_DEFAULT_BRANCH};
pub use help_flow::{run_help_flow, Urgency};
pub use prompt::{Prompter, ScriptedAnswer, ScriptedPrompter, StdinPrompter};
pub use start::{run_start, BranchPlan, WorkType, DIRTY_TREE};
pub use team::{run_team, TeamReport};

use crate::backup::BackupStore;
use crate::core::{Config, Logger};
use crate::git::GitAdapter;
use crate::integrations::{GithubGateway, Notifier};
use crate::recovery::{ErrorHandler, RecoveryManager};

/// Terminal status of a phase run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStatus {
    Completed,
    /// The user backed out; no side effects beyond what was confirmed.
    Aborted,
    Failed,
}

/// Artifacts a phase produced.
#[derive(Debug, Clone, Default)]
pub struct PhaseArtifacts {
    pub branch: Option<String>,
    pub issue: Option<u64>,
    /// URL of a created pull request.
    pub pr: Option<String>,
}

/// Structured result every phase returns.
#[derive(Debug)]
pub struct PhaseResult {
    pub status: PhaseStatus,
    pub artifacts: PhaseArtifacts,
    pub messages: Vec<String>,
    /// Machine-readable reason for an abort or failure, e.g. `DIRTY_TREE`.
    pub reason: Option<String>,
    /// The user must fix something by hand before retrying.
    pub requires_manual_action: bool,
}

impl PhaseResult {
    pub fn completed() -> Self {
        Self {
            status: PhaseStatus::Completed,
            artifacts: PhaseArtifacts::default(),
            messages: Vec::new(),
            reason: None,
            requires_manual_action: false,
        }
    }

    pub fn aborted(reason: impl Into<String>) -> Self {
        Self {
            status: PhaseStatus::Aborted,
            artifacts: PhaseArtifacts::default(),
            messages: Vec::new(),
            reason: Some(reason.into()),
            requires_manual_action: false,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: PhaseStatus::Failed,
            artifacts: PhaseArtifacts::default(),
            messages: Vec::new(),
            reason: Some(reason.into()),
            requires_manual_action: false,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.artifacts.branch = Some(branch.into());
        self
    }

    pub fn manual_action_required(mut self) -> Self {
        self.requires_manual_action = true;
        self
    }

    /// Exit code mapping: only unhandled failures exit non-zero.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            PhaseStatus::Completed | PhaseStatus::Aborted => 0,
            PhaseStatus::Failed => 1,
        }
    }
}

/// Shared handles every phase receives. Uniquely owned by one phase
/// execution at a time.
pub struct PhaseContext<'a> {
    pub config: &'a Config,
    pub logger: &'a Logger,
    pub git: &'a GitAdapter,
    pub gateway: &'a mut GithubGateway,
    pub notifier: &'a Notifier,
    pub backups: &'a BackupStore,
    pub handler: &'a mut ErrorHandler,
    pub recovery: &'a mut RecoveryManager,
    pub root: &'a Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(PhaseResult::completed().exit_code(), 0);
        assert_eq!(PhaseResult::aborted("USER_CANCELLED").exit_code(), 0);
        assert_eq!(PhaseResult::failed("BOOM").exit_code(), 1);
    }

    #[test]
    fn test_builder_helpers() {
        let result = PhaseResult::completed()
            .with_branch("feature/x")
            .with_message("done");
        assert_eq!(result.artifacts.branch.as_deref(), Some("feature/x"));
        assert_eq!(result.messages, vec!["done"]);

        let result = PhaseResult::failed("MERGE_CONFLICT").manual_action_required();
        assert!(result.requires_manual_action);
        assert_eq!(result.reason.as_deref(), Some("MERGE_CONFLICT"));
    }
}
