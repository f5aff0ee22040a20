//! Application state and lifecycle management.
//!
//! The `App` struct owns the shared handles (configuration, logger, Git
//! adapter, backup store, error handler, recovery manager), builds the
//! gateway and notifier on demand, and hands a [`PhaseContext`] to whichever
//! phase the CLI dispatches.

use std::path::PathBuf;

use anyhow::Result;

use crate::backup::BackupStore;
use crate::core::{Config, Logger, OfflineMode, RetryConfig};
use crate::git::GitAdapter;
use crate::integrations::{GithubGateway, Notifier};
use crate::recovery::{ErrorHandler, RecoveryManager};
use crate::workflow::{self, PhaseContext, PhaseResult, Prompter};

/// User-facing phases the CLI can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Continue,
    Finish,
    Team,
    HelpFlow,
}

/// Top-level application wiring.
pub struct App {
    pub config: Config,
    logger: Logger,
    git: GitAdapter,
    backups: BackupStore,
    handler: ErrorHandler,
    recovery: RecoveryManager,
    root: PathBuf,
}

impl App {
    /// Build the application rooted at the current directory.
    pub fn new() -> Result<Self> {
        let root = std::env::current_dir()?;
        let config = Config::load_from(&root)?;
        let logger = Logger::new(&config);
        let git = GitAdapter::new(&root).with_timeout(config.git_timeout());
        let backups = BackupStore::new(&root, config.backup_dir(), config.backup_retention);
        let handler = ErrorHandler::new(logger.clone());
        let offline = OfflineMode::at(config.offline_mode_path());
        let recovery = RecoveryManager::new(
            RetryConfig::with_max_attempts(config.max_retries),
            offline,
            logger.clone(),
        );

        Ok(Self { config, logger, git, backups, handler, recovery, root })
    }

    /// Install panic and termination-signal hooks. Called once by `main`.
    pub fn install_hooks(&self) {
        self.handler.install_process_hooks();
    }

    /// Run one phase to completion.
    pub fn run(&mut self, phase: Phase, prompter: &mut dyn Prompter) -> PhaseResult {
        let offline = OfflineMode::at(self.config.offline_mode_path());
        let remote_url = self.git.remote_url("origin").ok();
        let mut gateway = GithubGateway::connect(&self.config, &offline, remote_url.as_deref());
        let notifier = Notifier::new(&self.config);

        let mut ctx = PhaseContext {
            config: &self.config,
            logger: &self.logger,
            git: &self.git,
            gateway: &mut gateway,
            notifier: &notifier,
            backups: &self.backups,
            handler: &mut self.handler,
            recovery: &mut self.recovery,
            root: &self.root,
        };

        let result = match phase {
            Phase::Start => workflow::run_start(&mut ctx, prompter),
            Phase::Continue => workflow::run_continue(&mut ctx, prompter),
            Phase::Finish => workflow::run_finish(&mut ctx, prompter),
            Phase::Team => workflow::run_team(&mut ctx, prompter),
            Phase::HelpFlow => workflow::run_help_flow(&mut ctx, prompter),
        };

        for message in &result.messages {
            println!("{message}");
        }
        if let Some(ref reason) = result.reason {
            self.logger.info(&format!("phase ended: {:?} ({reason})", result.status));
        }
        result
    }

    /// Validate configuration and print the report. Returns the exit code.
    pub fn check_config(&self) -> i32 {
        let report = self.config.check();
        for error in &report.errors {
            println!("エラー: {error}");
        }
        for warning in &report.warnings {
            println!("注意: {warning}");
        }
        if report.is_ok() {
            println!("設定に問題はありません。");
            0
        } else {
            1
        }
    }

    /// Best-effort configuration repair. Returns the exit code.
    pub fn fix_config(&self) -> i32 {
        match Config::fix(&self.root) {
            Ok(actions) if actions.is_empty() => {
                println!("修復すべき設定はありません。");
                0
            }
            Ok(actions) => {
                for action in actions {
                    println!("{action}");
                }
                0
            }
            Err(e) => {
                eprintln!("設定の修復に失敗しました: {e}");
                1
            }
        }
    }

    /// Interactive first-time setup: collect the required keys, validate
    /// them, and write the per-user global configuration.
    pub fn setup(&self, prompter: &mut dyn Prompter) -> Result<i32> {
        use crate::security::validators;

        println!("teamflow 初期設定");

        let token = loop {
            let Some(input) = prompter.input("GitHub Personal Access Token (ghp_… / github_pat_…)")
            else {
                return Ok(0);
            };
            let check = validators::validate_github_token(&input);
            match check.value {
                Some(token) => break token,
                None => println!("{}", check.error.unwrap_or_default()),
            }
        };

        let channel = loop {
            let Some(input) = prompter.input("Slackチャンネル (空でスキップ)") else {
                return Ok(0);
            };
            if input.trim().is_empty() {
                break None;
            }
            let check = validators::validate_slack_channel(&input);
            match check.value {
                Some(channel) => break Some(channel),
                None => println!("{}", check.error.unwrap_or_default()),
            }
        };

        let default_branch = prompter
            .input("既定ブランチ (空で main)")
            .map(|b| if b.trim().is_empty() { "main".to_string() } else { b.trim().to_string() })
            .unwrap_or_else(|| "main".to_string());

        let Some(global) = Config::global_config_path() else {
            anyhow::bail!("ホームディレクトリを特定できません");
        };
        if let Some(parent) = global.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut map = serde_json::Map::new();
        map.insert("GITHUB_TOKEN".to_string(), serde_json::json!(token));
        map.insert("DEFAULT_BRANCH".to_string(), serde_json::json!(default_branch));
        if let Some(channel) = channel {
            map.insert("SLACK_CHANNEL".to_string(), serde_json::json!(channel));
        }
        std::fs::write(&global, serde_json::to_string_pretty(&map)?)?;

        println!("設定を保存しました: {}", global.display());
        Ok(0)
    }

    /// Run registered cleanups; used for a graceful end of process.
    pub fn shutdown(&self) -> i32 {
        self.handler.graceful_shutdown()
    }
}
