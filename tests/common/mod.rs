//! Shared helpers for integration tests: temporary Git repositories and a
//! fully wired phase context.

use std::path::{Path, PathBuf};
use std::process::Command;

use teamflow::core::{Config, Logger, OfflineMode, RetryConfig};
use teamflow::{BackupStore, ErrorHandler, GitAdapter, RecoveryManager};

/// Run a git command in `dir`, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "dev")
        .env("GIT_AUTHOR_EMAIL", "dev@example.com")
        .env("GIT_COMMITTER_NAME", "dev")
        .env("GIT_COMMITTER_EMAIL", "dev@example.com")
        .output()
        .expect("git binary available");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Initialize a repository on `main` with one commit.
pub fn init_repo(dir: &Path) {
    git(dir, &["init"]);
    git(dir, &["checkout", "-b", "main"]);
    git(dir, &["config", "user.name", "dev"]);
    git(dir, &["config", "user.email", "dev@example.com"]);
    std::fs::write(dir.join("README.md"), "# demo\n").unwrap();
    git(dir, &["add", "."]);
    git(dir, &["commit", "-m", "chore: initial commit"]);
}

/// Add a bare `origin` remote cloned from the repository and push `main`.
pub fn add_origin(dir: &Path, remote_dir: &Path) {
    git(remote_dir, &["init", "--bare"]);
    let url = remote_dir.to_string_lossy().to_string();
    git(dir, &["remote", "add", "origin", &url]);
    git(dir, &["push", "--set-upstream", "origin", "main"]);
}

/// Clone the bare remote into `dest` and configure an author, for
/// simulating a teammate pushing work.
pub fn clone_repo(remote: &Path, dest: &Path) {
    let url = remote.to_string_lossy().to_string();
    let dest_str = dest.to_string_lossy().to_string();
    let parent = dest.parent().expect("clone destination has a parent");
    git(parent, &["clone", &url, &dest_str]);
    git(dest, &["config", "user.name", "teammate"]);
    git(dest, &["config", "user.email", "teammate@example.com"]);
}

/// Commit a file in `dir` and push the current branch.
pub fn commit_and_push(dir: &Path, file: &str, content: &str, message: &str) {
    std::fs::write(dir.join(file), content).unwrap();
    git(dir, &["add", "."]);
    git(dir, &["commit", "-m", message]);
    git(dir, &["push", "origin", "HEAD"]);
}

/// Everything a phase needs, wired against a temporary repository.
pub struct TestEnv {
    pub root: PathBuf,
    pub config: Config,
    pub logger: Logger,
    pub git: GitAdapter,
    pub backups: BackupStore,
    pub handler: ErrorHandler,
    pub recovery: RecoveryManager,
}

impl TestEnv {
    pub fn new(root: &Path) -> Self {
        let mut config = Config::default();
        config.state_dir = root.join(".teamflow");

        let logger = Logger::at_path(config.log_dir().join("team-flow.log"), config.log_level);
        let git = GitAdapter::new(root);
        let backups = BackupStore::new(root, config.backup_dir(), config.backup_retention);
        let handler = ErrorHandler::new(logger.clone());
        let offline = OfflineMode::at(config.offline_mode_path());
        let recovery = RecoveryManager::new(
            RetryConfig::with_max_attempts(config.max_retries),
            offline,
            logger.clone(),
        );

        Self { root: root.to_path_buf(), config, logger, git, backups, handler, recovery }
    }
}

/// Build a phase context over a test environment. The gateway is offline
/// (no token), so phases exercise their degraded paths without networking.
#[macro_export]
macro_rules! phase_ctx {
    ($env:expr, $gateway:expr, $notifier:expr) => {
        teamflow::workflow::PhaseContext {
            config: &$env.config,
            logger: &$env.logger,
            git: &$env.git,
            gateway: &mut $gateway,
            notifier: &$notifier,
            backups: &$env.backups,
            handler: &mut $env.handler,
            recovery: &mut $env.recovery,
            root: &$env.root,
        }
    };
}

/// Gateway wired to nothing: no token, so it reports unavailable and never
/// touches the network.
pub fn offline_gateway(env: &TestEnv) -> teamflow::GithubGateway {
    let offline = OfflineMode::at(env.config.offline_mode_path());
    teamflow::GithubGateway::connect(&env.config, &offline, None)
}
