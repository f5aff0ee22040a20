//! Repository diagnosis and work-status analysis.
//!
//! Diagnosis inspects the repository and produces severity-tagged issues,
//! team-practice warnings, and suggestions. The work-status analyzer derives
//! the current piece of work (branch, sync state, ages) and ranks the next
//! actions the Continue phase offers.

use std::path::Path;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use walkdir::WalkDir;

use crate::core::Config;
use crate::git::{GitAdapter, GitStatus};

/// Working tree entries above this size are flagged.
const LARGE_FILE_BYTES: u64 = 100 * 1024 * 1024;

/// Untracked-file count above which the tree is considered noisy.
const UNTRACKED_NOISE_THRESHOLD: usize = 10;

/// Uncommitted-change count above which a commit is overdue.
const LARGE_BATCH_THRESHOLD: usize = 20;

const STALE_HOURS: f64 = 24.0;
const LONG_RUNNING_HOURS: f64 = 8.0;

/// Severity of a diagnosed problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    Critical,
    Error,
    Warning,
}

/// One diagnosed problem.
#[derive(Debug, Clone)]
pub struct DiagnosisIssue {
    pub severity: IssueSeverity,
    pub title: String,
    pub detail: String,
}

/// Full diagnosis output.
#[derive(Debug, Default)]
pub struct DiagnosisReport {
    pub issues: Vec<DiagnosisIssue>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

impl DiagnosisReport {
    /// Whether anything blocking was found.
    pub fn has_critical(&self) -> bool {
        self.issues.iter().any(|i| i.severity == IssueSeverity::Critical)
    }
}

/// Inspect the repository and working environment.
pub fn diagnose(git: &GitAdapter, config: &Config, root: &Path) -> DiagnosisReport {
    let mut report = DiagnosisReport::default();

    if !git.is_repository() {
        report.issues.push(DiagnosisIssue {
            severity: IssueSeverity::Critical,
            title: "Gitリポジトリではありません".to_string(),
            detail: "git init または既存リポジトリ内で実行してください".to_string(),
        });
        return report;
    }

    let status = git.status().unwrap_or_default();

    if !status.conflicted.is_empty() {
        report.issues.push(DiagnosisIssue {
            severity: IssueSeverity::Critical,
            title: "マージコンフリクトが未解消です".to_string(),
            detail: format!("競合ファイル: {}", status.conflicted.join(", ")),
        });
    }

    if git.is_detached() {
        report.issues.push(DiagnosisIssue {
            severity: IssueSeverity::Error,
            title: "HEAD が切り離されています".to_string(),
            detail: "git checkout <ブランチ名> でブランチに戻ってください".to_string(),
        });
    }

    if status.untracked.len() > UNTRACKED_NOISE_THRESHOLD {
        report.issues.push(DiagnosisIssue {
            severity: IssueSeverity::Warning,
            title: format!("未追跡ファイルが多すぎます ({})", status.untracked.len()),
            detail: ".gitignore の整備を検討してください".to_string(),
        });
    }

    if status.has_remote_origin && !git.remote_reachable("origin") {
        report.issues.push(DiagnosisIssue {
            severity: IssueSeverity::Error,
            title: "リモート origin に到達できません".to_string(),
            detail: "git remote -v と接続状況を確認してください".to_string(),
        });
    }

    if !is_writable(root) {
        report.issues.push(DiagnosisIssue {
            severity: IssueSeverity::Critical,
            title: "作業ディレクトリに書き込めません".to_string(),
            detail: "ディレクトリの権限を確認してください".to_string(),
        });
    }

    if git.config_value("user.name").is_none() || git.config_value("user.email").is_none() {
        report.issues.push(DiagnosisIssue {
            severity: IssueSeverity::Error,
            title: "Gitのユーザー設定が不足しています".to_string(),
            detail: "git config user.name / user.email を設定してください".to_string(),
        });
    }

    for file in oversized_files(root) {
        report.issues.push(DiagnosisIssue {
            severity: IssueSeverity::Warning,
            title: format!("巨大なファイルがあります: {file}"),
            detail: "Git LFS などの利用を検討してください".to_string(),
        });
    }

    // Team-practice warnings.
    if status.current_branch.as_deref() == Some(config.default_branch.as_str()) {
        report
            .warnings
            .push(format!("{} ブランチ上で直接作業しています", config.default_branch));
        report.suggestions.push("start コマンドで作業ブランチを作成してください".to_string());
    }
    if status.uncommitted_count() > LARGE_BATCH_THRESHOLD {
        report.warnings.push(format!(
            "未コミットの変更が {} 件あります。こまめなコミットを推奨します",
            status.uncommitted_count()
        ));
    }
    if status.ahead > 0 {
        report.warnings.push(format!("未プッシュのコミットが {} 件あります", status.ahead));
        report.suggestions.push("continue コマンドからプッシュできます".to_string());
    }

    report
}

/// Probe whether the directory accepts writes.
fn is_writable(root: &Path) -> bool {
    let probe = root.join(".teamflow-write-probe");
    match std::fs::write(&probe, b"probe") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

/// Working-tree files above the size threshold, relative paths.
fn oversized_files(root: &Path) -> Vec<String> {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            name != ".git" && name != "target"
        })
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.metadata().map(|m| m.len() > LARGE_FILE_BYTES).unwrap_or(false))
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .unwrap_or(e.path())
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect()
}

// ----------------------------------------------------------------------
// Capability probe
// ----------------------------------------------------------------------

/// A detected test runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRunner {
    pub kind: &'static str,
    pub run_cmd: &'static str,
}

/// Probe for a usable test runner in the project.
pub fn detect_test_runner(root: &Path) -> Option<TestRunner> {
    if root.join("Cargo.toml").exists() {
        return Some(TestRunner { kind: "cargo", run_cmd: "cargo test" });
    }
    if root.join("package.json").exists() {
        let has_test_script = std::fs::read_to_string(root.join("package.json"))
            .ok()
            .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
            .and_then(|json| json.get("scripts")?.get("test").cloned())
            .is_some();
        if has_test_script {
            return Some(TestRunner { kind: "npm", run_cmd: "npm test" });
        }
    }
    if root.join("Makefile").exists() {
        let has_test_target = std::fs::read_to_string(root.join("Makefile"))
            .map(|content| content.lines().any(|l| l.starts_with("test:")))
            .unwrap_or(false);
        if has_test_target {
            return Some(TestRunner { kind: "make", run_cmd: "make test" });
        }
    }
    None
}

// ----------------------------------------------------------------------
// Work status
// ----------------------------------------------------------------------

/// Relationship of the branch to its upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    UpToDate,
    Ahead,
    Behind,
    Diverged,
    NoRemote,
}

/// Next action a recommendation drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendedAction {
    Commit,
    Pull,
    Push,
    Sync,
    Test,
    UpdateIssue,
    UpdateStatus,
}

impl RecommendedAction {
    /// Dispatch rank; lower runs first.
    const fn rank(&self) -> u8 {
        match self {
            Self::Commit => 0,
            Self::Pull => 1,
            Self::Push => 2,
            Self::Sync => 3,
            Self::Test => 4,
            Self::UpdateIssue => 5,
            Self::UpdateStatus => 6,
        }
    }
}

/// Recommendation priority shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// One ranked next action.
#[derive(Debug, Clone)]
pub struct Recommendation {
    pub action: RecommendedAction,
    pub priority: Priority,
    pub title: String,
    pub description: String,
}

/// Derived summary of the current piece of work.
#[derive(Debug, Clone)]
pub struct WorkStatus {
    pub branch: Option<String>,
    pub sync: SyncState,
    pub uncommitted: usize,
    pub unpushed: usize,
    pub hours_since_branch_created: Option<f64>,
    pub hours_since_last_commit: Option<f64>,
    pub is_stale: bool,
    pub is_long_running: bool,
    pub issue_number: Option<u64>,
    pub recommendations: Vec<Recommendation>,
}

static ISSUE_IN_BRANCH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"issue-(\d+)-").expect("valid regex"));

/// Extract the issue number encoded in a branch name, if any.
pub fn issue_number_from_branch(branch: &str) -> Option<u64> {
    ISSUE_IN_BRANCH_RE.captures(branch).and_then(|c| c[1].parse().ok())
}

/// Classify the sync relationship from a status snapshot.
pub fn classify_sync(status: &GitStatus) -> SyncState {
    if !status.has_remote_origin || status.tracking.is_none() {
        return SyncState::NoRemote;
    }
    match (status.ahead > 0, status.behind > 0) {
        (true, true) => SyncState::Diverged,
        (true, false) => SyncState::Ahead,
        (false, true) => SyncState::Behind,
        (false, false) => SyncState::UpToDate,
    }
}

/// Analyze the current work on the repository.
pub fn analyze_work_status(git: &GitAdapter, config: &Config, root: &Path) -> WorkStatus {
    let status = git.status().unwrap_or_default();
    let branch = status.current_branch.clone();
    let sync = classify_sync(&status);

    let now = Utc::now();
    let hours_since_branch_created = branch.as_deref().and_then(|b| {
        git.branch_created_at(b, &config.default_branch)
            .ok()
            .flatten()
            .map(|t| (now - t).num_minutes() as f64 / 60.0)
    });
    let hours_since_last_commit = git
        .last_commit()
        .ok()
        .flatten()
        .and_then(|c| c.time)
        .map(|t| (now - t).num_minutes() as f64 / 60.0);

    let issue_number = branch.as_deref().and_then(issue_number_from_branch);
    let test_runner = detect_test_runner(root);

    compose_work_status(
        branch,
        sync,
        status.uncommitted_count(),
        status.ahead,
        hours_since_branch_created,
        hours_since_last_commit,
        issue_number,
        test_runner.is_some(),
    )
}

/// Pure composition of the work status and its ranked recommendations.
#[allow(clippy::too_many_arguments)]
pub fn compose_work_status(
    branch: Option<String>,
    sync: SyncState,
    uncommitted: usize,
    unpushed: usize,
    hours_since_branch_created: Option<f64>,
    hours_since_last_commit: Option<f64>,
    issue_number: Option<u64>,
    has_test_runner: bool,
) -> WorkStatus {
    let is_stale = hours_since_last_commit.is_some_and(|h| h > STALE_HOURS);
    let is_long_running = hours_since_branch_created.is_some_and(|h| h > LONG_RUNNING_HOURS);

    let mut recommendations = Vec::new();

    if uncommitted > 0 {
        recommendations.push(Recommendation {
            action: RecommendedAction::Commit,
            priority: Priority::High,
            title: "変更をコミット".to_string(),
            description: format!("{uncommitted} 件の未コミットの変更があります"),
        });
    }
    if sync == SyncState::Behind {
        recommendations.push(Recommendation {
            action: RecommendedAction::Pull,
            priority: Priority::High,
            title: "リモートの変更を取り込み".to_string(),
            description: "リモートが先行しています。pull してください".to_string(),
        });
    }
    if sync == SyncState::Ahead && unpushed > 0 {
        recommendations.push(Recommendation {
            action: RecommendedAction::Push,
            priority: Priority::Medium,
            title: "コミットをプッシュ".to_string(),
            description: format!("{unpushed} 件の未プッシュのコミットがあります"),
        });
    }
    if sync == SyncState::Diverged {
        recommendations.push(Recommendation {
            action: RecommendedAction::Sync,
            priority: Priority::High,
            title: "ブランチを同期".to_string(),
            description: "ローカルとリモートが分岐しています。rebase か merge で同期してください"
                .to_string(),
        });
    }
    if has_test_runner && (uncommitted > 0 || unpushed > 0) {
        recommendations.push(Recommendation {
            action: RecommendedAction::Test,
            priority: Priority::Medium,
            title: "テストを実行".to_string(),
            description: "変更に対してテストを実行してください".to_string(),
        });
    }
    if issue_number.is_some() && is_long_running {
        recommendations.push(Recommendation {
            action: RecommendedAction::UpdateIssue,
            priority: Priority::Low,
            title: "Issueに進捗を記録".to_string(),
            description: "作業が長時間に及んでいます。Issueに進捗コメントを残してください"
                .to_string(),
        });
    }
    if is_stale {
        recommendations.push(Recommendation {
            action: RecommendedAction::UpdateStatus,
            priority: Priority::Low,
            title: "チームに状況を共有".to_string(),
            description: "最後のコミットから24時間以上経過しています".to_string(),
        });
    }

    recommendations.sort_by_key(|r| r.action.rank());

    WorkStatus {
        branch,
        sync,
        uncommitted,
        unpushed,
        hours_since_branch_created,
        hours_since_last_commit,
        is_stale,
        is_long_running,
        issue_number,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(ahead: usize, behind: usize, tracking: bool) -> GitStatus {
        GitStatus {
            current_branch: Some("feature/x".to_string()),
            ahead,
            behind,
            has_remote_origin: tracking,
            tracking: tracking.then(|| "origin/feature/x".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_sync_classification() {
        assert_eq!(classify_sync(&status(0, 0, true)), SyncState::UpToDate);
        assert_eq!(classify_sync(&status(2, 0, true)), SyncState::Ahead);
        assert_eq!(classify_sync(&status(0, 3, true)), SyncState::Behind);
        assert_eq!(classify_sync(&status(2, 3, true)), SyncState::Diverged);
        assert_eq!(classify_sync(&status(0, 0, false)), SyncState::NoRemote);
    }

    #[test]
    fn test_issue_number_extraction() {
        assert_eq!(issue_number_from_branch("feature/issue-123-login"), Some(123));
        assert_eq!(issue_number_from_branch("bugfix/issue-5-login"), Some(5));
        assert_eq!(issue_number_from_branch("feature/login"), None);
        assert_eq!(issue_number_from_branch("feature/issue-x-login"), None);
    }

    #[test]
    fn test_recommendation_ranking() {
        let ws = compose_work_status(
            Some("feature/issue-9-x".to_string()),
            SyncState::Behind,
            3,
            0,
            Some(10.0),
            Some(30.0),
            Some(9),
            true,
        );
        let actions: Vec<_> = ws.recommendations.iter().map(|r| r.action).collect();
        // Commit outranks pull; the trailing low-priority actions stay last.
        assert_eq!(
            actions,
            vec![
                RecommendedAction::Commit,
                RecommendedAction::Pull,
                RecommendedAction::Test,
                RecommendedAction::UpdateIssue,
                RecommendedAction::UpdateStatus,
            ]
        );
        assert!(ws.is_stale);
        assert!(ws.is_long_running);
    }

    #[test]
    fn test_clean_tree_has_no_commit_recommendation() {
        let ws = compose_work_status(
            Some("feature/x".to_string()),
            SyncState::UpToDate,
            0,
            0,
            Some(1.0),
            Some(0.5),
            None,
            true,
        );
        assert!(ws.recommendations.is_empty());
        assert!(!ws.is_stale);
        assert!(!ws.is_long_running);
    }

    #[test]
    fn test_diverged_recommends_sync() {
        let ws = compose_work_status(
            Some("feature/x".to_string()),
            SyncState::Diverged,
            0,
            2,
            None,
            None,
            None,
            false,
        );
        let actions: Vec<_> = ws.recommendations.iter().map(|r| r.action).collect();
        assert_eq!(actions, vec![RecommendedAction::Sync]);
        assert_eq!(ws.recommendations[0].priority, Priority::High);
    }

    #[test]
    fn test_detect_test_runner_cargo() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\nname=\"x\"\n").unwrap();
        let runner = detect_test_runner(dir.path()).unwrap();
        assert_eq!(runner.kind, "cargo");
        assert_eq!(runner.run_cmd, "cargo test");
    }

    #[test]
    fn test_detect_test_runner_npm_requires_script() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{\"name\":\"x\"}").unwrap();
        assert!(detect_test_runner(dir.path()).is_none());

        std::fs::write(
            dir.path().join("package.json"),
            "{\"scripts\":{\"test\":\"jest\"}}",
        )
        .unwrap();
        let runner = detect_test_runner(dir.path()).unwrap();
        assert_eq!(runner.kind, "npm");
    }

    #[test]
    fn test_detect_test_runner_make() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Makefile"), "build:\n\tcc main.c\n\ntest:\n\t./run\n")
            .unwrap();
        let runner = detect_test_runner(dir.path()).unwrap();
        assert_eq!(runner.kind, "make");
    }

    #[test]
    fn test_detect_test_runner_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(detect_test_runner(dir.path()).is_none());
    }

    #[test]
    fn test_is_writable_probe() {
        let dir = tempfile::tempdir().unwrap();
        assert!(is_writable(dir.path()));
        // The probe file must not linger.
        assert!(!dir.path().join(".teamflow-write-probe").exists());
    }
}
