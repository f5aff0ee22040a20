//! Git integration module.
//!
//! A narrow, timeout-bounded surface over the `git` binary. Every operation
//! is bounded by a wall clock (default 30 seconds) and maps process output to
//! tagged domain errors; nothing outside this module spawns `git`.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Tagged Git operation error.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("merge conflict: {0}")]
    MergeConflict(String),

    #[error("not a git repository")]
    NotGitRepository,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("remote not found: {0}")]
    RemoteNotFound(String),

    #[error("branch not found: {0}")]
    BranchNotFound(String),

    #[error("nothing to commit")]
    NothingToCommit,

    #[error("uncommitted changes would be overwritten: {0}")]
    UncommittedChanges(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("push rejected: {0}")]
    PushRejected(String),

    #[error("git operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("git error: {0}")]
    Unknown(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GitError {
    /// Stable tag used by the error classifier.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::MergeConflict(_) => "MERGE_CONFLICT",
            Self::NotGitRepository => "NOT_GIT_REPOSITORY",
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::RemoteNotFound(_) => "REMOTE_NOT_FOUND",
            Self::BranchNotFound(_) => "BRANCH_NOT_FOUND",
            Self::NothingToCommit => "NOTHING_TO_COMMIT",
            Self::UncommittedChanges(_) => "UNCOMMITTED_CHANGES",
            Self::AuthFailed(_) => "AUTH_FAILED",
            Self::NetworkError(_) | Self::Timeout(_) => "NETWORK_ERROR",
            Self::PushRejected(_) => "PUSH_REJECTED",
            Self::Unknown(_) | Self::Io(_) => "UNKNOWN_GIT_ERROR",
        }
    }
}

/// Result type for Git operations.
pub type GitResult<T> = Result<T, GitError>;

/// Per-file change classification, as reported by `git status --porcelain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Modified,
    Added,
    Deleted,
    Renamed,
    Untracked,
    Conflicted,
}

impl ChangeKind {
    /// Short status tag, matching Git's porcelain vocabulary.
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Modified => "M",
            Self::Added => "A",
            Self::Deleted => "D",
            Self::Renamed => "R",
            Self::Untracked => "??",
            Self::Conflicted => "UU",
        }
    }
}

/// One changed file in the working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    pub path: String,
    pub kind: ChangeKind,
    /// Whether the change is in the index (staged).
    pub staged: bool,
}

/// Snapshot of the repository state. Never cached across operations.
#[derive(Debug, Clone, Default)]
pub struct GitStatus {
    /// Current branch; `None` on a detached HEAD.
    pub current_branch: Option<String>,
    pub ahead: usize,
    pub behind: usize,
    pub staged: Vec<String>,
    pub modified: Vec<String>,
    pub untracked: Vec<String>,
    pub conflicted: Vec<String>,
    pub has_remote_origin: bool,
    /// Upstream tracking ref, e.g. `origin/main`.
    pub tracking: Option<String>,
}

impl GitStatus {
    /// Whether the working tree has no pending changes.
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty()
            && self.modified.is_empty()
            && self.untracked.is_empty()
            && self.conflicted.is_empty()
    }

    /// Count of uncommitted entries (staged + unstaged + untracked).
    pub fn uncommitted_count(&self) -> usize {
        self.staged.len() + self.modified.len() + self.untracked.len() + self.conflicted.len()
    }
}

/// One commit, as listed by the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub hash: String,
    pub subject: String,
    pub author: String,
    pub time: Option<DateTime<Utc>>,
}

/// Timeout-bounded Git adapter rooted at one working directory.
#[derive(Debug, Clone)]
pub struct GitAdapter {
    root: PathBuf,
    timeout: Duration,
}

impl GitAdapter {
    /// Create an adapter with the default 30-second bound.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), timeout: Duration::from_secs(30) }
    }

    /// Override the per-operation wall clock.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Working directory this adapter operates on.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ------------------------------------------------------------------
    // Process plumbing
    // ------------------------------------------------------------------

    /// Run `git` with the given arguments, bounded by the adapter timeout.
    ///
    /// Output is drained on separate threads so a chatty command cannot
    /// deadlock on a full pipe while we poll for exit.
    fn run(&self, args: &[&str]) -> GitResult<ProcessOutput> {
        tracing::debug!(?args, dir = %self.root.display(), "running git");

        let mut child = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdout_pipe = child.stdout.take().expect("stdout piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr piped");
        let stdout_thread = std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buf);
            buf
        });
        let stderr_thread = std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf);
            buf
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait()? {
                Some(status) => break status,
                None => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(GitError::Timeout(self.timeout));
                    }
                    std::thread::sleep(Duration::from_millis(20));
                }
            }
        };

        let stdout = String::from_utf8_lossy(&stdout_thread.join().unwrap_or_default()).to_string();
        let stderr = String::from_utf8_lossy(&stderr_thread.join().unwrap_or_default()).to_string();

        Ok(ProcessOutput { success: status.success(), stdout, stderr })
    }

    /// Run `git` and map a failure exit to a tagged error.
    fn run_checked(&self, args: &[&str]) -> GitResult<String> {
        let output = self.run(args)?;
        if output.success {
            Ok(output.stdout)
        } else {
            tracing::warn!(?args, stderr = %output.stderr.trim(), "git command failed");
            Err(map_stderr(&output.stderr))
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Whether `root` is inside a Git work tree.
    pub fn is_repository(&self) -> bool {
        self.run(&["rev-parse", "--is-inside-work-tree"])
            .map(|o| o.success && o.stdout.trim() == "true")
            .unwrap_or(false)
    }

    /// Current branch name; `None` on a detached HEAD.
    pub fn current_branch(&self) -> GitResult<Option<String>> {
        let out = self.run_checked(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim();
        if name == "HEAD" {
            Ok(None)
        } else {
            Ok(Some(name.to_string()))
        }
    }

    /// Whether HEAD is detached.
    pub fn is_detached(&self) -> bool {
        matches!(self.current_branch(), Ok(None))
    }

    /// Full status snapshot.
    pub fn status(&self) -> GitResult<GitStatus> {
        let porcelain = self.run_checked(&["status", "--porcelain=v1", "--branch"])?;
        let mut status = parse_porcelain(&porcelain);
        status.has_remote_origin = self.has_remote_origin();
        Ok(status)
    }

    /// Whether a remote named `origin` is configured.
    pub fn has_remote_origin(&self) -> bool {
        self.run(&["remote"])
            .map(|o| o.success && o.stdout.lines().any(|l| l.trim() == "origin"))
            .unwrap_or(false)
    }

    /// URL of a named remote.
    pub fn remote_url(&self, name: &str) -> GitResult<String> {
        let out = self.run_checked(&["remote", "get-url", name])?;
        Ok(out.trim().to_string())
    }

    /// Probe whether a remote answers at all, bounded by the adapter
    /// timeout.
    pub fn remote_reachable(&self, name: &str) -> bool {
        self.run(&["ls-remote", "--exit-code", name, "HEAD"])
            .map(|o| o.success)
            .unwrap_or(false)
    }

    /// Local branch names.
    pub fn local_branches(&self) -> GitResult<Vec<String>> {
        let out = self.run_checked(&["branch", "--format=%(refname:short)"])?;
        Ok(out.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect())
    }

    /// Remote branch names, without the remote prefix.
    pub fn remote_branches(&self) -> GitResult<Vec<String>> {
        let out = self.run_checked(&["branch", "-r", "--format=%(refname:short)"])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.contains("HEAD"))
            .map(|l| l.split_once('/').map_or(l, |(_, rest)| rest).to_string())
            .collect())
    }

    /// Whether a local branch exists.
    pub fn branch_exists(&self, branch: &str) -> bool {
        self.run(&["rev-parse", "--verify", "--quiet", &format!("refs/heads/{branch}")])
            .map(|o| o.success)
            .unwrap_or(false)
    }

    /// Whether a remote-tracking branch exists on `origin`.
    pub fn remote_branch_exists(&self, branch: &str) -> bool {
        self.run(&["rev-parse", "--verify", "--quiet", &format!("refs/remotes/origin/{branch}")])
            .map(|o| o.success)
            .unwrap_or(false)
    }

    /// Changed files in the working tree with per-file status tags.
    pub fn changed_files(&self) -> GitResult<Vec<ChangedFile>> {
        let out = self.run_checked(&["status", "--porcelain=v1"])?;
        Ok(parse_changed_files(&out))
    }

    /// A repository configuration value, when set.
    pub fn config_value(&self, key: &str) -> Option<String> {
        self.run(&["config", "--get", key])
            .ok()
            .filter(|o| o.success)
            .map(|o| o.stdout.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Most recent commit on HEAD.
    pub fn last_commit(&self) -> GitResult<Option<CommitInfo>> {
        let out = self.run(&["log", "-1", "--format=%H%x1f%s%x1f%an%x1f%aI"])?;
        if !out.success {
            return Ok(None);
        }
        Ok(parse_commit_lines(&out.stdout).into_iter().next())
    }

    /// Most recent commit on an arbitrary ref.
    pub fn last_commit_on(&self, reference: &str) -> GitResult<Option<CommitInfo>> {
        let out = self.run(&["log", "-1", "--format=%H%x1f%s%x1f%an%x1f%aI", reference])?;
        if !out.success {
            return Ok(None);
        }
        Ok(parse_commit_lines(&out.stdout).into_iter().next())
    }

    /// Commits reachable from HEAD but not from `reference`.
    pub fn commits_since(&self, reference: &str) -> GitResult<Vec<CommitInfo>> {
        let range = format!("{reference}..HEAD");
        let out = self.run_checked(&["log", &range, "--format=%H%x1f%s%x1f%an%x1f%aI"])?;
        Ok(parse_commit_lines(&out))
    }

    /// (ahead, behind) relative to the upstream; (0, 0) without an upstream.
    pub fn ahead_behind(&self) -> (usize, usize) {
        let out = match self.run(&["rev-list", "--left-right", "--count", "@{upstream}...HEAD"]) {
            Ok(o) if o.success => o.stdout,
            _ => return (0, 0),
        };
        let mut parts = out.split_whitespace();
        let behind = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0);
        let ahead = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0);
        (ahead, behind)
    }

    /// Author time of the first commit unique to `branch` relative to `base`.
    ///
    /// Falls back to the last commit time when the branch carries no own
    /// commits yet.
    pub fn branch_created_at(&self, branch: &str, base: &str) -> GitResult<Option<DateTime<Utc>>> {
        let range = format!("{base}..{branch}");
        let out = self.run(&["log", &range, "--reverse", "--format=%aI"])?;
        if out.success {
            if let Some(first) = out.stdout.lines().find(|l| !l.trim().is_empty()) {
                return Ok(parse_timestamp(first));
            }
        }
        Ok(self.last_commit()?.and_then(|c| c.time))
    }

    /// Files differing between two branches (names only).
    pub fn diff_branches(&self, a: &str, b: &str) -> GitResult<Vec<String>> {
        let range = format!("{a}...{b}");
        let out = self.run_checked(&["diff", "--name-only", &range])?;
        Ok(out.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect())
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Stage specific paths.
    pub fn stage(&self, paths: &[String]) -> GitResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["add", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.run_checked(&args)?;
        Ok(())
    }

    /// Stage everything, including deletions and untracked files.
    pub fn stage_all(&self) -> GitResult<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// Create a commit; returns the new commit hash.
    pub fn commit(&self, message: &str) -> GitResult<String> {
        let output = self.run(&["commit", "-m", message])?;
        if !output.success {
            let combined = format!("{}{}", output.stdout, output.stderr);
            if combined.contains("nothing to commit") || combined.contains("nothing added") {
                return Err(GitError::NothingToCommit);
            }
            return Err(map_stderr(&output.stderr));
        }
        let hash = self.run_checked(&["rev-parse", "HEAD"])?;
        Ok(hash.trim().to_string())
    }

    /// Commit message autogenerated from the working tree when the user
    /// supplies none.
    pub fn auto_commit_message(&self) -> GitResult<String> {
        let files = self.changed_files()?;
        Ok(compose_auto_message(&files))
    }

    /// Push the branch to `origin`.
    ///
    /// The first attempt uses the plain form; when Git fails for a reason the
    /// mapper cannot classify, a second attempt pushes the explicit refspec
    /// directly, which sidesteps misconfigured push defaults.
    pub fn push(&self, branch: &str, set_upstream: bool) -> GitResult<()> {
        let first = if set_upstream {
            self.run(&["push", "--set-upstream", "origin", branch])?
        } else {
            self.run(&["push", "origin", branch])?
        };
        if first.success {
            return Ok(());
        }

        let error = map_push_stderr(&first.stderr);
        if !matches!(error, GitError::Unknown(_)) {
            return Err(error);
        }

        tracing::warn!(branch, "plain push failed, retrying with explicit refspec");
        let refspec = format!("{branch}:refs/heads/{branch}");
        let second = self.run(&["push", "origin", &refspec])?;
        if second.success {
            Ok(())
        } else {
            Err(map_push_stderr(&second.stderr))
        }
    }

    /// Pull the current branch from its upstream.
    pub fn pull(&self) -> GitResult<()> {
        self.run_checked(&["pull"])?;
        Ok(())
    }

    /// Fetch from `origin`, pruning removed refs.
    pub fn fetch(&self) -> GitResult<()> {
        self.run_checked(&["fetch", "--prune", "origin"])?;
        Ok(())
    }

    /// Merge a branch into the current one.
    pub fn merge(&self, branch: &str) -> GitResult<()> {
        self.run_checked(&["merge", branch])?;
        Ok(())
    }

    /// Rebase the current branch onto another.
    pub fn rebase(&self, onto: &str) -> GitResult<()> {
        self.run_checked(&["rebase", onto])?;
        Ok(())
    }

    /// Abort an in-progress rebase. Missing rebase state is not an error.
    pub fn rebase_abort(&self) -> GitResult<()> {
        let out = self.run(&["rebase", "--abort"])?;
        if out.success || out.stderr.contains("no rebase in progress") {
            Ok(())
        } else {
            Err(map_stderr(&out.stderr))
        }
    }

    /// Stash the working tree with a message.
    pub fn stash_push(&self, message: &str) -> GitResult<()> {
        self.run_checked(&["stash", "push", "--include-untracked", "-m", message])?;
        Ok(())
    }

    /// Pop the most recent stash entry.
    pub fn stash_pop(&self) -> GitResult<()> {
        self.run_checked(&["stash", "pop"])?;
        Ok(())
    }

    /// List stash entries.
    pub fn stash_list(&self) -> GitResult<Vec<String>> {
        let out = self.run_checked(&["stash", "list", "--format=%gs"])?;
        Ok(out.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect())
    }

    /// Switch to an existing branch.
    pub fn checkout(&self, branch: &str) -> GitResult<()> {
        self.run_checked(&["checkout", branch])?;
        Ok(())
    }

    /// Create a branch from `base` and switch to it.
    pub fn create_and_switch(&self, branch: &str, base: &str) -> GitResult<()> {
        self.run_checked(&["checkout", "-b", branch, base])?;
        Ok(())
    }

    /// Delete a merged local branch. Refuses to delete the current branch.
    pub fn delete_branch(&self, branch: &str) -> GitResult<()> {
        if self.current_branch()?.as_deref() == Some(branch) {
            return Err(GitError::Unknown(format!(
                "refusing to delete the current branch '{branch}'"
            )));
        }
        self.run_checked(&["branch", "-d", branch])?;
        Ok(())
    }
}

/// Captured output of one `git` invocation.
#[derive(Debug)]
struct ProcessOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

// ----------------------------------------------------------------------
// Parsing and mapping
// ----------------------------------------------------------------------

/// Map a failed invocation's stderr to a tagged error.
fn map_stderr(stderr: &str) -> GitError {
    let text = stderr.trim().to_string();
    let lower = text.to_lowercase();

    if lower.contains("not a git repository") {
        GitError::NotGitRepository
    } else if lower.contains("conflict") || lower.contains("needs merge") || lower.contains("unmerged")
    {
        GitError::MergeConflict(text)
    } else if lower.contains("permission denied") && !lower.contains("publickey") {
        GitError::PermissionDenied(text)
    } else if lower.contains("repository not found")
        || lower.contains("could not read from remote repository")
        || lower.contains("does not appear to be a git repository")
    {
        GitError::RemoteNotFound(text)
    } else if lower.contains("did not match any")
        || lower.contains("unknown revision")
        || lower.contains("no such branch")
        || lower.contains("invalid reference")
    {
        GitError::BranchNotFound(text)
    } else if lower.contains("nothing to commit") {
        GitError::NothingToCommit
    } else if lower.contains("your local changes") || lower.contains("would be overwritten") {
        GitError::UncommittedChanges(text)
    } else if lower.contains("authentication failed")
        || lower.contains("could not read username")
        || lower.contains("invalid credentials")
        || lower.contains("publickey")
    {
        GitError::AuthFailed(text)
    } else if lower.contains("could not resolve host")
        || lower.contains("unable to access")
        || lower.contains("connection timed out")
        || lower.contains("connection refused")
        || lower.contains("network is unreachable")
    {
        GitError::NetworkError(text)
    } else {
        GitError::Unknown(text)
    }
}

/// Push-specific mapping: distinguishes rejection from the generic cases.
fn map_push_stderr(stderr: &str) -> GitError {
    let lower = stderr.to_lowercase();
    if lower.contains("[rejected]") || lower.contains("non-fast-forward") || lower.contains("fetch first")
    {
        return GitError::PushRejected(stderr.trim().to_string());
    }
    map_stderr(stderr)
}

/// Parse `git status --porcelain=v1 --branch` output.
fn parse_porcelain(output: &str) -> GitStatus {
    let mut status = GitStatus::default();

    for line in output.lines() {
        if let Some(header) = line.strip_prefix("## ") {
            parse_branch_header(header, &mut status);
            continue;
        }
        if line.len() < 3 {
            continue;
        }
        let (code, path) = line.split_at(2);
        let path = path.trim().to_string();
        let index = code.as_bytes()[0] as char;
        let worktree = code.as_bytes()[1] as char;

        match (index, worktree) {
            ('?', '?') => status.untracked.push(path),
            ('U', _) | (_, 'U') | ('A', 'A') | ('D', 'D') => status.conflicted.push(path),
            (i, w) => {
                if i != ' ' {
                    status.staged.push(path.clone());
                }
                if w != ' ' {
                    status.modified.push(path);
                }
            }
        }
    }

    status
}

/// Parse the `## branch...upstream [ahead N, behind M]` header line.
fn parse_branch_header(header: &str, status: &mut GitStatus) {
    if header.starts_with("HEAD (no branch)") {
        status.current_branch = None;
        return;
    }

    let (names, counts) = match header.split_once(" [") {
        Some((n, c)) => (n, Some(c.trim_end_matches(']'))),
        None => (header, None),
    };

    match names.split_once("...") {
        Some((local, upstream)) => {
            status.current_branch = Some(local.to_string());
            status.tracking = Some(upstream.to_string());
        }
        None => {
            // "branchname" or "No commits yet on branchname"
            let name = names.strip_prefix("No commits yet on ").unwrap_or(names);
            status.current_branch = Some(name.to_string());
        }
    }

    if let Some(counts) = counts {
        for part in counts.split(", ") {
            if let Some(n) = part.strip_prefix("ahead ") {
                status.ahead = n.parse().unwrap_or(0);
            } else if let Some(n) = part.strip_prefix("behind ") {
                status.behind = n.parse().unwrap_or(0);
            }
        }
    }
}

/// Parse `git status --porcelain=v1` into per-file change records.
fn parse_changed_files(output: &str) -> Vec<ChangedFile> {
    let mut files = Vec::new();
    for line in output.lines() {
        if line.len() < 3 || line.starts_with("## ") {
            continue;
        }
        let (code, path) = line.split_at(2);
        // Renames are reported as "old -> new"; keep the new path.
        let path = path.trim();
        let path = path.split(" -> ").last().unwrap_or(path).to_string();
        let index = code.as_bytes()[0] as char;
        let worktree = code.as_bytes()[1] as char;

        let (kind, staged) = match (index, worktree) {
            ('?', '?') => (ChangeKind::Untracked, false),
            ('U', _) | (_, 'U') | ('A', 'A') | ('D', 'D') => (ChangeKind::Conflicted, false),
            ('R', _) => (ChangeKind::Renamed, true),
            ('A', _) => (ChangeKind::Added, true),
            ('D', _) => (ChangeKind::Deleted, true),
            (_, 'D') => (ChangeKind::Deleted, false),
            ('M', _) => (ChangeKind::Modified, true),
            (_, 'M') => (ChangeKind::Modified, false),
            _ => continue,
        };
        files.push(ChangedFile { path, kind, staged });
    }
    files
}

/// Compose the fallback commit message from working-tree counts.
fn compose_auto_message(files: &[ChangedFile]) -> String {
    let added =
        files.iter().filter(|f| matches!(f.kind, ChangeKind::Added | ChangeKind::Untracked)).count();
    let modified = files
        .iter()
        .filter(|f| matches!(f.kind, ChangeKind::Modified | ChangeKind::Renamed))
        .count();
    let deleted = files.iter().filter(|f| matches!(f.kind, ChangeKind::Deleted)).count();

    format!("Update: add {added} files, modify {modified} files, delete {deleted} files")
}

/// Parse `%H%x1f%s%x1f%an%x1f%aI` formatted log lines.
fn parse_commit_lines(output: &str) -> Vec<CommitInfo> {
    output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| {
            let mut parts = line.split('\u{1f}');
            let hash = parts.next()?.trim().to_string();
            if hash.is_empty() {
                return None;
            }
            let subject = parts.next().unwrap_or("").to_string();
            let author = parts.next().unwrap_or("").to_string();
            let time = parts.next().and_then(parse_timestamp);
            Some(CommitInfo { hash, subject, author, time })
        })
        .collect()
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim()).ok().map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_porcelain_clean() {
        let status = parse_porcelain("## main...origin/main\n");
        assert_eq!(status.current_branch.as_deref(), Some("main"));
        assert_eq!(status.tracking.as_deref(), Some("origin/main"));
        assert!(status.is_clean());
        assert_eq!((status.ahead, status.behind), (0, 0));
    }

    #[test]
    fn test_parse_porcelain_ahead_behind() {
        let status = parse_porcelain("## feature/x...origin/feature/x [ahead 2, behind 1]\n");
        assert_eq!(status.ahead, 2);
        assert_eq!(status.behind, 1);
    }

    #[test]
    fn test_parse_porcelain_changes() {
        let out = "## main\n M src/lib.rs\nM  src/main.rs\nA  new.rs\n?? notes.txt\nUU conflict.rs\n";
        let status = parse_porcelain(out);
        assert_eq!(status.modified, vec!["src/lib.rs"]);
        assert_eq!(status.staged, vec!["src/main.rs", "new.rs"]);
        assert_eq!(status.untracked, vec!["notes.txt"]);
        assert_eq!(status.conflicted, vec!["conflict.rs"]);
        assert_eq!(status.uncommitted_count(), 5);
        assert!(!status.is_clean());
    }

    #[test]
    fn test_parse_porcelain_detached() {
        let status = parse_porcelain("## HEAD (no branch)\n");
        assert!(status.current_branch.is_none());
    }

    #[test]
    fn test_parse_changed_files_tags() {
        let out = " M a.rs\nA  b.rs\n D c.rs\nR  old.rs -> new.rs\n?? d.txt\nUU e.rs\n";
        let files = parse_changed_files(out);
        let kinds: Vec<_> = files.iter().map(|f| (f.path.as_str(), f.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("a.rs", ChangeKind::Modified),
                ("b.rs", ChangeKind::Added),
                ("c.rs", ChangeKind::Deleted),
                ("new.rs", ChangeKind::Renamed),
                ("d.txt", ChangeKind::Untracked),
                ("e.rs", ChangeKind::Conflicted),
            ]
        );
        assert!(files[1].staged);
        assert!(!files[0].staged);
    }

    #[test]
    fn test_auto_commit_message() {
        let files = vec![
            ChangedFile { path: "a".into(), kind: ChangeKind::Untracked, staged: false },
            ChangedFile { path: "b".into(), kind: ChangeKind::Added, staged: true },
            ChangedFile { path: "c".into(), kind: ChangeKind::Modified, staged: false },
            ChangedFile { path: "d".into(), kind: ChangeKind::Deleted, staged: true },
        ];
        assert_eq!(
            compose_auto_message(&files),
            "Update: add 2 files, modify 1 files, delete 1 files"
        );
    }

    #[test]
    fn test_map_stderr_tags() {
        let cases = [
            ("fatal: not a git repository (or any parent)", "NOT_GIT_REPOSITORY"),
            ("CONFLICT (content): Merge conflict in a.txt", "MERGE_CONFLICT"),
            ("error: insufficient permission; Permission denied", "PERMISSION_DENIED"),
            ("fatal: repository not found", "REMOTE_NOT_FOUND"),
            ("error: pathspec 'x' did not match any file(s)", "BRANCH_NOT_FOUND"),
            ("nothing to commit, working tree clean", "NOTHING_TO_COMMIT"),
            ("error: Your local changes to the following files would be overwritten", "UNCOMMITTED_CHANGES"),
            ("fatal: Authentication failed for 'https://github.com/x/y'", "AUTH_FAILED"),
            ("fatal: unable to access 'https://github.com/x/y': Could not resolve host", "NETWORK_ERROR"),
            ("something unexpected happened", "UNKNOWN_GIT_ERROR"),
        ];
        for (stderr, tag) in cases {
            assert_eq!(map_stderr(stderr).tag(), tag, "stderr: {stderr}");
        }
    }

    #[test]
    fn test_map_push_stderr_distinguishes_rejection() {
        let rejected = "! [rejected] main -> main (non-fast-forward)";
        assert_eq!(map_push_stderr(rejected).tag(), "PUSH_REJECTED");

        let auth = "fatal: Authentication failed";
        assert_eq!(map_push_stderr(auth).tag(), "AUTH_FAILED");

        let net = "fatal: unable to access: Connection timed out";
        assert_eq!(map_push_stderr(net).tag(), "NETWORK_ERROR");
    }

    #[test]
    fn test_parse_commit_lines() {
        let out = "abc123\u{1f}feat: add login\u{1f}dev\u{1f}2024-03-01T10:00:00+09:00\nwithout-fields\n";
        let commits = parse_commit_lines(out);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].hash, "abc123");
        assert_eq!(commits[0].subject, "feat: add login");
        assert!(commits[0].time.is_some());
        assert_eq!(commits[1].subject, "");
    }

    #[test]
    fn test_error_tags_are_stable() {
        assert_eq!(GitError::NothingToCommit.tag(), "NOTHING_TO_COMMIT");
        assert_eq!(GitError::Timeout(Duration::from_secs(30)).tag(), "NETWORK_ERROR");
    }
}
