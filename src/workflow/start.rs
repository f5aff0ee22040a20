//! Start phase: begin a new piece of work.
//!
//! `Idle → CheckRepo → CheckClean → ChooseWorkType → ChooseIssue →
//! BuildBranchPlan → ScanConflicts → CreateBranch → NotifyTeam → Done`.
//!
//! A backup is taken before the first mutating step. The new branch is
//! always cut from the repository default branch unless the operator
//! explicitly confirms the current branch as base.

use std::collections::HashMap;

use super::prompt::Prompter;
use super::{PhaseContext, PhaseResult};
use crate::integrations::NotificationMessage;
use crate::recovery::classify_git;
use crate::security::validators;

/// Abort reason when the tree is dirty and the user declines stashing.
pub const DIRTY_TREE: &str = "DIRTY_TREE";

/// Category of work, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkType {
    Feature,
    Bugfix,
    Hotfix,
    Docs,
    Refactor,
    Test,
    Chore,
}

impl WorkType {
    /// All work types, in menu order.
    pub const ALL: [WorkType; 7] = [
        Self::Feature,
        Self::Bugfix,
        Self::Hotfix,
        Self::Docs,
        Self::Refactor,
        Self::Test,
        Self::Chore,
    ];

    /// Display name shown in menus.
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Feature => "機能開発",
            Self::Bugfix => "バグ修正",
            Self::Hotfix => "緊急修正",
            Self::Docs => "ドキュメント",
            Self::Refactor => "リファクタリング",
            Self::Test => "テスト",
            Self::Chore => "雑務",
        }
    }

    /// Branch name prefix.
    pub const fn branch_prefix(&self) -> &'static str {
        match self {
            Self::Feature => "feature/",
            Self::Bugfix => "bugfix/",
            Self::Hotfix => "hotfix/",
            Self::Docs => "docs/",
            Self::Refactor => "refactor/",
            Self::Test => "test/",
            Self::Chore => "chore/",
        }
    }

    /// One-line help blurb.
    pub const fn blurb(&self) -> &'static str {
        match self {
            Self::Feature => "新しい機能の追加",
            Self::Bugfix => "既存の不具合の修正",
            Self::Hotfix => "本番環境の緊急対応",
            Self::Docs => "ドキュメントの追加・更新",
            Self::Refactor => "動作を変えない内部改善",
            Self::Test => "テストの追加・改善",
            Self::Chore => "ビルド設定などの雑務",
        }
    }

    /// Conventional-commits type used for commits of this work.
    pub const fn commit_type(&self) -> &'static str {
        match self {
            Self::Feature => "feat",
            Self::Bugfix | Self::Hotfix => "fix",
            Self::Docs => "docs",
            Self::Refactor => "refactor",
            Self::Test => "test",
            Self::Chore => "chore",
        }
    }
}

/// Planned branch for a piece of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchPlan {
    pub work_type: WorkType,
    pub issue_number: Option<u64>,
    pub slug: String,
    pub full_name: String,
}

impl BranchPlan {
    /// Derive a plan from the work type, optional issue, and a short title.
    ///
    /// The slug keeps lower-case ASCII alphanumerics and dashes, at most 30
    /// characters; a title with nothing usable falls back to `work`.
    pub fn new(work_type: WorkType, issue_number: Option<u64>, title: &str) -> Self {
        let slug = slugify(title);
        let issue_part = issue_number.map(|n| format!("issue-{n}-")).unwrap_or_default();
        let full_name = format!("{}{}{}", work_type.branch_prefix(), issue_part, slug);
        Self { work_type, issue_number, slug, full_name }
    }

    /// Validate the derived name against the branch rules.
    pub fn validate(&self) -> Result<(), String> {
        validators::validate_branch_name(&self.full_name).into_result().map(|_| ())
    }
}

/// Reduce a free-form title to a branch slug.
fn slugify(title: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = true; // suppress leading dash
    for c in title.trim().chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
        if slug.len() >= 30 {
            break;
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "work".to_string()
    } else {
        slug
    }
}

/// Run the Start phase.
pub fn run_start(ctx: &mut PhaseContext<'_>, prompter: &mut dyn Prompter) -> PhaseResult {
    ctx.logger.info("start phase: begin");

    // CheckRepo
    if !ctx.git.is_repository() {
        return PhaseResult::failed("NOT_GIT_REPOSITORY")
            .with_message("Gitリポジトリ内で実行してください".to_string());
    }

    // CheckClean
    let status = match ctx.git.status() {
        Ok(s) => s,
        Err(e) => {
            let c = classify_git(&e);
            ctx.handler.handle(c, &e.to_string());
            return PhaseResult::failed(e.tag());
        }
    };
    if !status.is_clean() {
        let message = format!(
            "作業ツリーに {} 件の未コミットの変更があります。スタッシュして続行しますか?",
            status.uncommitted_count()
        );
        match prompter.confirm(&message) {
            Some(true) => {
                if let Err(e) = ctx.git.stash_push("teamflow: start") {
                    let c = classify_git(&e);
                    ctx.handler.handle(c, &e.to_string());
                    return PhaseResult::failed(e.tag());
                }
                ctx.logger.info("start phase: stashed working tree");
            }
            Some(false) => return PhaseResult::aborted(DIRTY_TREE),
            None => return PhaseResult::aborted("USER_CANCELLED"),
        }
    }

    // ChooseWorkType
    let options: Vec<String> = WorkType::ALL
        .iter()
        .map(|w| format!("{} — {}", w.display_name(), w.blurb()))
        .collect();
    let Some(index) = prompter.select("作業の種類を選択してください", &options) else {
        return PhaseResult::aborted("USER_CANCELLED");
    };
    let work_type = WorkType::ALL[index];

    // ChooseIssue
    let (issue_number, title) = match choose_issue(ctx, prompter) {
        IssueChoice::Picked { number, title } => (Some(number), title),
        IssueChoice::None { title } => (None, title),
        IssueChoice::Cancelled => return PhaseResult::aborted("USER_CANCELLED"),
        IssueChoice::Failed(reason) => return PhaseResult::failed(reason),
    };

    // BuildBranchPlan
    let plan = BranchPlan::new(work_type, issue_number, &title);
    if let Err(error) = plan.validate() {
        return PhaseResult::failed("INVALID_BRANCH_NAME").with_message(error);
    }

    // Collision with an existing local branch: offer switching instead.
    if ctx.git.branch_exists(&plan.full_name) {
        let message =
            format!("ブランチ {} は既に存在します。切り替えますか?", plan.full_name);
        match prompter.confirm(&message) {
            Some(true) => {
                if let Err(e) = ctx.git.checkout(&plan.full_name) {
                    let c = classify_git(&e);
                    ctx.handler.handle(c, &e.to_string());
                    return PhaseResult::failed(e.tag());
                }
                return PhaseResult::completed()
                    .with_branch(plan.full_name.clone())
                    .with_message("既存のブランチに切り替えました".to_string());
            }
            _ => return PhaseResult::aborted("BRANCH_EXISTS"),
        }
    }

    // A remote branch already claiming the issue requires explicit consent.
    if let Some(number) = issue_number {
        let marker = format!("issue-{number}-");
        let claimed = ctx
            .git
            .remote_branches()
            .unwrap_or_default()
            .into_iter()
            .find(|b| b.contains(&marker));
        if let Some(existing) = claimed {
            let message = format!(
                "Issue #{number} のリモートブランチ {existing} が既に存在します。それでも新しいブランチを作成しますか?"
            );
            if prompter.confirm(&message) != Some(true) {
                return PhaseResult::aborted("ISSUE_ALREADY_CLAIMED");
            }
        }
    }

    // ScanConflicts: show files other active branches already touch.
    let overlaps = scan_branch_overlaps(ctx);
    if !overlaps.is_empty() {
        for (file, branches) in &overlaps {
            ctx.logger.warn(&format!(
                "potential conflict: {file} is modified on {}",
                branches.join(", ")
            ));
            println!("注意: {file} は {} でも変更されています", branches.join(", "));
        }
    }

    // Base selection: default branch unless explicitly confirmed otherwise.
    let base = match choose_base(ctx, prompter, &status.current_branch) {
        Some(base) => base,
        None => return PhaseResult::aborted("USER_CANCELLED"),
    };

    // Backup before the first mutation.
    if let Err(e) = ctx.backups.create_full("start", Some(ctx.git)) {
        ctx.logger.warn(&format!("backup before start failed: {e}"));
    }

    // CreateBranch
    if let Err(e) = ctx.git.create_and_switch(&plan.full_name, &base) {
        let c = classify_git(&e);
        ctx.handler.handle(c, &e.to_string());
        return PhaseResult::failed(e.tag());
    }
    ctx.logger.info(&format!("created branch {} from {base}", plan.full_name));

    // NotifyTeam
    if ctx.notifier.is_configured() {
        let user = ctx.gateway.user().to_string();
        let user = if user.is_empty() { "誰か".to_string() } else { user };
        let issue_title = issue_number.map(|n| format!("#{n} {title}"));
        let message =
            NotificationMessage::work_started(&user, &plan.full_name, issue_title.as_deref());
        ctx.notifier.send_all(&message);
    }

    let mut result = PhaseResult::completed()
        .with_branch(plan.full_name.clone())
        .with_message(format!("ブランチ {} を作成しました", plan.full_name));
    result.artifacts.issue = issue_number;
    result
}

enum IssueChoice {
    Picked { number: u64, title: String },
    None { title: String },
    Cancelled,
    Failed(String),
}

/// Ask which issue the work belongs to, creating one on request.
fn choose_issue(ctx: &mut PhaseContext<'_>, prompter: &mut dyn Prompter) -> IssueChoice {
    if !ctx.gateway.is_available() {
        ctx.logger.warn("github gateway unavailable; starting without an issue");
        match prompter.input("作業内容を一言で入力してください") {
            Some(title) if !title.trim().is_empty() => IssueChoice::None { title },
            Some(_) => IssueChoice::Cancelled,
            None => IssueChoice::Cancelled,
        }
    } else {
        let options = vec![
            "既存のIssueから選択".to_string(),
            "新しいIssueを作成".to_string(),
            "Issueなしで開始".to_string(),
        ];
        match prompter.select("Issueの扱いを選択してください", &options) {
            Some(0) => pick_existing_issue(ctx, prompter),
            Some(1) => create_new_issue(ctx, prompter),
            Some(2) => match prompter.input("作業内容を一言で入力してください") {
                Some(title) if !title.trim().is_empty() => IssueChoice::None { title },
                _ => IssueChoice::Cancelled,
            },
            _ => IssueChoice::Cancelled,
        }
    }
}

fn pick_existing_issue(ctx: &mut PhaseContext<'_>, prompter: &mut dyn Prompter) -> IssueChoice {
    let issues = match ctx.gateway.list_open_issues() {
        Ok(issues) => issues,
        Err(e) => {
            let c = crate::recovery::classify_gateway(&e);
            ctx.handler.handle(c, &e.to_string());
            return IssueChoice::Failed(e.tag().to_string());
        }
    };
    if issues.is_empty() {
        println!("オープンなIssueがありません。");
        return match prompter.input("作業内容を一言で入力してください") {
            Some(title) if !title.trim().is_empty() => IssueChoice::None { title },
            _ => IssueChoice::Cancelled,
        };
    }

    let options: Vec<String> =
        issues.iter().map(|i| format!("#{} {}", i.number, i.title)).collect();
    match prompter.select("Issueを選択してください", &options) {
        Some(index) => IssueChoice::Picked {
            number: issues[index].number,
            title: issues[index].title.clone(),
        },
        None => IssueChoice::Cancelled,
    }
}

fn create_new_issue(ctx: &mut PhaseContext<'_>, prompter: &mut dyn Prompter) -> IssueChoice {
    let Some(title) = prompter.input("新しいIssueのタイトル") else {
        return IssueChoice::Cancelled;
    };
    if title.trim().is_empty() {
        return IssueChoice::Cancelled;
    }
    let body = prompter.input("Issueの説明 (省略可)").unwrap_or_default();
    let body = if body.trim().is_empty() { None } else { Some(body.as_str()) };

    match ctx.gateway.create_issue(title.trim(), body, &[]) {
        Ok(issue) => {
            println!("Issue #{} を作成しました: {}", issue.number, issue.html_url);
            IssueChoice::Picked { number: issue.number, title: issue.title }
        }
        Err(e) => {
            let c = crate::recovery::classify_gateway(&e);
            ctx.handler.handle(c, &e.to_string());
            IssueChoice::Failed(e.tag().to_string())
        }
    }
}

/// Decide the base branch for the new branch.
fn choose_base(
    ctx: &mut PhaseContext<'_>,
    prompter: &mut dyn Prompter,
    current: &Option<String>,
) -> Option<String> {
    let default = ctx.config.default_branch.clone();
    match current.as_deref() {
        Some(branch) if branch != default => {
            let message = format!(
                "現在 {branch} 上にいます。既定では {default} から分岐します。{branch} を起点にしますか?"
            );
            match prompter.confirm(&message)? {
                true => Some(branch.to_string()),
                false => Some(default),
            }
        }
        _ => Some(default),
    }
}

/// Files modified on more than one active branch relative to the default.
fn scan_branch_overlaps(ctx: &mut PhaseContext<'_>) -> Vec<(String, Vec<String>)> {
    let default = &ctx.config.default_branch;
    let branches: Vec<String> = ctx
        .git
        .local_branches()
        .unwrap_or_default()
        .into_iter()
        .filter(|b| b != default)
        .collect();

    let mut by_file: HashMap<String, Vec<String>> = HashMap::new();
    for branch in &branches {
        if let Ok(files) = ctx.git.diff_branches(default, branch) {
            for file in files {
                by_file.entry(file).or_default().push(branch.clone());
            }
        }
    }

    let mut overlaps: Vec<(String, Vec<String>)> =
        by_file.into_iter().filter(|(_, branches)| branches.len() > 1).collect();
    overlaps.sort_by(|a, b| a.0.cmp(&b.0));
    overlaps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_type_table() {
        assert_eq!(WorkType::Feature.branch_prefix(), "feature/");
        assert_eq!(WorkType::Bugfix.branch_prefix(), "bugfix/");
        assert_eq!(WorkType::Hotfix.commit_type(), "fix");
        for w in WorkType::ALL {
            assert!(!w.display_name().is_empty());
            assert!(!w.blurb().is_empty());
            assert!(w.branch_prefix().ends_with('/'));
        }
    }

    #[test]
    fn test_slugify_ascii() {
        assert_eq!(slugify("Add User Login"), "add-user-login");
        assert_eq!(slugify("  fix:   broken  CI!  "), "fix-broken-ci");
        assert_eq!(slugify("UPPER_case_123"), "upper-case-123");
    }

    #[test]
    fn test_slugify_bounds_and_fallback() {
        let long = slugify(&"a very long branch title that keeps going forever".repeat(2));
        assert!(long.len() <= 30, "len: {}", long.len());
        assert!(!long.ends_with('-'));

        // A title with no usable characters falls back.
        assert_eq!(slugify("ユーザープロファイル機能"), "work");
        assert_eq!(slugify("!!!"), "work");
    }

    #[test]
    fn test_branch_plan_derivation() {
        let plan = BranchPlan::new(WorkType::Feature, Some(123), "ユーザープロファイル機能");
        assert!(plan.full_name.starts_with("feature/"));
        assert!(plan.full_name.contains("issue-123-"));
        assert!(plan.slug.len() <= 30);
        assert!(plan
            .slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        plan.validate().unwrap();
    }

    #[test]
    fn test_branch_plan_without_issue() {
        let plan = BranchPlan::new(WorkType::Bugfix, None, "login fails on empty password");
        assert_eq!(plan.full_name, format!("bugfix/{}", plan.slug));
        assert!(!plan.full_name.contains("issue-"));
        plan.validate().unwrap();
    }

    #[test]
    fn test_branch_plan_full_name_invariant() {
        let plan = BranchPlan::new(WorkType::Hotfix, Some(7), "crash");
        assert_eq!(
            plan.full_name,
            format!("{}issue-7-{}", WorkType::Hotfix.branch_prefix(), plan.slug)
        );
    }
}
