//! Finish phase: wrap up the current piece of work.
//!
//! `CheckOnNonDefault → ReviewChangedFiles → SelectFilesToStage →
//! ComposeCommitMessage → Commit → RunTests → Push → OpenPullRequest →
//! NotifyTeam → Done`. Refuses to run on the default branch; a branch name
//! carrying `issue-<N>-` links the pull request to its issue.

use super::continue_flow::compose_commit_message;
use super::prompt::Prompter;
use super::{PhaseContext, PhaseResult};
use crate::diagnosis::{self, issue_number_from_branch};
use crate::integrations::{GatewayError, NotificationMessage, ValidationKind};
use crate::recovery::{classify_gateway, classify_git};

/// Failure reason when Finish is invoked on the default branch.
pub const ON_DEFAULT_BRANCH: &str = "ON_DEFAULT_BRANCH";

const COMMIT_TYPES: &[(&str, &str)] = &[
    ("feat", "新機能"),
    ("fix", "バグ修正"),
    ("docs", "ドキュメント"),
    ("refactor", "リファクタリング"),
    ("test", "テスト"),
    ("chore", "雑務"),
];

/// Run the Finish phase.
pub fn run_finish(ctx: &mut PhaseContext<'_>, prompter: &mut dyn Prompter) -> PhaseResult {
    ctx.logger.info("finish phase: begin");

    if !ctx.git.is_repository() {
        return PhaseResult::failed("NOT_GIT_REPOSITORY")
            .with_message("Gitリポジトリ内で実行してください".to_string());
    }

    // CheckOnNonDefault: never finish work on main/master or the configured
    // default, before any staging or committing happens.
    let branch = match ctx.git.current_branch() {
        Ok(Some(branch)) => branch,
        Ok(None) => return PhaseResult::failed("DETACHED_HEAD").manual_action_required(),
        Err(e) => {
            let c = classify_git(&e);
            ctx.handler.handle(c, &e.to_string());
            return PhaseResult::failed(e.tag());
        }
    };
    if is_default_branch(&branch, &ctx.config.default_branch) {
        return PhaseResult::failed(ON_DEFAULT_BRANCH).with_message(format!(
            "{branch} 上では finish を実行できません。start で作業ブランチを作成してください"
        ));
    }

    // ReviewChangedFiles
    let files = match ctx.git.changed_files() {
        Ok(files) => files,
        Err(e) => {
            let c = classify_git(&e);
            ctx.handler.handle(c, &e.to_string());
            return PhaseResult::failed(e.tag());
        }
    };

    let status = ctx.git.status().unwrap_or_default();
    if files.is_empty() && status.ahead == 0 {
        return PhaseResult::aborted("NOTHING_TO_FINISH")
            .with_message("コミットもプッシュも不要です".to_string());
    }

    let mut committed = false;
    if !files.is_empty() {
        println!("変更されたファイル:");
        for file in &files {
            println!("  {:>2} {}", file.kind.tag(), file.path);
        }

        // SelectFilesToStage
        let options = vec![
            "すべてステージする".to_string(),
            "ファイルを個別に選択する".to_string(),
            "キャンセル".to_string(),
        ];
        let selected: Vec<String> = match prompter.select("ステージ方法を選択してください", &options)
        {
            Some(0) => files.iter().map(|f| f.path.clone()).collect(),
            Some(1) => {
                let mut picked = Vec::new();
                for file in &files {
                    match prompter.confirm(&format!("{} をステージしますか?", file.path)) {
                        Some(true) => picked.push(file.path.clone()),
                        Some(false) => {}
                        None => return PhaseResult::aborted("USER_CANCELLED"),
                    }
                }
                picked
            }
            _ => return PhaseResult::aborted("USER_CANCELLED"),
        };
        if selected.is_empty() && status.ahead == 0 {
            return PhaseResult::aborted("NOTHING_STAGED");
        }

        if !selected.is_empty() {
            // Backup before the first mutation of this phase.
            if let Err(e) = ctx.backups.create_incremental("finish", Some(ctx.git)) {
                ctx.logger.warn(&format!("backup before finish failed: {e}"));
            }

            if let Err(e) = ctx.git.stage(&selected) {
                let c = classify_git(&e);
                ctx.handler.handle(c, &e.to_string());
                return PhaseResult::failed(e.tag());
            }

            // ComposeCommitMessage
            let message = match compose_message(ctx, prompter) {
                Some(message) => message,
                None => return PhaseResult::aborted("USER_CANCELLED"),
            };

            match ctx.git.commit(&message) {
                Ok(hash) => {
                    ctx.logger.info(&format!("finish: committed {hash}"));
                    committed = true;
                }
                Err(e) => {
                    let c = classify_git(&e);
                    ctx.handler.handle(c, &e.to_string());
                    return PhaseResult::failed(e.tag());
                }
            }
        }
    }

    // RunTests (optional; failing tests need explicit consent to continue)
    if let Some(runner) = diagnosis::detect_test_runner(ctx.root) {
        if prompter.confirm(&format!("テストを実行しますか? ({})", runner.run_cmd)) == Some(true) {
            let passed = std::process::Command::new("sh")
                .arg("-c")
                .arg(runner.run_cmd)
                .current_dir(ctx.root)
                .status()
                .map(|s| s.success())
                .unwrap_or(false);
            if !passed {
                ctx.logger.warn("finish: tests failed");
                if prompter.confirm("テストが失敗しました。それでも続行しますか?") != Some(true) {
                    return PhaseResult::failed("TESTS_FAILED").manual_action_required();
                }
            }
        }
    }

    // Push
    let should_push = ctx.config.auto_push
        || prompter.confirm(&format!("{branch} をプッシュしますか?")) == Some(true);
    if !should_push {
        return PhaseResult::completed()
            .with_branch(branch)
            .with_message("プッシュせずに終了しました".to_string());
    }
    if let Err(e) = ctx.git.push(&branch, true) {
        let c = classify_git(&e);
        ctx.handler.handle(c, &e.to_string());
        return PhaseResult::failed(e.tag());
    }
    ctx.logger.info(&format!("finish: pushed {branch}"));

    // OpenPullRequest (optional)
    let mut pr_url = None;
    let should_pr = ctx.gateway.is_available()
        && (ctx.config.auto_pr
            || prompter.confirm("プルリクエストを作成しますか?") == Some(true));
    if should_pr {
        match open_pull_request(ctx, prompter, &branch) {
            PrOutcome::Created(url) => pr_url = Some(url),
            PrOutcome::Skipped(message) => println!("{message}"),
            PrOutcome::Cancelled => return PhaseResult::aborted("USER_CANCELLED"),
            PrOutcome::Failed(reason) => return PhaseResult::failed(reason),
        }
    }

    // NotifyTeam (optional)
    if ctx.notifier.is_configured() {
        let user = ctx.gateway.user().to_string();
        let user = if user.is_empty() { "誰か".to_string() } else { user };
        let message = NotificationMessage::work_finished(&user, &branch, pr_url.as_deref());
        ctx.notifier.send_all(&message);
    }

    let mut result = PhaseResult::completed().with_branch(branch);
    if committed {
        result = result.with_message("変更をコミットしてプッシュしました".to_string());
    }
    if let Some(url) = pr_url {
        result.artifacts.pr = Some(url.clone());
        result = result.with_message(format!("プルリクエスト: {url}"));
    }
    result
}

/// Both the configured default and the conventional defaults are refused.
fn is_default_branch(branch: &str, configured: &str) -> bool {
    branch == configured || branch == "main" || branch == "master"
}

fn compose_message(ctx: &mut PhaseContext<'_>, prompter: &mut dyn Prompter) -> Option<String> {
    let options: Vec<String> =
        COMMIT_TYPES.iter().map(|(t, label)| format!("{t} — {label}")).collect();
    let index = prompter.select("コミットの種類を選択してください", &options)?;
    let commit_type = COMMIT_TYPES[index].0;

    loop {
        let description =
            prompter.input("変更内容 (空にすると自動生成、小文字で始め末尾ピリオドなし)")?;
        if description.trim().is_empty() {
            // The adapter composes "Update: add/modify/delete ..." from the tree.
            return ctx.git.auto_commit_message().ok();
        }
        match compose_commit_message(commit_type, &description) {
            Ok(message) => return Some(message),
            Err(error) => println!("{error}"),
        }
    }
}

enum PrOutcome {
    Created(String),
    Skipped(String),
    Cancelled,
    Failed(String),
}

fn open_pull_request(
    ctx: &mut PhaseContext<'_>,
    prompter: &mut dyn Prompter,
    branch: &str,
) -> PrOutcome {
    let default_title = default_pr_title(branch);
    let title = match prompter.input(&format!("PRタイトル (既定: {default_title})")) {
        Some(t) if !t.trim().is_empty() => t.trim().to_string(),
        Some(_) => default_title,
        None => return PrOutcome::Cancelled,
    };
    let summary = prompter.input("PRの説明 (省略可)").unwrap_or_default();
    let body = build_pr_body(branch, &summary);

    let draft = prompter.confirm("ドラフトPRにしますか?") == Some(true);
    let reviewers = ctx.gateway.suggest_reviewers(&[], 2).unwrap_or_default();

    match ctx.gateway.create_pull(
        &title,
        &body,
        branch,
        &ctx.config.default_branch,
        draft,
        &reviewers,
    ) {
        Ok(pull) => {
            println!("プルリクエスト #{} を作成しました: {}", pull.number, pull.html_url);
            PrOutcome::Created(pull.html_url)
        }
        Err(GatewayError::Validation { kind: ValidationKind::NoCommits, .. }) => {
            PrOutcome::Skipped("ベースブランチとの差分がないためPRを作成しませんでした".to_string())
        }
        Err(GatewayError::Validation { kind: ValidationKind::AlreadyExists, .. }) => {
            PrOutcome::Skipped("このブランチのPRは既に存在します".to_string())
        }
        Err(e) => {
            let c = classify_gateway(&e);
            ctx.handler.handle(c, &e.to_string());
            PrOutcome::Failed(e.tag().to_string())
        }
    }
}

/// Derive a human title from the branch name:
/// `feature/issue-12-add-login` → `add login`.
pub fn default_pr_title(branch: &str) -> String {
    let tail = branch.rsplit('/').next().unwrap_or(branch);
    let tail = match issue_number_from_branch(branch) {
        Some(n) => tail.trim_start_matches(&format!("issue-{n}-")).to_string(),
        None => tail.to_string(),
    };
    let title = tail.replace('-', " ").trim().to_string();
    if title.is_empty() {
        branch.to_string()
    } else {
        title
    }
}

/// Compose the PR body; a branch named `…issue-<N>-…` closes its issue.
pub fn build_pr_body(branch: &str, summary: &str) -> String {
    let mut body = String::new();
    if !summary.trim().is_empty() {
        body.push_str(summary.trim());
        body.push_str("\n\n");
    }
    body.push_str(&format!("ブランチ: `{branch}`\n"));
    if let Some(number) = issue_number_from_branch(branch) {
        body.push_str(&format!("\nCloses #{number}\n"));
    }
    body
}
