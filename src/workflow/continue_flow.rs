//! Continue phase: resume work in progress.
//!
//! `Analyze → Rank → confirm each recommendation in rank order →
//! dispatch(action)`. Skipping a recommendation moves on to the next; a
//! failure is classified and, when a strategy exists, handed to the recovery
//! manager before deciding whether the phase survives.

use std::process::Command;

use super::prompt::Prompter;
use super::{PhaseContext, PhaseResult};
use crate::diagnosis::{self, RecommendedAction, WorkStatus};
use crate::integrations::NotificationMessage;
use crate::recovery::{classify_gateway, classify_git, RecoveryContext};
use crate::security::validators;

/// Conventional-commits types offered for the commit action.
const COMMIT_TYPES: &[(&str, &str)] = &[
    ("feat", "新機能"),
    ("fix", "バグ修正"),
    ("docs", "ドキュメント"),
    ("refactor", "リファクタリング"),
    ("test", "テスト"),
    ("chore", "雑務"),
];

/// Run the Continue phase.
pub fn run_continue(ctx: &mut PhaseContext<'_>, prompter: &mut dyn Prompter) -> PhaseResult {
    ctx.logger.info("continue phase: begin");

    if !ctx.git.is_repository() {
        return PhaseResult::failed("NOT_GIT_REPOSITORY")
            .with_message("Gitリポジトリ内で実行してください".to_string());
    }

    // Analyze + Rank
    let work = diagnosis::analyze_work_status(ctx.git, ctx.config, ctx.root);
    print_summary(&work);

    if work.recommendations.is_empty() {
        println!("推奨される操作はありません。作業を続けるか finish で仕上げてください。");
        return PhaseResult::completed()
            .with_message("推奨される操作はありません".to_string());
    }

    let mut messages = Vec::new();
    for recommendation in &work.recommendations {
        let prompt = format!(
            "[{}] {} — {}。実行しますか?",
            priority_label(recommendation.priority),
            recommendation.title,
            recommendation.description
        );
        match prompter.confirm(&prompt) {
            Some(true) => {}
            Some(false) => continue, // skip, back to the menu
            None => return PhaseResult::aborted("USER_CANCELLED"),
        }

        match dispatch(ctx, prompter, recommendation.action, &work) {
            ActionOutcome::Done(message) => {
                ctx.logger.info(&format!("continue action done: {message}"));
                messages.push(message);
            }
            ActionOutcome::Skipped => {}
            ActionOutcome::Aborted => return PhaseResult::aborted("USER_CANCELLED"),
            ActionOutcome::Fatal { reason, manual } => {
                let mut result = PhaseResult::failed(reason);
                if manual {
                    result = result.manual_action_required();
                }
                for message in messages {
                    result = result.with_message(message);
                }
                return result;
            }
        }
    }

    let mut result = PhaseResult::completed();
    for message in messages {
        result = result.with_message(message);
    }
    result
}

fn print_summary(work: &WorkStatus) {
    if let Some(ref branch) = work.branch {
        println!("ブランチ: {branch}");
    }
    println!(
        "未コミット: {} / 未プッシュ: {} / 同期: {:?}",
        work.uncommitted, work.unpushed, work.sync
    );
    if let Some(hours) = work.hours_since_last_commit {
        println!("最終コミットから {hours:.1} 時間");
    }
}

const fn priority_label(priority: diagnosis::Priority) -> &'static str {
    match priority {
        diagnosis::Priority::High => "高",
        diagnosis::Priority::Medium => "中",
        diagnosis::Priority::Low => "低",
    }
}

enum ActionOutcome {
    Done(String),
    Skipped,
    Aborted,
    Fatal { reason: String, manual: bool },
}

fn dispatch(
    ctx: &mut PhaseContext<'_>,
    prompter: &mut dyn Prompter,
    action: RecommendedAction,
    work: &WorkStatus,
) -> ActionOutcome {
    match action {
        RecommendedAction::Commit => commit_action(ctx, prompter),
        RecommendedAction::Pull => pull_action(ctx),
        RecommendedAction::Push => push_action(ctx, work),
        RecommendedAction::Sync => sync_action(ctx, prompter),
        RecommendedAction::Test => test_action(ctx, prompter),
        RecommendedAction::UpdateIssue => update_issue_action(ctx, prompter, work),
        RecommendedAction::UpdateStatus => update_status_action(ctx, work),
    }
}

/// Compose a Conventional-Commits message from a type and description.
///
/// Rejects empty descriptions, descriptions starting with an upper-case
/// letter, and descriptions ending with a period.
pub fn compose_commit_message(commit_type: &str, description: &str) -> Result<String, String> {
    let description = description.trim();
    if description.is_empty() {
        return Err("説明を入力してください".to_string());
    }
    if description.chars().next().is_some_and(|c| c.is_uppercase()) {
        return Err("説明は小文字で始めてください".to_string());
    }
    if description.ends_with('.') || description.ends_with('。') {
        return Err("説明の末尾にピリオドは不要です".to_string());
    }

    let message = format!("{commit_type}: {description}");
    validators::validate_commit_message(&message).into_result()
}

fn commit_action(ctx: &mut PhaseContext<'_>, prompter: &mut dyn Prompter) -> ActionOutcome {
    let options: Vec<String> =
        COMMIT_TYPES.iter().map(|(t, label)| format!("{t} — {label}")).collect();
    let Some(index) = prompter.select("コミットの種類を選択してください", &options) else {
        return ActionOutcome::Aborted;
    };
    let commit_type = COMMIT_TYPES[index].0;

    let message = loop {
        let Some(description) = prompter.input("変更内容 (小文字で始め、末尾ピリオドなし)") else {
            return ActionOutcome::Aborted;
        };
        match compose_commit_message(commit_type, &description) {
            Ok(message) => break message,
            Err(error) => println!("{error}"),
        }
    };

    if let Err(e) = ctx.git.stage_all() {
        let c = classify_git(&e);
        ctx.handler.handle(c, &e.to_string());
        return ActionOutcome::Fatal { reason: e.tag().to_string(), manual: false };
    }
    match ctx.git.commit(&message) {
        Ok(hash) => ActionOutcome::Done(format!("コミットしました: {} ({message})", &hash[..7.min(hash.len())])),
        Err(e) => {
            let c = classify_git(&e);
            ctx.handler.handle(c, &e.to_string());
            ActionOutcome::Fatal { reason: e.tag().to_string(), manual: false }
        }
    }
}

fn pull_action(ctx: &mut PhaseContext<'_>) -> ActionOutcome {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match ctx.git.pull() {
            Ok(()) => {
                return ActionOutcome::Done("リモートの変更を取り込みました".to_string());
            }
            Err(e) => match handle_git_failure(ctx, e, "continue") {
                FailureDecision::Retry if attempts <= ctx.config.max_retries => {}
                FailureDecision::Retry => {
                    return ActionOutcome::Fatal {
                        reason: "NETWORK_ERROR".to_string(),
                        manual: false,
                    };
                }
                FailureDecision::GiveUp { reason, manual } => {
                    return ActionOutcome::Fatal { reason, manual };
                }
            },
        }
    }
}

fn push_action(ctx: &mut PhaseContext<'_>, work: &WorkStatus) -> ActionOutcome {
    let Some(branch) = work.branch.clone() else {
        return ActionOutcome::Fatal { reason: "DETACHED_HEAD".to_string(), manual: true };
    };
    let mut attempts = 0;
    loop {
        attempts += 1;
        match ctx.git.push(&branch, false) {
            Ok(()) => return ActionOutcome::Done(format!("{branch} をプッシュしました")),
            Err(e) => match handle_git_failure(ctx, e, "continue") {
                FailureDecision::Retry if attempts <= ctx.config.max_retries => {}
                FailureDecision::Retry => {
                    return ActionOutcome::Fatal {
                        reason: "NETWORK_ERROR".to_string(),
                        manual: false,
                    };
                }
                FailureDecision::GiveUp { reason, manual } => {
                    return ActionOutcome::Fatal { reason, manual };
                }
            },
        }
    }
}

fn sync_action(ctx: &mut PhaseContext<'_>, prompter: &mut dyn Prompter) -> ActionOutcome {
    let options =
        vec!["rebase (履歴を直列に保つ)".to_string(), "merge".to_string(), "キャンセル".to_string()];
    let choice = match prompter.select("同期方法を選択してください", &options) {
        Some(2) | None => return ActionOutcome::Skipped,
        Some(choice) => choice,
    };

    if let Err(e) = ctx.git.fetch() {
        return match handle_git_failure(ctx, e, "continue") {
            FailureDecision::Retry => {
                ActionOutcome::Fatal { reason: "NETWORK_ERROR".to_string(), manual: false }
            }
            FailureDecision::GiveUp { reason, manual } => ActionOutcome::Fatal { reason, manual },
        };
    }

    let upstream = format!("origin/{}", current_branch_or(ctx, ""));
    let result = if choice == 0 { ctx.git.rebase(&upstream) } else { ctx.git.merge(&upstream) };
    match result {
        Ok(()) => ActionOutcome::Done("ブランチを同期しました".to_string()),
        Err(e) => {
            // Conflicts here always need a human; print the steps and fail.
            let c = classify_git(&e);
            ctx.handler.handle(c, &e.to_string());
            if c.tag == crate::recovery::ErrorTag::MergeConflict {
                println!("{}", crate::recovery::ErrorTag::MergeConflict.human_message());
                ActionOutcome::Fatal { reason: "MERGE_CONFLICT".to_string(), manual: true }
            } else {
                ActionOutcome::Fatal { reason: e.tag().to_string(), manual: false }
            }
        }
    }
}

fn current_branch_or(ctx: &PhaseContext<'_>, fallback: &str) -> String {
    ctx.git
        .current_branch()
        .ok()
        .flatten()
        .unwrap_or_else(|| fallback.to_string())
}

fn test_action(ctx: &mut PhaseContext<'_>, prompter: &mut dyn Prompter) -> ActionOutcome {
    let Some(runner) = diagnosis::detect_test_runner(ctx.root) else {
        return ActionOutcome::Done("テストランナーが見つかりません".to_string());
    };
    println!("実行: {}", runner.run_cmd);

    let status = Command::new("sh")
        .arg("-c")
        .arg(runner.run_cmd)
        .current_dir(ctx.root)
        .status();

    match status {
        Ok(status) if status.success() => {
            ActionOutcome::Done("テストが成功しました".to_string())
        }
        Ok(_) => {
            ctx.logger.warn("tests failed during continue");
            match prompter.confirm("テストが失敗しました。続行しますか?") {
                Some(true) => ActionOutcome::Done("テスト失敗を許容して続行".to_string()),
                _ => ActionOutcome::Fatal { reason: "TESTS_FAILED".to_string(), manual: true },
            }
        }
        Err(e) => {
            ctx.logger.warn(&format!("test runner spawn failed: {e}"));
            ActionOutcome::Done("テストを実行できませんでした".to_string())
        }
    }
}

fn update_issue_action(
    ctx: &mut PhaseContext<'_>,
    prompter: &mut dyn Prompter,
    work: &WorkStatus,
) -> ActionOutcome {
    let Some(number) = work.issue_number else {
        return ActionOutcome::Done("ブランチ名にIssue番号がありません".to_string());
    };
    let Some(progress) = prompter.input("進捗コメント") else {
        return ActionOutcome::Aborted;
    };
    if progress.trim().is_empty() {
        return ActionOutcome::Skipped;
    }

    match ctx.gateway.comment_issue(number, progress.trim()) {
        Ok(()) => ActionOutcome::Done(format!("Issue #{number} にコメントしました")),
        Err(e) => {
            let c = classify_gateway(&e);
            ctx.handler.handle(c, &e.to_string());
            if c.recoverable {
                let reset = match &e {
                    crate::integrations::GatewayError::RateLimit { reset_epoch } => {
                        Some(*reset_epoch)
                    }
                    _ => None,
                };
                let mut confirm = |_: &str| false;
                let mut rctx = RecoveryContext {
                    operation: "continue",
                    backups: Some(ctx.backups),
                    git: Some(ctx.git),
                    rate_limit_reset: reset,
                    missing_path: None,
                    root: ctx.root,
                    confirm: &mut confirm,
                };
                let outcome = ctx.recovery.recover(c.tag, &mut rctx);
                if outcome.retry {
                    if let Ok(()) = ctx.gateway.comment_issue(number, progress.trim()) {
                        ctx.recovery.reset_retries(c.tag);
                        return ActionOutcome::Done(format!(
                            "Issue #{number} にコメントしました (再試行)"
                        ));
                    }
                }
            }
            ActionOutcome::Fatal { reason: e.tag().to_string(), manual: false }
        }
    }
}

fn update_status_action(ctx: &mut PhaseContext<'_>, work: &WorkStatus) -> ActionOutcome {
    if !ctx.notifier.is_configured() {
        return ActionOutcome::Done("通知先が設定されていません".to_string());
    }
    let branch = work.branch.clone().unwrap_or_else(|| "(detached)".to_string());
    let message = NotificationMessage::with_title(
        "作業状況",
        format!(
            "`{branch}` で作業中 (未コミット {}, 未プッシュ {})",
            work.uncommitted, work.unpushed
        ),
    );
    let report = ctx.notifier.send_all(&message);
    if report.any_delivered() {
        ActionOutcome::Done("チームに状況を共有しました".to_string())
    } else {
        ActionOutcome::Done("通知の送信に失敗しました".to_string())
    }
}

enum FailureDecision {
    /// The recovery strategy asks for another attempt.
    Retry,
    GiveUp { reason: String, manual: bool },
}

/// Classify a Git failure, attempt recovery for recoverable tags, and decide
/// whether the action gets another attempt.
fn handle_git_failure(
    ctx: &mut PhaseContext<'_>,
    error: crate::git::GitError,
    operation: &str,
) -> FailureDecision {
    let classification = classify_git(&error);
    ctx.handler.handle(classification, &error.to_string());

    if classification.recoverable {
        let mut confirm = |_: &str| false;
        let mut rctx = RecoveryContext {
            operation,
            backups: Some(ctx.backups),
            git: Some(ctx.git),
            rate_limit_reset: None,
            missing_path: None,
            root: ctx.root,
            confirm: &mut confirm,
        };
        let outcome = ctx.recovery.recover(classification.tag, &mut rctx);
        ctx.logger.info(&format!("recovery: {}", outcome.message));
        if outcome.retry {
            return FailureDecision::Retry;
        }
    }

    let manual = classification.tag == crate::recovery::ErrorTag::MergeConflict;
    if manual {
        println!("{}", classification.tag.human_message());
    }
    FailureDecision::GiveUp { reason: error.tag().to_string(), manual }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_message_composition() {
        assert_eq!(
            compose_commit_message("feat", "add login form").unwrap(),
            "feat: add login form"
        );
        assert_eq!(
            compose_commit_message("fix", "  handle empty password  ").unwrap(),
            "fix: handle empty password"
        );
    }

    #[test]
    fn test_commit_message_rejections() {
        assert!(compose_commit_message("feat", "").is_err());
        assert!(compose_commit_message("feat", "   ").is_err());
        assert!(compose_commit_message("feat", "Add login").is_err());
        assert!(compose_commit_message("feat", "add login.").is_err());
        assert!(compose_commit_message("feat", "追加する。").is_err());
        // Too short overall.
        assert!(compose_commit_message("f", "x").is_err());
    }

    #[test]
    fn test_commit_types_table() {
        assert!(COMMIT_TYPES.iter().any(|(t, _)| *t == "feat"));
        assert!(COMMIT_TYPES.iter().any(|(t, _)| *t == "fix"));
        assert_eq!(COMMIT_TYPES.len(), 6);
    }
}
