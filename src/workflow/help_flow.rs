//! Help-Flow phase: get unstuck.
//!
//! Urgency selection routes to emergency handlers (escape the current
//! state), fix handlers (diagnose and repair), or learning content. Every
//! destructive operation asks for explicit confirmation first.

use super::prompt::Prompter;
use super::start::WorkType;
use super::{PhaseContext, PhaseResult};
use crate::core::OfflineMode;
use crate::diagnosis;
use crate::recovery::classify_git;

/// How urgent the operator's situation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    High,
    Medium,
    Low,
}

/// Run the Help-Flow phase.
pub fn run_help_flow(ctx: &mut PhaseContext<'_>, prompter: &mut dyn Prompter) -> PhaseResult {
    ctx.logger.info("help-flow phase: begin");

    let options = vec![
        "緊急 — 今すぐ作業状態から退避したい".to_string(),
        "中 — 問題を診断・修復したい".to_string(),
        "低 — 使い方を知りたい".to_string(),
    ];
    let urgency = match prompter.select("状況の緊急度を選択してください", &options) {
        Some(0) => Urgency::High,
        Some(1) => Urgency::Medium,
        Some(2) => Urgency::Low,
        _ => return PhaseResult::aborted("USER_CANCELLED"),
    };

    match urgency {
        Urgency::High => emergency_menu(ctx, prompter),
        Urgency::Medium => fix_menu(ctx, prompter),
        Urgency::Low => {
            print_learning_content();
            PhaseResult::completed()
        }
    }
}

fn emergency_menu(ctx: &mut PhaseContext<'_>, prompter: &mut dyn Prompter) -> PhaseResult {
    let options = vec![
        format!("作業を退避して {} に戻る", ctx.config.default_branch),
        "バックアップから復元する".to_string(),
        "進行中の rebase を中止する".to_string(),
        "キャンセル".to_string(),
    ];
    match prompter.select("緊急の操作を選択してください", &options) {
        Some(0) => escape_to_default(ctx, prompter),
        Some(1) => restore_from_backup(ctx, prompter),
        Some(2) => abort_rebase(ctx, prompter),
        _ => PhaseResult::aborted("USER_CANCELLED"),
    }
}

fn fix_menu(ctx: &mut PhaseContext<'_>, prompter: &mut dyn Prompter) -> PhaseResult {
    let options = vec![
        "診断を実行する".to_string(),
        "バックアップから復元する".to_string(),
        "オフラインモードを解除する".to_string(),
        "設定ファイルを修復する".to_string(),
        "キャンセル".to_string(),
    ];
    match prompter.select("修復の操作を選択してください", &options) {
        Some(0) => run_diagnosis(ctx),
        Some(1) => restore_from_backup(ctx, prompter),
        Some(2) => clear_offline_mode(ctx),
        Some(3) => fix_config(ctx),
        _ => PhaseResult::aborted("USER_CANCELLED"),
    }
}

/// Stash everything and return to the default branch.
fn escape_to_default(ctx: &mut PhaseContext<'_>, prompter: &mut dyn Prompter) -> PhaseResult {
    let default = ctx.config.default_branch.clone();
    if !confirm_destructive(
        ctx,
        prompter,
        &format!("未コミットの変更をスタッシュして {default} に切り替えます。続行しますか?"),
    ) {
        return PhaseResult::aborted("USER_CANCELLED");
    }

    let status = ctx.git.status().unwrap_or_default();
    if !status.is_clean() {
        if let Err(e) = ctx.git.stash_push("teamflow: emergency escape") {
            let c = classify_git(&e);
            ctx.handler.handle(c, &e.to_string());
            return PhaseResult::failed(e.tag());
        }
    }
    match ctx.git.checkout(&default) {
        Ok(()) => PhaseResult::completed().with_message(format!(
            "{default} に戻りました。作業は stash に退避されています (git stash pop で復帰)"
        )),
        Err(e) => {
            let c = classify_git(&e);
            ctx.handler.handle(c, &e.to_string());
            PhaseResult::failed(e.tag())
        }
    }
}

/// Restore the working tree from a chosen backup.
fn restore_from_backup(ctx: &mut PhaseContext<'_>, prompter: &mut dyn Prompter) -> PhaseResult {
    let records = match ctx.backups.records() {
        Ok(records) => records,
        Err(e) => return PhaseResult::failed("BACKUP_INDEX_ERROR").with_message(e.to_string()),
    };
    if records.is_empty() {
        return PhaseResult::aborted("NO_BACKUPS")
            .with_message("バックアップがありません".to_string());
    }

    let options: Vec<String> = records
        .iter()
        .map(|r| format!("{} ({} / {:?})", r.id, r.operation, r.kind))
        .collect();
    let Some(index) = prompter.select("復元するバックアップを選択してください", &options) else {
        return PhaseResult::aborted("USER_CANCELLED");
    };
    let record = &records[index];

    if !confirm_destructive(
        ctx,
        prompter,
        &format!("バックアップ {} で作業ツリーを上書きします。続行しますか?", record.id),
    ) {
        return PhaseResult::aborted("USER_CANCELLED");
    }

    if let Err(e) = ctx.backups.verify(&record.id) {
        return PhaseResult::failed("BACKUP_VERIFY_FAILED").with_message(e.to_string());
    }
    match ctx.backups.restore(&record.id, Some(ctx.git)) {
        Ok(summary) => {
            let mut result = PhaseResult::completed().with_message(format!(
                "{} ファイルを復元しました",
                summary.restored_files
            ));
            if let Some(branch) = summary.restored_branch {
                result = result.with_message(format!("ブランチ {branch} に戻りました"));
            }
            result
        }
        Err(e) => PhaseResult::failed("RESTORE_FAILED").with_message(e.to_string()),
    }
}

fn abort_rebase(ctx: &mut PhaseContext<'_>, prompter: &mut dyn Prompter) -> PhaseResult {
    if !confirm_destructive(ctx, prompter, "進行中の rebase を中止します。続行しますか?") {
        return PhaseResult::aborted("USER_CANCELLED");
    }
    match ctx.git.rebase_abort() {
        Ok(()) => PhaseResult::completed().with_message("rebase を中止しました".to_string()),
        Err(e) => {
            let c = classify_git(&e);
            ctx.handler.handle(c, &e.to_string());
            PhaseResult::failed(e.tag())
        }
    }
}

fn run_diagnosis(ctx: &mut PhaseContext<'_>) -> PhaseResult {
    let report = diagnosis::diagnose(ctx.git, ctx.config, ctx.root);

    println!("## 診断結果");
    if report.issues.is_empty() {
        println!("  問題は見つかりませんでした");
    }
    for issue in &report.issues {
        println!("  [{:?}] {} — {}", issue.severity, issue.title, issue.detail);
    }
    for warning in &report.warnings {
        println!("  注意: {warning}");
    }
    for suggestion in &report.suggestions {
        println!("  提案: {suggestion}");
    }

    let counts = ctx.handler.classification_counts();
    if !counts.is_empty() {
        println!("## このセッションのエラー分類");
        for (tag, count) in counts {
            println!("  {tag}: {count}");
        }
    }
    let attempts: Vec<_> = ctx.recovery.history().collect();
    if !attempts.is_empty() {
        println!("## リカバリ履歴 (直近 {} 件)", attempts.len());
        for attempt in attempts {
            println!(
                "  {} {} → {}",
                attempt.ts,
                attempt.strategy,
                if attempt.success { "成功" } else { "失敗" }
            );
        }
    }

    if report.has_critical() {
        PhaseResult::completed()
            .with_message("重大な問題が見つかりました。表示された手順で対処してください".to_string())
    } else {
        PhaseResult::completed()
    }
}

fn clear_offline_mode(ctx: &mut PhaseContext<'_>) -> PhaseResult {
    let offline = OfflineMode::at(ctx.config.offline_mode_path());
    if !offline.is_enabled() {
        return PhaseResult::completed()
            .with_message("オフラインモードは有効ではありません".to_string());
    }
    match offline.clear() {
        Ok(()) => PhaseResult::completed()
            .with_message("オフラインモードを解除しました".to_string()),
        Err(e) => PhaseResult::failed("OFFLINE_CLEAR_FAILED").with_message(e.to_string()),
    }
}

fn fix_config(ctx: &mut PhaseContext<'_>) -> PhaseResult {
    match crate::core::Config::fix(ctx.root) {
        Ok(actions) => {
            let mut result = PhaseResult::completed();
            if actions.is_empty() {
                result = result.with_message("修復すべき設定はありません".to_string());
            }
            for action in actions {
                result = result.with_message(action);
            }
            result
        }
        Err(e) => PhaseResult::failed("CONFIG_FIX_FAILED").with_message(e.to_string()),
    }
}

/// Destructive help-flow operations always ask, even when
/// `CONFIRM_DESTRUCTIVE_ACTIONS` is off for the regular phases.
fn confirm_destructive(
    _ctx: &mut PhaseContext<'_>,
    prompter: &mut dyn Prompter,
    message: &str,
) -> bool {
    prompter.confirm(message) == Some(true)
}

fn print_learning_content() {
    println!("## teamflow の流れ");
    println!("  start    — 作業ブランチを作って作業を開始");
    println!("  continue — 状況に応じた次の一手 (コミット/プル/プッシュ/同期)");
    println!("  finish   — コミット・プッシュ・PR作成までの仕上げ");
    println!("  team     — チーム全体の状況レポート");
    println!();
    println!("## 作業の種類");
    for work_type in WorkType::ALL {
        println!(
            "  {}{} — {}",
            work_type.branch_prefix(),
            "...",
            work_type.blurb()
        );
    }
    println!();
    println!("## ヒント");
    println!("  ・コミットはこまめに。説明は小文字で始め、末尾にピリオドを付けない");
    println!("  ・main / master 上では直接作業しない");
    println!("  ・困ったら help-flow の診断から始める");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urgency_variants() {
        assert_ne!(Urgency::High, Urgency::Low);
        assert_eq!(Urgency::Medium, Urgency::Medium);
    }
}
