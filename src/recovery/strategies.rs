//! Recovery strategies.
//!
//! One strategy per recoverable error tag. Retries are bounded; the Nth
//! backoff sleeps `base * 2^(N-1)`. Every attempt lands in a bounded history
//! ring that diagnostics can query.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use super::handler::ErrorTag;
use crate::backup::BackupStore;
use crate::core::{Logger, OfflineMode, RetryConfig, DEFAULT_ENV_TEMPLATE};
use crate::git::GitAdapter;

/// Number of attempts kept in the history ring.
const HISTORY_CAP: usize = 50;

/// One recorded recovery attempt.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryAttempt {
    pub error_tag: String,
    pub strategy: String,
    pub success: bool,
    pub context: String,
    pub ts: String,
}

/// What a strategy decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryOutcome {
    /// Whether the strategy considers the situation handled.
    pub success: bool,
    /// Whether the caller should retry the failed operation.
    pub retry: bool,
    /// Human summary of what was done.
    pub message: String,
}

impl RecoveryOutcome {
    fn handled(message: impl Into<String>) -> Self {
        Self { success: true, retry: false, message: message.into() }
    }

    fn retry_now(message: impl Into<String>) -> Self {
        Self { success: true, retry: true, message: message.into() }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self { success: false, retry: false, message: message.into() }
    }
}

/// Ambient facts a strategy may need.
pub struct RecoveryContext<'a> {
    /// Operation being recovered, e.g. `start`.
    pub operation: &'a str,
    pub backups: Option<&'a BackupStore>,
    pub git: Option<&'a GitAdapter>,
    /// Unix epoch seconds when the rate-limit window resets.
    pub rate_limit_reset: Option<u64>,
    /// Path the failed operation found missing.
    pub missing_path: Option<&'a Path>,
    /// Repository root, for writing default files.
    pub root: &'a Path,
    /// Asks the user to confirm a destructive step.
    pub confirm: &'a mut dyn FnMut(&str) -> bool,
}

/// Dispatches recovery strategies and tracks bounded retries.
pub struct RecoveryManager {
    retry_config: RetryConfig,
    offline: OfflineMode,
    logger: Logger,
    history: VecDeque<RecoveryAttempt>,
    /// Per-tag attempt counters; cleared on success or bound-exceeded.
    retry_counts: HashMap<&'static str, u32>,
    sleeper: Box<dyn FnMut(Duration)>,
}

impl RecoveryManager {
    pub fn new(retry_config: RetryConfig, offline: OfflineMode, logger: Logger) -> Self {
        Self {
            retry_config,
            offline,
            logger,
            history: VecDeque::new(),
            retry_counts: HashMap::new(),
            sleeper: Box::new(std::thread::sleep),
        }
    }

    /// Replace the sleeper (tests observe the schedule without waiting).
    #[cfg(test)]
    pub fn with_sleeper(mut self, sleeper: impl FnMut(Duration) + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// Recorded attempts, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &RecoveryAttempt> {
        self.history.iter()
    }

    /// Run the strategy for a recoverable tag.
    pub fn recover(&mut self, tag: ErrorTag, ctx: &mut RecoveryContext<'_>) -> RecoveryOutcome {
        let (strategy, outcome) = match tag {
            ErrorTag::NetworkTimeout | ErrorTag::UnknownRecoverable => {
                ("exponential_backoff", self.backoff(tag))
            }
            ErrorTag::ConnectionRefused => ("enable_offline_mode", self.enable_offline(ctx)),
            ErrorTag::MergeConflict => ("restore_from_backup", self.restore_backup(ctx)),
            ErrorTag::ApiRateLimit => ("wait_for_reset", self.wait_for_reset(ctx)),
            ErrorTag::FileNotFound => ("write_default_file", self.write_default_file(ctx)),
            ErrorTag::ConfigurationMissing => {
                ("write_default_config", self.write_default_config(ctx))
            }
            ErrorTag::FileBusy => ("exponential_backoff", self.backoff(tag)),
            other => (
                "none",
                RecoveryOutcome::failed(format!(
                    "no recovery strategy for {}",
                    other.as_str()
                )),
            ),
        };

        self.record(tag, strategy, &outcome, ctx.operation);
        outcome
    }

    /// Clear the bounded-retry counter for a tag after the operation finally
    /// succeeded.
    pub fn reset_retries(&mut self, tag: ErrorTag) {
        self.retry_counts.remove(tag.as_str());
    }

    // ------------------------------------------------------------------
    // Strategies
    // ------------------------------------------------------------------

    fn backoff(&mut self, tag: ErrorTag) -> RecoveryOutcome {
        let count = self.retry_counts.entry(tag.as_str()).or_insert(0);
        *count += 1;
        let attempt = *count;

        if attempt > self.retry_config.max_attempts {
            self.retry_counts.remove(tag.as_str());
            return RecoveryOutcome::failed(format!(
                "再試行の上限 ({}) に達しました",
                self.retry_config.max_attempts
            ));
        }

        let delay = self.retry_config.delay_for_attempt(attempt);
        self.logger.info(&format!(
            "retrying after {}ms (attempt {attempt}/{})",
            delay.as_millis(),
            self.retry_config.max_attempts
        ));
        (self.sleeper)(delay);
        RecoveryOutcome::retry_now(format!("{}ms 待機後に再試行します", delay.as_millis()))
    }

    fn enable_offline(&mut self, ctx: &RecoveryContext<'_>) -> RecoveryOutcome {
        let reason = format!("connection refused during {}", ctx.operation);
        match self.offline.enable(&reason) {
            Ok(_) => RecoveryOutcome::handled(
                "オフラインモードを有効にしました。ネットワーク操作はスキップされます",
            ),
            Err(e) => RecoveryOutcome::failed(format!("オフラインモードへの切替に失敗: {e}")),
        }
    }

    fn restore_backup(&mut self, ctx: &mut RecoveryContext<'_>) -> RecoveryOutcome {
        let Some(store) = ctx.backups else {
            return RecoveryOutcome::failed("バックアップストアが利用できません");
        };

        let record = match store.latest_for_operation(ctx.operation) {
            Ok(Some(record)) => record,
            Ok(None) => {
                return RecoveryOutcome::failed(format!(
                    "操作 {} に対応するバックアップがありません",
                    ctx.operation
                ));
            }
            Err(e) => return RecoveryOutcome::failed(format!("バックアップ一覧の取得に失敗: {e}")),
        };

        let prompt = format!(
            "バックアップ {} ({}) から復元します。作業ツリーが上書きされます。続行しますか?",
            record.id, record.timestamp
        );
        if !(ctx.confirm)(&prompt) {
            return RecoveryOutcome::failed("復元がキャンセルされました");
        }

        match store.restore(&record.id, ctx.git) {
            Ok(summary) => RecoveryOutcome::handled(format!(
                "バックアップ {} から {} ファイルを復元しました",
                record.id, summary.restored_files
            )),
            Err(e) => RecoveryOutcome::failed(format!("復元に失敗しました: {e}")),
        }
    }

    fn wait_for_reset(&mut self, ctx: &RecoveryContext<'_>) -> RecoveryOutcome {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        let reset = ctx.rate_limit_reset.unwrap_or(now);
        let wait = Duration::from_secs(reset.saturating_sub(now) + 1);

        self.logger.info(&format!("rate limited; waiting {}s until reset", wait.as_secs()));
        (self.sleeper)(wait);
        RecoveryOutcome::retry_now(format!(
            "レート制限のリセットまで {}s 待機しました",
            wait.as_secs()
        ))
    }

    fn write_default_file(&mut self, ctx: &RecoveryContext<'_>) -> RecoveryOutcome {
        let Some(path) = ctx.missing_path else {
            return RecoveryOutcome::failed("不足しているファイルのパスが不明です");
        };
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let Some(content) = default_content_for(name) else {
            return RecoveryOutcome::failed(format!("{name} の既定内容は定義されていません"));
        };

        let target =
            if path.is_absolute() { path.to_path_buf() } else { ctx.root.join(path) };
        match write_default(&target, content) {
            Ok(()) => RecoveryOutcome::retry_now(format!(
                "{} を既定の内容で作成しました",
                target.display()
            )),
            Err(e) => RecoveryOutcome::failed(format!("{} の作成に失敗: {e}", target.display())),
        }
    }

    fn write_default_config(&mut self, ctx: &RecoveryContext<'_>) -> RecoveryOutcome {
        let target = ctx.root.join(crate::core::STATE_DIR_NAME).join("config.json");
        match write_default(&target, DEFAULT_CONFIG_JSON) {
            Ok(()) => RecoveryOutcome::retry_now(format!(
                "既定の設定ファイルを作成しました: {}",
                target.display()
            )),
            Err(e) => RecoveryOutcome::failed(format!("設定ファイルの作成に失敗: {e}")),
        }
    }

    fn record(&mut self, tag: ErrorTag, strategy: &str, outcome: &RecoveryOutcome, context: &str) {
        let attempt = RecoveryAttempt {
            error_tag: tag.as_str().to_string(),
            strategy: strategy.to_string(),
            success: outcome.success,
            context: context.to_string(),
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        self.logger.info(&format!(
            "recovery {} for {}: {} ({})",
            attempt.strategy,
            attempt.error_tag,
            if attempt.success { "ok" } else { "failed" },
            attempt.context
        ));
        if self.history.len() >= HISTORY_CAP {
            self.history.pop_front();
        }
        self.history.push_back(attempt);
    }
}

/// Files the FILE_NOT_FOUND strategy knows how to recreate. The table is
/// closed: unknown files are never invented.
fn default_content_for(file_name: &str) -> Option<&'static str> {
    match file_name {
        ".env" => Some(DEFAULT_ENV_TEMPLATE),
        ".gitignore" => Some(DEFAULT_GITIGNORE),
        "config.json" => Some(DEFAULT_CONFIG_JSON),
        _ => None,
    }
}

const DEFAULT_GITIGNORE: &str = "\
node_modules/
target/
dist/
.env
.teamflow/logs/
.teamflow/backups/
";

const DEFAULT_CONFIG_JSON: &str = "\
{
  \"DEFAULT_BRANCH\": \"main\",
  \"SLACK_CHANNEL\": \"#general\",
  \"AUTO_PUSH\": false,
  \"AUTO_PR\": false,
  \"CONFIRM_DESTRUCTIVE_ACTIONS\": true
}
";

fn write_default(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)
}
