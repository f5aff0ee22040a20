//! Error classification and process-level failure handling.
//!
//! The handler is the only component that touches platform-level failure
//! mechanisms (panics, termination signals, exit codes). Everything else
//! hands it tagged domain errors; the handler decides severity, records the
//! classification, and prints the human guidance for the tag.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::Logger;
use crate::git::GitError;
use crate::integrations::GatewayError;

/// Severity buckets, driving the handling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Report with a suggestion; never recover automatically.
    Critical,
    /// Dispatch to the recovery manager.
    Recoverable,
    /// Log and continue.
    Warning,
    /// Log full detail and surface; do not recover.
    Unknown,
}

/// Stable error tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorTag {
    // Critical
    GitRepositoryCorruption,
    PermissionDenied,
    DiskSpaceFull,
    OutOfMemory,
    AuthenticationFailed,
    UnknownCritical,
    // Recoverable
    NetworkTimeout,
    ConnectionRefused,
    MergeConflict,
    ApiRateLimit,
    FileNotFound,
    ConfigurationMissing,
    FileBusy,
    UnknownRecoverable,
    // Warning
    OptionalFeatureUnavailable,
    ConfigurationMissingNonfatal,
    PerformanceWarning,
    DeprecatedFeature,
    // Fallback
    Unknown,
}

impl ErrorTag {
    /// Stable string form, used in logs and counters.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GitRepositoryCorruption => "GIT_REPOSITORY_CORRUPTION",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::DiskSpaceFull => "DISK_SPACE_FULL",
            Self::OutOfMemory => "OUT_OF_MEMORY",
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::UnknownCritical => "UNKNOWN_CRITICAL",
            Self::NetworkTimeout => "NETWORK_TIMEOUT",
            Self::ConnectionRefused => "CONNECTION_REFUSED",
            Self::MergeConflict => "MERGE_CONFLICT",
            Self::ApiRateLimit => "API_RATE_LIMIT",
            Self::FileNotFound => "FILE_NOT_FOUND",
            Self::ConfigurationMissing => "CONFIGURATION_MISSING",
            Self::FileBusy => "FILE_BUSY",
            Self::UnknownRecoverable => "UNKNOWN_RECOVERABLE",
            Self::OptionalFeatureUnavailable => "OPTIONAL_FEATURE_UNAVAILABLE",
            Self::ConfigurationMissingNonfatal => "CONFIGURATION_MISSING_NONFATAL",
            Self::PerformanceWarning => "PERFORMANCE_WARNING",
            Self::DeprecatedFeature => "DEPRECATED_FEATURE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Severity bucket of this tag.
    pub const fn severity(&self) -> Severity {
        match self {
            Self::GitRepositoryCorruption
            | Self::PermissionDenied
            | Self::DiskSpaceFull
            | Self::OutOfMemory
            | Self::AuthenticationFailed
            | Self::UnknownCritical => Severity::Critical,
            Self::NetworkTimeout
            | Self::ConnectionRefused
            | Self::MergeConflict
            | Self::ApiRateLimit
            | Self::FileNotFound
            | Self::ConfigurationMissing
            | Self::FileBusy
            | Self::UnknownRecoverable => Severity::Recoverable,
            Self::OptionalFeatureUnavailable
            | Self::ConfigurationMissingNonfatal
            | Self::PerformanceWarning
            | Self::DeprecatedFeature => Severity::Warning,
            Self::Unknown => Severity::Unknown,
        }
    }

    /// Whether the recovery manager has a strategy for this tag.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self.severity(), Severity::Recoverable)
    }

    /// Static human guidance: the symptom and the steps to take.
    pub const fn human_message(&self) -> &'static str {
        match self {
            Self::GitRepositoryCorruption => {
                "Gitリポジトリが破損している可能性があります。\n  1. git fsck で状態を確認\n  2. バックアップまたはリモートから再クローン\n  3. .git ディレクトリを手動で変更しない"
            }
            Self::PermissionDenied => {
                "ファイルへのアクセスが拒否されました。\n  1. ファイルの所有者と権限を確認 (ls -la)\n  2. 必要なら chmod / chown で修正\n  3. 別プロセスが掴んでいないか確認"
            }
            Self::DiskSpaceFull => {
                "ディスク容量が不足しています。\n  1. df -h で空き容量を確認\n  2. 不要なファイルを削除\n  3. 再度実行"
            }
            Self::OutOfMemory => {
                "メモリが不足しています。\n  1. 他のアプリケーションを終了\n  2. 対象を減らして再度実行"
            }
            Self::AuthenticationFailed => {
                "認証に失敗しました。\n  1. GITHUB_TOKEN の有効期限を確認\n  2. トークンのスコープ (repo) を確認\n  3. .env の値を更新して再度実行"
            }
            Self::UnknownCritical => {
                "回復不能なエラーが発生しました。ログ (.teamflow/logs/team-flow.log) を確認してください。"
            }
            Self::NetworkTimeout => {
                "ネットワークがタイムアウトしました。自動的に再試行します。\n  続く場合は接続状況を確認してください。"
            }
            Self::ConnectionRefused => {
                "接続が拒否されました。オフラインモードに切り替えます。\n  復旧後に .teamflow/state/offline-mode.json を削除してください。"
            }
            Self::MergeConflict => {
                "マージコンフリクトが発生しました。\n  1. git status で競合ファイルを確認\n  2. 各ファイルの競合を解消して git add\n  3. rebase 中なら git rebase --continue\n  4. やり直す場合は help-flow から復元を選択"
            }
            Self::ApiRateLimit => {
                "GitHub APIのレート制限に達しました。リセットまで待機して再試行します。"
            }
            Self::FileNotFound => {
                "必要なファイルが見つかりません。既定の内容で作成を試みます。"
            }
            Self::ConfigurationMissing => {
                "設定ファイルが見つかりません。既定の設定で作成を試みます。\n  作成後に .env の GITHUB_TOKEN を設定してください。"
            }
            Self::FileBusy => {
                "ファイルが他のプロセスに使用されています。\n  1. エディタやビルドを終了\n  2. 再度実行"
            }
            Self::UnknownRecoverable => {
                "一時的なエラーが発生しました。再試行します。"
            }
            Self::OptionalFeatureUnavailable => {
                "任意機能が利用できません。該当機能を除いて続行します。"
            }
            Self::ConfigurationMissingNonfatal => {
                "一部の設定が未完了です。既定値で続行します。"
            }
            Self::PerformanceWarning => "処理に時間がかかっています。",
            Self::DeprecatedFeature => "非推奨の機能が使用されました。",
            Self::Unknown => {
                "不明なエラーが発生しました。ログ (.teamflow/logs/team-flow.log) の詳細を確認してください。"
            }
        }
    }
}

/// Result of classifying one error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub tag: ErrorTag,
    pub severity: Severity,
    pub recoverable: bool,
}

impl Classification {
    fn of(tag: ErrorTag) -> Self {
        Self { tag, severity: tag.severity(), recoverable: tag.is_recoverable() }
    }
}

/// Classify a free-form error message, optionally with the platform error
/// kind that produced it.
pub fn classify_message(message: &str, kind: Option<ErrorKind>) -> Classification {
    if let Some(kind) = kind {
        match kind {
            ErrorKind::PermissionDenied => {
                return Classification::of(ErrorTag::PermissionDenied);
            }
            ErrorKind::NotFound => return Classification::of(ErrorTag::FileNotFound),
            ErrorKind::TimedOut => return Classification::of(ErrorTag::NetworkTimeout),
            ErrorKind::ConnectionRefused => {
                return Classification::of(ErrorTag::ConnectionRefused);
            }
            ErrorKind::OutOfMemory => return Classification::of(ErrorTag::OutOfMemory),
            _ => {}
        }
    }

    let lower = message.to_lowercase();
    let tag = if lower.contains("repository corrupt")
        || lower.contains("object file") && lower.contains("empty")
        || lower.contains("loose object") && lower.contains("corrupt")
    {
        ErrorTag::GitRepositoryCorruption
    } else if lower.contains("eacces") || lower.contains("eperm") || lower.contains("permission denied")
    {
        ErrorTag::PermissionDenied
    } else if lower.contains("enospc") || lower.contains("no space left") {
        ErrorTag::DiskSpaceFull
    } else if lower.contains("out of memory") || lower.contains("enomem") {
        ErrorTag::OutOfMemory
    } else if lower.contains("authentication failed")
        || lower.contains("bad credentials")
        || lower.contains("401")
    {
        ErrorTag::AuthenticationFailed
    } else if lower.contains("rate limit") {
        ErrorTag::ApiRateLimit
    } else if lower.contains("timed out") || lower.contains("timeout") || lower.contains("etimedout")
    {
        ErrorTag::NetworkTimeout
    } else if lower.contains("connection refused") || lower.contains("econnrefused") {
        ErrorTag::ConnectionRefused
    } else if lower.contains("merge conflict") || lower.contains("conflict") {
        ErrorTag::MergeConflict
    } else if lower.contains("no such file") || lower.contains("enoent") || lower.contains("not found")
    {
        ErrorTag::FileNotFound
    } else if lower.contains("ebusy") || lower.contains("resource busy") {
        ErrorTag::FileBusy
    } else if lower.contains("configuration missing") || lower.contains("config missing") {
        ErrorTag::ConfigurationMissing
    } else if lower.contains("deprecated") {
        ErrorTag::DeprecatedFeature
    } else {
        ErrorTag::Unknown
    };

    Classification::of(tag)
}

/// Classify a Git adapter error.
pub fn classify_git(error: &GitError) -> Classification {
    let tag = match error {
        GitError::MergeConflict(_) => ErrorTag::MergeConflict,
        GitError::NotGitRepository => ErrorTag::UnknownCritical,
        GitError::PermissionDenied(_) => ErrorTag::PermissionDenied,
        GitError::AuthFailed(_) => ErrorTag::AuthenticationFailed,
        GitError::NetworkError(_) | GitError::Timeout(_) => ErrorTag::NetworkTimeout,
        GitError::UncommittedChanges(_)
        | GitError::NothingToCommit
        | GitError::BranchNotFound(_)
        | GitError::RemoteNotFound(_)
        | GitError::PushRejected(_) => ErrorTag::UnknownRecoverable,
        GitError::Io(e) => return classify_message(&e.to_string(), Some(e.kind())),
        GitError::Unknown(message) => return classify_message(message, None),
    };
    Classification::of(tag)
}

/// Classify a gateway error.
pub fn classify_gateway(error: &GatewayError) -> Classification {
    let tag = match error {
        GatewayError::Unauthorized => ErrorTag::AuthenticationFailed,
        GatewayError::RateLimit { .. } => ErrorTag::ApiRateLimit,
        GatewayError::Forbidden(_) | GatewayError::NotFound(_) => ErrorTag::UnknownCritical,
        GatewayError::Timeout => ErrorTag::NetworkTimeout,
        GatewayError::NotAvailable { .. } => ErrorTag::OptionalFeatureUnavailable,
        GatewayError::Validation { .. } => ErrorTag::UnknownRecoverable,
        GatewayError::Http(message) | GatewayError::Decode(message) => {
            return classify_message(message, None);
        }
    };
    Classification::of(tag)
}

/// Shared flag set by the termination-signal handler.
pub type ShutdownFlag = Arc<AtomicBool>;

type Cleanup = Box<dyn FnOnce() + Send>;

/// The process-wide error handler.
pub struct ErrorHandler {
    logger: Logger,
    counters: HashMap<&'static str, u64>,
    cleanups: Arc<Mutex<Vec<Cleanup>>>,
    shutdown: ShutdownFlag,
}

impl ErrorHandler {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            counters: HashMap::new(),
            cleanups: Arc::new(Mutex::new(Vec::new())),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag polled by phases between steps.
    pub fn shutdown_flag(&self) -> ShutdownFlag {
        Arc::clone(&self.shutdown)
    }

    /// Register a callback to run on graceful shutdown.
    pub fn register_cleanup(&self, cleanup: impl FnOnce() + Send + 'static) {
        if let Ok(mut cleanups) = self.cleanups.lock() {
            cleanups.push(Box::new(cleanup));
        }
    }

    /// Install the process-wide hooks: a panic hook that emits a structured
    /// report and exits 1, and a termination-signal handler that drains,
    /// runs cleanups, and exits 0.
    pub fn install_process_hooks(&self) {
        let logger = self.logger.clone();
        std::panic::set_hook(Box::new(move |info| {
            let report = format!("unhandled failure: {info}");
            logger.error(&report);
            eprintln!("\n[teamflow] {report}");
            eprintln!("[teamflow] {}", ErrorTag::UnknownCritical.human_message());
            std::process::exit(1);
        }));

        let logger = self.logger.clone();
        let cleanups = Arc::clone(&self.cleanups);
        let shutdown = Arc::clone(&self.shutdown);
        let result = ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
            logger.warn("termination signal received; shutting down");
            eprintln!("\n[teamflow] 終了シグナルを受信しました。後片付けを実行します…");
            // Brief drain window for in-flight operations.
            std::thread::sleep(Duration::from_millis(200));
            if let Ok(mut cleanups) = cleanups.lock() {
                for cleanup in cleanups.drain(..) {
                    cleanup();
                }
            }
            std::process::exit(0);
        });
        if let Err(e) = result {
            tracing::warn!(error = %e, "could not install signal handler");
        }
    }

    /// Handle one classified error: record it, log it, and print the tag
    /// with its human guidance.
    pub fn handle(&mut self, classification: Classification, detail: &str) {
        *self.counters.entry(classification.tag.as_str()).or_insert(0) += 1;

        let tag = classification.tag.as_str();
        match classification.severity {
            Severity::Critical => {
                self.logger.error(&format!("[{tag}] {detail}"));
                eprintln!("[{tag}] {detail}");
                eprintln!("{}", classification.tag.human_message());
            }
            Severity::Recoverable => {
                self.logger.warn(&format!("[{tag}] {detail}"));
                eprintln!("[{tag}] {detail}");
            }
            Severity::Warning => {
                self.logger.warn(&format!("[{tag}] {detail}"));
            }
            Severity::Unknown => {
                self.logger.error(&format!("[{tag}] {detail}"));
                eprintln!("[{tag}] {detail}");
                eprintln!("{}", classification.tag.human_message());
            }
        }
    }

    /// Classification counts since startup, for diagnostics.
    pub fn classification_counts(&self) -> &HashMap<&'static str, u64> {
        &self.counters
    }

    /// Run cleanups and return the exit code for a graceful end.
    pub fn graceful_shutdown(&self) -> i32 {
        if let Ok(mut cleanups) = self.cleanups.lock() {
            for cleanup in cleanups.drain(..) {
                cleanup();
            }
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LogLevel;

    fn test_handler() -> (tempfile::TempDir, ErrorHandler) {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::at_path(dir.path().join("t.log"), LogLevel::Debug);
        (dir, ErrorHandler::new(logger))
    }

    #[test]
    fn test_tag_severities() {
        assert_eq!(ErrorTag::AuthenticationFailed.severity(), Severity::Critical);
        assert_eq!(ErrorTag::MergeConflict.severity(), Severity::Recoverable);
        assert_eq!(ErrorTag::DeprecatedFeature.severity(), Severity::Warning);
        assert_eq!(ErrorTag::Unknown.severity(), Severity::Unknown);
        assert!(ErrorTag::ApiRateLimit.is_recoverable());
        assert!(!ErrorTag::DiskSpaceFull.is_recoverable());
    }

    #[test]
    fn test_classify_by_message() {
        let cases = [
            ("fatal: loose object abc is corrupt", ErrorTag::GitRepositoryCorruption),
            ("EACCES: permission denied, open '/x'", ErrorTag::PermissionDenied),
            ("ENOSPC: no space left on device", ErrorTag::DiskSpaceFull),
            ("process ran out of memory", ErrorTag::OutOfMemory),
            ("Authentication failed for repo", ErrorTag::AuthenticationFailed),
            ("API rate limit exceeded for user", ErrorTag::ApiRateLimit),
            ("connect ETIMEDOUT 140.82.112.3:443", ErrorTag::NetworkTimeout),
            ("connect ECONNREFUSED 127.0.0.1:443", ErrorTag::ConnectionRefused),
            ("Merge conflict in src/app.ts", ErrorTag::MergeConflict),
            ("ENOENT: no such file or directory", ErrorTag::FileNotFound),
            ("EBUSY: resource busy or locked", ErrorTag::FileBusy),
            ("function xyz is deprecated", ErrorTag::DeprecatedFeature),
            ("??? something inexplicable", ErrorTag::Unknown),
        ];
        for (message, expected) in cases {
            let c = classify_message(message, None);
            assert_eq!(c.tag, expected, "message: {message}");
            assert_eq!(c.severity, expected.severity());
        }
    }

    #[test]
    fn test_classify_by_io_kind() {
        let c = classify_message("open failed", Some(ErrorKind::PermissionDenied));
        assert_eq!(c.tag, ErrorTag::PermissionDenied);
        let c = classify_message("open failed", Some(ErrorKind::NotFound));
        assert_eq!(c.tag, ErrorTag::FileNotFound);
        let c = classify_message("connect failed", Some(ErrorKind::ConnectionRefused));
        assert_eq!(c.tag, ErrorTag::ConnectionRefused);
    }

    #[test]
    fn test_classify_git_errors() {
        let c = classify_git(&GitError::MergeConflict("a.txt".into()));
        assert_eq!(c.tag, ErrorTag::MergeConflict);
        assert!(c.recoverable);

        let c = classify_git(&GitError::AuthFailed("denied".into()));
        assert_eq!(c.tag, ErrorTag::AuthenticationFailed);
        assert_eq!(c.severity, Severity::Critical);

        let c = classify_git(&GitError::Timeout(Duration::from_secs(30)));
        assert_eq!(c.tag, ErrorTag::NetworkTimeout);
    }

    #[test]
    fn test_classify_gateway_errors() {
        let c = classify_gateway(&GatewayError::RateLimit { reset_epoch: 1 });
        assert_eq!(c.tag, ErrorTag::ApiRateLimit);
        assert!(c.recoverable);

        let c = classify_gateway(&GatewayError::Unauthorized);
        assert_eq!(c.tag, ErrorTag::AuthenticationFailed);

        let c = classify_gateway(&GatewayError::Timeout);
        assert_eq!(c.tag, ErrorTag::NetworkTimeout);
    }

    #[test]
    fn test_counters_accumulate() {
        let (_dir, mut handler) = test_handler();
        let c = classify_message("merge conflict in x", None);
        handler.handle(c, "sync failed");
        handler.handle(c, "sync failed again");
        let c2 = classify_message("???", None);
        handler.handle(c2, "odd");

        let counts = handler.classification_counts();
        assert_eq!(counts.get("MERGE_CONFLICT"), Some(&2));
        assert_eq!(counts.get("UNKNOWN"), Some(&1));
    }

    #[test]
    fn test_cleanups_run_on_graceful_shutdown() {
        let (_dir, handler) = test_handler();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        handler.register_cleanup(move || flag.store(true, Ordering::SeqCst));

        let code = handler.graceful_shutdown();
        assert_eq!(code, 0);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_every_tag_has_guidance() {
        let tags = [
            ErrorTag::GitRepositoryCorruption,
            ErrorTag::PermissionDenied,
            ErrorTag::DiskSpaceFull,
            ErrorTag::OutOfMemory,
            ErrorTag::AuthenticationFailed,
            ErrorTag::UnknownCritical,
            ErrorTag::NetworkTimeout,
            ErrorTag::ConnectionRefused,
            ErrorTag::MergeConflict,
            ErrorTag::ApiRateLimit,
            ErrorTag::FileNotFound,
            ErrorTag::ConfigurationMissing,
            ErrorTag::FileBusy,
            ErrorTag::UnknownRecoverable,
            ErrorTag::OptionalFeatureUnavailable,
            ErrorTag::ConfigurationMissingNonfatal,
            ErrorTag::PerformanceWarning,
            ErrorTag::DeprecatedFeature,
            ErrorTag::Unknown,
        ];
        for tag in tags {
            assert!(!tag.human_message().is_empty());
            assert!(!tag.as_str().is_empty());
        }
    }
}
