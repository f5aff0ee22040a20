//! Configuration management for Teamflow.
//!
//! Configuration is assembled from four layers, highest priority first:
//! process environment, the per-user global file
//! (`$HOME/.teamflow/config.json`), the project-level `.env` file, and
//! built-in defaults. The resulting [`Config`] is frozen after load.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::security::validators;

/// Name of the tool state directory, relative to the repository root.
pub const STATE_DIR_NAME: &str = ".teamflow";

/// Log level for the application log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    /// Upper-case label used in log lines.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Runtime environment, mirroring the `NODE_ENV` convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
    Test,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

/// Application configuration, frozen after [`Config::load`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// GitHub personal access token. Required for any API operation.
    pub github_token: Option<String>,

    /// Slack bot token for team notifications.
    pub slack_token: Option<String>,

    /// Slack channel notifications are posted to.
    pub slack_channel: String,

    /// Discord webhook URL for team notifications.
    pub discord_webhook_url: Option<String>,

    /// Name of the repository default branch.
    pub default_branch: String,

    /// Push automatically after a successful commit in the Finish phase.
    pub auto_push: bool,

    /// Open a pull request automatically after a successful push.
    pub auto_pr: bool,

    /// Require confirmation before destructive operations.
    pub confirm_destructive_actions: bool,

    /// Runtime environment.
    pub node_env: Environment,

    /// Verbose diagnostics.
    pub debug: bool,

    /// Application log level.
    pub log_level: LogLevel,

    /// Maximum retry attempts for recoverable operations.
    pub max_retries: u32,

    /// Wall-clock bound for a single Git invocation, in seconds.
    pub git_timeout_secs: u64,

    /// Minimum interval between outbound API requests, in milliseconds.
    pub api_min_interval_ms: u64,

    /// Number of backup records kept before the oldest is dropped.
    pub backup_retention: usize,

    /// Tool state directory (project level).
    #[serde(skip)]
    pub state_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github_token: None,
            slack_token: None,
            slack_channel: "#general".to_string(),
            discord_webhook_url: None,
            default_branch: "main".to_string(),
            auto_push: false,
            auto_pr: false,
            confirm_destructive_actions: true,
            node_env: Environment::default(),
            debug: false,
            log_level: LogLevel::Info,
            max_retries: 3,
            git_timeout_secs: 30,
            api_min_interval_ms: 100,
            backup_retention: 10,
            state_dir: PathBuf::from(STATE_DIR_NAME),
        }
    }
}

impl Config {
    /// Load configuration with hierarchical merging.
    ///
    /// Loading order (later overrides earlier):
    /// 1. Defaults
    /// 2. Project `.env` file in the current directory
    /// 3. `$HOME/.teamflow/config.json`
    /// 4. Process environment (highest priority)
    pub fn load() -> anyhow::Result<Self> {
        let cwd = std::env::current_dir()?;
        Self::load_from(&cwd)
    }

    /// Load configuration rooted at a specific directory.
    pub fn load_from(root: &Path) -> anyhow::Result<Self> {
        let mut config = Self::default();
        config.state_dir = root.join(STATE_DIR_NAME);

        let env_file = root.join(".env");
        if env_file.exists() {
            let vars = parse_env_file(&env_file)?;
            config.apply(&vars);
            tracing::debug!("Loaded project config from {}", env_file.display());
        }

        if let Some(global) = Self::global_config_path() {
            if global.exists() {
                let content = std::fs::read_to_string(&global)?;
                let vars: HashMap<String, String> = serde_json::from_str(&content)?;
                config.apply(&vars);
                tracing::debug!("Loaded global config from {}", global.display());
            }
        }

        let env_vars: HashMap<String, String> = std::env::vars().collect();
        config.apply(&env_vars);

        Ok(config)
    }

    /// Path of the per-user global configuration file.
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|d| d.join(STATE_DIR_NAME).join("config.json"))
    }

    /// Apply a key/value layer over the current values.
    fn apply(&mut self, vars: &HashMap<String, String>) {
        if let Some(v) = non_empty(vars.get("GITHUB_TOKEN")) {
            self.github_token = Some(v);
        }
        if let Some(v) = non_empty(vars.get("SLACK_TOKEN")) {
            self.slack_token = Some(v);
        }
        if let Some(v) = non_empty(vars.get("SLACK_CHANNEL")) {
            self.slack_channel = v;
        }
        if let Some(v) = non_empty(vars.get("DISCORD_WEBHOOK_URL")) {
            self.discord_webhook_url = Some(v);
        }
        if let Some(v) = non_empty(vars.get("DEFAULT_BRANCH")) {
            self.default_branch = v;
        }
        if let Some(v) = vars.get("AUTO_PUSH").and_then(|v| parse_bool(v)) {
            self.auto_push = v;
        }
        if let Some(v) = vars.get("AUTO_PR").and_then(|v| parse_bool(v)) {
            self.auto_pr = v;
        }
        if let Some(v) = vars.get("CONFIRM_DESTRUCTIVE_ACTIONS").and_then(|v| parse_bool(v)) {
            self.confirm_destructive_actions = v;
        }
        if let Some(v) = vars.get("NODE_ENV").and_then(|v| v.parse().ok()) {
            self.node_env = v;
        }
        if let Some(v) = vars.get("DEBUG").and_then(|v| parse_bool(v)) {
            self.debug = v;
        }
        if let Some(v) = vars.get("LOG_LEVEL").and_then(|v| v.parse().ok()) {
            self.log_level = v;
        }
        if let Some(v) = vars.get("TEAMFLOW_MAX_RETRIES").and_then(|v| v.parse().ok()) {
            self.max_retries = v;
        }
    }

    /// Git invocation timeout as a [`Duration`].
    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }

    /// Minimum inter-request interval as a [`Duration`].
    pub fn api_min_interval(&self) -> Duration {
        Duration::from_millis(self.api_min_interval_ms)
    }

    /// Backup directory under the state directory.
    pub fn backup_dir(&self) -> PathBuf {
        self.state_dir.join("backups")
    }

    /// Log directory under the state directory.
    pub fn log_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }

    /// Path of the offline-mode marker file.
    pub fn offline_mode_path(&self) -> PathBuf {
        self.state_dir.join("state").join("offline-mode.json")
    }

    /// Validate the configuration and produce a report.
    pub fn check(&self) -> ConfigReport {
        let mut report = ConfigReport::default();

        match &self.github_token {
            None => report.errors.push("GITHUB_TOKEN が設定されていません".to_string()),
            Some(token) => {
                if !validators::validate_github_token(token).valid {
                    report.errors.push("GITHUB_TOKEN の形式が正しくありません".to_string());
                }
            }
        }

        if self.slack_token.is_some() {
            let check = validators::validate_slack_channel(&self.slack_channel);
            if !check.valid {
                report
                    .errors
                    .push(check.error.unwrap_or_else(|| "SLACK_CHANNEL が不正です".to_string()));
            }
        } else {
            report.warnings.push("SLACK_TOKEN 未設定のため Slack 通知は無効です".to_string());
        }

        match &self.discord_webhook_url {
            Some(url) => {
                if !validators::validate_discord_webhook(url).valid {
                    report
                        .errors
                        .push("DISCORD_WEBHOOK_URL の形式が正しくありません".to_string());
                }
            }
            None => {
                report
                    .warnings
                    .push("DISCORD_WEBHOOK_URL 未設定のため Discord 通知は無効です".to_string());
            }
        }

        if self.default_branch.trim().is_empty() {
            report.errors.push("DEFAULT_BRANCH が空です".to_string());
        }

        report
    }

    /// Best-effort repair: create `.env` from `.env.example` when missing and
    /// make sure the state directory layout exists.
    pub fn fix(root: &Path) -> anyhow::Result<Vec<String>> {
        let mut actions = Vec::new();

        let env_file = root.join(".env");
        if !env_file.exists() {
            let example = root.join(".env.example");
            let content = if example.exists() {
                std::fs::read_to_string(&example)?
            } else {
                DEFAULT_ENV_TEMPLATE.to_string()
            };
            std::fs::write(&env_file, content)?;
            actions.push(format!("created {}", env_file.display()));
        }

        let state_dir = root.join(STATE_DIR_NAME);
        for sub in ["backups", "state", "logs"] {
            let dir = state_dir.join(sub);
            if !dir.exists() {
                std::fs::create_dir_all(&dir)?;
                actions.push(format!("created {}", dir.display()));
            }
        }

        Ok(actions)
    }

    /// Persist the project-level configuration file.
    pub fn save_project_file(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.state_dir)?;
        let path = self.state_dir.join("config.json");
        let mut map: HashMap<&str, serde_json::Value> = HashMap::new();
        map.insert("DEFAULT_BRANCH", serde_json::json!(self.default_branch));
        map.insert("SLACK_CHANNEL", serde_json::json!(self.slack_channel));
        map.insert("AUTO_PUSH", serde_json::json!(self.auto_push));
        map.insert("AUTO_PR", serde_json::json!(self.auto_pr));
        map.insert(
            "CONFIRM_DESTRUCTIVE_ACTIONS",
            serde_json::json!(self.confirm_destructive_actions),
        );
        std::fs::write(&path, serde_json::to_string_pretty(&map)?)?;
        Ok(())
    }
}

/// Outcome of a configuration check.
#[derive(Debug, Default)]
pub struct ConfigReport {
    /// Problems that prevent normal operation.
    pub errors: Vec<String>,
    /// Non-fatal observations.
    pub warnings: Vec<String>,
}

impl ConfigReport {
    /// True when no errors were found.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Skeleton written by `--fix-config` when no `.env.example` exists.
pub const DEFAULT_ENV_TEMPLATE: &str = "\
# Teamflow configuration
GITHUB_TOKEN=
# SLACK_TOKEN=
# SLACK_CHANNEL=#general
# DISCORD_WEBHOOK_URL=
# DEFAULT_BRANCH=main
# AUTO_PUSH=false
# AUTO_PR=false
# CONFIRM_DESTRUCTIVE_ACTIONS=true
";

/// Parse a `.env` file into a key/value map.
///
/// Supports `KEY=VALUE` lines, `#` comments, and single/double quoted values.
pub fn parse_env_file(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_env_content(&content))
}

fn parse_env_content(content: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let mut value = value.trim();
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            value = &value[1..value.len() - 1];
        }
        vars.insert(key.to_string(), value.to_string());
    }
    vars
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.slack_channel, "#general");
        assert_eq!(config.default_branch, "main");
        assert!(!config.auto_push);
        assert!(!config.auto_pr);
        assert!(config.confirm_destructive_actions);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.backup_retention, 10);
    }

    #[test]
    fn test_parse_env_content() {
        let vars = parse_env_content(
            "# comment\nGITHUB_TOKEN=ghp_abc\nDEFAULT_BRANCH=\"develop\"\n\nAUTO_PUSH=true\nBROKEN_LINE\n",
        );
        assert_eq!(vars.get("GITHUB_TOKEN").unwrap(), "ghp_abc");
        assert_eq!(vars.get("DEFAULT_BRANCH").unwrap(), "develop");
        assert_eq!(vars.get("AUTO_PUSH").unwrap(), "true");
        assert!(!vars.contains_key("BROKEN_LINE"));
    }

    #[test]
    fn test_layer_priority() {
        let mut config = Config::default();

        let mut low = HashMap::new();
        low.insert("DEFAULT_BRANCH".to_string(), "develop".to_string());
        low.insert("AUTO_PUSH".to_string(), "true".to_string());
        config.apply(&low);

        let mut high = HashMap::new();
        high.insert("DEFAULT_BRANCH".to_string(), "trunk".to_string());
        config.apply(&high);

        assert_eq!(config.default_branch, "trunk");
        assert!(config.auto_push);
    }

    #[test]
    fn test_empty_values_ignored() {
        let mut config = Config::default();
        let mut vars = HashMap::new();
        vars.insert("GITHUB_TOKEN".to_string(), "   ".to_string());
        config.apply(&vars);
        assert!(config.github_token.is_none());
    }

    #[test]
    fn test_parse_bool_variants() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_check_reports_missing_token() {
        let config = Config::default();
        let report = config.check();
        assert!(!report.is_ok());
        assert!(report.errors.iter().any(|e| e.contains("GITHUB_TOKEN")));
    }

    #[test]
    fn test_check_accepts_valid_token() {
        let config = Config {
            github_token: Some(format!("ghp_{}", "a".repeat(36))),
            ..Default::default()
        };
        let report = config.check();
        assert!(report.is_ok(), "errors: {:?}", report.errors);
    }
}
