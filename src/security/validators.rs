//! Input validation.
//!
//! Every validator trims its input, returns the trimmed (or normalized)
//! value when valid, and a human-readable message when not. Validators never
//! panic and never touch the filesystem.

use std::sync::LazyLock;

use regex::Regex;

use super::messages;

/// Outcome of a validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validated {
    /// Whether the input passed.
    pub valid: bool,
    /// Normalized value, present when valid.
    pub value: Option<String>,
    /// Human-readable message, present when invalid.
    pub error: Option<String>,
}

impl Validated {
    fn ok(value: impl Into<String>) -> Self {
        Self { valid: true, value: Some(value.into()), error: None }
    }

    fn err(message: &str) -> Self {
        Self { valid: false, value: None, error: Some(message.to_string()) }
    }

    /// Convert into a `Result`, for call sites that want `?`.
    pub fn into_result(self) -> Result<String, String> {
        if self.valid {
            Ok(self.value.unwrap_or_default())
        } else {
            Err(self.error.unwrap_or_default())
        }
    }
}

/// Characters Git forbids in reference names.
const BRANCH_FORBIDDEN_CHARS: &[char] = &['~', '^', ':', '?', '*', '[', ']', '\\'];

/// Validate a Git branch name.
pub fn validate_branch_name(input: &str) -> Validated {
    let name = input.trim();

    if name.is_empty() {
        return Validated::err(messages::BRANCH_EMPTY);
    }
    if name.len() > 100 {
        return Validated::err(messages::BRANCH_TOO_LONG);
    }
    if name.chars().any(char::is_whitespace) {
        return Validated::err(messages::BRANCH_WHITESPACE);
    }
    if name.contains("..") {
        return Validated::err(messages::BRANCH_DOUBLE_DOT);
    }
    if name.chars().any(|c| BRANCH_FORBIDDEN_CHARS.contains(&c)) {
        return Validated::err(messages::BRANCH_INVALID_CHARS);
    }
    if name.eq_ignore_ascii_case("HEAD") {
        return Validated::err(messages::BRANCH_RESERVED);
    }
    if name.starts_with('-')
        || name.ends_with('-')
        || name.starts_with('.')
        || name.ends_with('.')
        || name.starts_with('/')
        || name.ends_with('/')
    {
        return Validated::err(messages::BRANCH_EDGE_CHARS);
    }
    if name.contains("//") {
        return Validated::err(messages::BRANCH_CONSECUTIVE_SLASH);
    }

    Validated::ok(name)
}

/// Validate a commit message. Trimmed length must be within 5..=200.
pub fn validate_commit_message(input: &str) -> Validated {
    let message = input.trim();
    if message.len() < 5 {
        return Validated::err(messages::COMMIT_TOO_SHORT);
    }
    if message.len() > 200 {
        return Validated::err(messages::COMMIT_TOO_LONG);
    }
    Validated::ok(message)
}

static CLASSIC_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ghp_[A-Za-z0-9]{36}$").expect("valid regex"));

static FINE_GRAINED_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^github_pat_[A-Za-z0-9_]{82}$").expect("valid regex"));

/// Validate a GitHub personal access token.
///
/// Accepts the classic `ghp_` shape and the fine-grained `github_pat_` shape,
/// nothing else.
pub fn validate_github_token(input: &str) -> Validated {
    let token = input.trim();
    if CLASSIC_TOKEN_RE.is_match(token) || FINE_GRAINED_TOKEN_RE.is_match(token) {
        Validated::ok(token)
    } else {
        Validated::err(messages::TOKEN_INVALID)
    }
}

static SLACK_CHANNEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#[a-z0-9_-]+$").expect("valid regex"));

/// Validate a Slack channel name, prepending `#` when absent.
pub fn validate_slack_channel(input: &str) -> Validated {
    let trimmed = input.trim();
    let channel =
        if trimmed.starts_with('#') { trimmed.to_string() } else { format!("#{trimmed}") };

    if channel.len() < 2 || channel.len() > 22 {
        return Validated::err(messages::SLACK_CHANNEL_LENGTH);
    }
    if !SLACK_CHANNEL_RE.is_match(&channel) {
        return Validated::err(messages::SLACK_CHANNEL_CHARS);
    }
    Validated::ok(channel)
}

/// Validate a URL, optionally restricting the scheme.
pub fn validate_url(input: &str, allowed_schemes: Option<&[&str]>) -> Validated {
    let url = input.trim();
    let Some((scheme, rest)) = url.split_once("://") else {
        return Validated::err(messages::URL_INVALID);
    };
    if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+') {
        return Validated::err(messages::URL_INVALID);
    }
    let host = rest.split(['/', '?', '#']).next().unwrap_or("");
    if host.is_empty() {
        return Validated::err(messages::URL_INVALID);
    }
    if let Some(schemes) = allowed_schemes {
        if !schemes.contains(&scheme) {
            return Validated::err(messages::URL_SCHEME);
        }
    }
    Validated::ok(url)
}

static DISCORD_WEBHOOK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://discord\.com/api/webhooks/\d+/[\w-]+$").expect("valid regex")
});

/// Validate a Discord webhook URL.
pub fn validate_discord_webhook(input: &str) -> Validated {
    let url = input.trim();
    if !validate_url(url, Some(&["https"])).valid {
        return Validated::err(messages::DISCORD_WEBHOOK_INVALID);
    }
    if !DISCORD_WEBHOOK_RE.is_match(url) {
        return Validated::err(messages::DISCORD_WEBHOOK_INVALID);
    }
    Validated::ok(url)
}

/// Directories never accepted as user-supplied paths.
const FORBIDDEN_PATH_PREFIXES: &[&str] = &["/etc", "/root", "/var/log"];

/// Validate a user-supplied file path.
pub fn validate_file_path(input: &str) -> Validated {
    let path = input.trim();
    if path.contains('\0') {
        return Validated::err(messages::PATH_NUL);
    }
    if path.split(['/', '\\']).any(|segment| segment == "..") {
        return Validated::err(messages::PATH_TRAVERSAL);
    }
    for prefix in FORBIDDEN_PATH_PREFIXES {
        if path == *prefix || path.starts_with(&format!("{prefix}/")) {
            return Validated::err(messages::PATH_FORBIDDEN);
        }
    }
    Validated::ok(path)
}
