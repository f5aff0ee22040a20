//! Secret masking for log lines and structured data.
//!
//! Every line written to the application log passes through [`mask_message`];
//! structured key/value data passes through [`mask_value_for_key`] before it
//! is serialized anywhere a human might read it.

use std::sync::LazyLock;

use regex::Regex;

/// Replacement inserted where a secret used to be.
pub const MASK: &str = "***masked***";

/// Key-name fragments whose values are always masked.
const SENSITIVE_KEY_PATTERNS: &[&str] =
    &["token", "password", "secret", "key", "auth", "credential"];

static GITHUB_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ghp_[A-Za-z0-9]+").expect("valid regex"));

static FINE_GRAINED_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"github_pat_[A-Za-z0-9_]+").expect("valid regex"));

static TOKEN_ASSIGNMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(token\s*[:=]\s*)(\S+)").expect("valid regex"));

static PASSWORD_ASSIGNMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(password\s*[:=]\s*)(\S+)").expect("valid regex"));

/// Check whether a key name refers to sensitive data.
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEY_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// Mask the value of a structured field based on its key name.
pub fn mask_value_for_key(key: &str, value: &str) -> String {
    if is_sensitive_key(key) {
        MASK.to_string()
    } else {
        mask_message(value)
    }
}

/// Apply message-level secret substitutions.
///
/// GitHub tokens keep their prefix so the operator can tell which kind of
/// credential leaked, but lose the payload.
pub fn mask_message(message: &str) -> String {
    let masked = GITHUB_TOKEN_RE.replace_all(message, format!("ghp_{MASK}"));
    let masked = FINE_GRAINED_TOKEN_RE.replace_all(&masked, format!("github_pat_{MASK}"));
    let masked = TOKEN_ASSIGNMENT_RE.replace_all(&masked, format!("${{1}}{MASK}"));
    let masked = PASSWORD_ASSIGNMENT_RE.replace_all(&masked, format!("${{1}}{MASK}"));
    masked.into_owned()
}

/// Mask every sensitive field of a JSON value, recursively.
pub fn mask_json(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, val) in map {
                if is_sensitive_key(key) {
                    out.insert(key.clone(), serde_json::Value::String(MASK.to_string()));
                } else {
                    out.insert(key.clone(), mask_json(val));
                }
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(mask_json).collect())
        }
        serde_json::Value::String(s) => serde_json::Value::String(mask_message(s)),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_github_token_masked() {
        let line = format!("authenticated with ghp_{}", "X".repeat(36));
        let masked = mask_message(&line);
        assert_eq!(masked, "authenticated with ghp_***masked***");
    }

    #[test]
    fn test_fine_grained_token_masked() {
        let line = "using github_pat_11ABCDEF0_abcdefghij";
        assert_eq!(mask_message(line), "using github_pat_***masked***");
    }

    #[test]
    fn test_token_assignment_masked() {
        assert_eq!(mask_message("token: hunter2"), "token: ***masked***");
        assert_eq!(mask_message("TOKEN=hunter2"), "TOKEN=***masked***");
    }

    #[test]
    fn test_password_assignment_masked() {
        assert_eq!(mask_message("password: hunter2"), "password: ***masked***");
    }

    #[test]
    fn test_plain_message_untouched() {
        assert_eq!(mask_message("created branch feature/login"), "created branch feature/login");
    }

    #[test]
    fn test_sensitive_keys() {
        for key in ["GITHUB_TOKEN", "apiKey", "DB_PASSWORD", "client_secret", "authHeader",
            "aws_credentials"]
        {
            assert!(is_sensitive_key(key), "{key} should be sensitive");
        }
        assert!(!is_sensitive_key("DEFAULT_BRANCH"));
        assert!(!is_sensitive_key("channel"));
    }

    #[test]
    fn test_mask_json_recursive() {
        let value = serde_json::json!({
            "github_token": "ghp_abc",
            "nested": { "password": "x", "branch": "main" },
            "list": ["token: abc"]
        });
        let masked = mask_json(&value);
        assert_eq!(masked["github_token"], "***masked***");
        assert_eq!(masked["nested"]["password"], "***masked***");
        assert_eq!(masked["nested"]["branch"], "main");
        assert_eq!(masked["list"][0], "token: ***masked***");
    }
}
