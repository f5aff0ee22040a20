//! Team notification services.
//!
//! Sends workflow events to Slack (Web API `chat.postMessage`) and Discord
//! (webhook embeds). Every message is composable into both the structured
//! form (attachments / embeds) and a plaintext fallback, so a transport that
//! rejects rich payloads still delivers something readable.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::Config;
use crate::security::masking;

/// A field in a notification message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageField {
    pub name: String,
    pub value: String,
    /// Display side by side in rich clients.
    #[serde(default)]
    pub inline: bool,
}

/// Notification content, transport-independent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub text: String,

    /// Hex color for rich rendering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<MessageField>,

    #[serde(default)]
    pub is_error: bool,
}

impl NotificationMessage {
    /// Create a simple text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self { title: None, text: text.into(), color: None, fields: Vec::new(), is_error: false }
    }

    /// Create a message with a title.
    pub fn with_title(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            text: text.into(),
            color: None,
            fields: Vec::new(),
            is_error: false,
        }
    }

    /// Add a field.
    pub fn add_field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(MessageField { name: name.into(), value: value.into(), inline });
        self
    }

    /// Mark as a success message (green unless a color was set).
    pub fn success(mut self) -> Self {
        self.is_error = false;
        if self.color.is_none() {
            self.color = Some("#28a745".to_string());
        }
        self
    }

    /// Mark as an error message (red unless a color was set).
    pub fn error(mut self) -> Self {
        self.is_error = true;
        if self.color.is_none() {
            self.color = Some("#dc3545".to_string());
        }
        self
    }

    /// Plaintext rendering used by transports without rich formatting.
    pub fn to_plaintext(&self) -> String {
        let mut out = String::new();
        if let Some(ref title) = self.title {
            out.push_str(title);
            out.push('\n');
        }
        out.push_str(&self.text);
        for field in &self.fields {
            out.push('\n');
            out.push_str(&format!("{}: {}", field.name, field.value));
        }
        masking::mask_message(&out)
    }

    /// Announcement for a newly started piece of work.
    pub fn work_started(user: &str, branch: &str, issue_title: Option<&str>) -> Self {
        let mut msg = Self::with_title(
            "作業開始",
            format!("{user} さんが `{branch}` で作業を開始しました"),
        )
        .add_field("ブランチ", branch, true);
        if let Some(title) = issue_title {
            msg = msg.add_field("Issue", title, true);
        }
        msg.success()
    }

    /// Announcement for finished work, optionally linking the pull request.
    pub fn work_finished(user: &str, branch: &str, pr_url: Option<&str>) -> Self {
        let mut msg = Self::with_title(
            "作業完了",
            format!("{user} さんが `{branch}` の作業を完了しました"),
        )
        .add_field("ブランチ", branch, true);
        if let Some(url) = pr_url {
            msg = msg.add_field("Pull Request", url, false);
        }
        msg.success()
    }
}

/// Error type for notification operations.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("{service} returned {status}: {message}")]
    Service { service: &'static str, status: u16, message: String },

    #[error("Slack API error: {0}")]
    SlackApi(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Outcome of a fanout to all configured transports.
#[derive(Debug, Default)]
pub struct FanoutReport {
    /// (transport name, result) per attempted send.
    pub results: Vec<(&'static str, NotificationResult<()>)>,
}

impl FanoutReport {
    /// Whether at least one transport accepted the message.
    pub fn any_delivered(&self) -> bool {
        self.results.iter().any(|(_, r)| r.is_ok())
    }

    /// Whether no transport was configured at all.
    pub fn nothing_configured(&self) -> bool {
        self.results.is_empty()
    }
}

/// Client fanning notifications out to every configured transport.
pub struct Notifier {
    client: reqwest::blocking::Client,
    slack_token: Option<String>,
    slack_channel: String,
    discord_webhook: Option<String>,
}

impl Notifier {
    /// Build from configuration.
    pub fn new(config: &Config) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("teamflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("client construction cannot fail with static options");

        Self {
            client,
            slack_token: config.slack_token.clone(),
            slack_channel: config.slack_channel.clone(),
            discord_webhook: config.discord_webhook_url.clone(),
        }
    }

    /// Whether any transport is configured.
    pub fn is_configured(&self) -> bool {
        self.slack_token.is_some() || self.discord_webhook.is_some()
    }

    /// Send to every configured transport. Failures are collected, not
    /// propagated; a notification must never abort a phase.
    pub fn send_all(&self, message: &NotificationMessage) -> FanoutReport {
        let mut report = FanoutReport::default();

        if self.slack_token.is_some() {
            report.results.push(("slack", self.send_slack(message)));
        }
        if self.discord_webhook.is_some() {
            report.results.push(("discord", self.send_discord(message)));
        }

        for (transport, result) in &report.results {
            match result {
                Ok(()) => tracing::debug!(transport, "notification delivered"),
                Err(e) => tracing::warn!(transport, error = %e, "notification failed"),
            }
        }
        report
    }

    /// Post to Slack via `chat.postMessage`.
    fn send_slack(&self, message: &NotificationMessage) -> NotificationResult<()> {
        let token = self
            .slack_token
            .as_ref()
            .ok_or_else(|| NotificationError::Config("SLACK_TOKEN not set".to_string()))?;

        let payload = build_slack_payload(&self.slack_channel, message);
        let response = self
            .client
            .post("https://slack.com/api/chat.postMessage")
            .bearer_auth(token)
            .json(&payload)
            .send()
            .map_err(|e| NotificationError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(NotificationError::Service {
                service: "slack",
                status,
                message: response.text().unwrap_or_default(),
            });
        }

        // Slack reports failures in-body with HTTP 200.
        let body: serde_json::Value =
            response.json().map_err(|e| NotificationError::Http(e.to_string()))?;
        if body.get("ok").and_then(|v| v.as_bool()) == Some(true) {
            Ok(())
        } else {
            let error = body
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error")
                .to_string();
            Err(NotificationError::SlackApi(error))
        }
    }

    /// Post to Discord via webhook.
    fn send_discord(&self, message: &NotificationMessage) -> NotificationResult<()> {
        let url = self
            .discord_webhook
            .as_ref()
            .ok_or_else(|| NotificationError::Config("DISCORD_WEBHOOK_URL not set".to_string()))?;

        let payload = build_discord_payload(message);
        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .map_err(|e| NotificationError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        if (200..300).contains(&status) || status == 204 {
            Ok(())
        } else {
            Err(NotificationError::Service {
                service: "discord",
                status,
                message: response.text().unwrap_or_default(),
            })
        }
    }
}

/// Build the Slack `chat.postMessage` payload.
fn build_slack_payload(channel: &str, message: &NotificationMessage) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "channel": channel,
        "username": "teamflow",
        "icon_emoji": ":rocket:",
        "text": message.to_plaintext(),
    });

    if message.title.is_some() || !message.fields.is_empty() || message.color.is_some() {
        let mut attachment = serde_json::json!({
            "text": masking::mask_message(&message.text),
            "mrkdwn_in": ["text"],
        });
        if let Some(ref title) = message.title {
            attachment["title"] = serde_json::json!(title);
        }
        if let Some(ref color) = message.color {
            attachment["color"] = serde_json::json!(color);
        }
        if !message.fields.is_empty() {
            let fields: Vec<serde_json::Value> = message
                .fields
                .iter()
                .map(|f| {
                    serde_json::json!({
                        "title": f.name,
                        "value": masking::mask_message(&f.value),
                        "short": f.inline,
                    })
                })
                .collect();
            attachment["fields"] = serde_json::json!(fields);
        }
        payload["attachments"] = serde_json::json!([attachment]);
    }

    payload
}

/// Build the Discord webhook payload.
fn build_discord_payload(message: &NotificationMessage) -> serde_json::Value {
    if message.title.is_none() && message.fields.is_empty() && message.color.is_none() {
        return serde_json::json!({ "content": message.to_plaintext() });
    }

    let mut embed = serde_json::json!({
        "description": masking::mask_message(&message.text),
    });
    if let Some(ref title) = message.title {
        embed["title"] = serde_json::json!(title);
    }
    if let Some(decimal) = message.color.as_deref().and_then(hex_to_decimal) {
        embed["color"] = serde_json::json!(decimal);
    }
    if !message.fields.is_empty() {
        let fields: Vec<serde_json::Value> = message
            .fields
            .iter()
            .map(|f| {
                serde_json::json!({
                    "name": f.name,
                    "value": masking::mask_message(&f.value),
                    "inline": f.inline,
                })
            })
            .collect();
        embed["fields"] = serde_json::json!(fields);
    }

    serde_json::json!({ "embeds": [embed] })
}

/// Convert a hex color to decimal (Discord's embed color format).
fn hex_to_decimal(hex: &str) -> Option<u32> {
    u32::from_str_radix(hex.trim_start_matches('#'), 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_builders() {
        let msg = NotificationMessage::text("hello");
        assert!(msg.title.is_none());
        assert!(!msg.is_error);

        let msg = NotificationMessage::with_title("Title", "Body").success();
        assert_eq!(msg.color.as_deref(), Some("#28a745"));

        let msg = NotificationMessage::text("boom").error();
        assert!(msg.is_error);
        assert_eq!(msg.color.as_deref(), Some("#dc3545"));
    }

    #[test]
    fn test_plaintext_composition() {
        let msg = NotificationMessage::with_title("作業開始", "devさんが作業を開始しました")
            .add_field("ブランチ", "feature/login", true);
        let text = msg.to_plaintext();
        assert!(text.starts_with("作業開始\n"));
        assert!(text.contains("ブランチ: feature/login"));
    }

    #[test]
    fn test_plaintext_masks_secrets() {
        let msg = NotificationMessage::text(format!("token: ghp_{}", "a".repeat(36)));
        assert!(msg.to_plaintext().contains("***masked***"));
    }

    #[test]
    fn test_slack_payload_rich() {
        let msg = NotificationMessage::with_title("Done", "finished")
            .add_field("branch", "feature/x", true)
            .success();
        let payload = build_slack_payload("#dev", &msg);
        assert_eq!(payload["channel"], "#dev");
        assert_eq!(payload["username"], "teamflow");
        let attachment = &payload["attachments"][0];
        assert_eq!(attachment["title"], "Done");
        assert_eq!(attachment["color"], "#28a745");
        assert_eq!(attachment["fields"][0]["title"], "branch");
    }

    #[test]
    fn test_slack_payload_simple() {
        let payload = build_slack_payload("#dev", &NotificationMessage::text("hi"));
        assert_eq!(payload["text"], "hi");
        assert!(payload.get("attachments").is_none());
    }

    #[test]
    fn test_discord_payload_embed() {
        let msg = NotificationMessage::with_title("Done", "finished").success();
        let payload = build_discord_payload(&msg);
        let embed = &payload["embeds"][0];
        assert_eq!(embed["title"], "Done");
        assert_eq!(embed["color"], 2_664_261); // #28a745
    }

    #[test]
    fn test_discord_payload_simple() {
        let payload = build_discord_payload(&NotificationMessage::text("hi"));
        assert_eq!(payload["content"], "hi");
        assert!(payload.get("embeds").is_none());
    }

    #[test]
    fn test_work_messages() {
        let msg = NotificationMessage::work_started("dev", "feature/issue-12-login", Some("ログイン機能"));
        assert!(msg.to_plaintext().contains("feature/issue-12-login"));
        assert!(msg.to_plaintext().contains("ログイン機能"));

        let msg = NotificationMessage::work_finished("dev", "feature/x", Some("https://github.com/a/b/pull/1"));
        assert!(msg.to_plaintext().contains("pull/1"));
    }

    #[test]
    fn test_unconfigured_notifier_sends_nothing() {
        let notifier = Notifier::new(&Config::default());
        assert!(!notifier.is_configured());
        let report = notifier.send_all(&NotificationMessage::text("hi"));
        assert!(report.nothing_configured());
        assert!(!report.any_delivered());
    }

    #[test]
    fn test_hex_to_decimal() {
        assert_eq!(hex_to_decimal("#ffffff"), Some(16_777_215));
        assert_eq!(hex_to_decimal("28a745"), Some(2_664_261));
        assert_eq!(hex_to_decimal("#nope"), None);
    }
}
