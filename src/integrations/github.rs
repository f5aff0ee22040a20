//! Rate-limited GitHub API gateway.
//!
//! All outbound GitHub traffic flows through one [`GithubGateway`]. Requests
//! are dispatched strictly in call order; the gateway enforces a minimum
//! inter-request interval, consults the last-seen rate-limit window before
//! every call, and refreshes it from every response. When initialization
//! fails (missing token, unreachable API, underivable remote) the gateway
//! stays in an unavailable state and every operation returns a
//! [`GatewayError::NotAvailable`] carrying a remediation hint instead of
//! touching the network.

use std::sync::LazyLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::core::{Config, OfflineMode};

const API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("teamflow/", env!("CARGO_PKG_VERSION"));

/// Last-seen API quota window. Owned exclusively by the gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitState {
    pub limit: u32,
    pub remaining: u32,
    /// Unix epoch seconds when the window resets.
    pub reset_epoch: u64,
    pub used: u32,
}

impl RateLimitState {
    /// Update from response headers; absent headers leave fields untouched.
    pub fn update_from_headers(&mut self, headers: &HeaderMap) {
        if let Some(v) = header_u64(headers, "x-ratelimit-limit") {
            self.limit = v as u32;
        }
        if let Some(v) = header_u64(headers, "x-ratelimit-remaining") {
            self.remaining = v as u32;
        }
        if let Some(v) = header_u64(headers, "x-ratelimit-reset") {
            self.reset_epoch = v;
        }
        if let Some(v) = header_u64(headers, "x-ratelimit-used") {
            self.used = v as u32;
        }
    }

    /// How long a caller must wait before the next dispatch, if the window is
    /// exhausted. One second of slack is added past the advertised reset.
    pub fn wait_before_next(&self, now_epoch: u64) -> Option<Duration> {
        if self.remaining > 0 || self.reset_epoch == 0 {
            return None;
        }
        let until = self.reset_epoch.saturating_sub(now_epoch) + 1;
        Some(Duration::from_secs(until))
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn now_epoch() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Recognized 422 validation failures on PR creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    /// "No commits between base and head".
    NoCommits,
    /// A pull request for this head already exists.
    AlreadyExists,
    Other,
}

/// Tagged gateway error.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("GitHub連携を利用できません: {reason}")]
    NotAvailable { reason: String },

    #[error("GitHubの認証に失敗しました (401)")]
    Unauthorized,

    #[error("APIレート制限に達しました (リセット: {reset_epoch})")]
    RateLimit { reset_epoch: u64 },

    #[error("アクセスが拒否されました (403): {0}")]
    Forbidden(String),

    #[error("リソースが見つかりません (404): {0}")]
    NotFound(String),

    #[error("リクエストが無効です (422): {message}")]
    Validation { message: String, kind: ValidationKind },

    #[error("APIリクエストがタイムアウトしました")]
    Timeout,

    #[error("HTTPエラー: {0}")]
    Http(String),

    #[error("APIレスポンスを解釈できません: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Stable tag used by the error classifier.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::NotAvailable { .. } => "NOT_AVAILABLE",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::RateLimit { .. } => "RATE_LIMIT",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Http(_) => "HTTP_ERROR",
            Self::Decode(_) => "DECODE_ERROR",
        }
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

// ----------------------------------------------------------------------
// Wire models
// ----------------------------------------------------------------------

/// A GitHub user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub login: String,
}

/// A GitHub label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

/// A GitHub issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub assignees: Vec<User>,
    pub updated_at: String,
    pub html_url: String,
    /// Present when the "issue" is actually a pull request.
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

/// A review on a pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub user: User,
    pub state: String,
    #[serde(default)]
    pub submitted_at: Option<String>,
}

/// Head/base ref of a pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRef {
    #[serde(rename = "ref")]
    pub name: String,
}

/// A pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    #[serde(default)]
    pub draft: bool,
    pub head: PullRef,
    pub base: PullRef,
    pub created_at: String,
    #[serde(default)]
    pub merged_at: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub requested_reviewers: Vec<User>,
    /// Filled by [`GithubGateway::list_pulls_with_reviews`].
    #[serde(skip)]
    pub reviews: Vec<Review>,
}

impl PullRequest {
    /// Parse the creation timestamp.
    pub fn created_time(&self) -> Option<DateTime<Utc>> {
        parse_time(&self.created_at)
    }

    /// Parse the merge timestamp, when merged.
    pub fn merged_time(&self) -> Option<DateTime<Utc>> {
        self.merged_at.as_deref().and_then(parse_time)
    }
}

/// A remote branch with its tip commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchInfo {
    pub name: String,
    pub commit: BranchCommit,
}

/// Tip commit of a branch listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchCommit {
    pub sha: String,
}

/// One commit from the commits listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitSummary {
    pub sha: String,
    pub commit: CommitDetail,
    #[serde(default)]
    pub author: Option<User>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitDetail {
    pub message: String,
    pub author: CommitAuthor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitAuthor {
    pub name: String,
    pub date: String,
}

/// Aggregated repository activity over a window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepoMetrics {
    pub window_days: i64,
    pub commits: usize,
    pub prs_created: usize,
    pub prs_merged: usize,
    /// Mean hours from PR creation to merge, over PRs merged in the window.
    pub mean_review_hours: Option<f64>,
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value).ok().map(|t| t.with_timezone(&Utc))
}

// ----------------------------------------------------------------------
// Gateway
// ----------------------------------------------------------------------

static OWNER_REPO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"github\.com[:/]([^/\s]+)/([^/\s]+?)(?:\.git)?/?$").expect("valid regex")
});

/// Derive `(owner, repo)` from a Git remote URL.
pub fn derive_owner_repo(remote_url: &str) -> Option<(String, String)> {
    let caps = OWNER_REPO_RE.captures(remote_url.trim())?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

#[derive(Debug, Clone)]
enum GatewayState {
    Ready,
    Unavailable { reason: String },
}

/// Serialized, rate-limited GitHub client.
pub struct GithubGateway {
    client: Client,
    token: String,
    owner: String,
    repo: String,
    /// Login of the authenticated user.
    user: String,
    state: GatewayState,
    rate_limit: RateLimitState,
    last_request: Option<Instant>,
    min_interval: Duration,
}

impl GithubGateway {
    /// Initialize the gateway: authenticate, capture identity, derive
    /// `owner/repo` from the remote URL, and probe repository access.
    ///
    /// Never fails; on any initialization problem the gateway is returned in
    /// the unavailable state and operations surface the reason.
    pub fn connect(config: &Config, offline: &OfflineMode, remote_url: Option<&str>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .expect("client construction cannot fail with static options");

        let mut gateway = Self {
            client,
            token: String::new(),
            owner: String::new(),
            repo: String::new(),
            user: String::new(),
            state: GatewayState::Ready,
            rate_limit: RateLimitState::default(),
            last_request: None,
            min_interval: config.api_min_interval(),
        };

        if offline.is_enabled() {
            let since = offline.state().map(|s| s.since).unwrap_or_default();
            gateway.state = GatewayState::Unavailable {
                reason: format!(
                    "オフラインモードが有効です ({since} から)。ネットワーク復旧後に .teamflow/state/offline-mode.json を削除してください"
                ),
            };
            return gateway;
        }

        let Some(token) = config.github_token.clone() else {
            gateway.state = GatewayState::Unavailable {
                reason: "GITHUB_TOKEN が設定されていません。.env に GITHUB_TOKEN=<PAT> を追加してください"
                    .to_string(),
            };
            return gateway;
        };
        gateway.token = token;

        let Some(url) = remote_url else {
            gateway.state = GatewayState::Unavailable {
                reason: "origin リモートが見つかりません。git remote add origin <url> を実行してください"
                    .to_string(),
            };
            return gateway;
        };
        let Some((owner, repo)) = derive_owner_repo(url) else {
            gateway.state = GatewayState::Unavailable {
                reason: format!("リモートURLからリポジトリを特定できません: {url}"),
            };
            return gateway;
        };
        gateway.owner = owner;
        gateway.repo = repo;

        match gateway.fetch_identity() {
            Ok(login) => gateway.user = login,
            Err(e) => {
                gateway.state = GatewayState::Unavailable {
                    reason: format!(
                        "GitHub認証に失敗しました ({e})。トークンの有効期限とスコープ (repo) を確認してください"
                    ),
                };
                return gateway;
            }
        }

        if let Err(e) = gateway.probe_repository() {
            gateway.state = GatewayState::Unavailable {
                reason: format!(
                    "リポジトリ {}/{} にアクセスできません ({e})。権限を確認してください",
                    gateway.owner, gateway.repo
                ),
            };
        }

        gateway
    }

    /// Whether initialization succeeded.
    pub fn is_available(&self) -> bool {
        matches!(self.state, GatewayState::Ready)
    }

    /// Authenticated user login, empty when unavailable.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// `owner/repo` slug.
    pub fn repo_slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Read-only view of the rate-limit window.
    pub fn rate_limit(&self) -> RateLimitState {
        self.rate_limit
    }

    fn unavailable_error(&self) -> GatewayError {
        let reason = match &self.state {
            GatewayState::Unavailable { reason } => reason.clone(),
            GatewayState::Ready => "internal state error".to_string(),
        };
        GatewayError::NotAvailable { reason }
    }

    fn fetch_identity(&mut self) -> GatewayResult<String> {
        let value = self.request(Method::GET, &format!("{API_BASE}/user"), None)?;
        value
            .get("login")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| GatewayError::Decode("missing login in /user response".to_string()))
    }

    fn probe_repository(&mut self) -> GatewayResult<()> {
        let url = format!("{API_BASE}/repos/{}/{}", self.owner, self.repo);
        self.request(Method::GET, &url, None)?;

        // Collaborator permission is advisory; some tokens cannot read it.
        let url = format!(
            "{API_BASE}/repos/{}/{}/collaborators/{}/permission",
            self.owner, self.repo, self.user
        );
        if let Ok(value) = self.request(Method::GET, &url, None) {
            if let Some(p) = value.get("permission").and_then(|v| v.as_str()) {
                tracing::debug!(permission = p, "collaborator permission");
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Dispatch one request, honoring pacing and the rate-limit window.
    ///
    /// A 403 carrying rate-limit semantics puts the request back at the head
    /// of the (serialized) queue: we sleep until the advertised reset and
    /// dispatch it again once.
    fn request(
        &mut self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> GatewayResult<serde_json::Value> {
        self.pace();
        match self.dispatch_once(method.clone(), url, body.clone()) {
            Err(GatewayError::RateLimit { reset_epoch }) => {
                let wait = reset_epoch.saturating_sub(now_epoch()) + 1;
                tracing::info!(wait_secs = wait, "rate limited; sleeping until window reset");
                std::thread::sleep(Duration::from_secs(wait));
                self.pace();
                self.dispatch_once(method, url, body)
            }
            other => other,
        }
    }

    /// Sleep as needed to honor the minimum interval and the quota window.
    fn pace(&mut self) {
        if let Some(wait) = self.rate_limit.wait_before_next(now_epoch()) {
            tracing::info!(wait_secs = wait.as_secs(), "rate-limit window exhausted; waiting");
            std::thread::sleep(wait);
        }
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                std::thread::sleep(self.min_interval - elapsed);
            }
        }
    }

    fn dispatch_once(
        &mut self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> GatewayResult<serde_json::Value> {
        let mut request = self
            .client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(body) = body {
            request = request.json(&body);
        }

        self.last_request = Some(Instant::now());
        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout
            } else {
                GatewayError::Http(e.to_string())
            }
        })?;

        self.rate_limit.update_from_headers(response.headers());

        let status = response.status();
        if status.is_success() {
            if status == StatusCode::NO_CONTENT {
                return Ok(serde_json::Value::Null);
            }
            return response.json().map_err(|e| GatewayError::Decode(e.to_string()));
        }

        let headers = response.headers().clone();
        let body: serde_json::Value = response.json().unwrap_or(serde_json::Value::Null);
        Err(classify_response(status, &headers, &body, self.rate_limit.reset_epoch))
    }

    fn parse_list<T: serde::de::DeserializeOwned>(
        value: serde_json::Value,
    ) -> GatewayResult<Vec<T>> {
        serde_json::from_value(value).map_err(|e| GatewayError::Decode(e.to_string()))
    }

    fn parse_one<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> GatewayResult<T> {
        serde_json::from_value(value).map_err(|e| GatewayError::Decode(e.to_string()))
    }

    fn repo_url(&self, path: &str) -> String {
        format!("{API_BASE}/repos/{}/{}/{}", self.owner, self.repo, path)
    }

    fn guard(&self) -> GatewayResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(self.unavailable_error())
        }
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Open issues, excluding pull requests.
    pub fn list_open_issues(&mut self) -> GatewayResult<Vec<Issue>> {
        self.guard()?;
        let url = self.repo_url("issues?state=open&per_page=50");
        let issues: Vec<Issue> = Self::parse_list(self.request(Method::GET, &url, None)?)?;
        Ok(issues.into_iter().filter(|i| i.pull_request.is_none()).collect())
    }

    /// Create a new issue.
    pub fn create_issue(
        &mut self,
        title: &str,
        body: Option<&str>,
        labels: &[String],
    ) -> GatewayResult<Issue> {
        self.guard()?;
        let url = self.repo_url("issues");
        let mut payload = serde_json::json!({ "title": title });
        if let Some(body) = body {
            payload["body"] = serde_json::json!(body);
        }
        if !labels.is_empty() {
            payload["labels"] = serde_json::json!(labels);
        }
        Self::parse_one(self.request(Method::POST, &url, Some(payload))?)
    }

    /// Fetch one issue by number.
    pub fn get_issue(&mut self, number: u64) -> GatewayResult<Issue> {
        self.guard()?;
        let url = self.repo_url(&format!("issues/{number}"));
        Self::parse_one(self.request(Method::GET, &url, None)?)
    }

    /// Add a comment to an issue.
    pub fn comment_issue(&mut self, number: u64, body: &str) -> GatewayResult<()> {
        self.guard()?;
        let url = self.repo_url(&format!("issues/{number}/comments"));
        self.request(Method::POST, &url, Some(serde_json::json!({ "body": body })))?;
        Ok(())
    }

    /// Open pull requests.
    pub fn list_open_pulls(&mut self) -> GatewayResult<Vec<PullRequest>> {
        self.guard()?;
        let url = self.repo_url("pulls?state=open&per_page=50");
        Self::parse_list(self.request(Method::GET, &url, None)?)
    }

    /// Open pull requests, each with its reviews attached.
    pub fn list_pulls_with_reviews(&mut self) -> GatewayResult<Vec<PullRequest>> {
        let mut pulls = self.list_open_pulls()?;
        for pull in &mut pulls {
            let url = self.repo_url(&format!("pulls/{}/reviews", pull.number));
            pull.reviews = Self::parse_list(self.request(Method::GET, &url, None)?)?;
        }
        Ok(pulls)
    }

    /// Pull requests in any state, most recently updated first.
    pub fn list_all_pulls(&mut self) -> GatewayResult<Vec<PullRequest>> {
        self.guard()?;
        let url = self.repo_url("pulls?state=all&sort=updated&direction=desc&per_page=100");
        Self::parse_list(self.request(Method::GET, &url, None)?)
    }

    /// Create a pull request and request reviewers.
    pub fn create_pull(
        &mut self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
        draft: bool,
        reviewers: &[String],
    ) -> GatewayResult<PullRequest> {
        self.guard()?;
        let url = self.repo_url("pulls");
        let payload = serde_json::json!({
            "title": title,
            "body": body,
            "head": head,
            "base": base,
            "draft": draft,
        });
        let pull: PullRequest = Self::parse_one(self.request(Method::POST, &url, Some(payload))?)?;

        if !reviewers.is_empty() {
            let url = self.repo_url(&format!("pulls/{}/requested_reviewers", pull.number));
            let payload = serde_json::json!({ "reviewers": reviewers });
            // Reviewer assignment failing must not undo PR creation.
            if let Err(e) = self.request(Method::POST, &url, Some(payload)) {
                tracing::warn!(error = %e, "failed to request reviewers");
            }
        }
        Ok(pull)
    }

    /// Remote branches.
    pub fn list_branches(&mut self) -> GatewayResult<Vec<BranchInfo>> {
        self.guard()?;
        let url = self.repo_url("branches?per_page=100");
        Self::parse_list(self.request(Method::GET, &url, None)?)
    }

    /// Contributor logins, most active first.
    pub fn list_contributors(&mut self) -> GatewayResult<Vec<String>> {
        self.guard()?;
        let url = self.repo_url("contributors?per_page=30");
        let users: Vec<User> = Self::parse_list(self.request(Method::GET, &url, None)?)?;
        Ok(users.into_iter().map(|u| u.login).collect())
    }

    /// Suggest reviewers: contributors minus the authenticated user and an
    /// explicit exclude list.
    pub fn suggest_reviewers(&mut self, exclude: &[String], max: usize) -> GatewayResult<Vec<String>> {
        let contributors = self.list_contributors()?;
        Ok(filter_reviewers(contributors, &self.user, exclude, max))
    }

    /// Commits on the default branch since a point in time.
    pub fn commits_since(&mut self, since: DateTime<Utc>) -> GatewayResult<Vec<CommitSummary>> {
        self.guard()?;
        let url = self.repo_url(&format!(
            "commits?since={}&per_page=100",
            urlencoding::encode(&since.to_rfc3339())
        ));
        Self::parse_list(self.request(Method::GET, &url, None)?)
    }

    /// Aggregate repository activity over the trailing window.
    pub fn repo_metrics(&mut self, window_days: i64) -> GatewayResult<RepoMetrics> {
        let since = Utc::now() - chrono::Duration::days(window_days);
        let commits = self.commits_since(since)?;
        let pulls = self.list_all_pulls()?;
        Ok(compute_metrics(window_days, commits.len(), &pulls, since))
    }
}

/// Pure reviewer filtering, split out for tests.
fn filter_reviewers(
    contributors: Vec<String>,
    own_login: &str,
    exclude: &[String],
    max: usize,
) -> Vec<String> {
    contributors
        .into_iter()
        .filter(|login| login != own_login)
        .filter(|login| !exclude.iter().any(|e| e.eq_ignore_ascii_case(login)))
        .take(max)
        .collect()
}

/// Pure metrics aggregation, split out for tests.
fn compute_metrics(
    window_days: i64,
    commits: usize,
    pulls: &[PullRequest],
    since: DateTime<Utc>,
) -> RepoMetrics {
    let created: Vec<_> =
        pulls.iter().filter(|p| p.created_time().is_some_and(|t| t >= since)).collect();
    let merged: Vec<_> =
        pulls.iter().filter(|p| p.merged_time().is_some_and(|t| t >= since)).collect();

    let review_hours: Vec<f64> = merged
        .iter()
        .filter_map(|p| {
            let created = p.created_time()?;
            let merged = p.merged_time()?;
            Some((merged - created).num_minutes() as f64 / 60.0)
        })
        .collect();

    let mean_review_hours = if review_hours.is_empty() {
        None
    } else {
        Some(review_hours.iter().sum::<f64>() / review_hours.len() as f64)
    };

    RepoMetrics {
        window_days,
        commits,
        prs_created: created.len(),
        prs_merged: merged.len(),
        mean_review_hours,
    }
}

/// Map a non-success response to a tagged error.
fn classify_response(
    status: StatusCode,
    headers: &HeaderMap,
    body: &serde_json::Value,
    last_reset: u64,
) -> GatewayError {
    let message = body
        .get("message")
        .and_then(|m| m.as_str())
        .map(String::from)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    match status.as_u16() {
        401 => GatewayError::Unauthorized,
        403 => {
            let remaining_zero = header_u64(headers, "x-ratelimit-remaining") == Some(0);
            let mentions_limit = message.to_lowercase().contains("rate limit");
            if remaining_zero || mentions_limit {
                let reset = header_u64(headers, "x-ratelimit-reset").unwrap_or(last_reset);
                GatewayError::RateLimit { reset_epoch: reset }
            } else {
                GatewayError::Forbidden(message)
            }
        }
        404 => GatewayError::NotFound(message),
        422 => {
            let kind = if message.contains("No commits between") {
                ValidationKind::NoCommits
            } else if message.contains("already exists") {
                ValidationKind::AlreadyExists
            } else {
                ValidationKind::Other
            };
            GatewayError::Validation { message, kind }
        }
        _ => GatewayError::Http(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                name.parse::<HeaderName>().unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_derive_owner_repo() {
        let cases = [
            ("https://github.com/acme/widgets.git", ("acme", "widgets")),
            ("https://github.com/acme/widgets", ("acme", "widgets")),
            ("git@github.com:acme/widgets.git", ("acme", "widgets")),
            ("ssh://git@github.com/acme/widgets", ("acme", "widgets")),
        ];
        for (url, (owner, repo)) in cases {
            let (o, r) = derive_owner_repo(url).unwrap_or_else(|| panic!("failed: {url}"));
            assert_eq!((o.as_str(), r.as_str()), (owner, repo));
        }
        assert!(derive_owner_repo("https://gitlab.com/acme/widgets").is_none());
    }

    #[test]
    fn test_rate_limit_update_from_headers() {
        let mut state = RateLimitState::default();
        state.update_from_headers(&headers(&[
            ("x-ratelimit-limit", "5000"),
            ("x-ratelimit-remaining", "4990"),
            ("x-ratelimit-reset", "1700000000"),
            ("x-ratelimit-used", "10"),
        ]));
        assert_eq!(state.limit, 5000);
        assert_eq!(state.remaining, 4990);
        assert_eq!(state.reset_epoch, 1_700_000_000);
        assert_eq!(state.used, 10);

        // Absent headers leave the window untouched.
        state.update_from_headers(&HeaderMap::new());
        assert_eq!(state.remaining, 4990);
    }

    #[test]
    fn test_rate_limit_gating() {
        let now = 1_700_000_000u64;
        let state = RateLimitState { limit: 60, remaining: 0, reset_epoch: now + 2, used: 60 };
        let wait = state.wait_before_next(now).unwrap();
        assert!(wait >= Duration::from_secs(2));
        assert!(wait <= Duration::from_secs(3));

        let open = RateLimitState { remaining: 10, ..state };
        assert!(open.wait_before_next(now).is_none());
    }

    #[test]
    fn test_classify_401() {
        let err = classify_response(StatusCode::UNAUTHORIZED, &HeaderMap::new(), &serde_json::json!({}), 0);
        assert_eq!(err.tag(), "UNAUTHORIZED");
    }

    #[test]
    fn test_classify_403_rate_limit_by_header() {
        let err = classify_response(
            StatusCode::FORBIDDEN,
            &headers(&[("x-ratelimit-remaining", "0"), ("x-ratelimit-reset", "123")]),
            &serde_json::json!({"message": "API rate limit exceeded"}),
            0,
        );
        match err {
            GatewayError::RateLimit { reset_epoch } => assert_eq!(reset_epoch, 123),
            other => panic!("expected RateLimit, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_403_forbidden() {
        let err = classify_response(
            StatusCode::FORBIDDEN,
            &headers(&[("x-ratelimit-remaining", "100")]),
            &serde_json::json!({"message": "Resource not accessible by integration"}),
            0,
        );
        assert_eq!(err.tag(), "FORBIDDEN");
    }

    #[test]
    fn test_classify_404_and_422() {
        let err = classify_response(StatusCode::NOT_FOUND, &HeaderMap::new(), &serde_json::json!({}), 0);
        assert_eq!(err.tag(), "NOT_FOUND");

        let err = classify_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            &HeaderMap::new(),
            &serde_json::json!({"message": "Validation Failed: No commits between main and feature/x"}),
            0,
        );
        match err {
            GatewayError::Validation { kind, .. } => assert_eq!(kind, ValidationKind::NoCommits),
            other => panic!("expected Validation, got {other:?}"),
        }

        let err = classify_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            &HeaderMap::new(),
            &serde_json::json!({"message": "A pull request already exists for acme:feature/x."}),
            0,
        );
        match err {
            GatewayError::Validation { kind, .. } => {
                assert_eq!(kind, ValidationKind::AlreadyExists);
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_filter_reviewers_excludes_self_and_list() {
        let contributors = vec![
            "alice".to_string(),
            "bob".to_string(),
            "carol".to_string(),
            "dave".to_string(),
        ];
        let picked = filter_reviewers(contributors, "bob", &["Carol".to_string()], 2);
        assert_eq!(picked, vec!["alice", "dave"]);
    }

    #[test]
    fn test_compute_metrics() {
        let since = Utc::now() - chrono::Duration::days(7);
        let mk = |created_days_ago: i64, merged_days_ago: Option<i64>| PullRequest {
            number: 1,
            title: "x".into(),
            body: None,
            state: "closed".into(),
            draft: false,
            head: PullRef { name: "feature/x".into() },
            base: PullRef { name: "main".into() },
            created_at: (Utc::now() - chrono::Duration::days(created_days_ago)).to_rfc3339(),
            merged_at: merged_days_ago
                .map(|d| (Utc::now() - chrono::Duration::days(d)).to_rfc3339()),
            html_url: String::new(),
            requested_reviewers: vec![],
            reviews: vec![],
        };

        let pulls = vec![mk(2, Some(1)), mk(3, None), mk(30, Some(20)), mk(10, Some(2))];
        let metrics = compute_metrics(7, 12, &pulls, since);
        assert_eq!(metrics.commits, 12);
        assert_eq!(metrics.prs_created, 2);
        assert_eq!(metrics.prs_merged, 2);
        let mean = metrics.mean_review_hours.unwrap();
        // (24h + 192h) / 2 = 108h
        assert!((mean - 108.0).abs() < 1.0, "mean: {mean}");
    }

    #[test]
    fn test_unavailable_gateway_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let offline = OfflineMode::at(dir.path().join("offline-mode.json"));
        offline.enable("test").unwrap();

        let config = Config::default();
        let mut gateway = GithubGateway::connect(&config, &offline, None);
        assert!(!gateway.is_available());
        let err = gateway.list_open_issues().unwrap_err();
        assert_eq!(err.tag(), "NOT_AVAILABLE");
        assert!(err.to_string().contains("オフライン"));
    }

    #[test]
    fn test_missing_token_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let offline = OfflineMode::at(dir.path().join("offline-mode.json"));
        let config = Config::default();
        let mut gateway =
            GithubGateway::connect(&config, &offline, Some("https://github.com/acme/widgets.git"));
        assert!(!gateway.is_available());
        let err = gateway.get_issue(1).unwrap_err();
        assert!(err.to_string().contains("GITHUB_TOKEN"));
    }
}
