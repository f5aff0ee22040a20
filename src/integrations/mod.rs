//! External integrations module.
//!
//! The rate-limited GitHub gateway and the Slack/Discord notification
//! fanout. Both own their HTTP clients; nothing else in the crate talks to
//! the network.

pub mod github;
pub mod notifications;

pub use github::{
    derive_owner_repo, BranchInfo, CommitSummary, GatewayError, GatewayResult, GithubGateway,
    Issue, PullRequest, RateLimitState, RepoMetrics, Review, User, ValidationKind,
};
pub use notifications::{
    FanoutReport, MessageField, NotificationError, NotificationMessage, NotificationResult,
    Notifier,
};
