//! Security module for Teamflow.
//!
//! Provides input validation and secret masking:
//! - All user input (branch names, commit messages, channels, paths) is
//!   validated before it reaches Git or the network.
//! - Everything written to the log file or serialized for humans passes
//!   through the secret masker first.

pub mod masking;
pub mod messages;
pub mod validators;

pub use masking::{is_sensitive_key, mask_json, mask_message, mask_value_for_key, MASK};
pub use validators::{
    validate_branch_name, validate_commit_message, validate_discord_webhook, validate_file_path,
    validate_github_token, validate_slack_channel, validate_url, Validated,
};
