//! User-facing validation messages.
//!
//! Collected in one place so the wording can be reviewed and translated
//! without touching validator logic. The tool's audience is a Japanese
//! development team; messages are Japanese.

pub const BRANCH_EMPTY: &str = "ブランチ名を入力してください";
pub const BRANCH_TOO_LONG: &str = "ブランチ名は100文字以内で入力してください";
pub const BRANCH_WHITESPACE: &str = "ブランチ名に空白は使用できません";
pub const BRANCH_INVALID_CHARS: &str = "ブランチ名に使用できない文字が含まれています (~ ^ : ? * [ ] \\)";
pub const BRANCH_DOUBLE_DOT: &str = "ブランチ名に .. は使用できません";
pub const BRANCH_EDGE_CHARS: &str = "ブランチ名の先頭・末尾に - . / は使用できません";
pub const BRANCH_CONSECUTIVE_SLASH: &str = "ブランチ名に // は使用できません";
pub const BRANCH_RESERVED: &str = "HEAD はブランチ名として使用できません";

pub const COMMIT_TOO_SHORT: &str = "コミットメッセージは5文字以上で入力してください";
pub const COMMIT_TOO_LONG: &str = "コミットメッセージは200文字以内で入力してください";

pub const TOKEN_INVALID: &str =
    "GitHubトークンの形式が正しくありません (ghp_ または github_pat_ で始まる必要があります)";

pub const SLACK_CHANNEL_LENGTH: &str = "Slackチャンネル名は2〜22文字で入力してください";
pub const SLACK_CHANNEL_CHARS: &str =
    "Slackチャンネル名は小文字英数字とハイフン・アンダースコアのみ使用できます";

pub const URL_INVALID: &str = "URLの形式が正しくありません";
pub const URL_SCHEME: &str = "URLのスキームが許可されていません";

pub const DISCORD_WEBHOOK_INVALID: &str =
    "Discord Webhook URLの形式が正しくありません (https://discord.com/api/webhooks/... )";

pub const PATH_TRAVERSAL: &str = "パスに .. を含めることはできません";
pub const PATH_FORBIDDEN: &str = "システムディレクトリへのパスは指定できません";
pub const PATH_NUL: &str = "パスにNUL文字を含めることはできません";
