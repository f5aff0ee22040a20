//! Team phase: one view of what everyone is doing.
//!
//! Fans out over four independent reads (active branches, open pull
//! requests with review state, potential file conflicts, 7-day metrics) and
//! renders one report. The conflict scan is quadratic over active branches;
//! above [`SCAN_SAMPLE_LIMIT`] branches it samples and says so.

use std::collections::HashMap;

use super::prompt::Prompter;
use super::{PhaseContext, PhaseResult};
use crate::integrations::{RepoMetrics, Review};
use crate::recovery::classify_gateway;

/// Conflict scanning samples beyond this many active branches.
pub const SCAN_SAMPLE_LIMIT: usize = 50;

/// One active branch and its last commit.
#[derive(Debug, Clone)]
pub struct BranchActivity {
    pub name: String,
    pub last_subject: Option<String>,
    pub last_author: Option<String>,
}

/// One open pull request with its review state.
#[derive(Debug, Clone)]
pub struct PullSummary {
    pub number: u64,
    pub title: String,
    pub status_label: &'static str,
    pub url: String,
}

/// A file touched by more than one active branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictEntry {
    pub file: String,
    pub branches: Vec<String>,
}

/// The aggregated team report.
#[derive(Debug, Default)]
pub struct TeamReport {
    pub branches: Vec<BranchActivity>,
    pub pulls: Vec<PullSummary>,
    pub conflicts: Vec<ConflictEntry>,
    pub metrics: Option<RepoMetrics>,
    /// True when the conflict scan sampled instead of covering every pair.
    pub sampled: bool,
    pub notes: Vec<String>,
}

impl TeamReport {
    /// Render the report for the terminal.
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("## アクティブなブランチ\n");
        if self.branches.is_empty() {
            out.push_str("  (なし)\n");
        }
        for branch in &self.branches {
            let subject = branch.last_subject.as_deref().unwrap_or("(コミットなし)");
            let author = branch
                .last_author
                .as_deref()
                .map(|a| format!(" — {a}"))
                .unwrap_or_default();
            out.push_str(&format!("  {} : {subject}{author}\n", branch.name));
        }

        out.push_str("\n## オープンなプルリクエスト\n");
        if self.pulls.is_empty() {
            out.push_str("  (なし)\n");
        }
        for pull in &self.pulls {
            out.push_str(&format!(
                "  #{} [{}] {} {}\n",
                pull.number, pull.status_label, pull.title, pull.url
            ));
        }

        out.push_str("\n## コンフリクトの可能性\n");
        if self.sampled {
            out.push_str(&format!(
                "  (ブランチ数が多いため先頭 {SCAN_SAMPLE_LIMIT} 件をサンプリング)\n"
            ));
        }
        if self.conflicts.is_empty() {
            out.push_str("  (なし)\n");
        }
        for conflict in &self.conflicts {
            out.push_str(&format!(
                "  {} ← {}\n",
                conflict.file,
                conflict.branches.join(", ")
            ));
        }

        if let Some(ref metrics) = self.metrics {
            out.push_str(&format!("\n## 直近{}日間の活動\n", metrics.window_days));
            out.push_str(&format!("  コミット: {}\n", metrics.commits));
            out.push_str(&format!(
                "  PR作成: {} / PRマージ: {}\n",
                metrics.prs_created, metrics.prs_merged
            ));
            match metrics.mean_review_hours {
                Some(hours) => {
                    out.push_str(&format!("  平均レビュー時間: {hours:.1} 時間\n"));
                }
                None => out.push_str("  平均レビュー時間: - (マージされたPRなし)\n"),
            }
        }

        for note in &self.notes {
            out.push_str(&format!("\n{note}\n"));
        }

        out
    }
}

/// Japanese review-state label for a pull request.
pub fn review_label(reviews: &[Review]) -> &'static str {
    if reviews.iter().any(|r| r.state == "CHANGES_REQUESTED") {
        "変更要求"
    } else if reviews.iter().any(|r| r.state == "APPROVED") {
        "承認済み"
    } else {
        "要レビュー"
    }
}

/// Pairwise conflict scan over per-branch changed-file lists.
pub fn scan_conflicts(changes: &HashMap<String, Vec<String>>) -> Vec<ConflictEntry> {
    let mut by_file: HashMap<&str, Vec<&str>> = HashMap::new();
    for (branch, files) in changes {
        for file in files {
            by_file.entry(file.as_str()).or_default().push(branch.as_str());
        }
    }

    let mut conflicts: Vec<ConflictEntry> = by_file
        .into_iter()
        .filter(|(_, branches)| branches.len() > 1)
        .map(|(file, mut branches)| {
            branches.sort_unstable();
            ConflictEntry {
                file: file.to_string(),
                branches: branches.into_iter().map(String::from).collect(),
            }
        })
        .collect();
    conflicts.sort_by(|a, b| a.file.cmp(&b.file));
    conflicts
}

/// Run the Team phase. The prompter is unused today; the phase is read-only.
pub fn run_team(ctx: &mut PhaseContext<'_>, _prompter: &mut dyn Prompter) -> PhaseResult {
    ctx.logger.info("team phase: begin");

    if !ctx.git.is_repository() {
        return PhaseResult::failed("NOT_GIT_REPOSITORY")
            .with_message("Gitリポジトリ内で実行してください".to_string());
    }

    let report = build_report(ctx);
    println!("{}", report.render());

    PhaseResult::completed().with_message(format!(
        "ブランチ {} 件 / PR {} 件 / コンフリクト候補 {} 件",
        report.branches.len(),
        report.pulls.len(),
        report.conflicts.len()
    ))
}

/// Collect the four report sections. Each read is independent; a failing
/// one leaves a note instead of sinking the whole report.
fn build_report(ctx: &mut PhaseContext<'_>) -> TeamReport {
    let mut report = TeamReport::default();
    let default = ctx.config.default_branch.clone();

    // (a) active branches with their last commit
    let mut branch_names: Vec<String> = ctx
        .git
        .local_branches()
        .unwrap_or_default()
        .into_iter()
        .filter(|b| *b != default)
        .collect();
    branch_names.sort();

    for name in &branch_names {
        let commit = ctx.git.last_commit_on(name).ok().flatten();
        report.branches.push(BranchActivity {
            name: name.clone(),
            last_subject: commit.as_ref().map(|c| c.subject.clone()),
            last_author: commit.map(|c| c.author),
        });
    }

    // (b) open PRs with review state
    match ctx.gateway.list_pulls_with_reviews() {
        Ok(pulls) => {
            for pull in pulls {
                report.pulls.push(PullSummary {
                    number: pull.number,
                    title: pull.title.clone(),
                    status_label: review_label(&pull.reviews),
                    url: pull.html_url.clone(),
                });
            }
        }
        Err(e) => {
            let c = classify_gateway(&e);
            ctx.handler.handle(c, &e.to_string());
            report.notes.push(format!("PR一覧を取得できませんでした: {e}"));
        }
    }

    // (c) pairwise conflict scan, sampled past the limit
    let scan_names: Vec<String> = if branch_names.len() > SCAN_SAMPLE_LIMIT {
        report.sampled = true;
        branch_names.iter().take(SCAN_SAMPLE_LIMIT).cloned().collect()
    } else {
        branch_names.clone()
    };
    let mut changes: HashMap<String, Vec<String>> = HashMap::new();
    for name in &scan_names {
        if let Ok(files) = ctx.git.diff_branches(&default, name) {
            changes.insert(name.clone(), files);
        }
    }
    report.conflicts = scan_conflicts(&changes);

    // (d) 7-day metrics
    match ctx.gateway.repo_metrics(7) {
        Ok(metrics) => report.metrics = Some(metrics),
        Err(e) => {
            report.notes.push(format!("メトリクスを取得できませんでした: {e}"));
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::User;

    fn review(state: &str) -> Review {
        Review { user: User { login: "r".to_string() }, state: state.to_string(), submitted_at: None }
    }

    #[test]
    fn test_review_labels() {
        assert_eq!(review_label(&[]), "要レビュー");
        assert_eq!(review_label(&[review("COMMENTED")]), "要レビュー");
        assert_eq!(review_label(&[review("APPROVED")]), "承認済み");
        // Changes-requested dominates an approval.
        assert_eq!(
            review_label(&[review("APPROVED"), review("CHANGES_REQUESTED")]),
            "変更要求"
        );
    }

    #[test]
    fn test_scan_conflicts_pairwise() {
        let mut changes = HashMap::new();
        changes.insert("feature/a".to_string(), vec!["a.txt".to_string(), "b.txt".to_string()]);
        changes.insert("feature/b".to_string(), vec!["a.txt".to_string()]);
        changes.insert("feature/c".to_string(), vec!["c.txt".to_string()]);

        let conflicts = scan_conflicts(&changes);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].file, "a.txt");
        assert_eq!(conflicts[0].branches, vec!["feature/a", "feature/b"]);
    }

    #[test]
    fn test_scan_conflicts_empty() {
        assert!(scan_conflicts(&HashMap::new()).is_empty());
    }

    #[test]
    fn test_render_report() {
        let report = TeamReport {
            branches: vec![BranchActivity {
                name: "feature/a".to_string(),
                last_subject: Some("feat: x".to_string()),
                last_author: Some("dev".to_string()),
            }],
            pulls: vec![PullSummary {
                number: 3,
                title: "Add x".to_string(),
                status_label: "変更要求",
                url: "https://github.com/a/b/pull/3".to_string(),
            }],
            conflicts: vec![ConflictEntry {
                file: "a.txt".to_string(),
                branches: vec!["feature/a".to_string(), "feature/b".to_string()],
            }],
            metrics: Some(RepoMetrics {
                window_days: 7,
                commits: 10,
                prs_created: 2,
                prs_merged: 1,
                mean_review_hours: Some(12.5),
            }),
            sampled: false,
            notes: vec![],
        };

        let rendered = report.render();
        assert!(rendered.contains("feature/a"));
        assert!(rendered.contains("変更要求"));
        assert!(rendered.contains("a.txt"));
        assert!(rendered.contains("12.5"));
        assert!(rendered.contains("直近7日間"));
    }

    #[test]
    fn test_render_empty_report() {
        let rendered = TeamReport::default().render();
        assert!(rendered.contains("(なし)"));
    }
}
