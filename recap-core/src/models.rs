//! Data model shared across the pipeline stages.
//!
//! Raw entities mirror what the fetch stage persists under `data/raw/`;
//! [`Activity`] and [`DailyStats`] are the normalised forms under
//! `data/normalized/`. All timestamps are stored as ISO-8601 strings so that
//! re-running a stage with unchanged input produces byte-identical files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ─── Raw entities ────────────────────────────────────────────────────────────

/// One changed file within a pull request or commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub filename: String,
    pub additions: u64,
    pub deletions: u64,
    /// "added" | "modified" | "removed" | "renamed" as reported by the host.
    pub status: String,
    /// Unified diff hunk when the host includes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
}

/// A comment on a pull request or issue. Inline review comments additionally
/// carry their file anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub body: String,
    /// ISO 8601.
    pub created_at: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_hunk: Option<String>,
}

/// A pull-request review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub author: String,
    /// "APPROVED" | "CHANGES_REQUESTED" | "COMMENTED".
    pub state: String,
    pub body: String,
    /// ISO 8601.
    pub submitted_at: String,
    pub url: String,
}

/// Raw pull-request data as persisted by the fetch stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// HTML URL.
    pub url: String,
    /// API URL (dedup key across search axes).
    pub api_url: String,
    pub number: u64,
    pub title: String,
    pub body: String,
    /// "open" | "closed".
    pub state: String,
    pub is_merged: bool,
    pub created_at: String,
    pub updated_at: String,
    pub merged_at: Option<String>,
    /// "owner/name".
    pub repo: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub files: Vec<FileChange>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub reviews: Vec<Review>,
}

/// Raw commit data as persisted by the fetch stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    /// HTML URL.
    pub url: String,
    pub api_url: String,
    /// Full commit message.
    pub message: String,
    pub author: String,
    /// "owner/name".
    pub repo: String,
    /// Committer date, ISO 8601.
    pub committed_at: String,
    #[serde(default)]
    pub files: Vec<FileChange>,
}

/// Raw issue data as persisted by the fetch stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub url: String,
    pub api_url: String,
    pub number: u64,
    pub title: String,
    pub body: String,
    pub state: String,
    pub created_at: String,
    pub updated_at: String,
    pub closed_at: Option<String>,
    pub repo: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

// ─── Normalised entities ─────────────────────────────────────────────────────

/// The closed set of user actions the normaliser emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    PrAuthored,
    PrReviewed,
    PrCommented,
    Commit,
    IssueAuthored,
    IssueCommented,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::PrAuthored => "pr_authored",
            ActivityKind::PrReviewed => "pr_reviewed",
            ActivityKind::PrCommented => "pr_commented",
            ActivityKind::Commit => "commit",
            ActivityKind::IssueAuthored => "issue_authored",
            ActivityKind::IssueCommented => "issue_commented",
        }
    }
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anchor of an inline review comment, kept for enrichment prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CommentContext {
    pub path: String,
    pub line: u64,
    pub diff_hunk: String,
    pub body: String,
}

/// One normalised, kind-tagged record of a user action on a specific day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// ISO 8601 instant; its date component equals the day file it lives in.
    pub ts: String,
    pub kind: ActivityKind,
    pub repo: String,
    /// PR or issue number; 0 for commits.
    pub pr_number: u64,
    pub title: String,
    /// Canonical HTML URL.
    pub url: String,
    /// Machine-generated one-liner.
    pub summary: String,
    /// Commit SHA, empty for non-commit kinds.
    #[serde(default)]
    pub sha: String,
    /// PR body / commit message / issue body.
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub review_bodies: Vec<String>,
    #[serde(default)]
    pub comment_bodies: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
    /// filename → unified diff hunk, only when the host supplied patches.
    #[serde(default)]
    pub file_patches: BTreeMap<String, String>,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Review/comment URLs supporting this activity.
    #[serde(default)]
    pub evidence_urls: Vec<String>,
    #[serde(default)]
    pub comment_contexts: Vec<CommentContext>,
    /// LLM-generated change summary, empty until enriched.
    #[serde(default)]
    pub change_summary: String,
    /// LLM intent tag: bugfix, feature, refactor, docs, chore, test,
    /// config, perf, security, other. Empty until enriched.
    #[serde(default)]
    pub intent: String,
}

// ─── Statistics ──────────────────────────────────────────────────────────────

/// Reference to a PR or issue inside the stats reference lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrRef {
    pub url: String,
    pub title: String,
    pub repo: String,
}

/// Reference to a commit inside the stats reference lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub url: String,
    pub title: String,
    pub repo: String,
    pub sha: String,
}

/// Per-day statistics for the GitHub source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GitHubStats {
    pub authored_count: u64,
    pub reviewed_count: u64,
    pub commented_count: u64,
    pub commit_count: u64,
    pub issue_authored_count: u64,
    pub issue_commented_count: u64,
    /// Summed over authored PRs and commits only; reviewed/commented PRs and
    /// issues do not contribute line counts.
    pub total_additions: u64,
    pub total_deletions: u64,
    /// Sorted, distinct.
    pub repos_touched: Vec<String>,
    #[serde(default)]
    pub authored_prs: Vec<PrRef>,
    #[serde(default)]
    pub reviewed_prs: Vec<PrRef>,
    #[serde(default)]
    pub commits: Vec<CommitRef>,
    #[serde(default)]
    pub authored_issues: Vec<PrRef>,
}

/// Per-source stats blocks. The GitHub block is required; other sources are
/// absent keys until they exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SourceStats {
    pub github: GitHubStats,
}

/// The per-day statistics object persisted next to `activities.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    /// YYYY-MM-DD.
    pub date: String,
    pub sources: SourceStats,
}

// ─── Job model (external collaborators) ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Accepted,
    Running,
    Completed,
    Failed,
}

/// Background-job record used by the HTTP API shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub status: JobStatus,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ─── Per-date range outcomes ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateStatus {
    Success,
    Skipped,
    Failed,
}

/// One entry of the per-date status list returned by range operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateOutcome {
    /// YYYY-MM-DD.
    pub date: String,
    pub status: DateStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DateOutcome {
    pub fn success(date: impl Into<String>) -> Self {
        DateOutcome {
            date: date.into(),
            status: DateStatus::Success,
            error: None,
        }
    }

    pub fn skipped(date: impl Into<String>) -> Self {
        DateOutcome {
            date: date.into(),
            status: DateStatus::Skipped,
            error: None,
        }
    }

    pub fn failed(date: impl Into<String>, error: impl Into<String>) -> Self {
        DateOutcome {
            date: date.into(),
            status: DateStatus::Failed,
            error: Some(error.into()),
        }
    }
}
