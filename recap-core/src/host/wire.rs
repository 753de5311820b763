//! Serde shapes for the subset of host-API payloads the pipeline reads.
//!
//! Search items derive `Serialize` as well: range fetches cache the raw
//! post-search buckets per chunk so interrupted runs can resume without
//! repeating the search phase.

use serde::{Deserialize, Serialize};

/// Envelope of both search endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults<T> {
    pub total_count: u64,
    #[serde(default)]
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserRef {
    #[serde(default)]
    pub login: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelRef {
    pub name: String,
}

/// Link object attached to issue-search hits that are pull requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestLink {
    pub url: String,
}

/// One hit from `/search/issues` (covers both PRs and issues).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IssueSearchItem {
    /// API URL of the issue resource.
    pub url: String,
    #[serde(default)]
    pub html_url: String,
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub updated_at: String,
    /// Present iff the hit is a pull request; `url` is the PR API URL and
    /// the dedup key across the three PR search axes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RepoRef {
    #[serde(default)]
    pub full_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GitActor {
    #[serde(default)]
    pub date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CommitMeta {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub committer: GitActor,
}

/// One hit from `/search/commits`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CommitSearchItem {
    pub sha: String,
    /// API URL.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub repository: RepoRef,
    #[serde(default)]
    pub commit: CommitMeta,
}

/// `/repos/{owner}/{repo}/pulls/{number}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PrDetail {
    pub url: String,
    pub html_url: String,
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    #[serde(default)]
    pub merged: bool,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub merged_at: Option<String>,
    #[serde(default)]
    pub labels: Vec<LabelRef>,
    #[serde(default)]
    pub user: UserRef,
}

/// Entry of `/pulls/{number}/files` and of commit detail `files`.
#[derive(Debug, Clone, Deserialize)]
pub struct FileEntry {
    pub filename: String,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub patch: Option<String>,
}

/// Review comment or issue comment. Inline review comments carry a file
/// anchor; issue comments leave those fields null.
#[derive(Debug, Clone, Deserialize)]
pub struct CommentEntry {
    #[serde(default)]
    pub user: UserRef,
    #[serde(default)]
    pub body: Option<String>,
    pub created_at: String,
    pub html_url: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub line: Option<u64>,
    #[serde(default)]
    pub diff_hunk: Option<String>,
}

/// Entry of `/pulls/{number}/reviews`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewEntry {
    #[serde(default)]
    pub user: UserRef,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub body: Option<String>,
    /// Absent for PENDING reviews, which the pipeline ignores.
    #[serde(default)]
    pub submitted_at: Option<String>,
    pub html_url: String,
}

/// `/repos/{owner}/{repo}/commits/{sha}`.
#[derive(Debug, Clone, Deserialize)]
pub struct CommitDetail {
    pub sha: String,
    pub url: String,
    pub html_url: String,
    #[serde(default)]
    pub commit: CommitMeta,
    #[serde(default)]
    pub author: Option<UserRef>,
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

/// `/repos/{owner}/{repo}/issues/{number}`.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueDetail {
    pub url: String,
    pub html_url: String,
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub closed_at: Option<String>,
    #[serde(default)]
    pub labels: Vec<LabelRef>,
    #[serde(default)]
    pub user: UserRef,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_search_item_round_trips_for_chunk_cache() {
        let json = r#"{
            "url": "https://ghe.example.com/api/v3/repos/org/x/issues/42",
            "html_url": "https://ghe.example.com/org/x/pull/42",
            "number": 42,
            "title": "Add feature",
            "updated_at": "2025-02-16T10:00:00Z",
            "pull_request": {"url": "https://ghe.example.com/api/v3/repos/org/x/pulls/42"}
        }"#;
        let item: IssueSearchItem = serde_json::from_str(json).unwrap();
        assert!(item.pull_request.is_some());
        let back = serde_json::to_string(&item).unwrap();
        let again: IssueSearchItem = serde_json::from_str(&back).unwrap();
        assert_eq!(again.number, 42);
        assert_eq!(again.pull_request.unwrap().url, item.pull_request.unwrap().url);
    }

    #[test]
    fn pr_detail_tolerates_null_body() {
        let json = r#"{
            "url": "https://ghe.example.com/api/v3/repos/org/x/pulls/42",
            "html_url": "https://ghe.example.com/org/x/pull/42",
            "number": 42,
            "title": "Add feature",
            "body": null,
            "state": "open",
            "created_at": "2025-02-16T09:00:00Z",
            "updated_at": "2025-02-16T10:00:00Z",
            "user": {"login": "alice"}
        }"#;
        let detail: PrDetail = serde_json::from_str(json).unwrap();
        assert!(detail.body.is_none());
        assert!(!detail.merged);
        assert_eq!(detail.user.login, "alice");
    }

    #[test]
    fn commit_search_item_exposes_committer_date() {
        let json = r#"{
            "sha": "abc123",
            "url": "https://ghe.example.com/api/v3/repos/org/x/commits/abc123",
            "html_url": "https://ghe.example.com/org/x/commit/abc123",
            "repository": {"full_name": "org/x"},
            "commit": {"message": "Fix crash", "committer": {"date": "2025-02-16T11:00:00Z"}}
        }"#;
        let item: CommitSearchItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.repository.full_name, "org/x");
        assert_eq!(item.commit.committer.date, "2025-02-16T11:00:00Z");
    }
}
