//! End-to-end pipeline scenarios over a mock host.

mod common;

use std::sync::Arc;

use chrono::NaiveDate;
use common::{empty_search, pr_detail, pr_search_item, test_config, test_pool, test_stores};
use pretty_assertions::assert_eq;
use recap_core::models::{Activity, DailyStats, DateStatus, PullRequest};
use recap_core::services::{Fetcher, Normalizer};
use recap_core::store::{Stage, LAST_FETCH_DATE};
use recap_core::ActivityKind;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn d(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

async fn mount_search(server: &MockServer, endpoint: &str, q: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/api/v3/search/{endpoint}")))
        .and(query_param("q", q))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mount empty results for every single-day search axis except those the
/// caller overrides.
async fn mount_empty_day_searches(server: &MockServer, day: &str, skip_pr_author: bool) {
    if !skip_pr_author {
        mount_search(
            server,
            "issues",
            &format!("type:pr author:alice updated:{day}"),
            empty_search(),
        )
        .await;
    }
    mount_search(
        server,
        "issues",
        &format!("type:pr reviewed-by:alice updated:{day}"),
        empty_search(),
    )
    .await;
    mount_search(
        server,
        "issues",
        &format!("type:pr commenter:alice updated:{day}"),
        empty_search(),
    )
    .await;
    mount_search(
        server,
        "commits",
        &format!("author:alice committer-date:{day}"),
        empty_search(),
    )
    .await;
    mount_search(
        server,
        "issues",
        &format!("type:issue author:alice updated:{day}"),
        empty_search(),
    )
    .await;
    mount_search(
        server,
        "issues",
        &format!("type:issue commenter:alice updated:{day}"),
        empty_search(),
    )
    .await;
}

/// Mount the enrichment endpoints for PR #42 of the happy-path scenario:
/// one file, one review by bob, one issue comment by alice, plus noise.
async fn mount_pr42_enrichment(server: &MockServer) {
    let host = server.uri();
    Mock::given(method("GET"))
        .and(path("/api/v3/repos/org/x/pulls/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pr_detail(&host, 42, "alice")))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/repos/org/x/pulls/42/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"filename": "src/a.py", "additions": 10, "deletions": 2, "status": "modified"}
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/repos/org/x/pulls/42/comments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/repos/org/x/issues/42/comments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "user": {"login": "alice"},
                "body": "looks good",
                "created_at": "2025-02-16T10:00:00Z",
                "html_url": format!("{host}/org/x/pull/42#issuecomment-1")
            },
            {
                "user": {"login": "bob"},
                "body": "+1",
                "created_at": "2025-02-16T10:05:00Z",
                "html_url": format!("{host}/org/x/pull/42#issuecomment-2")
            },
            {
                "user": {"login": "release-bot"},
                "body": "Deployed to staging",
                "created_at": "2025-02-16T10:06:00Z",
                "html_url": format!("{host}/org/x/pull/42#issuecomment-3")
            }
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/repos/org/x/pulls/42/reviews"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "user": {"login": "bob"},
                "state": "APPROVED",
                "body": "",
                "submitted_at": "2025-02-16T09:30:00Z",
                "html_url": format!("{host}/org/x/pull/42#pullrequestreview-1")
            }
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn single_day_happy_path() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let host = server.uri();
    let day = "2025-02-16";

    mount_empty_day_searches(&server, day, true).await;
    mount_search(
        &server,
        "issues",
        &format!("type:pr author:alice updated:{day}"),
        json!({"total_count": 1, "items": [pr_search_item(&host, 42, "2025-02-16T10:00:00Z")]}),
    )
    .await;
    mount_pr42_enrichment(&server).await;

    // The scenario expects exactly one activity: the author's own comment
    // must not add a second one.
    let mut config = (*test_config(&host, dir.path())).clone();
    config.include_own_pr_comments = false;
    let config = Arc::new(config);
    let stores = test_stores(&config);
    let fetcher = Fetcher::new(
        Arc::clone(&config),
        test_pool(&config),
        Arc::clone(&stores.checkpoints),
        Arc::clone(&stores.daily_state),
        Arc::clone(&stores.failed),
        Arc::clone(&stores.progress),
    );

    let date = d(day);
    let raw_dir = fetcher.fetch(date, None).await.unwrap();

    let prs: Vec<PullRequest> =
        recap_core::files::load_json(&raw_dir.join("prs.json")).unwrap();
    assert_eq!(prs.len(), 1);
    let pr = &prs[0];
    assert_eq!(pr.number, 42);
    assert_eq!(pr.repo, "org/x");
    // Noise filtered: bob's "+1" and the bot comment are gone.
    assert_eq!(pr.comments.len(), 1);
    assert_eq!(pr.comments[0].author, "alice");
    assert_eq!(pr.reviews.len(), 1);

    assert_eq!(
        stores.checkpoints.get(LAST_FETCH_DATE).unwrap(),
        Some(date)
    );
    assert!(stores
        .daily_state
        .get_timestamp(Stage::Fetch, date)
        .unwrap()
        .is_some());

    // Normalize the fetched day.
    let normalizer = Normalizer::new(
        Arc::clone(&config),
        Arc::clone(&stores.checkpoints),
        Arc::clone(&stores.daily_state),
        Arc::clone(&stores.failed),
        None,
    );
    let (activities_path, stats_path) = normalizer.normalize(date, false).await.unwrap();

    let activities: Vec<Activity> = recap_core::files::load_jsonl(&activities_path).unwrap();
    assert_eq!(activities.len(), 1);
    let activity = &activities[0];
    assert_eq!(activity.kind, ActivityKind::PrAuthored);
    assert_eq!(activity.ts, "2025-02-16T09:00:00Z");
    assert_eq!(activity.summary, "pr_authored: Add feature (org/x) +10/-2");

    let stats: DailyStats = recap_core::files::load_json(&stats_path).unwrap();
    let github = &stats.sources.github;
    assert_eq!(stats.date, day);
    assert_eq!(github.authored_count, 1);
    assert_eq!(github.reviewed_count, 0);
    assert_eq!(github.total_additions, 10);
    assert_eq!(github.total_deletions, 2);
    assert_eq!(github.repos_touched, vec!["org/x"]);
    assert_eq!(github.authored_prs.len(), 1);
}

#[tokio::test]
async fn refetch_with_no_upstream_changes_is_byte_identical() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let host = server.uri();
    let day = "2025-02-16";

    mount_empty_day_searches(&server, day, true).await;
    mount_search(
        &server,
        "issues",
        &format!("type:pr author:alice updated:{day}"),
        json!({"total_count": 1, "items": [pr_search_item(&host, 42, "2025-02-16T10:00:00Z")]}),
    )
    .await;
    mount_pr42_enrichment(&server).await;

    let config = test_config(&host, dir.path());
    let stores = test_stores(&config);
    let fetcher = Fetcher::new(
        Arc::clone(&config),
        test_pool(&config),
        stores.checkpoints,
        stores.daily_state,
        stores.failed,
        stores.progress,
    );

    let date = d(day);
    let raw_dir = fetcher.fetch(date, None).await.unwrap();
    let first = std::fs::read(raw_dir.join("prs.json")).unwrap();
    fetcher.fetch(date, None).await.unwrap();
    let second = std::fs::read(raw_dir.join("prs.json")).unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn range_isolates_failures_per_date() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let host = server.uri();
    let window = "2025-02-14..2025-02-16";

    // Chunk searches: PR and issue axes are quiet; the commits chunk search
    // is persistently broken, which degrades commits to day-scoped searches.
    for q in [
        format!("type:pr author:alice updated:{window}"),
        format!("type:pr reviewed-by:alice updated:{window}"),
        format!("type:pr commenter:alice updated:{window}"),
        format!("type:issue author:alice updated:{window}"),
        format!("type:issue commenter:alice updated:{window}"),
    ] {
        mount_search(&server, "issues", &q, empty_search()).await;
    }
    Mock::given(method("GET"))
        .and(path("/api/v3/search/commits"))
        .and(query_param("q", format!("author:alice committer-date:{window}")))
        .respond_with(ResponseTemplate::new(500).set_body_string("chunk broken"))
        .mount(&server)
        .await;

    // Day-scoped commit searches: 02-15 is the only broken day.
    mount_search(
        &server,
        "commits",
        "author:alice committer-date:2025-02-14",
        empty_search(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/search/commits"))
        .and(query_param(
            "q",
            "author:alice committer-date:2025-02-15",
        ))
        .respond_with(ResponseTemplate::new(500).set_body_string("day broken"))
        .mount(&server)
        .await;
    mount_search(
        &server,
        "commits",
        "author:alice committer-date:2025-02-16",
        empty_search(),
    )
    .await;

    let config = test_config(&host, dir.path());
    let stores = test_stores(&config);
    let fetcher = Fetcher::new(
        Arc::clone(&config),
        test_pool(&config),
        Arc::clone(&stores.checkpoints),
        Arc::clone(&stores.daily_state),
        Arc::clone(&stores.failed),
        Arc::clone(&stores.progress),
    );

    let since = d("2025-02-14");
    let until = d("2025-02-16");
    let outcomes = fetcher.fetch_range(since, until, None, false, 1).await.unwrap();

    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0].date, "2025-02-14");
    assert_eq!(outcomes[0].status, DateStatus::Success);
    assert_eq!(outcomes[1].date, "2025-02-15");
    assert_eq!(outcomes[1].status, DateStatus::Failed);
    let error = outcomes[1].error.as_deref().unwrap();
    assert!(error.contains("500"), "{error}");
    assert_eq!(outcomes[2].date, "2025-02-16");
    assert_eq!(outcomes[2].status, DateStatus::Success);

    // The broken date is recorded as retryable, not exhausted.
    let entry = stores.failed.get_entry(d("2025-02-15")).unwrap().unwrap();
    assert!(!entry.permanent);
    assert_eq!(entry.attempts, 1);
    assert!(stores.failed.exhausted_dates().unwrap().is_empty());

    // The good dates advanced the checkpoint past the failed one.
    assert_eq!(
        stores.checkpoints.get(LAST_FETCH_DATE).unwrap(),
        Some(until)
    );

    // A second run re-attempts only the failed date.
    let outcomes = fetcher.fetch_range(since, until, None, false, 1).await.unwrap();
    assert_eq!(outcomes[0].status, DateStatus::Skipped);
    assert_eq!(outcomes[1].status, DateStatus::Failed);
    assert_eq!(outcomes[2].status, DateStatus::Skipped);
    let entry = stores.failed.get_entry(d("2025-02-15")).unwrap().unwrap();
    assert_eq!(entry.attempts, 2);
}

#[tokio::test]
async fn permanent_failures_are_not_retried() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let host = server.uri();
    let day = "2025-03-03";

    // The author-axis search 422s both at chunk scope and at day scope:
    // the host rejects the query shape, so the date is permanent.
    let window = format!("{day}..{day}");
    for q in [
        format!("type:pr reviewed-by:alice updated:{window}"),
        format!("type:pr commenter:alice updated:{window}"),
        format!("type:issue author:alice updated:{window}"),
        format!("type:issue commenter:alice updated:{window}"),
    ] {
        mount_search(&server, "issues", &q, empty_search()).await;
    }
    mount_search(
        &server,
        "commits",
        &format!("author:alice committer-date:{window}"),
        empty_search(),
    )
    .await;
    mount_empty_day_searches(&server, day, true).await;
    for q in [
        format!("type:pr author:alice updated:{window}"),
        format!("type:pr author:alice updated:{day}"),
    ] {
        Mock::given(method("GET"))
            .and(path("/api/v3/search/issues"))
            .and(query_param("q", q))
            .respond_with(ResponseTemplate::new(422).set_body_string("Validation Failed"))
            .mount(&server)
            .await;
    }

    let config = test_config(&host, dir.path());
    let stores = test_stores(&config);
    let fetcher = Fetcher::new(
        Arc::clone(&config),
        test_pool(&config),
        Arc::clone(&stores.checkpoints),
        Arc::clone(&stores.daily_state),
        Arc::clone(&stores.failed),
        Arc::clone(&stores.progress),
    );

    let date = d(day);
    let outcomes = fetcher.fetch_range(date, date, None, false, 1).await.unwrap();
    assert_eq!(outcomes[0].status, DateStatus::Failed);
    assert_eq!(stores.failed.exhausted_dates().unwrap(), vec![date]);

    // The next run skips the permanently failed date entirely.
    let outcomes = fetcher.fetch_range(date, date, None, false, 1).await.unwrap();
    assert_eq!(outcomes[0].status, DateStatus::Skipped);
    let entry = stores.failed.get_entry(date).unwrap().unwrap();
    assert_eq!(entry.attempts, 1);
}
