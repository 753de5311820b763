//! Host-client behaviour against a mock host: retries, rate limits,
//! pagination, permanent failures.

mod common;

use common::{empty_search, fast_host_options};
use recap_core::{FetchError, HostClient};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> HostClient {
    HostClient::new(&server.uri(), "test-token", fast_host_options()).expect("client")
}

#[tokio::test]
async fn search_sends_auth_and_accept_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/search/issues"))
        .and(header("Authorization", "token test-token"))
        .and(header("Accept", "application/vnd.github.v3+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_search()))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server)
        .search_issues("type:pr author:alice updated:2025-02-16", 1, 100)
        .await
        .unwrap();
    assert_eq!(result.total_count, 0);
}

#[tokio::test]
async fn commit_search_uses_preview_accept_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/search/commits"))
        .and(header("Accept", "application/vnd.github.cloak-preview+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_search()))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .search_commits("author:alice committer-date:2025-02-16", 1, 100)
        .await
        .unwrap();
}

#[tokio::test]
async fn server_errors_retry_three_times_then_fail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/repos/org/x/pulls/1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(4)
        .mount(&server)
        .await;

    let err = client(&server).get_pr("org", "x", 1).await.unwrap_err();
    match err {
        FetchError::Http {
            status, attempts, ..
        } => {
            assert_eq!(status, 500);
            assert_eq!(attempts, 4);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn transient_server_error_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/repos/org/x/pulls/1"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/repos/org/x/pulls/1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::pr_detail(&server.uri(), 1, "alice")),
        )
        .mount(&server)
        .await;

    let detail = client(&server).get_pr("org", "x", 1).await.unwrap();
    assert_eq!(detail.number, 1);
}

#[tokio::test]
async fn rate_limit_exhaustion_reports_eight_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/search/issues"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "0")
                .set_body_string("slow down"),
        )
        .expect(8)
        .mount(&server)
        .await;

    let err = client(&server)
        .search_issues("type:pr author:alice", 1, 100)
        .await
        .unwrap_err();
    match err {
        FetchError::Http {
            status,
            attempts,
            rate_limited,
            ..
        } => {
            assert_eq!(status, 429);
            assert_eq!(attempts, 8);
            assert!(rate_limited);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn rate_limited_403_retries_then_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/search/issues"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("Retry-After", "0")
                .set_body_string("API rate limit exceeded for installation"),
        )
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/search/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_search()))
        .mount(&server)
        .await;

    let result = client(&server)
        .search_issues("type:pr author:alice", 1, 100)
        .await
        .unwrap();
    assert_eq!(result.total_count, 0);
}

#[tokio::test]
async fn plain_403_fails_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/repos/org/private/pulls/2"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).get_pr("org", "private", 2).await.unwrap_err();
    assert!(err.is_permanent());
    assert_eq!(err.status(), Some(403));
}

#[tokio::test]
async fn not_found_fails_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/repos/org/gone/pulls/3"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).get_pr("org", "gone", 3).await.unwrap_err();
    match err {
        FetchError::Http {
            status, attempts, ..
        } => {
            assert_eq!(status, 404);
            assert_eq!(attempts, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn pagination_concatenates_until_short_page() {
    let server = MockServer::start().await;
    let full_page: Vec<serde_json::Value> = (0..100)
        .map(|i| {
            json!({
                "user": {"login": "bob"},
                "body": format!("comment {i}"),
                "created_at": "2025-02-16T10:00:00Z",
                "html_url": format!("{}/org/x/pull/1#c{i}", server.uri())
            })
        })
        .collect();
    Mock::given(method("GET"))
        .and(path("/api/v3/repos/org/x/issues/1/comments"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&full_page))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/repos/org/x/issues/1/comments"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "user": {"login": "bob"},
            "body": "last one",
            "created_at": "2025-02-16T11:00:00Z",
            "html_url": format!("{}/org/x/pull/1#c100", server.uri())
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let comments = client(&server)
        .get_issue_comments("org", "x", 1)
        .await
        .unwrap();
    assert_eq!(comments.len(), 101);
    assert_eq!(comments[100].body.as_deref(), Some("last one"));
}

#[tokio::test]
async fn search_all_pages_collects_multiple_pages() {
    let server = MockServer::start().await;
    let page_one: Vec<serde_json::Value> = (1..=100)
        .map(|i| common::pr_search_item(&server.uri(), i, "2025-02-16T10:00:00Z"))
        .collect();
    Mock::given(method("GET"))
        .and(path("/api/v3/search/issues"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"total_count": 101, "items": page_one})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/search/issues"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": 101,
            "items": [common::pr_search_item(&server.uri(), 101, "2025-02-16T10:00:00Z")]
        })))
        .mount(&server)
        .await;

    let items = client(&server)
        .search_issues_all("type:pr author:alice updated:2025-02-16")
        .await
        .unwrap();
    assert_eq!(items.len(), 101);
}
