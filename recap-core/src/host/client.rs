//! The host HTTP client: retry, rate-limit etiquette, pagination.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::host::wire::{
    CommentEntry, CommitDetail, CommitSearchItem, FileEntry, IssueDetail, IssueSearchItem,
    PrDetail, ReviewEntry, SearchResults,
};

/// Upstream ceiling on search result sets; reaching it means the query needs
/// a narrower date window.
pub const SEARCH_RESULT_CEILING: u64 = 1000;

const JSON_ACCEPT: &str = "application/vnd.github.v3+json";
/// Commit search still sits behind a preview media type on GHES.
const COMMIT_SEARCH_ACCEPT: &str = "application/vnd.github.cloak-preview+json";

const RATE_LIMIT_RETRIES: u32 = 7;
const SERVER_RETRIES: u32 = 3;
const MAX_BACKOFF_SECS: f64 = 300.0;
const PER_PAGE: u32 = 100;

/// Tunables for a [`HostClient`].
#[derive(Debug, Clone)]
pub struct HostOptions {
    /// Minimum spacing between search calls.
    pub search_interval: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Base of the exponential backoff formula `base^n` seconds.
    pub backoff_base: f64,
}

impl Default for HostOptions {
    fn default() -> Self {
        HostOptions {
            search_interval: Duration::from_secs_f64(2.0),
            timeout: Duration::from_secs(30),
            backoff_base: 2.0,
        }
    }
}

/// Spacing guard for the search endpoints. Shared across every client in a
/// pool so the ~30 req/min search quota holds regardless of worker count.
pub struct SearchThrottle {
    interval: Duration,
    last: tokio::sync::Mutex<Option<Instant>>,
}

impl SearchThrottle {
    pub fn new(interval: Duration) -> Self {
        SearchThrottle {
            interval,
            last: tokio::sync::Mutex::new(None),
        }
    }

    /// Block until at least `interval` has elapsed since the previous search
    /// call from any sharing client. The lock is held across the sleep so
    /// concurrent callers queue up behind it.
    pub async fn wait(&self) {
        if self.interval.is_zero() {
            return;
        }
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                let pause = self.interval - elapsed;
                debug!(pause_ms = pause.as_millis() as u64, "search throttle");
                tokio::time::sleep(pause).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Authenticated client for one host connection.
pub struct HostClient {
    http: reqwest::Client,
    api_base: String,
    throttle: Arc<SearchThrottle>,
    options: HostOptions,
}

impl HostClient {
    pub fn new(base_url: &str, token: &str, options: HostOptions) -> Result<Self, FetchError> {
        let throttle = Arc::new(SearchThrottle::new(options.search_interval));
        Self::with_throttle(base_url, token, options, throttle)
    }

    /// Construct a client sharing an existing throttle (used by the pool).
    pub fn with_throttle(
        base_url: &str,
        token: &str,
        options: HostOptions,
        throttle: Arc<SearchThrottle>,
    ) -> Result<Self, FetchError> {
        let trimmed = base_url.trim_end_matches('/');
        // The public API host serves the API at the root; GHES nests it.
        let api_base = if trimmed.contains("api.github.com") {
            trimmed.to_string()
        } else {
            format!("{trimmed}/api/v3")
        };

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("token {token}")).map_err(|_| {
            FetchError::Decode {
                endpoint: api_base.clone(),
                message: "host token contains invalid header characters".into(),
            }
        })?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_ACCEPT));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(options.timeout)
            .build()
            .map_err(|source| FetchError::Network {
                endpoint: api_base.clone(),
                attempts: 0,
                source,
            })?;

        Ok(HostClient {
            http,
            api_base,
            throttle,
            options,
        })
    }

    pub fn throttle(&self) -> Arc<SearchThrottle> {
        Arc::clone(&self.throttle)
    }

    // ── Public API ──────────────────────────────────────────────────────────

    pub async fn search_issues(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> Result<SearchResults<IssueSearchItem>, FetchError> {
        self.throttle.wait().await;
        self.request_json(
            "/search/issues",
            &[
                ("q", query.to_string()),
                ("page", page.to_string()),
                ("per_page", per_page.to_string()),
            ],
            None,
        )
        .await
    }

    pub async fn search_commits(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> Result<SearchResults<CommitSearchItem>, FetchError> {
        self.throttle.wait().await;
        self.request_json(
            "/search/commits",
            &[
                ("q", query.to_string()),
                ("page", page.to_string()),
                ("per_page", per_page.to_string()),
            ],
            Some(COMMIT_SEARCH_ACCEPT),
        )
        .await
    }

    /// Collect every page of an issue search, warning once if the result set
    /// reaches the host ceiling.
    pub async fn search_issues_all(
        &self,
        query: &str,
    ) -> Result<Vec<IssueSearchItem>, FetchError> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let result = self.search_issues(query, page, PER_PAGE).await?;
            let count = result.items.len();
            items.extend(result.items);
            if items.len() as u64 >= SEARCH_RESULT_CEILING {
                warn!(
                    query,
                    total = result.total_count,
                    "search result set reached the {SEARCH_RESULT_CEILING}-item ceiling; \
                     narrow the date window to avoid losing results"
                );
                break;
            }
            if count < PER_PAGE as usize {
                break;
            }
            page += 1;
        }
        Ok(items)
    }

    /// Collect every page of a commit search, warning once at the ceiling.
    pub async fn search_commits_all(
        &self,
        query: &str,
    ) -> Result<Vec<CommitSearchItem>, FetchError> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let result = self.search_commits(query, page, PER_PAGE).await?;
            let count = result.items.len();
            items.extend(result.items);
            if items.len() as u64 >= SEARCH_RESULT_CEILING {
                warn!(
                    query,
                    total = result.total_count,
                    "search result set reached the {SEARCH_RESULT_CEILING}-item ceiling; \
                     narrow the date window to avoid losing results"
                );
                break;
            }
            if count < PER_PAGE as usize {
                break;
            }
            page += 1;
        }
        Ok(items)
    }

    pub async fn get_pr(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PrDetail, FetchError> {
        self.request_json(&format!("/repos/{owner}/{repo}/pulls/{number}"), &[], None)
            .await
    }

    pub async fn get_pr_files(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<FileEntry>, FetchError> {
        self.paginate(&format!("/repos/{owner}/{repo}/pulls/{number}/files"))
            .await
    }

    /// Review comments and issue comments of a PR, concatenated. Review
    /// comments come first and carry their file anchors.
    pub async fn get_pr_comments(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<CommentEntry>, FetchError> {
        let mut comments: Vec<CommentEntry> = self
            .paginate(&format!("/repos/{owner}/{repo}/pulls/{number}/comments"))
            .await?;
        let issue_comments: Vec<CommentEntry> = self
            .paginate(&format!("/repos/{owner}/{repo}/issues/{number}/comments"))
            .await?;
        comments.extend(issue_comments);
        Ok(comments)
    }

    pub async fn get_pr_reviews(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<ReviewEntry>, FetchError> {
        self.paginate(&format!("/repos/{owner}/{repo}/pulls/{number}/reviews"))
            .await
    }

    pub async fn get_commit(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<CommitDetail, FetchError> {
        self.request_json(&format!("/repos/{owner}/{repo}/commits/{sha}"), &[], None)
            .await
    }

    pub async fn get_issue(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<IssueDetail, FetchError> {
        self.request_json(&format!("/repos/{owner}/{repo}/issues/{number}"), &[], None)
            .await
    }

    pub async fn get_issue_comments(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<CommentEntry>, FetchError> {
        self.paginate(&format!("/repos/{owner}/{repo}/issues/{number}/comments"))
            .await
    }

    // ── Internal ────────────────────────────────────────────────────────────

    /// Loop pages of a list endpoint until a short page comes back.
    async fn paginate<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, FetchError> {
        let mut all: Vec<T> = Vec::new();
        let mut page = 1u32;
        loop {
            let batch: Vec<T> = self
                .request_json(
                    path,
                    &[
                        ("page", page.to_string()),
                        ("per_page", PER_PAGE.to_string()),
                    ],
                    None,
                )
                .await?;
            let count = batch.len();
            all.extend(batch);
            if count < PER_PAGE as usize {
                break;
            }
            page += 1;
        }
        debug!(path, items = all.len(), pages = page, "paginate");
        Ok(all)
    }

    /// Issue one logical GET with the dual retry policy.
    ///
    /// Rate-limit hits (429, and 403 whose body signals quota exhaustion)
    /// retry up to 7 times with header-derived waits; 5xx and transport
    /// errors retry up to 3 times with exponential backoff. Other 4xx fail
    /// immediately. Every wait carries ±25 % jitter so pooled clients do not
    /// stampede the reset instant together.
    async fn request_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        accept_override: Option<&'static str>,
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.api_base, path);
        let mut rate_hits = 0u32;
        let mut server_hits = 0u32;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let mut request = self.http.get(&url).query(query);
            if let Some(accept) = accept_override {
                request = request.header(ACCEPT, accept);
            }

            let response = match request.send().await {
                Ok(r) => r,
                Err(source) => {
                    server_hits += 1;
                    warn!(endpoint = path, attempt = attempts, error = %source, "transport error");
                    if server_hits > SERVER_RETRIES {
                        return Err(FetchError::Network {
                            endpoint: path.to_string(),
                            attempts,
                            source,
                        });
                    }
                    tokio::time::sleep(self.backoff(server_hits)).await;
                    continue;
                }
            };

            let status = response.status();
            let headers = response.headers().clone();

            if status == StatusCode::TOO_MANY_REQUESTS {
                rate_hits += 1;
                let wait = self.rate_limit_wait(&headers, rate_hits);
                warn!(
                    endpoint = path,
                    attempt = attempts,
                    wait_secs = wait.as_secs_f64(),
                    "rate limited (429)"
                );
                if rate_hits > RATE_LIMIT_RETRIES {
                    return Err(FetchError::Http {
                        status: status.as_u16(),
                        endpoint: path.to_string(),
                        attempts,
                        message: format!("rate limit exceeded after {RATE_LIMIT_RETRIES} retries"),
                        rate_limited: true,
                    });
                }
                tokio::time::sleep(wait).await;
                continue;
            }

            if status == StatusCode::FORBIDDEN {
                let body = response.text().await.unwrap_or_default();
                if body.to_lowercase().contains("rate limit") {
                    rate_hits += 1;
                    let wait = self.rate_limit_wait(&headers, rate_hits);
                    warn!(
                        endpoint = path,
                        attempt = attempts,
                        wait_secs = wait.as_secs_f64(),
                        "rate limited (403)"
                    );
                    if rate_hits > RATE_LIMIT_RETRIES {
                        return Err(FetchError::Http {
                            status: status.as_u16(),
                            endpoint: path.to_string(),
                            attempts,
                            message: format!(
                                "rate limit exceeded after {RATE_LIMIT_RETRIES} retries"
                            ),
                            rate_limited: true,
                        });
                    }
                    tokio::time::sleep(wait).await;
                    continue;
                }
                return Err(FetchError::Http {
                    status: status.as_u16(),
                    endpoint: path.to_string(),
                    attempts,
                    message: truncate_body(&body),
                    rate_limited: false,
                });
            }

            if status.is_server_error() {
                server_hits += 1;
                warn!(
                    endpoint = path,
                    status = status.as_u16(),
                    attempt = attempts,
                    "server error"
                );
                if server_hits > SERVER_RETRIES {
                    let body = response.text().await.unwrap_or_default();
                    return Err(FetchError::Http {
                        status: status.as_u16(),
                        endpoint: path.to_string(),
                        attempts,
                        message: format!(
                            "Server error {} after {SERVER_RETRIES} retries: {}",
                            status.as_u16(),
                            truncate_body(&body)
                        ),
                        rate_limited: false,
                    });
                }
                tokio::time::sleep(self.backoff(server_hits)).await;
                continue;
            }

            if status.is_client_error() {
                let body = response.text().await.unwrap_or_default();
                return Err(FetchError::Http {
                    status: status.as_u16(),
                    endpoint: path.to_string(),
                    attempts,
                    message: truncate_body(&body),
                    rate_limited: false,
                });
            }

            self.track_quota(&headers).await;

            let body = response.text().await.map_err(|source| FetchError::Network {
                endpoint: path.to_string(),
                attempts,
                source,
            })?;
            return serde_json::from_str(&body).map_err(|e| FetchError::Decode {
                endpoint: path.to_string(),
                message: e.to_string(),
            });
        }
    }

    /// Three-tier wait for rate-limit hits: explicit `Retry-After`, then the
    /// `X-RateLimit-Reset` delta, then exponential backoff.
    fn rate_limit_wait(&self, headers: &HeaderMap, hit: u32) -> Duration {
        let base = retry_after_secs(headers)
            .or_else(|| reset_delta_secs(headers))
            .unwrap_or_else(|| self.backoff_secs(hit));
        jittered(base)
    }

    fn backoff_secs(&self, hit: u32) -> f64 {
        self.options
            .backoff_base
            .powi(hit.saturating_sub(1) as i32)
            .min(MAX_BACKOFF_SECS)
    }

    fn backoff(&self, hit: u32) -> Duration {
        jittered(self.backoff_secs(hit))
    }

    /// Adaptive quota awareness after a successful call: near exhaustion,
    /// block until the reset instant instead of burning the last requests.
    async fn track_quota(&self, headers: &HeaderMap) {
        let Some(remaining) = header_u64(headers, "X-RateLimit-Remaining") else {
            return;
        };
        if remaining < 10 {
            match reset_delta_secs(headers) {
                Some(delta) => {
                    let wait = Duration::from_secs_f64(delta + 1.0);
                    warn!(
                        remaining,
                        wait_secs = wait.as_secs_f64(),
                        "rate limit critical, waiting for reset"
                    );
                    tokio::time::sleep(wait).await;
                }
                None => warn!(remaining, "rate limit critical, no reset header"),
            }
        } else if remaining < 100 {
            warn!(remaining, "rate limit low");
        }
    }
}

fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 200;
    if body.len() > LIMIT {
        let mut end = LIMIT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &body[..end])
    } else {
        body.to_string()
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn header_f64(headers: &HeaderMap, name: &str) -> Option<f64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn retry_after_secs(headers: &HeaderMap) -> Option<f64> {
    header_f64(headers, "Retry-After")
}

fn reset_delta_secs(headers: &HeaderMap) -> Option<f64> {
    let reset = header_f64(headers, "X-RateLimit-Reset")?;
    let now = chrono::Utc::now().timestamp() as f64;
    Some((reset - now).max(0.0))
}

/// ±25 % uniform jitter to desynchronise concurrent clients.
fn jittered(secs: f64) -> Duration {
    let factor = rand::thread_rng().gen_range(0.75..=1.25);
    Duration::from_secs_f64((secs * factor).max(0.0))
}
