//! Shared helpers for the integration suites.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use recap_core::host::HostOptions;
use recap_core::{
    AppConfig, CheckpointStore, ClientPool, DailyStateStore, FailedDateStore, FetchProgressStore,
};
use serde_json::json;

/// Host options tuned for tests: no throttle, tiny backoff.
pub fn fast_host_options() -> HostOptions {
    HostOptions {
        search_interval: Duration::ZERO,
        timeout: Duration::from_secs(5),
        backoff_base: 0.01,
    }
}

/// App config rooted in a temp directory, pointed at a mock host.
pub fn test_config(host_url: &str, data_dir: &Path) -> Arc<AppConfig> {
    Arc::new(AppConfig {
        host_url: host_url.to_string(),
        host_token: "test-token".into(),
        username: "alice".into(),
        data_dir: data_dir.to_path_buf(),
        prompts_dir: data_dir.join("prompts"),
        provider_config_path: None,
        pool_size: 2,
        max_workers: 2,
        max_fetch_retries: 5,
        search_interval_secs: 0.0,
        include_own_pr_comments: true,
    })
}

pub struct Stores {
    pub checkpoints: Arc<CheckpointStore>,
    pub daily_state: Arc<DailyStateStore>,
    pub failed: Arc<FailedDateStore>,
    pub progress: Arc<FetchProgressStore>,
}

pub fn test_stores(config: &AppConfig) -> Stores {
    Stores {
        checkpoints: Arc::new(CheckpointStore::new(config.checkpoints_path())),
        daily_state: Arc::new(DailyStateStore::new(config.daily_state_path())),
        failed: Arc::new(FailedDateStore::new(
            config.failed_dates_path(),
            config.max_fetch_retries,
        )),
        progress: Arc::new(FetchProgressStore::new(config.fetch_progress_dir())),
    }
}

pub fn test_pool(config: &AppConfig) -> Arc<ClientPool> {
    Arc::new(
        ClientPool::new(
            &config.host_url,
            &config.host_token,
            config.pool_size,
            fast_host_options(),
        )
        .expect("pool construction"),
    )
}

/// Empty search envelope.
pub fn empty_search() -> serde_json::Value {
    json!({"total_count": 0, "items": []})
}

/// A PR search hit as `/search/issues` returns it.
pub fn pr_search_item(host: &str, number: u64, updated_at: &str) -> serde_json::Value {
    json!({
        "url": format!("{host}/api/v3/repos/org/x/issues/{number}"),
        "html_url": format!("{host}/org/x/pull/{number}"),
        "number": number,
        "title": "Add feature",
        "updated_at": updated_at,
        "pull_request": {"url": format!("{host}/api/v3/repos/org/x/pulls/{number}")}
    })
}

/// The PR detail payload used by the happy-path scenarios.
pub fn pr_detail(host: &str, number: u64, author: &str) -> serde_json::Value {
    json!({
        "url": format!("{host}/api/v3/repos/org/x/pulls/{number}"),
        "html_url": format!("{host}/org/x/pull/{number}"),
        "number": number,
        "title": "Add feature",
        "body": "Adds the feature.",
        "state": "open",
        "merged": false,
        "created_at": "2025-02-16T09:00:00Z",
        "updated_at": "2025-02-16T10:00:00Z",
        "merged_at": null,
        "labels": [{"name": "feature"}],
        "user": {"login": author}
    })
}
