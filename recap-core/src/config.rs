//! Application configuration.
//!
//! Loaded from a TOML secrets file with `RECAP_*` environment overrides
//! layered on top, then queried for every derived path in the canonical file
//! tree. The provider/task document for the LLM router is separate (see
//! [`crate::llm::ProviderConfig`]).

use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;

use crate::error::ConfigError;

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_prompts_dir() -> PathBuf {
    PathBuf::from("prompts")
}

fn default_pool_size() -> usize {
    5
}

fn default_max_workers() -> usize {
    5
}

fn default_max_retries() -> u32 {
    5
}

fn default_search_interval() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Base URL of the GitHub-compatible host, e.g.
    /// `https://ghe.example.com`.
    pub host_url: String,
    /// Personal access token for the host.
    pub host_token: String,
    /// Login whose activity is collected.
    pub username: String,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_prompts_dir")]
    pub prompts_dir: PathBuf,
    /// Path of the provider/task routing document.
    #[serde(default)]
    pub provider_config_path: Option<PathBuf>,

    /// Number of host clients in the enrichment pool.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Default worker count for range operations.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Failure attempts per date before it is reported as exhausted.
    #[serde(default = "default_max_retries")]
    pub max_fetch_retries: u32,
    /// Minimum spacing between search API calls, in seconds.
    #[serde(default = "default_search_interval")]
    pub search_interval_secs: f64,
    /// Whether an author's comments on their own PR produce `pr_commented`
    /// activities. Default keeps the discussion trail.
    #[serde(default = "default_true")]
    pub include_own_pr_comments: bool,
}

impl AppConfig {
    /// Load from a TOML file, then apply `RECAP_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: AppConfig =
            toml::from_str(&text).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Environment variables win over the file, matching the layered-loader
    /// convention: `RECAP_HOST_URL`, `RECAP_HOST_TOKEN`, `RECAP_USERNAME`,
    /// `RECAP_DATA_DIR`.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("RECAP_HOST_URL") {
            self.host_url = v;
        }
        if let Ok(v) = std::env::var("RECAP_HOST_TOKEN") {
            self.host_token = v;
        }
        if let Ok(v) = std::env::var("RECAP_USERNAME") {
            self.username = v;
        }
        if let Ok(v) = std::env::var("RECAP_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.host_url.trim().is_empty() {
            return Err(ConfigError::Invalid("host_url is empty".into()));
        }
        if self.username.trim().is_empty() {
            return Err(ConfigError::Invalid("username is empty".into()));
        }
        if self.pool_size == 0 {
            return Err(ConfigError::Invalid("pool_size must be at least 1".into()));
        }
        Ok(())
    }

    // ── Derived paths ───────────────────────────────────────────────────────

    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    pub fn normalized_dir(&self) -> PathBuf {
        self.data_dir.join("normalized")
    }

    pub fn summaries_dir(&self) -> PathBuf {
        self.data_dir.join("summaries")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join("state")
    }

    fn date_dir(base: PathBuf, date: NaiveDate) -> PathBuf {
        base.join(format!("{:04}", date.year()))
            .join(format!("{:02}", date.month()))
            .join(format!("{:02}", date.day()))
    }

    /// `data/raw/{YYYY}/{MM}/{DD}/`
    pub fn date_raw_dir(&self, date: NaiveDate) -> PathBuf {
        Self::date_dir(self.raw_dir(), date)
    }

    /// `data/normalized/{YYYY}/{MM}/{DD}/`
    pub fn date_normalized_dir(&self, date: NaiveDate) -> PathBuf {
        Self::date_dir(self.normalized_dir(), date)
    }

    /// `data/summaries/{YYYY}/daily/{MM}-{DD}.md`
    pub fn daily_summary_path(&self, date: NaiveDate) -> PathBuf {
        self.summaries_dir()
            .join(format!("{:04}", date.year()))
            .join("daily")
            .join(format!("{:02}-{:02}.md", date.month(), date.day()))
    }

    /// `data/summaries/{YYYY}/weekly/W{NN}.md` (ISO week)
    pub fn weekly_summary_path(&self, year: i32, week: u32) -> PathBuf {
        self.summaries_dir()
            .join(format!("{year:04}"))
            .join("weekly")
            .join(format!("W{week:02}.md"))
    }

    /// `data/summaries/{YYYY}/monthly/{MM}.md`
    pub fn monthly_summary_path(&self, year: i32, month: u32) -> PathBuf {
        self.summaries_dir()
            .join(format!("{year:04}"))
            .join("monthly")
            .join(format!("{month:02}.md"))
    }

    /// `data/summaries/{YYYY}/yearly.md`
    pub fn yearly_summary_path(&self, year: i32) -> PathBuf {
        self.summaries_dir()
            .join(format!("{year:04}"))
            .join("yearly.md")
    }

    pub fn checkpoints_path(&self) -> PathBuf {
        self.state_dir().join("checkpoints.json")
    }

    pub fn daily_state_path(&self) -> PathBuf {
        self.state_dir().join("daily_state.json")
    }

    pub fn failed_dates_path(&self) -> PathBuf {
        self.state_dir().join("failed_dates.json")
    }

    pub fn batch_jobs_path(&self) -> PathBuf {
        self.state_dir().join("batch_jobs.json")
    }

    pub fn fetch_progress_dir(&self) -> PathBuf {
        self.state_dir().join("fetch_progress")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            host_url: "https://ghe.example.com".into(),
            host_token: "token".into(),
            username: "alice".into(),
            data_dir: PathBuf::from("data"),
            prompts_dir: PathBuf::from("prompts"),
            provider_config_path: None,
            pool_size: 5,
            max_workers: 5,
            max_fetch_retries: 5,
            search_interval_secs: 2.0,
            include_own_pr_comments: true,
        }
    }

    #[test]
    fn parses_minimal_toml_with_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            host_url = "https://ghe.example.com"
            host_token = "t0ken"
            username = "alice"
            "#,
        )
        .unwrap();
        assert_eq!(config.pool_size, 5);
        assert_eq!(config.max_fetch_retries, 5);
        assert!(config.include_own_pr_comments);
        assert_eq!(config.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn derived_paths_match_layout() {
        let config = base_config();
        let date = NaiveDate::from_ymd_opt(2025, 2, 16).unwrap();
        assert_eq!(
            config.date_raw_dir(date),
            PathBuf::from("data/raw/2025/02/16")
        );
        assert_eq!(
            config.daily_summary_path(date),
            PathBuf::from("data/summaries/2025/daily/02-16.md")
        );
        assert_eq!(
            config.weekly_summary_path(2025, 7),
            PathBuf::from("data/summaries/2025/weekly/W07.md")
        );
        assert_eq!(
            config.monthly_summary_path(2025, 2),
            PathBuf::from("data/summaries/2025/monthly/02.md")
        );
        assert_eq!(
            config.yearly_summary_path(2025),
            PathBuf::from("data/summaries/2025/yearly.md")
        );
        assert_eq!(
            config.checkpoints_path(),
            PathBuf::from("data/state/checkpoints.json")
        );
    }

    #[test]
    fn rejects_zero_pool_size() {
        let mut config = base_config();
        config.pool_size = 0;
        assert!(config.validate().is_err());
    }
}
