//! Root of the `recap-core` library.
//!
//! A personal activity-recap engine: it ingests pull-request, commit, issue,
//! review and comment activity for one user from a GitHub-compatible host,
//! normalises it into a uniform activity stream with per-day statistics, and
//! drives an LLM-backed hierarchical summariser (daily → weekly → monthly →
//! yearly) plus an ad-hoc query mode. The file tree is the system of record;
//! a handful of small JSON state stores make multi-year backfills resumable.

// All user-visible output goes through the tracing stack; library code never
// writes to stdout/stderr directly.
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod config;
pub mod dates;
pub mod error;
pub mod files;
pub mod host;
pub mod llm;
pub mod models;
pub mod prompts;
pub mod services;
pub mod store;

pub use config::AppConfig;
pub use error::{
    ConfigError, FetchError, NormalizeError, RecapError, Result, StorageError, SummarizeError,
};
pub use host::{ClientPool, HostClient, HostOptions};
pub use llm::pricing::PricingTable;
pub use llm::provider_config::ProviderConfig;
pub use llm::router::LlmRouter;
pub use llm::usage::UsageTracker;
pub use models::{Activity, ActivityKind, DailyStats, DateOutcome, DateStatus};
pub use services::{FetchKind, Fetcher, Normalizer, Orchestrator, RangeOptions, Summarizer};
pub use store::{
    BatchJobStore, CheckpointStore, DailyStateStore, FailedDateStore, FetchProgressStore, Stage,
};
