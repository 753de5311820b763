//! Persistent, thread-safe state stores.
//!
//! Each store is one JSON file mutated under an exclusive lock with a
//! read-modify-write pattern. They are what makes multi-year backfills
//! survive crashes: the checkpoint records how far each stage got, the daily
//! state drives cascade staleness, the failed-date store separates permanent
//! from retryable failures, the fetch-progress cache makes range searches
//! resumable, and the batch-job store lets interrupted runs resume polling.

mod batch_jobs;
mod checkpoint;
mod daily_state;
mod failed_dates;
mod fetch_progress;

pub use batch_jobs::{BatchJobRecord, BatchJobStore};
pub use checkpoint::{
    CheckpointStore, LAST_FETCH_DATE, LAST_NORMALIZE_DATE, LAST_SUMMARIZE_DATE,
};
pub use daily_state::{DailyStateStore, Stage};
pub use failed_dates::{FailedDateStore, FailureEntry};
pub use fetch_progress::FetchProgressStore;
