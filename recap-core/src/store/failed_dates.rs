//! Per-date failure tracking with permanent/retryable classification.
//!
//! In a multi-year backfill some dates fail on rate limits, timeouts or 5xx.
//! Recording them lets the next run retry exactly those dates, while dates
//! that failed permanently (404, non-rate-limit 403, 422) or exhausted their
//! attempt budget are reported instead of retried forever.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dates::fmt_date;
use crate::error::{RecapError, StorageError};
use crate::files;
use crate::store::Stage;

/// Failure record for one date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEntry {
    /// Pipeline stage that failed.
    pub phase: String,
    /// Total failure count.
    pub attempts: u32,
    /// Most recent error message.
    pub last_error: String,
    /// ISO 8601 instant of the last attempt.
    pub last_attempt: String,
    /// ISO 8601 instant of the first failure.
    pub first_failure: String,
    /// Never retry when true.
    pub permanent: bool,
}

/// JSON-file store of failed dates.
pub struct FailedDateStore {
    path: PathBuf,
    max_retries: u32,
    lock: Mutex<()>,
}

impl FailedDateStore {
    pub fn new(path: PathBuf, max_retries: u32) -> Self {
        FailedDateStore {
            path,
            max_retries,
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<BTreeMap<String, FailureEntry>, StorageError> {
        if self.path.exists() {
            files::load_json(&self.path)
        } else {
            Ok(BTreeMap::new())
        }
    }

    /// Record a failure, classifying it from the error. Increments the
    /// attempt counter on repeat failures; a permanent classification sticks.
    pub fn record_failure(
        &self,
        date: NaiveDate,
        phase: Stage,
        error: &RecapError,
    ) -> Result<(), StorageError> {
        let _guard = self.lock.lock().expect("failed-date lock poisoned");
        let mut map = self.read()?;
        let now = Utc::now().to_rfc3339();
        let permanent = error.is_permanent();
        let message = error.to_string();
        let key = fmt_date(date);

        match map.get_mut(&key) {
            Some(entry) => {
                entry.attempts += 1;
                entry.last_error = message;
                entry.last_attempt = now;
                if permanent {
                    entry.permanent = true;
                }
            }
            None => {
                map.insert(
                    key.clone(),
                    FailureEntry {
                        phase: phase.as_str().to_string(),
                        attempts: 1,
                        last_error: message,
                        last_attempt: now.clone(),
                        first_failure: now,
                        permanent,
                    },
                );
            }
        }
        let entry = &map[&key];
        debug!(
            date = %key,
            phase = %phase,
            attempts = entry.attempts,
            permanent = entry.permanent,
            "recorded failure"
        );
        files::save_json(&map, &self.path)
    }

    /// Clear the failure record for a date that succeeded.
    pub fn record_success(&self, date: NaiveDate, phase: Stage) -> Result<(), StorageError> {
        let _guard = self.lock.lock().expect("failed-date lock poisoned");
        let mut map = self.read()?;
        if map.remove(&fmt_date(date)).is_some() {
            debug!(date = %date, phase = %phase, "cleared failure record");
            files::save_json(&map, &self.path)?;
        }
        Ok(())
    }

    /// Failure entry for a date, if one exists.
    pub fn get_entry(&self, date: NaiveDate) -> Result<Option<FailureEntry>, StorageError> {
        let _guard = self.lock.lock().expect("failed-date lock poisoned");
        Ok(self.read()?.remove(&fmt_date(date)))
    }

    fn entry_retryable(&self, entry: &FailureEntry) -> bool {
        !entry.permanent && entry.attempts < self.max_retries
    }

    /// Candidates that are allowed to run: no failure record, or a retryable
    /// record below the attempt cap. Permanent and exhausted dates are
    /// dropped.
    pub fn retryable_dates(
        &self,
        candidates: &[NaiveDate],
    ) -> Result<Vec<NaiveDate>, StorageError> {
        let _guard = self.lock.lock().expect("failed-date lock poisoned");
        let map = self.read()?;
        Ok(candidates
            .iter()
            .copied()
            .filter(|d| match map.get(&fmt_date(*d)) {
                None => true,
                Some(entry) => self.entry_retryable(entry),
            })
            .collect())
    }

    /// Candidates that have a recorded, still-retryable failure. These are
    /// merged into a range run's work set even when the date looks fresh.
    pub fn failed_retryable_dates(
        &self,
        candidates: &[NaiveDate],
    ) -> Result<Vec<NaiveDate>, StorageError> {
        let _guard = self.lock.lock().expect("failed-date lock poisoned");
        let map = self.read()?;
        Ok(candidates
            .iter()
            .copied()
            .filter(|d| {
                map.get(&fmt_date(*d))
                    .is_some_and(|entry| self.entry_retryable(entry))
            })
            .collect())
    }

    /// Dates that will never be retried automatically: permanent failures
    /// and those that hit the attempt cap. Sorted ascending.
    pub fn exhausted_dates(&self) -> Result<Vec<NaiveDate>, StorageError> {
        let _guard = self.lock.lock().expect("failed-date lock poisoned");
        let map = self.read()?;
        Ok(map
            .iter()
            .filter(|(_, entry)| entry.permanent || entry.attempts >= self.max_retries)
            .filter_map(|(date, _)| date.parse().ok())
            .collect())
    }
}
