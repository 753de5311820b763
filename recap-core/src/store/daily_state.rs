//! Per-date stage timestamps and the cascade staleness predicates.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use crate::dates::fmt_date;
use crate::error::StorageError;
use crate::files;

/// Pipeline stage names as stored in `daily_state.json` and
/// `failed_dates.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Fetch,
    Normalize,
    Summarize,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Normalize => "normalize",
            Stage::Summarize => "summarize",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

type StateMap = BTreeMap<String, BTreeMap<String, String>>;

/// Per-date `{fetched_at, normalized_at, summarized_at}` record store.
///
/// Staleness rules:
/// - fetch: stale when no record exists OR the fetch timestamp's date
///   component is on or before the target date (evening activity may post
///   after a same-day fetch);
/// - normalize: stale when the fetch timestamp is newer than the normalize
///   timestamp;
/// - summarize: stale when the normalize timestamp is newer than the
///   summarize timestamp.
pub struct DailyStateStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl DailyStateStore {
    pub fn new(path: PathBuf) -> Self {
        DailyStateStore {
            path,
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<StateMap, StorageError> {
        if self.path.exists() {
            files::load_json(&self.path)
        } else {
            Ok(StateMap::new())
        }
    }

    /// Stored timestamp for a stage and date, or `None`.
    pub fn get_timestamp(
        &self,
        stage: Stage,
        date: NaiveDate,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        let _guard = self.lock.lock().expect("daily state lock poisoned");
        let map = self.read()?;
        Ok(map
            .get(&fmt_date(date))
            .and_then(|entry| entry.get(stage.as_str()))
            .and_then(|s| s.parse::<DateTime<Utc>>().ok()))
    }

    /// Record `now` as the timestamp for a stage and date.
    pub fn set_timestamp(&self, stage: Stage, date: NaiveDate) -> Result<(), StorageError> {
        self.set_timestamp_at(stage, date, Utc::now())
    }

    /// Record an explicit timestamp for a stage and date.
    pub fn set_timestamp_at(
        &self,
        stage: Stage,
        date: NaiveDate,
        ts: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let _guard = self.lock.lock().expect("daily state lock poisoned");
        let mut map = self.read()?;
        map.entry(fmt_date(date))
            .or_default()
            .insert(stage.as_str().to_string(), ts.to_rfc3339());
        files::save_json(&map, &self.path)?;
        debug!(stage = %stage, date = %date, ts = %ts, "daily state updated");
        Ok(())
    }

    pub fn is_fetch_stale(&self, date: NaiveDate) -> Result<bool, StorageError> {
        match self.get_timestamp(Stage::Fetch, date)? {
            None => Ok(true),
            Some(ts) => Ok(ts.date_naive() <= date),
        }
    }

    pub fn is_normalize_stale(&self, date: NaiveDate) -> Result<bool, StorageError> {
        let Some(norm_ts) = self.get_timestamp(Stage::Normalize, date)? else {
            return Ok(true);
        };
        let Some(fetch_ts) = self.get_timestamp(Stage::Fetch, date)? else {
            return Ok(true);
        };
        Ok(fetch_ts > norm_ts)
    }

    pub fn is_summarize_stale(&self, date: NaiveDate) -> Result<bool, StorageError> {
        let Some(summ_ts) = self.get_timestamp(Stage::Summarize, date)? else {
            return Ok(true);
        };
        let Some(norm_ts) = self.get_timestamp(Stage::Normalize, date)? else {
            return Ok(true);
        };
        Ok(norm_ts > summ_ts)
    }

    pub fn is_stale(&self, stage: Stage, date: NaiveDate) -> Result<bool, StorageError> {
        match stage {
            Stage::Fetch => self.is_fetch_stale(date),
            Stage::Normalize => self.is_normalize_stale(date),
            Stage::Summarize => self.is_summarize_stale(date),
        }
    }

    /// Subset of `dates` that needs work for the given stage.
    pub fn stale_dates(
        &self,
        stage: Stage,
        dates: &[NaiveDate],
    ) -> Result<Vec<NaiveDate>, StorageError> {
        let mut out = Vec::new();
        for &d in dates {
            if self.is_stale(stage, d)? {
                out.push(d);
            }
        }
        debug!(stage = %stage, stale = out.len(), total = dates.len(), "stale_dates");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn store() -> (TempDir, DailyStateStore) {
        let dir = TempDir::new().unwrap();
        let store = DailyStateStore::new(dir.path().join("daily_state.json"));
        (dir, store)
    }

    #[test]
    fn missing_record_is_stale_everywhere() {
        let (_dir, store) = store();
        let date = d("2025-02-16");
        assert!(store.is_fetch_stale(date).unwrap());
        assert!(store.is_normalize_stale(date).unwrap());
        assert!(store.is_summarize_stale(date).unwrap());
    }

    #[test]
    fn same_day_fetch_stays_stale() {
        // Evening activity may post after the fetch, so a fetch timestamp on
        // the target date itself is still considered stale.
        let (_dir, store) = store();
        let date = d("2025-02-16");
        let ts = Utc.with_ymd_and_hms(2025, 2, 16, 23, 0, 0).unwrap();
        store.set_timestamp_at(Stage::Fetch, date, ts).unwrap();
        assert!(store.is_fetch_stale(date).unwrap());
    }

    #[test]
    fn next_day_fetch_is_fresh() {
        let (_dir, store) = store();
        let date = d("2025-02-16");
        let ts = Utc.with_ymd_and_hms(2025, 2, 17, 1, 0, 0).unwrap();
        store.set_timestamp_at(Stage::Fetch, date, ts).unwrap();
        assert!(!store.is_fetch_stale(date).unwrap());
    }

    #[test]
    fn refetch_cascades_into_normalize_staleness() {
        let (_dir, store) = store();
        let date = d("2025-02-16");
        let t0 = Utc.with_ymd_and_hms(2025, 2, 17, 1, 0, 0).unwrap();
        store.set_timestamp_at(Stage::Fetch, date, t0).unwrap();
        store
            .set_timestamp_at(Stage::Normalize, date, t0 + Duration::minutes(1))
            .unwrap();
        assert!(!store.is_normalize_stale(date).unwrap());

        // A newer fetch invalidates the normalize output.
        store
            .set_timestamp_at(Stage::Fetch, date, t0 + Duration::hours(2))
            .unwrap();
        assert!(store.is_normalize_stale(date).unwrap());
    }

    #[test]
    fn renormalize_cascades_into_summarize_staleness() {
        let (_dir, store) = store();
        let date = d("2025-02-16");
        let t0 = Utc.with_ymd_and_hms(2025, 2, 17, 1, 0, 0).unwrap();
        store.set_timestamp_at(Stage::Normalize, date, t0).unwrap();
        store
            .set_timestamp_at(Stage::Summarize, date, t0 + Duration::minutes(1))
            .unwrap();
        assert!(!store.is_summarize_stale(date).unwrap());

        store
            .set_timestamp_at(Stage::Normalize, date, t0 + Duration::hours(1))
            .unwrap();
        assert!(store.is_summarize_stale(date).unwrap());
    }

    #[test]
    fn stale_dates_filters() {
        let (_dir, store) = store();
        let fresh = d("2025-02-15");
        let stale = d("2025-02-16");
        let ts = Utc.with_ymd_and_hms(2025, 2, 16, 1, 0, 0).unwrap();
        store.set_timestamp_at(Stage::Fetch, fresh, ts).unwrap();
        let result = store.stale_dates(Stage::Fetch, &[fresh, stale]).unwrap();
        assert_eq!(result, vec![stale]);
    }
}
