//! Last-successful-date checkpoint per pipeline stage.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::NaiveDate;
use tracing::debug;

use crate::dates::fmt_date;
use crate::error::StorageError;
use crate::files;

pub const LAST_FETCH_DATE: &str = "last_fetch_date";
pub const LAST_NORMALIZE_DATE: &str = "last_normalize_date";
pub const LAST_SUMMARIZE_DATE: &str = "last_summarize_date";

/// Checkpoint file: stage key → last successfully processed date.
///
/// Updates obey a monotonicity guard: with parallel workers an earlier date
/// can finish after a later one, and must not rewind the checkpoint.
/// Lexicographic comparison is valid because the values are ISO dates.
pub struct CheckpointStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CheckpointStore {
    pub fn new(path: PathBuf) -> Self {
        CheckpointStore {
            path,
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<BTreeMap<String, String>, StorageError> {
        if self.path.exists() {
            files::load_json(&self.path)
        } else {
            Ok(BTreeMap::new())
        }
    }

    /// Advance `key` to `date` if it is strictly greater than the stored
    /// value. Returns whether a write happened.
    pub fn update(&self, key: &str, date: NaiveDate) -> Result<bool, StorageError> {
        let _guard = self.lock.lock().expect("checkpoint lock poisoned");
        let mut map = self.read()?;
        let proposed = fmt_date(date);
        let existing = map.get(key).cloned().unwrap_or_default();
        if proposed > existing {
            map.insert(key.to_string(), proposed.clone());
            files::save_json(&map, &self.path)?;
            debug!(key, date = %proposed, "checkpoint updated");
            Ok(true)
        } else {
            debug!(key, proposed = %proposed, existing = %existing, "checkpoint unchanged");
            Ok(false)
        }
    }

    /// Current value for `key`, if any.
    pub fn get(&self, key: &str) -> Result<Option<NaiveDate>, StorageError> {
        let _guard = self.lock.lock().expect("checkpoint lock poisoned");
        let map = self.read()?;
        Ok(map.get(key).and_then(|s| s.parse().ok()))
    }

    /// Snapshot of every checkpoint key.
    pub fn all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let _guard = self.lock.lock().expect("checkpoint lock poisoned");
        self.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn first_update_writes() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoints.json"));
        assert!(store.update(LAST_FETCH_DATE, d("2025-02-15")).unwrap());
        assert_eq!(store.get(LAST_FETCH_DATE).unwrap(), Some(d("2025-02-15")));
    }

    #[test]
    fn smaller_date_never_rewinds() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoints.json"));
        store.update(LAST_FETCH_DATE, d("2025-02-16")).unwrap();
        assert!(!store.update(LAST_FETCH_DATE, d("2025-02-15")).unwrap());
        assert_eq!(store.get(LAST_FETCH_DATE).unwrap(), Some(d("2025-02-16")));
    }

    #[test]
    fn equal_date_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoints.json"));
        store.update(LAST_FETCH_DATE, d("2025-02-16")).unwrap();
        assert!(!store.update(LAST_FETCH_DATE, d("2025-02-16")).unwrap());
    }

    #[test]
    fn keys_are_independent() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoints.json"));
        store.update(LAST_FETCH_DATE, d("2025-02-16")).unwrap();
        store.update(LAST_NORMALIZE_DATE, d("2025-02-14")).unwrap();
        assert_eq!(store.get(LAST_FETCH_DATE).unwrap(), Some(d("2025-02-16")));
        assert_eq!(
            store.get(LAST_NORMALIZE_DATE).unwrap(),
            Some(d("2025-02-14"))
        );
        assert_eq!(store.get(LAST_SUMMARIZE_DATE).unwrap(), None);
    }

    #[test]
    fn out_of_order_completion_keeps_latest() {
        // Workers finish 02-16 before 02-15; the checkpoint must end at 02-16.
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoints.json"));
        store.update(LAST_FETCH_DATE, d("2025-02-16")).unwrap();
        store.update(LAST_FETCH_DATE, d("2025-02-15")).unwrap();
        assert_eq!(store.get(LAST_FETCH_DATE).unwrap(), Some(d("2025-02-16")));
    }
}
