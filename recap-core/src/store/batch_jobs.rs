//! Batch-job records for crash recovery.
//!
//! Submitted provider batches are persisted so an interrupted run resumes
//! polling instead of re-submitting (and re-paying for) the same work.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StorageError;
use crate::files;

const TERMINAL_STATUSES: &[&str] = &["completed", "failed", "expired"];

/// One submitted batch job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJobRecord {
    pub batch_id: String,
    pub provider: String,
    pub task: String,
    pub custom_ids: Vec<String>,
    /// ISO 8601.
    pub submitted_at: String,
    pub status: String,
}

/// JSON-file store of batch jobs keyed by provider batch id.
pub struct BatchJobStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl BatchJobStore {
    pub fn new(path: PathBuf) -> Self {
        BatchJobStore {
            path,
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<BTreeMap<String, BatchJobRecord>, StorageError> {
        if self.path.exists() {
            files::load_json(&self.path)
        } else {
            Ok(BTreeMap::new())
        }
    }

    /// Record a newly submitted batch.
    pub fn save_job(
        &self,
        batch_id: &str,
        provider: &str,
        task: &str,
        custom_ids: Vec<String>,
    ) -> Result<(), StorageError> {
        let _guard = self.lock.lock().expect("batch job lock poisoned");
        let mut map = self.read()?;
        map.insert(
            batch_id.to_string(),
            BatchJobRecord {
                batch_id: batch_id.to_string(),
                provider: provider.to_string(),
                task: task.to_string(),
                custom_ids,
                submitted_at: Utc::now().to_rfc3339(),
                status: "submitted".to_string(),
            },
        );
        debug!(batch_id, provider, task, "saved batch job");
        files::save_json(&map, &self.path)
    }

    pub fn get_job(&self, batch_id: &str) -> Result<Option<BatchJobRecord>, StorageError> {
        let _guard = self.lock.lock().expect("batch job lock poisoned");
        Ok(self.read()?.remove(batch_id))
    }

    /// Jobs not yet in a terminal state.
    pub fn active_jobs(&self) -> Result<Vec<BatchJobRecord>, StorageError> {
        let _guard = self.lock.lock().expect("batch job lock poisoned");
        Ok(self
            .read()?
            .into_values()
            .filter(|job| !TERMINAL_STATUSES.contains(&job.status.as_str()))
            .collect())
    }

    pub fn update_status(&self, batch_id: &str, status: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().expect("batch job lock poisoned");
        let mut map = self.read()?;
        if let Some(job) = map.get_mut(batch_id) {
            job.status = status.to_string();
            files::save_json(&map, &self.path)?;
        }
        Ok(())
    }

    pub fn remove_job(&self, batch_id: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().expect("batch job lock poisoned");
        let mut map = self.read()?;
        if map.remove(batch_id).is_some() {
            files::save_json(&map, &self.path)?;
        }
        Ok(())
    }
}
