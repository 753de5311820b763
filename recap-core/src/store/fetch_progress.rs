//! Per-chunk search-result cache for resumable range fetches.
//!
//! A multi-year `fetch_range` issues one search per month-chunk per kind.
//! When a run is interrupted mid-enrichment, the cached search buckets let
//! the restart skip straight back to enrichment without burning search quota.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::StorageError;
use crate::files;

/// Directory of `{slugified-chunk-key}.json` files, one per chunk+kind.
pub struct FetchProgressStore {
    dir: PathBuf,
}

impl FetchProgressStore {
    pub fn new(dir: PathBuf) -> Self {
        FetchProgressStore { dir }
    }

    /// Chunk keys look like `2025-01-01..2025-01-31/prs`; slashes are not
    /// filename-safe.
    fn key_to_path(&self, chunk_key: &str) -> PathBuf {
        let slug = chunk_key.replace(['/', '\\'], "_");
        self.dir.join(format!("{slug}.json"))
    }

    /// Persist the post-search bucket for a chunk.
    pub fn save_chunk<T: Serialize>(
        &self,
        chunk_key: &str,
        items: &T,
    ) -> Result<(), StorageError> {
        let path = self.key_to_path(chunk_key);
        files::save_json(items, &path)?;
        debug!(chunk = chunk_key, path = %path.display(), "saved chunk search cache");
        Ok(())
    }

    /// Load a cached chunk, or `None` when it was never saved. A cache file
    /// that no longer parses is treated as absent so the search re-runs.
    pub fn load_chunk<T: DeserializeOwned>(
        &self,
        chunk_key: &str,
    ) -> Result<Option<T>, StorageError> {
        let path = self.key_to_path(chunk_key);
        if !path.exists() {
            return Ok(None);
        }
        match files::load_json(&path) {
            Ok(value) => {
                debug!(chunk = chunk_key, "loaded chunk search cache");
                Ok(Some(value))
            }
            Err(StorageError::Json { .. }) => {
                tracing::warn!(chunk = chunk_key, "stale chunk cache did not parse, ignoring");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Drop the cache for one chunk (called once the chunk succeeded).
    pub fn clear_chunk(&self, chunk_key: &str) -> Result<(), StorageError> {
        let path = self.key_to_path(chunk_key);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|source| StorageError::Io {
                path: path.clone(),
                source,
            })?;
            debug!(chunk = chunk_key, "cleared chunk search cache");
        }
        Ok(())
    }

    /// Drop every cached chunk.
    pub fn clear_all(&self) -> Result<(), StorageError> {
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir).map_err(|source| StorageError::Io {
                path: self.dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
