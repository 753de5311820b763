//! JSON / JSONL helpers for the canonical file store.
//!
//! The file tree is the system of record: every write creates parent
//! directories on demand, and every reader goes through these helpers so the
//! formats stay uniform (UTF-8, pretty JSON, one object per JSONL line).

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;

fn io_err(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn json_err(path: &Path, source: serde_json::Error) -> StorageError {
    StorageError::Json {
        path: path.to_path_buf(),
        source,
    }
}

/// Create the parent directory of `path` if it does not exist yet.
pub fn ensure_parent(path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(path, e))?;
    }
    Ok(())
}

/// Write `value` as pretty-printed JSON.
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<(), StorageError> {
    ensure_parent(path)?;
    let payload = serde_json::to_string_pretty(value).map_err(|e| json_err(path, e))?;
    fs::write(path, payload).map_err(|e| io_err(path, e))
}

/// Read a JSON file into `T`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let text = fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_json::from_str(&text).map_err(|e| json_err(path, e))
}

/// Write one compact JSON object per line.
pub fn save_jsonl<T: Serialize>(items: &[T], path: &Path) -> Result<(), StorageError> {
    ensure_parent(path)?;
    let file = fs::File::create(path).map_err(|e| io_err(path, e))?;
    let mut out = std::io::BufWriter::new(file);
    for item in items {
        let line = serde_json::to_string(item).map_err(|e| json_err(path, e))?;
        writeln!(out, "{line}").map_err(|e| io_err(path, e))?;
    }
    out.flush().map_err(|e| io_err(path, e))
}

/// Read a JSONL file into a vector of `T`, skipping blank lines.
pub fn load_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StorageError> {
    let file = fs::File::open(path).map_err(|e| io_err(path, e))?;
    let reader = BufReader::new(file);
    let mut items = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| io_err(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        items.push(serde_json::from_str(&line).map_err(|e| json_err(path, e))?);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        name: String,
        n: u32,
    }

    #[test]
    fn json_round_trip_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c.json");
        let row = Row {
            name: "x".into(),
            n: 7,
        };
        save_json(&row, &path).unwrap();
        let back: Row = load_json(&path).unwrap();
        assert_eq!(row, back);
    }

    #[test]
    fn jsonl_round_trip_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.jsonl");
        let rows = vec![
            Row {
                name: "a".into(),
                n: 1,
            },
            Row {
                name: "b".into(),
                n: 2,
            },
        ];
        save_jsonl(&rows, &path).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"\n\n")
            .unwrap();
        let back: Vec<Row> = load_jsonl(&path).unwrap();
        assert_eq!(rows, back);
    }

    #[test]
    fn load_json_reports_path_on_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        let err = load_json::<Row>(&path).unwrap_err();
        assert!(err.to_string().contains("bad.json"));
    }
}
