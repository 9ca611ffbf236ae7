//! Flat JSON file persistence shared by the target registry, the action queue
//! and the scheduler state. Writes go through a temp file and an atomic rename
//! so a crash mid-write never leaves a truncated file behind.

use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Reads a JSON file, returning `Ok(None)` when it does not exist yet.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let value = serde_json::from_str(&raw).map_err(|source| StorageError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(Some(value))
}

/// Serializes `value` and atomically replaces `path` with it.
pub fn store_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let io_err = |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let raw = serde_json::to_string_pretty(value).map_err(|source| StorageError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(raw.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
    }
    fs::rename(&tmp, path).map_err(io_err)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        id: String,
        count: u32,
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Option<Sample> = load_json(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn round_trips_and_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");
        let value = Sample {
            id: "abc".to_string(),
            count: 3,
        };

        store_json(&path, &value).unwrap();

        assert!(!path.with_extension("tmp").exists());
        let loaded: Sample = load_json(&path).unwrap().unwrap();
        assert_eq!(loaded, value);
    }

    #[test]
    fn store_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deep").join("sample.json");
        let value = Sample {
            id: "x".to_string(),
            count: 1,
        };

        store_json(&path, &value).unwrap();
        let loaded: Sample = load_json(&path).unwrap().unwrap();
        assert_eq!(loaded, value);
    }
}
