//! Persistent key/value state shared across invocations.
//!
//! Everything the indexer and pipeline need to survive an invocation
//! boundary lives here: scan checkpoints, the published folder cache,
//! and the classification-call timestamp. The store is a capability
//! injected at construction, not a process-wide singleton.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Well-known state keys. One value per key, JSON-encoded.
pub mod keys {
    /// LIFO stack of pending folder identifiers for the active scan.
    pub const SCAN_STACK: &str = "scan_stack";
    /// Absolute paths discovered so far by the active scan.
    pub const SCAN_FOUND_PATHS: &str = "scan_found_paths";
    /// Whether a scan is currently active.
    pub const SCAN_IN_PROGRESS: &str = "scan_in_progress";
    /// Epoch milliseconds at which the active scan started.
    pub const SCAN_STARTED_AT: &str = "scan_started_at";
    /// Handle of the scheduled continuation trigger, if any.
    pub const SCAN_TRIGGER_ID: &str = "scan_trigger_id";
    /// The published folder cache (absolute paths).
    pub const FOLDER_CACHE: &str = "folder_cache";
    /// Human-readable UTC timestamp of the last completed scan.
    pub const FOLDER_CACHE_UPDATED_AT: &str = "folder_cache_updated_at";
    /// Epoch milliseconds of the last outbound classification call.
    pub const LAST_CLASSIFY_AT: &str = "last_classify_at";
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Durable key/value store surviving across invocations.
pub trait StateStore: Send + Sync {
    fn get_raw(&self, key: &str) -> Result<Option<String>, StateError>;
    fn set_raw(&self, key: &str, value: &str) -> Result<(), StateError>;
    fn delete(&self, key: &str) -> Result<(), StateError>;
}

/// Read a JSON-encoded value.
pub fn get_json<T: DeserializeOwned>(
    store: &dyn StateStore,
    key: &str,
) -> Result<Option<T>, StateError> {
    match store.get_raw(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Write a JSON-encoded value.
pub fn set_json<T: Serialize>(
    store: &dyn StateStore,
    key: &str,
    value: &T,
) -> Result<(), StateError> {
    store.set_raw(key, &serde_json::to_string(value)?)
}

/// File-backed state store.
///
/// One JSON file per key under a state directory, written atomically
/// (temp file then rename) so a crash mid-write never leaves a
/// half-serialized value behind.
pub struct JsonStateStore {
    state_dir: PathBuf,
}

impl JsonStateStore {
    /// Create a store rooted at `state_dir`, creating it if needed.
    pub fn new(state_dir: PathBuf) -> Result<Self, StateError> {
        fs::create_dir_all(&state_dir)?;
        Ok(Self { state_dir })
    }

    /// Default location: `~/.config/custodian/state/`.
    pub fn default_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("custodian")
            .join("state")
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.state_dir.join(format!("{}.json", key))
    }
}

impl StateStore for JsonStateStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>, StateError> {
        let path = self.key_path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<(), StateError> {
        let path = self.key_path(key);
        let temp_path = path.with_extension("tmp");

        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(value.as_bytes())?;
        writer.flush()?;
        writer.get_ref().sync_all()?;

        fs::rename(&temp_path, &path)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StateError> {
        let path = self.key_path(key);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// In-memory state store for tests and dry runs.
#[derive(Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>, StateError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<(), StateError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StateError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_json_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::new(dir.path().to_path_buf()).unwrap();

        set_json(&store, keys::SCAN_STACK, &vec!["a", "b"]).unwrap();
        let stack: Option<Vec<String>> = get_json(&store, keys::SCAN_STACK).unwrap();
        assert_eq!(stack, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn test_json_store_absent_key() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::new(dir.path().to_path_buf()).unwrap();

        let value: Option<bool> = get_json(&store, keys::SCAN_IN_PROGRESS).unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn test_json_store_delete() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::new(dir.path().to_path_buf()).unwrap();

        set_json(&store, keys::SCAN_IN_PROGRESS, &true).unwrap();
        store.delete(keys::SCAN_IN_PROGRESS).unwrap();
        let value: Option<bool> = get_json(&store, keys::SCAN_IN_PROGRESS).unwrap();
        assert_eq!(value, None);

        // Deleting an absent key is not an error
        store.delete(keys::SCAN_IN_PROGRESS).unwrap();
    }

    #[test]
    fn test_json_store_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::new(dir.path().to_path_buf()).unwrap();

        set_json(&store, keys::LAST_CLASSIFY_AT, &1000i64).unwrap();
        set_json(&store, keys::LAST_CLASSIFY_AT, &2000i64).unwrap();
        let value: Option<i64> = get_json(&store, keys::LAST_CLASSIFY_AT).unwrap();
        assert_eq!(value, Some(2000));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStateStore::new();
        set_json(&store, keys::SCAN_IN_PROGRESS, &true).unwrap();
        let value: Option<bool> = get_json(&store, keys::SCAN_IN_PROGRESS).unwrap();
        assert_eq!(value, Some(true));
    }
}
