//! Durable client-side storage for session state.
//!
//! Session fields are written under fixed string keys (see
//! [`crate::auth::session::keys`]) so that every backend can be cleared
//! completely on logout.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing::warn;

use crate::config::{Config, StorageBackend};

use super::credentials::KeyringStorage;

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Key/value store the session manager persists its state into.
pub trait TokenStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<()>;
}

/// Open the storage backend selected in the config
pub fn open_storage(config: &Config) -> Result<Arc<dyn TokenStorage>> {
    match config.storage {
        StorageBackend::File => {
            let dir = Config::cache_dir()?;
            Ok(Arc::new(FileStorage::new(dir)))
        }
        StorageBackend::Keyring => Ok(Arc::new(KeyringStorage::new())),
    }
}

/// Stores all keys in a single JSON object on disk
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            path: dir.join(SESSION_FILE),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)
            .context("Failed to read session file")?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        match serde_json::from_str(&contents) {
            Ok(map) => Ok(map),
            Err(e) => {
                // Overwritten by the next write
                warn!(path = %self.path.display(), error = %e, "Ignoring corrupt session file");
                Ok(BTreeMap::new())
            }
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if map.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path).context("Failed to remove session file")?;
            }
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(map)?;
        std::fs::write(&self.path, contents).context("Failed to write session file")?;
        Ok(())
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        // The guard protects no data, so a poisoned lock is still usable
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TokenStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.guard();
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.guard();
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.guard();
        let mut map = self.read_map()?;
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

/// In-process storage, used by tests and by callers that opt out of persistence
#[derive(Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently present, sorted
    pub fn keys(&self) -> Vec<String> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<String> = values.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl TokenStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_storage_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FileStorage::new(dir.path().to_path_buf());

        assert_eq!(storage.get("clims_access_token").unwrap(), None);
        storage.set("clims_access_token", "abc").unwrap();
        storage.set("clims_refresh_token", "def").unwrap();
        assert_eq!(storage.get("clims_access_token").unwrap().as_deref(), Some("abc"));

        // A second handle sees the same file
        let other = FileStorage::new(dir.path().to_path_buf());
        assert_eq!(other.get("clims_refresh_token").unwrap().as_deref(), Some("def"));
    }

    #[test]
    fn test_file_storage_removes_file_when_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FileStorage::new(dir.path().to_path_buf());

        storage.set("k", "v").unwrap();
        assert!(storage.path().exists());
        storage.remove("k").unwrap();
        assert!(!storage.path().exists());

        // Removing again is fine
        storage.remove("k").unwrap();
    }

    #[test]
    fn test_corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FileStorage::new(dir.path().to_path_buf());
        std::fs::write(storage.path(), "{ truncated").unwrap();

        assert_eq!(storage.get("clims_access_token").unwrap(), None);
        storage.set("clims_access_token", "abc").unwrap();
        assert_eq!(storage.get("clims_access_token").unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn test_memory_storage() {
        let storage = MemoryStorage::new();
        storage.set("b", "2").unwrap();
        storage.set("a", "1").unwrap();
        assert_eq!(storage.keys(), vec!["a".to_string(), "b".to_string()]);
        storage.remove("a").unwrap();
        assert_eq!(storage.get("a").unwrap(), None);
        assert_eq!(storage.keys(), vec!["b".to_string()]);
    }
}
