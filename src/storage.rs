//! Durable key-value storage standing in for the browser's local storage.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

/// Key holding the logged-in username.
pub const SESSION_KEY: &str = "loggedInUser";
/// Key holding the single registered credential record.
pub const CREDENTIALS_KEY: &str = "user";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] io::Error),
    #[error("storage file is not valid json: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("storage lock poisoned")]
    Poisoned,
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// All entries kept in one pretty-printed JSON object, rewritten on every change.
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents)?
            }
        } else {
            BTreeMap::new()
        };
        log::debug!("Opened local storage at {} ({} keys)", path.display(), entries.len());

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(&self.path)?;

        let json = serde_json::to_string_pretty(entries)?;
        write!(file, "{}", json)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        let mut updated = entries.clone();
        updated.insert(key.to_string(), value.to_string());
        self.save(&updated)?;
        *entries = updated;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut updated = entries.clone();
        updated.remove(key);
        self.save(&updated)?;
        *entries = updated;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local_storage.json");

        let store = JsonFileStore::open(&path).unwrap();
        store.set(SESSION_KEY, "alice").unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get(SESSION_KEY).unwrap().as_deref(), Some("alice"));
    }

    #[test]
    fn file_store_remove_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local_storage.json");

        let store = JsonFileStore::open(&path).unwrap();
        store.set(SESSION_KEY, "alice").unwrap();
        store.remove(SESSION_KEY).unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get(SESSION_KEY).unwrap(), None);
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("nothing.json")).unwrap();
        assert_eq!(store.get(CREDENTIALS_KEY).unwrap(), None);
    }

    #[test]
    fn failed_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("missing").join("store.json")).unwrap();

        assert!(matches!(
            store.set(SESSION_KEY, "alice"),
            Err(StorageError::Io(_))
        ));
        assert_eq!(store.get(SESSION_KEY).unwrap(), None);
    }

    #[test]
    fn memory_store_overwrites() {
        let store = MemoryStore::new();
        store.set("k", "1").unwrap();
        store.set("k", "2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("2"));
    }
}
