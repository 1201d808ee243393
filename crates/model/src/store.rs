//! The durable key-value store seam. The core never performs I/O itself;
//! it is handed an implementation of this trait (e.g. backed by browser
//! `localStorage`, a file, or an in-memory map for tests).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

/// A synchronous get/set/remove key-value store, as spec'd for the offline
/// queue and the quota ledger. Failures (quota exceeded, disabled storage)
/// are represented, not panicked on: callers log once and fall back to
/// in-memory-only behavior for the remainder of the session.
pub trait DurableStore: Send + Sync {
    /// Reads the string stored under `key`, or `None` if absent.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, overwriting any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes the value stored under `key`, if any.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// A failure from a `DurableStore` operation. Deliberately unstructured
/// beyond a message: callers cannot recover differently based on the
/// underlying cause, only log once and continue in-memory.
#[derive(thiserror::Error, Debug, Clone)]
#[error("durable store error: {0}")]
pub struct StoreError(pub String);

impl StoreError {
    /// Builds a `StoreError` from any displayable cause.
    pub fn new(cause: impl std::fmt::Display) -> Self {
        Self(cause.to_string())
    }
}

/// An in-process `DurableStore` backed by a map, guarded by a mutex. Used
/// by tests and as the default when no host-provided store is configured —
/// in that case queue and quota state live only for the process lifetime.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _ = self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _ = self.values.lock().remove(key);
        Ok(())
    }
}

/// A `DurableStore` backed by a single JSON file, for embedders with no
/// host-provided storage of their own (the browser `localStorage` analogue
/// for a process that can touch a filesystem). The whole map is held in
/// memory and rewritten to disk on every `set`/`remove`; this crate has no
/// opinion on write batching or fsync policy beyond what `std::fs::write`
/// gives it.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Opens (or creates) a JSON-backed store at `path`. A missing or
    /// unreadable file starts the store empty rather than failing, since an
    /// empty durable store is a safe, if memory-less, starting state.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = std::fs::read_to_string(&path)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
            .unwrap_or_default();
        Self { path, values: Mutex::new(values) }
    }

    fn persist(&self, values: &HashMap<String, String>) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(values).map_err(StoreError::new)?;
        std::fs::write(&self.path, serialized).map_err(StoreError::new)
    }
}

impl DurableStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock();
        let _ = values.insert(key.to_string(), value.to_string());
        self.persist(&values)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock();
        let _ = values.remove(key);
        self.persist(&values)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_values() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v".to_string()));
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = std::env::temp_dir().join(format!("reportwire-store-test-{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("store.json");
        let _ = std::fs::remove_file(&path);

        let store = FileStore::open(&path);
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();

        let reopened = FileStore::open(&path);
        assert_eq!(reopened.get("k").unwrap(), Some("v".to_string()));

        reopened.remove("k").unwrap();
        let reopened_again = FileStore::open(&path);
        assert_eq!(reopened_again.get("k").unwrap(), None);

        let _ = std::fs::remove_file(&path);
    }
}
