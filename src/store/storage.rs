//! Client key/value stores: short-lived (memory) and persisted (JSON file)
//!
//! Demo-scoped entries are recognised only by [`DEMO_KEY_PREFIX`]; bulk
//! removal goes through [`remove_prefixed`] and never touches other keys.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use parking_lot::RwLock;
use tracing::debug;

/// Key prefix marking an entry as demo-scoped
pub const DEMO_KEY_PREFIX: &str = "demo:";

/// Minimal string store, the shape of a browser storage area
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// Remove every key starting with `prefix`; returns how many were removed.
///
/// Full key scan, O(n) in stored keys.
pub fn remove_prefixed(store: &dyn KeyValueStore, prefix: &str) -> Result<usize, StorageError> {
    let doomed: Vec<String> = store
        .keys()?
        .into_iter()
        .filter(|key| key.starts_with(prefix))
        .collect();

    for key in &doomed {
        store.remove(key)?;
    }

    Ok(doomed.len())
}

/// Short-lived store, gone with the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

/// Persisted store backed by one JSON object file, written through on every change
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(raw) if raw.is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_slice(&raw).map_err(StorageError::Corrupt)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(StorageError::Io(err)),
        };

        debug!(path = %path.display(), entries = entries.len(), "Opened persisted store");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_vec_pretty(entries).map_err(StorageError::Corrupt)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write();
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("persisted store is not valid JSON: {0}")]
    Corrupt(serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_prefixed_leaves_other_keys_alone() {
        let store = MemoryStore::new();
        store.set("demo:session", "{}").unwrap();
        store.set("demo:projects", "[]").unwrap();
        store.set("app:last_path", "/app/projects").unwrap();
        store.set("theme", "dark").unwrap();
        store.set("my-demo:thing", "x").unwrap();

        let removed = remove_prefixed(&store, DEMO_KEY_PREFIX).unwrap();

        assert_eq!(removed, 2);
        assert_eq!(
            store.keys().unwrap(),
            vec!["app:last_path", "my-demo:thing", "theme"]
        );
    }

    #[test]
    fn remove_prefixed_on_empty_store_is_noop() {
        let store = MemoryStore::new();
        assert_eq!(remove_prefixed(&store, DEMO_KEY_PREFIX).unwrap(), 0);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let store = FileStore::open(&path).unwrap();
        store.set("app:last_path", "/app/projects?tab=materials").unwrap();
        store.set("demo:tour", "done").unwrap();
        store.remove("demo:tour").unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("app:last_path").unwrap().as_deref(),
            Some("/app/projects?tab=materials")
        );
        assert_eq!(reopened.get("demo:tour").unwrap(), None);
    }

    #[test]
    fn file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, b"not json").unwrap();

        assert!(matches!(
            FileStore::open(&path),
            Err(StorageError::Corrupt(_))
        ));
    }
}
