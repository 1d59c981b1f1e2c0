//! Persisted key-value stores backing the metadata map.
//!
//! The metadata store only needs whole-value `get`/`set`; any durable
//! storage satisfies that. Two implementations ship:
//!
//! - [`FileKeyValueStore`]: one file per store key under a directory,
//!   replaced atomically via temp file + rename.
//! - [`InMemoryKeyValueStore`]: process-local, for tests and ephemeral caches.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::cache::types::CacheError;

/// Durable string store used by the metadata layer.
///
/// Calls may block on I/O; async callers run them on the blocking pool.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. `Ok(None)` if the key was never written.
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Replace a value.
    fn set(&self, key: &str, value: String) -> Result<(), CacheError>;

    /// Delete a value. Missing keys are not an error.
    fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// File-backed store: `<directory>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    directory: PathBuf,
}

impl FileKeyValueStore {
    /// Open a store rooted at `directory`, creating it if needed.
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)
            .map_err(|e| CacheError::storage(&directory, e))?;
        Ok(Self { directory })
    }

    /// Store directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn value_path(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.directory.join(format!("{}.json", safe))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let path = self.value_path(key);
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::storage(path, e)),
        }
    }

    fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        let path = self.value_path(key);
        let temp_path = path.with_extension("json.tmp");

        if let Err(e) = std::fs::write(&temp_path, value) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(CacheError::storage(temp_path, e));
        }
        std::fs::rename(&temp_path, &path).map_err(|e| {
            let _ = std::fs::remove_file(&temp_path);
            CacheError::storage(&path, e)
        })
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        let path = self.value_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::storage(path, e)),
        }
    }
}

/// Process-local store. Counts writes so tests can observe save batching.
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    values: Mutex<HashMap<String, String>>,
    writes: AtomicU64,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set` calls served.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        self.values.lock().insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.values.lock().remove(key);
        Ok(())
    }
}
