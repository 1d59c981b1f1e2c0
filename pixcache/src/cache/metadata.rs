//! Persisted metadata map: the single source of truth for which keys are live.
//!
//! The whole map is serialized as one JSON object under
//! [`METADATA_STORE_KEY`] in a [`KeyValueStore`]. Lookups are synchronous
//! against the in-memory copy; persistence happens on the blocking pool.
//!
//! # Batching
//!
//! Structural changes (insert, remove, clear) are persisted immediately.
//! Access-only updates (`access_count`, `last_accessed_at`) are persisted
//! every `save_interval` accesses, so the stored copy lags the in-memory map
//! by at most `save_interval - 1` access updates. A crash in that window
//! costs slightly stale LRU ordering, never cached bytes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::cache::key::CacheKey;
use crate::cache::kv::KeyValueStore;
use crate::cache::types::{CacheEntry, CacheError};

/// Store key under which the entry map is persisted.
pub const METADATA_STORE_KEY: &str = "pixcache.metadata.v1";

/// In-memory entry map with batched persistence.
pub struct MetadataStore {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    store: Arc<dyn KeyValueStore>,
    save_interval: u64,
    /// Access-only updates since the last save.
    pending_accesses: AtomicU64,
    /// Serializes saves so an older snapshot never overwrites a newer one.
    save_lock: tokio::sync::Mutex<()>,
}

impl MetadataStore {
    /// Create an empty store. Call [`load`](Self::load) to populate it.
    ///
    /// A `save_interval` of zero is treated as one (save on every access).
    pub fn new(store: Arc<dyn KeyValueStore>, save_interval: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            store,
            save_interval: save_interval.max(1),
            pending_accesses: AtomicU64::new(0),
            save_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Load the persisted map, replacing the in-memory copy.
    ///
    /// Entries that fail to parse are dropped individually; an unparseable
    /// blob yields an empty map. Returns the number of entries loaded.
    pub async fn load(&self) -> Result<usize, CacheError> {
        let store = Arc::clone(&self.store);
        let raw = tokio::task::spawn_blocking(move || store.get(METADATA_STORE_KEY))
            .await
            .map_err(|e| CacheError::Serialization(format!("metadata load task failed: {}", e)))??;

        let loaded = match raw {
            Some(raw) => parse_entries(&raw),
            None => HashMap::new(),
        };
        let count = loaded.len();
        *self.entries.write() = loaded;
        self.pending_accesses.store(0, Ordering::SeqCst);

        info!(entries = count, "Loaded cache metadata");
        Ok(count)
    }

    /// Get a copy of one entry.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.read().get(key).cloned()
    }

    /// Whether the key is live.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no entries are live.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Sum of `size_bytes` across live entries.
    pub fn total_size_bytes(&self) -> u64 {
        self.entries.read().values().map(|e| e.size_bytes).sum()
    }

    /// Copy of the full map.
    pub fn snapshot(&self) -> HashMap<CacheKey, CacheEntry> {
        self.entries.read().clone()
    }

    /// Entries ordered least-recently-accessed first.
    ///
    /// Ties fall back to creation time, then key, so the order is total.
    pub fn entries_by_last_access(&self) -> Vec<(CacheKey, CacheEntry)> {
        let mut entries: Vec<_> = self
            .entries
            .read()
            .iter()
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect();
        entries.sort_by(|(ka, a), (kb, b)| {
            a.last_accessed_at
                .cmp(&b.last_accessed_at)
                .then(a.created_at.cmp(&b.created_at))
                .then(ka.cmp(kb))
        });
        entries
    }

    /// Insert or replace an entry and persist immediately.
    pub async fn upsert(&self, key: CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
        self.entries.write().insert(key, entry);
        self.save().await
    }

    /// Remove an entry and persist immediately. Returns the removed entry.
    pub async fn remove(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let removed = self.entries.write().remove(key);
        if removed.is_some() {
            self.save().await?;
        }
        Ok(removed)
    }

    /// Drop an entry from the in-memory map without persisting.
    ///
    /// Used to roll back an insert whose persistence failed.
    pub(crate) fn discard(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.write().remove(key)
    }

    /// Record a hit on `key`.
    ///
    /// Returns `false` if the key is not live. Persists only every
    /// `save_interval` accesses; a failed batched save is logged and the
    /// pending count is kept so the next access retries.
    pub async fn record_access(&self, key: &CacheKey) -> bool {
        {
            let mut entries = self.entries.write();
            match entries.get_mut(key) {
                Some(entry) => entry.touch(Utc::now()),
                None => return false,
            }
        }

        let pending = self.pending_accesses.fetch_add(1, Ordering::SeqCst) + 1;
        if pending >= self.save_interval {
            if let Err(e) = self.save().await {
                warn!(key = %key, error = %e, "Batched metadata save failed");
            }
        }
        true
    }

    /// Remove every entry and persist immediately. Returns how many were dropped.
    pub async fn clear(&self) -> Result<usize, CacheError> {
        let dropped = {
            let mut entries = self.entries.write();
            let count = entries.len();
            entries.clear();
            count
        };
        self.save().await?;
        Ok(dropped)
    }

    /// Persist the current map if any access updates are pending.
    pub async fn flush(&self) -> Result<(), CacheError> {
        if self.pending_accesses.load(Ordering::SeqCst) == 0 {
            return Ok(());
        }
        self.save().await
    }

    /// Access updates not yet persisted.
    pub fn pending_accesses(&self) -> u64 {
        self.pending_accesses.load(Ordering::SeqCst)
    }

    /// Persist the current map unconditionally.
    pub async fn save(&self) -> Result<(), CacheError> {
        let _guard = self.save_lock.lock().await;

        let (json, count) = {
            let entries = self.entries.read();
            let json = serde_json::to_string(&*entries)
                .map_err(|e| CacheError::Serialization(e.to_string()))?;
            // Everything visible in this snapshot is covered by this save
            self.pending_accesses.store(0, Ordering::SeqCst);
            (json, entries.len())
        };

        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || store.set(METADATA_STORE_KEY, json))
            .await
            .map_err(|e| CacheError::Serialization(format!("metadata save task failed: {}", e)))?;

        if let Err(e) = result {
            // Keep the batch open so the next access retries the save
            self.pending_accesses.fetch_add(1, Ordering::SeqCst);
            return Err(e);
        }

        debug!(entries = count, "Persisted cache metadata");
        Ok(())
    }
}

/// Parse a persisted blob entry by entry, dropping anything malformed.
fn parse_entries(raw: &str) -> HashMap<CacheKey, CacheEntry> {
    let values: HashMap<String, serde_json::Value> = match serde_json::from_str(raw) {
        Ok(values) => values,
        Err(e) => {
            warn!(error = %e, "Cache metadata is unreadable, starting empty");
            return HashMap::new();
        }
    };

    let mut entries = HashMap::with_capacity(values.len());
    for (raw_key, value) in values {
        let Some(key) = CacheKey::parse(&raw_key) else {
            warn!(key = %raw_key, "Dropping metadata entry with malformed key");
            continue;
        };
        match serde_json::from_value::<CacheEntry>(value) {
            Ok(entry) => {
                entries.insert(key, entry);
            }
            Err(e) => {
                warn!(key = %raw_key, error = %e, "Dropping unparseable metadata entry");
            }
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::kv::{FileKeyValueStore, InMemoryKeyValueStore};
    use crate::cache::KeyDeriver;
    use chrono::{DateTime, Duration as ChronoDuration};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn key(n: u32) -> CacheKey {
        KeyDeriver::derive(&format!("https://img.test/{}.jpg", n), None)
    }

    fn entry(n: u32, size: u64, created: DateTime<Utc>) -> CacheEntry {
        CacheEntry::new(
            format!("https://img.test/{}.jpg", n),
            None,
            Some(PathBuf::from(format!("/cache/{}.img", n))),
            size,
            created,
        )
    }

    fn memory_store() -> Arc<InMemoryKeyValueStore> {
        Arc::new(InMemoryKeyValueStore::new())
    }

    #[tokio::test]
    async fn test_upsert_persists_immediately() {
        let kv = memory_store();
        let store = MetadataStore::new(kv.clone(), 10);

        store.upsert(key(1), entry(1, 100, Utc::now())).await.unwrap();

        assert_eq!(kv.write_count(), 1);
        assert!(kv.get(METADATA_STORE_KEY).unwrap().is_some());
        assert_eq!(store.len(), 1);
        assert_eq!(store.total_size_bytes(), 100);
    }

    #[tokio::test]
    async fn test_load_round_trip() {
        let kv = memory_store();
        let created = Utc::now();
        {
            let store = MetadataStore::new(kv.clone(), 10);
            store.upsert(key(1), entry(1, 100, created)).await.unwrap();
            store.upsert(key(2), entry(2, 200, created)).await.unwrap();
        }

        let reopened = MetadataStore::new(kv, 10);
        assert_eq!(reopened.load().await.unwrap(), 2);
        assert_eq!(reopened.get(&key(2)).unwrap().size_bytes, 200);
    }

    #[tokio::test]
    async fn test_access_saves_are_batched() {
        let kv = memory_store();
        let store = MetadataStore::new(kv.clone(), 3);
        store.upsert(key(1), entry(1, 10, Utc::now())).await.unwrap();
        let writes_after_insert = kv.write_count();

        assert!(store.record_access(&key(1)).await);
        assert!(store.record_access(&key(1)).await);
        assert_eq!(kv.write_count(), writes_after_insert, "No save before interval");
        assert_eq!(store.pending_accesses(), 2);

        assert!(store.record_access(&key(1)).await);
        assert_eq!(kv.write_count(), writes_after_insert + 1);
        assert_eq!(store.pending_accesses(), 0);
        assert_eq!(store.get(&key(1)).unwrap().access_count, 3);
    }

    #[tokio::test]
    async fn test_persisted_copy_lags_by_less_than_interval() {
        let kv = memory_store();
        let store = MetadataStore::new(kv.clone(), 4);
        store.upsert(key(1), entry(1, 10, Utc::now())).await.unwrap();

        for _ in 0..6 {
            store.record_access(&key(1)).await;
        }

        let reopened = MetadataStore::new(kv, 4);
        reopened.load().await.unwrap();
        let persisted = reopened.get(&key(1)).unwrap().access_count;
        let live = store.get(&key(1)).unwrap().access_count;

        assert_eq!(live, 6);
        assert!(live - persisted < 4);
    }

    #[tokio::test]
    async fn test_flush_persists_pending_accesses() {
        let kv = memory_store();
        let store = MetadataStore::new(kv.clone(), 100);
        store.upsert(key(1), entry(1, 10, Utc::now())).await.unwrap();
        store.record_access(&key(1)).await;

        store.flush().await.unwrap();

        let reopened = MetadataStore::new(kv.clone(), 100);
        reopened.load().await.unwrap();
        assert_eq!(reopened.get(&key(1)).unwrap().access_count, 1);

        // Nothing pending, so flush is a no-op
        let writes = kv.write_count();
        store.flush().await.unwrap();
        assert_eq!(kv.write_count(), writes);
    }

    #[tokio::test]
    async fn test_record_access_unknown_key() {
        let store = MetadataStore::new(memory_store(), 1);
        assert!(!store.record_access(&key(9)).await);
        assert_eq!(store.pending_accesses(), 0);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let store = MetadataStore::new(memory_store(), 10);
        store.upsert(key(1), entry(1, 10, Utc::now())).await.unwrap();
        store.upsert(key(2), entry(2, 20, Utc::now())).await.unwrap();

        assert!(store.remove(&key(1)).await.unwrap().is_some());
        assert!(store.remove(&key(1)).await.unwrap().is_none());

        assert_eq!(store.clear().await.unwrap(), 1);
        assert!(store.is_empty());
        assert_eq!(store.total_size_bytes(), 0);
    }

    #[tokio::test]
    async fn test_load_drops_malformed_entries() {
        let kv = memory_store();
        let good = entry(1, 10, Utc::now());
        let blob = serde_json::json!({
            key(1).as_str(): good,
            "not-a-key": good,
            key(2).as_str(): { "sourceUri": 42 },
        });
        kv.set(METADATA_STORE_KEY, blob.to_string()).unwrap();

        let store = MetadataStore::new(kv, 10);
        assert_eq!(store.load().await.unwrap(), 1);
        assert!(store.contains(&key(1)));
        assert!(!store.contains(&key(2)));
    }

    #[tokio::test]
    async fn test_load_unreadable_blob_yields_empty() {
        let kv = memory_store();
        kv.set(METADATA_STORE_KEY, "{ not json".to_string()).unwrap();

        let store = MetadataStore::new(kv, 10);
        assert_eq!(store.load().await.unwrap(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_entries_by_last_access_orders_oldest_first() {
        let store = MetadataStore::new(memory_store(), 100);
        let base = Utc::now() - ChronoDuration::hours(1);

        store.upsert(key(1), entry(1, 10, base)).await.unwrap();
        store
            .upsert(key(2), entry(2, 10, base + ChronoDuration::minutes(1)))
            .await
            .unwrap();
        store
            .upsert(key(3), entry(3, 10, base + ChronoDuration::minutes(2)))
            .await
            .unwrap();

        // Key 1 becomes most recent
        store.record_access(&key(1)).await;

        let order: Vec<CacheKey> = store
            .entries_by_last_access()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(order, vec![key(2), key(3), key(1)]);
    }

    #[tokio::test]
    async fn test_file_backed_store() {
        let temp_dir = TempDir::new().unwrap();
        let kv = Arc::new(FileKeyValueStore::open(temp_dir.path()).unwrap());
        {
            let store = MetadataStore::new(kv.clone(), 10);
            store.upsert(key(1), entry(1, 10, Utc::now())).await.unwrap();
        }

        let store = MetadataStore::new(kv, 10);
        assert_eq!(store.load().await.unwrap(), 1);
    }
}
