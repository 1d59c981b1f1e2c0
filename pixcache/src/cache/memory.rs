//! In-memory image tier with LRU eviction under a byte budget.

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

use crate::cache::key::CacheKey;

/// Mutable state guarded by a single lock so size and order never disagree.
struct MemoryState {
    /// Recency-ordered payloads; the LRU end is evicted first.
    entries: LruCache<CacheKey, Bytes>,
    /// Sum of payload lengths.
    size_bytes: u64,
    /// Entries evicted to make room since creation.
    evictions: u64,
}

/// In-memory tier for decoded-ready image bytes.
///
/// Classic LRU: `get` promotes to most-recently-used, `put` evicts from the
/// least-recently-used end until the incoming payload fits. Never touches
/// the filesystem; every operation is a short synchronous critical section.
///
/// An item larger than the whole budget evicts everything and is still
/// inserted, so the cache never refuses a payload outright.
pub struct MemoryTier {
    state: Mutex<MemoryState>,
    max_size_bytes: u64,
}

impl MemoryTier {
    /// Create a memory tier with the given byte budget.
    pub fn new(max_size_bytes: u64) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                entries: LruCache::unbounded(),
                size_bytes: 0,
                evictions: 0,
            }),
            max_size_bytes,
        }
    }

    /// Get a payload, promoting it to most-recently-used.
    pub fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let mut state = self.state.lock();
        let hit = state.entries.get(key).cloned();
        if hit.is_some() {
            trace!(key = %key, "Memory tier hit");
        }
        hit
    }

    /// Check for a key without affecting recency.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().entries.contains(key)
    }

    /// Insert a payload, evicting least-recently-used entries until it fits.
    ///
    /// Replacing an existing key releases the old payload's bytes first.
    pub fn put(&self, key: CacheKey, data: Bytes) {
        let incoming = data.len() as u64;
        let mut state = self.state.lock();

        if let Some(old) = state.entries.pop(&key) {
            state.size_bytes = state.size_bytes.saturating_sub(old.len() as u64);
        }

        let mut evicted = 0u64;
        while state.size_bytes + incoming > self.max_size_bytes {
            match state.entries.pop_lru() {
                Some((_, old)) => {
                    state.size_bytes = state.size_bytes.saturating_sub(old.len() as u64);
                    evicted += 1;
                }
                None => break,
            }
        }

        state.entries.put(key, data);
        state.size_bytes += incoming;
        state.evictions += evicted;

        if evicted > 0 {
            trace!(
                evicted = evicted,
                size_bytes = state.size_bytes,
                limit = self.max_size_bytes,
                "Memory tier evicted entries to fit payload"
            );
        }
    }

    /// Remove one key. Returns `true` if it was present.
    pub fn remove(&self, key: &CacheKey) -> bool {
        let mut state = self.state.lock();
        match state.entries.pop(key) {
            Some(old) => {
                state.size_bytes = state.size_bytes.saturating_sub(old.len() as u64);
                true
            }
            None => false,
        }
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.size_bytes = 0;
    }

    /// Current payload bytes held.
    pub fn size_bytes(&self) -> u64 {
        self.state.lock().size_bytes
    }

    /// Current number of entries.
    pub fn entry_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Configured byte budget.
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// Entries evicted for space since creation.
    pub fn evictions(&self) -> u64 {
        self.state.lock().evictions
    }
}
