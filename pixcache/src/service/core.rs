//! Tier composition and the resolution path shared by lookups and prefetch.
//!
//! ```text
//! resolve(key)
//!   ├─ memory hit + file live ─────────────────────────► path
//!   └─ coalescer
//!        ├─ follower: wait for the leader's result ────► path | error
//!        └─ leader
//!             ├─ memory hit + file live ───────────────► path
//!             ├─ memory bytes, entry gone: drop, fall through
//!             ├─ disk hit: promote bytes to memory ────► path
//!             └─ remote fetch (CDN, then origin)
//!                  └─ write disk, fill memory, enforce budget ► path
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use tracing::{debug, info, trace, warn};

use super::config::ImageCacheConfig;
use super::error::ImageCacheError;
use crate::cache::{
    CacheKey, CacheStats, CacheCounters, DiskTier, EvictionManager, EvictionResult,
    KeyValueStore, MemoryTier, MetadataStore, PersistedCounters, Registration,
    RequestCoalescer, STATS_STORE_KEY,
};
use crate::prefetch::{PrefetchRequest, PrefetchTarget};
use crate::remote::{ImageOrigin, RemoteResolver};

type ResolveResult = Result<PathBuf, ImageCacheError>;

/// Every tier plus the bookkeeping that ties them together.
pub(crate) struct CacheCore {
    config: ImageCacheConfig,
    memory: MemoryTier,
    metadata: Arc<MetadataStore>,
    disk: Arc<DiskTier>,
    eviction: EvictionManager,
    remote: RemoteResolver,
    coalescer: RequestCoalescer<ResolveResult>,
    counters: CacheCounters,
    store: Arc<dyn KeyValueStore>,
}

impl CacheCore {
    /// Open every tier and run startup maintenance.
    ///
    /// Startup order: load metadata, delete orphaned files, purge expired
    /// entries, bring disk usage back under budget, restore counters. No
    /// request is served before this returns.
    pub(crate) async fn open(
        config: ImageCacheConfig,
        remote: RemoteResolver,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, ImageCacheError> {
        config.validate()?;

        let metadata = Arc::new(MetadataStore::new(
            Arc::clone(&store),
            config.metadata_save_interval,
        ));
        metadata.load().await?;

        let disk = Arc::new(DiskTier::open(&config.cache_dir, Arc::clone(&metadata)).await?);
        if let Err(e) = disk.remove_orphans().await {
            warn!(error = %e, "Failed to scan cache directory for orphaned files");
        }

        let eviction = EvictionManager::new(
            Arc::clone(&disk),
            Arc::clone(&metadata),
            config.max_disk_bytes,
            config.reclaim_ratio,
        );
        eviction.purge_expired(config.disk_ttl).await;
        eviction.enforce_budget(None).await;

        let counters = CacheCounters::new();
        if let Some(saved) = load_counters(&store).await {
            counters.restore(&saved);
        }

        info!(
            cache_dir = %config.cache_dir.display(),
            entries = metadata.len(),
            disk_bytes = metadata.total_size_bytes(),
            max_disk_bytes = config.max_disk_bytes,
            max_memory_bytes = config.max_memory_bytes,
            "Image cache ready"
        );

        Ok(Self {
            memory: MemoryTier::new(config.max_memory_bytes),
            config,
            metadata,
            disk,
            eviction,
            remote,
            coalescer: RequestCoalescer::new(),
            counters,
            store,
        })
    }

    pub(crate) fn config(&self) -> &ImageCacheConfig {
        &self.config
    }

    /// Resolve `key` to a local file, fetching it if no tier has it.
    ///
    /// Concurrent calls for the same key share one resolution.
    pub(crate) async fn resolve(&self, key: &CacheKey, origin: &ImageOrigin) -> ResolveResult {
        self.counters.record_request();

        if self.memory.contains(key) {
            if let Some(path) = self.disk.read(key).await? {
                self.memory.get(key);
                self.counters.record_memory_hit();
                trace!(key = %key, "Memory hit");
                return Ok(path);
            }
        }

        let mut coalesced = false;
        loop {
            match self.coalescer.register(key) {
                Registration::Leader(guard) => {
                    let result = self.resolve_uncached(key, origin).await;
                    guard.complete(result.clone());
                    return result;
                }
                Registration::Follower(mut rx) => {
                    if !coalesced {
                        self.counters.record_coalesced();
                        coalesced = true;
                    }
                    match rx.recv().await {
                        Ok(result) => return result,
                        // Leader went away without a result; take over
                        Err(_) => continue,
                    }
                }
            }
        }
    }

    /// Leader-side resolution. Holds the per-key lock for its whole duration.
    async fn resolve_uncached(&self, key: &CacheKey, origin: &ImageOrigin) -> ResolveResult {
        if self.memory.contains(key) {
            if let Some(path) = self.disk.read(key).await? {
                self.memory.get(key);
                self.counters.record_memory_hit();
                trace!(key = %key, "Memory hit");
                return Ok(path);
            }
            // Disk entry was cleared or evicted; metadata decides liveness
            self.memory.remove(key);
            debug!(key = %key, "Dropped memory bytes without a live disk entry");
        }

        if let Some(path) = self.disk.read(key).await? {
            match self.disk.read_bytes(&path).await {
                Ok(bytes) => {
                    self.memory.put(key.clone(), bytes);
                    self.counters.record_disk_hit();
                    debug!(key = %key, "Disk hit, promoted to memory");
                    return Ok(path);
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Cached file unreadable, refetching");
                    if let Err(e) = self.disk.remove(key).await {
                        warn!(key = %key, error = %e, "Failed to drop unreadable cache entry");
                    }
                }
            }
        }

        debug!(key = %key, uri = %origin.raw_uri, "Cache miss, fetching");
        let fetched = match self.remote.fetch(key, origin).await {
            Ok(fetched) => fetched,
            Err(e) => {
                self.counters.record_miss();
                let uri = if origin.raw_uri.is_empty() {
                    origin.cdn_id.as_deref().unwrap_or_default()
                } else {
                    origin.raw_uri.as_str()
                };
                return Err(ImageCacheError::from_remote(uri, e));
            }
        };

        let path = self.write_through(key, origin, &fetched.bytes).await?;
        self.memory.put(key.clone(), fetched.bytes);
        self.counters.record_remote_hit();
        debug!(key = %key, url = %fetched.url, source = ?fetched.source, "Fetched and cached");
        Ok(path)
    }

    /// Write bytes to disk, then bring usage back under budget.
    async fn write_through(
        &self,
        key: &CacheKey,
        origin: &ImageOrigin,
        bytes: &Bytes,
    ) -> ResolveResult {
        let path = self
            .disk
            .write(key, &origin.raw_uri, origin.variant.as_deref(), bytes)
            .await?;
        self.eviction.enforce_budget(Some(key)).await;
        Ok(path)
    }

    /// Whether `key` is live in any local tier.
    pub(crate) fn is_cached(&self, key: &CacheKey) -> bool {
        self.memory.contains(key) || self.metadata.contains(key)
    }

    /// Clear the requested tiers. Clearing disk also clears metadata.
    pub(crate) async fn clear(&self, memory: bool, disk: bool) -> Result<(), ImageCacheError> {
        if memory {
            let entries = self.memory.entry_count();
            self.memory.clear();
            info!(entries = entries, "Cleared memory tier");
        }
        if disk {
            let files = self.disk.clear().await?;
            info!(files = files, "Cleared disk tier");
        }
        Ok(())
    }

    pub(crate) async fn evict_to_budget(&self, target_bytes: u64) -> EvictionResult {
        self.eviction.evict_to_budget(target_bytes).await
    }

    /// Point-in-time statistics.
    pub(crate) fn stats(&self) -> CacheStats {
        CacheStats {
            memory_bytes: self.memory.size_bytes(),
            memory_entries: self.memory.entry_count(),
            disk_bytes: self.metadata.total_size_bytes(),
            disk_entries: self.metadata.len(),
            evictions: self.eviction.evictions(),
            ..CacheStats::from_counters(&self.counters.persisted())
        }
    }

    /// Persist pending metadata updates and counters.
    pub(crate) async fn flush(&self) -> Result<(), ImageCacheError> {
        self.metadata.flush().await?;
        self.save_counters().await
    }

    async fn save_counters(&self) -> Result<(), ImageCacheError> {
        let json = serde_json::to_string(&self.counters.persisted())
            .map_err(|e| ImageCacheError::Storage(e.to_string()))?;
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.set(STATS_STORE_KEY, json))
            .await
            .map_err(|e| ImageCacheError::Storage(format!("counter save task failed: {}", e)))??;
        Ok(())
    }
}

impl PrefetchTarget for CacheCore {
    type Error = ImageCacheError;

    fn is_resolved(&self, key: &CacheKey) -> bool {
        self.is_cached(key)
    }

    fn resolve(&self, request: PrefetchRequest) -> BoxFuture<'_, Result<(), ImageCacheError>> {
        Box::pin(async move {
            CacheCore::resolve(self, &request.key, &request.origin)
                .await
                .map(|_| ())
        })
    }
}

async fn load_counters(store: &Arc<dyn KeyValueStore>) -> Option<PersistedCounters> {
    let store = Arc::clone(store);
    let raw = match tokio::task::spawn_blocking(move || store.get(STATS_STORE_KEY)).await {
        Ok(Ok(raw)) => raw?,
        Ok(Err(e)) => {
            warn!(error = %e, "Failed to read persisted cache counters");
            return None;
        }
        Err(e) => {
            warn!(error = %e, "Counter load task failed");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(counters) => Some(counters),
        Err(e) => {
            warn!(error = %e, "Dropping unreadable cache counters");
            None
        }
    }
}
