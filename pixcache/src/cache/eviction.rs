//! Disk budget and TTL enforcement.
//!
//! Both policies walk the [`MetadataStore`] index rather than scanning the
//! filesystem, and delete through [`DiskTier::remove`] so files and metadata
//! move together.
//!
//! # Budget
//!
//! When a write pushes total tracked usage above `max_disk_bytes`, entries
//! are evicted least-recently-accessed first until usage drops to the
//! reclaim floor (`max_disk_bytes * reclaim_ratio`), leaving headroom so the
//! next write does not immediately evict again.
//!
//! # Expiry
//!
//! TTL is creation-based: an entry older than the TTL is purged no matter
//! how recently it was read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::cache::disk::DiskTier;
use crate::cache::key::CacheKey;
use crate::cache::metadata::MetadataStore;

/// Result of an eviction or purge run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionResult {
    /// Entries removed
    pub files_deleted: usize,
    /// Bytes the removed entries accounted for
    pub bytes_freed: u64,
    /// Tracked usage before the run
    pub size_before: u64,
    /// Tracked usage after the run
    pub size_after: u64,
    /// Wall time of the run in milliseconds
    pub duration_ms: u64,
}

/// Enforces the disk budget and TTL over the metadata index.
pub struct EvictionManager {
    disk: Arc<DiskTier>,
    metadata: Arc<MetadataStore>,
    max_disk_bytes: u64,
    reclaim_ratio: f64,
    evictions: AtomicU64,
}

impl EvictionManager {
    pub fn new(
        disk: Arc<DiskTier>,
        metadata: Arc<MetadataStore>,
        max_disk_bytes: u64,
        reclaim_ratio: f64,
    ) -> Self {
        Self {
            disk,
            metadata,
            max_disk_bytes,
            reclaim_ratio,
            evictions: AtomicU64::new(0),
        }
    }

    /// Usage the automatic eviction settles at.
    pub fn reclaim_target(&self) -> u64 {
        (self.max_disk_bytes as f64 * self.reclaim_ratio) as u64
    }

    /// Configured disk budget.
    pub fn max_disk_bytes(&self) -> u64 {
        self.max_disk_bytes
    }

    /// Entries removed by budget eviction or TTL since creation.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Evict least-recently-accessed entries until usage is at most `target_bytes`.
    ///
    /// Stops early only when every entry has been tried. Per-entry deletion
    /// failures are logged and skipped.
    pub async fn evict_to_budget(&self, target_bytes: u64) -> EvictionResult {
        self.evict(target_bytes, None).await
    }

    /// Evict down to the reclaim floor if usage exceeds the budget.
    ///
    /// `protect` is never evicted; pass the key just written so a fill is
    /// not undone by its own budget check. Returns `None` if under budget.
    pub async fn enforce_budget(&self, protect: Option<&CacheKey>) -> Option<EvictionResult> {
        let usage = self.metadata.total_size_bytes();
        if usage <= self.max_disk_bytes {
            return None;
        }

        debug!(
            usage = usage,
            limit = self.max_disk_bytes,
            target = self.reclaim_target(),
            "Disk tier over budget"
        );
        Some(self.evict(self.reclaim_target(), protect).await)
    }

    async fn evict(&self, target_bytes: u64, protect: Option<&CacheKey>) -> EvictionResult {
        let start = Instant::now();
        let size_before = self.metadata.total_size_bytes();
        let mut result = EvictionResult {
            size_before,
            ..Default::default()
        };

        if size_before <= target_bytes {
            result.size_after = size_before;
            return result;
        }

        let mut usage = size_before;
        for (key, entry) in self.metadata.entries_by_last_access() {
            if usage <= target_bytes {
                break;
            }
            if protect == Some(&key) {
                continue;
            }

            match self.disk.remove(&key).await {
                Ok(_) => {
                    usage = usage.saturating_sub(entry.size_bytes);
                    result.files_deleted += 1;
                    result.bytes_freed += entry.size_bytes;
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to evict cache entry");
                }
            }
        }

        result.size_after = self.metadata.total_size_bytes();
        result.duration_ms = start.elapsed().as_millis() as u64;
        self.evictions
            .fetch_add(result.files_deleted as u64, Ordering::Relaxed);

        log_eviction_result("Disk budget eviction complete", &result);
        result
    }

    /// Remove every entry created more than `ttl` ago.
    pub async fn purge_expired(&self, ttl: Duration) -> EvictionResult {
        self.purge_expired_at(ttl, Utc::now()).await
    }

    /// [`purge_expired`](Self::purge_expired) against an explicit clock.
    pub async fn purge_expired_at(&self, ttl: Duration, now: DateTime<Utc>) -> EvictionResult {
        let start = Instant::now();
        let mut result = EvictionResult {
            size_before: self.metadata.total_size_bytes(),
            ..Default::default()
        };

        let expired: Vec<_> = self
            .metadata
            .snapshot()
            .into_iter()
            .filter(|(_, entry)| entry.is_expired(ttl, now))
            .collect();

        for (key, entry) in expired {
            match self.disk.remove(&key).await {
                Ok(_) => {
                    result.files_deleted += 1;
                    result.bytes_freed += entry.size_bytes;
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to purge expired cache entry");
                }
            }
        }

        result.size_after = self.metadata.total_size_bytes();
        result.duration_ms = start.elapsed().as_millis() as u64;
        self.evictions
            .fetch_add(result.files_deleted as u64, Ordering::Relaxed);

        log_eviction_result("Expired entry purge complete", &result);
        result
    }
}

fn log_eviction_result(message: &str, result: &EvictionResult) {
    if result.files_deleted == 0 {
        debug!(size = result.size_before, "{}: nothing removed", message);
        return;
    }
    info!(
        files_deleted = result.files_deleted,
        bytes_freed = result.bytes_freed,
        size_before = result.size_before,
        size_after = result.size_after,
        duration_ms = result.duration_ms,
        "{}",
        message
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::kv::InMemoryKeyValueStore;
    use crate::cache::types::CacheEntry;
    use crate::cache::KeyDeriver;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    fn key(n: u32) -> CacheKey {
        KeyDeriver::derive(&format!("https://img.test/{}.jpg", n), None)
    }

    struct Fixture {
        _temp_dir: TempDir,
        disk: Arc<DiskTier>,
        metadata: Arc<MetadataStore>,
        manager: EvictionManager,
    }

    async fn fixture(max_disk_bytes: u64, reclaim_ratio: f64) -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let metadata = Arc::new(MetadataStore::new(
            Arc::new(InMemoryKeyValueStore::new()),
            100,
        ));
        let disk = Arc::new(
            DiskTier::open(temp_dir.path(), Arc::clone(&metadata))
                .await
                .unwrap(),
        );
        let manager = EvictionManager::new(
            Arc::clone(&disk),
            Arc::clone(&metadata),
            max_disk_bytes,
            reclaim_ratio,
        );
        Fixture {
            _temp_dir: temp_dir,
            disk,
            metadata,
            manager,
        }
    }

    /// Write an entry and backdate its timestamps so ordering is explicit.
    async fn write_aged(fx: &Fixture, n: u32, size: usize, created: DateTime<Utc>) {
        let path = fx
            .disk
            .write(&key(n), &format!("https://img.test/{}.jpg", n), None, &vec![0u8; size])
            .await
            .unwrap();
        let entry = CacheEntry::new(
            format!("https://img.test/{}.jpg", n),
            None,
            Some(path),
            size as u64,
            created,
        );
        fx.metadata.upsert(key(n), entry).await.unwrap();
    }

    #[tokio::test]
    async fn test_evict_to_budget_removes_oldest_first() {
        let fx = fixture(10_000, 0.8).await;
        let base = Utc::now() - ChronoDuration::hours(1);
        for n in 0..5 {
            write_aged(&fx, n, 100, base + ChronoDuration::minutes(n as i64)).await;
        }

        let result = fx.manager.evict_to_budget(300).await;

        assert_eq!(result.files_deleted, 2);
        assert_eq!(result.bytes_freed, 200);
        assert_eq!(result.size_before, 500);
        assert_eq!(result.size_after, 300);
        assert!(!fx.metadata.contains(&key(0)));
        assert!(!fx.metadata.contains(&key(1)));
        assert!(fx.metadata.contains(&key(2)));
        assert!(!fx.disk.path_for(&key(0)).exists());
    }

    #[tokio::test]
    async fn test_recent_access_protects_from_eviction() {
        let fx = fixture(10_000, 0.8).await;
        let base = Utc::now() - ChronoDuration::hours(1);
        for n in 0..3 {
            write_aged(&fx, n, 100, base + ChronoDuration::minutes(n as i64)).await;
        }

        // Oldest entry becomes most recently accessed
        fx.disk.read(&key(0)).await.unwrap();

        fx.manager.evict_to_budget(200).await;

        assert!(fx.metadata.contains(&key(0)));
        assert!(!fx.metadata.contains(&key(1)));
    }

    #[tokio::test]
    async fn test_evict_to_budget_noop_when_under() {
        let fx = fixture(10_000, 0.8).await;
        write_aged(&fx, 0, 100, Utc::now()).await;

        let result = fx.manager.evict_to_budget(1000).await;

        assert_eq!(result.files_deleted, 0);
        assert_eq!(result.size_after, 100);
    }

    #[tokio::test]
    async fn test_enforce_budget_targets_reclaim_floor() {
        let fx = fixture(1000, 0.5).await;
        let base = Utc::now() - ChronoDuration::hours(1);
        for n in 0..11 {
            write_aged(&fx, n, 100, base + ChronoDuration::minutes(n as i64)).await;
        }

        let result = fx.manager.enforce_budget(None).await.unwrap();

        assert_eq!(fx.manager.reclaim_target(), 500);
        assert_eq!(result.size_after, 500);
        assert_eq!(result.files_deleted, 6);
        assert_eq!(fx.manager.evictions(), 6);
    }

    #[tokio::test]
    async fn test_enforce_budget_under_limit() {
        let fx = fixture(1000, 0.8).await;
        write_aged(&fx, 0, 1000, Utc::now()).await;

        assert!(fx.manager.enforce_budget(None).await.is_none());
    }

    #[tokio::test]
    async fn test_enforce_budget_spares_protected_key() {
        let fx = fixture(150, 0.5).await;
        let old = Utc::now() - ChronoDuration::hours(1);
        write_aged(&fx, 0, 100, old).await;
        write_aged(&fx, 1, 100, old + ChronoDuration::minutes(1)).await;

        fx.manager.enforce_budget(Some(&key(0))).await.unwrap();

        assert!(fx.metadata.contains(&key(0)));
        assert!(!fx.metadata.contains(&key(1)));
    }

    #[tokio::test]
    async fn test_purge_expired_is_creation_based() {
        let fx = fixture(10_000, 0.8).await;
        let now = Utc::now();
        let ttl = Duration::from_secs(3600);

        write_aged(&fx, 0, 100, now - ChronoDuration::seconds(3601)).await;
        write_aged(&fx, 1, 100, now - ChronoDuration::seconds(60)).await;

        // A fresh read does not rescue an expired entry
        fx.disk.read(&key(0)).await.unwrap();

        let result = fx.manager.purge_expired_at(ttl, now).await;

        assert_eq!(result.files_deleted, 1);
        assert!(!fx.metadata.contains(&key(0)));
        assert!(fx.metadata.contains(&key(1)));
    }

    #[tokio::test]
    async fn test_eviction_continues_past_missing_files() {
        let fx = fixture(10_000, 0.8).await;
        let base = Utc::now() - ChronoDuration::hours(1);
        for n in 0..3 {
            write_aged(&fx, n, 100, base + ChronoDuration::minutes(n as i64)).await;
        }
        std::fs::remove_file(fx.disk.path_for(&key(0))).unwrap();

        let result = fx.manager.evict_to_budget(100).await;

        assert_eq!(result.files_deleted, 2);
        assert_eq!(result.size_after, 100);
    }
}
