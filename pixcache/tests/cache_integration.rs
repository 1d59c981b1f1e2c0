//! End-to-end tests for the public cache API.
//!
//! Every test runs against a temporary cache directory and a scripted HTTP
//! client, so no network access is needed.
//!
//! Run with: `cargo test --test cache_integration`

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tempfile::TempDir;

use pixcache::cache::{
    CacheEntry, CacheKey, DiskTier, InMemoryKeyValueStore, KeyDeriver, KeyValueStore,
    MetadataStore, METADATA_STORE_KEY,
};
use pixcache::remote::{AsyncHttpClient, RemoteError, TemplateCdnResolver};
use pixcache::service::{
    ClearOptions, GetImageOptions, ImageCache, ImageCacheConfig, ImageCacheError,
};

// ============================================================================
// Scripted HTTP client
// ============================================================================

/// Answers from a fixed URL table; anything else is a 404.
#[derive(Default)]
struct ScriptedHttp {
    bodies: HashMap<String, Bytes>,
    statuses: HashMap<String, u16>,
    calls: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedHttp {
    fn new() -> Self {
        Self::default()
    }

    fn body(mut self, url: &str, body: impl Into<Bytes>) -> Self {
        self.bodies.insert(url.to_string(), body.into());
        self
    }

    fn status(mut self, url: &str, status: u16) -> Self {
        self.statuses.insert(url.to_string(), status);
        self
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().get(url).copied().unwrap_or(0)
    }

    fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

impl AsyncHttpClient for ScriptedHttp {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, RemoteError>> {
        Box::pin(async move {
            self.total.fetch_add(1, Ordering::SeqCst);
            *self.calls.lock().entry(url.to_string()).or_insert(0) += 1;

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(body) = self.bodies.get(url) {
                return Ok(body.clone());
            }
            Err(RemoteError::Http {
                url: url.to_string(),
                status: self.statuses.get(url).copied().unwrap_or(404),
            })
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

const CDN_TEMPLATE: &str = "https://cdn.test/{id}/{variant}";

async fn open(
    dir: &TempDir,
    http: Arc<ScriptedHttp>,
    store: Arc<dyn KeyValueStore>,
    config: impl FnOnce(ImageCacheConfig) -> ImageCacheConfig,
) -> ImageCache {
    ImageCache::builder(config(ImageCacheConfig::new(dir.path())))
        .with_http_client(http)
        .with_cdn_resolver(Arc::new(TemplateCdnResolver::new(CDN_TEMPLATE).unwrap()))
        .with_store(store)
        .build()
        .await
        .unwrap()
}

fn image_url(n: usize) -> String {
    format!("https://origin.test/{}.jpg", n)
}

async fn get(cache: &ImageCache, uri: &str) -> PathBuf {
    cache
        .get_image(uri, GetImageOptions::default())
        .await
        .unwrap()
}

// ============================================================================
// Resolution order and fallback
// ============================================================================

#[tokio::test]
async fn test_cdn_failure_falls_back_to_origin() {
    let dir = TempDir::new().unwrap();
    let http = Arc::new(
        ScriptedHttp::new()
            .status("https://cdn.test/abc/medium", 500)
            .body("https://origin.test/a.jpg", "origin-bytes"),
    );
    let cache = open(&dir, http.clone(), Arc::new(InMemoryKeyValueStore::new()), |c| c).await;

    let path = cache
        .get_image(
            "https://origin.test/a.jpg",
            GetImageOptions::default()
                .with_cdn_id("abc")
                .with_variant("medium"),
        )
        .await
        .unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"origin-bytes");
    assert_eq!(http.calls_to("https://cdn.test/abc/medium"), 1);
    assert_eq!(http.calls_to("https://cdn.test/abc/public"), 0);
    assert_eq!(http.calls_to("https://origin.test/a.jpg"), 1);

    let stats = cache.get_stats();
    assert_eq!(stats.remote_hits, 1);
    assert_eq!(stats.disk_entries, 1);
    assert_eq!(stats.disk_bytes, "origin-bytes".len() as u64);
}

#[tokio::test]
async fn test_cdn_failure_without_fallback_is_network_error() {
    let dir = TempDir::new().unwrap();
    let http = Arc::new(
        ScriptedHttp::new()
            .status("https://cdn.test/abc/public", 503)
            .body("https://origin.test/a.jpg", "origin-bytes"),
    );
    let cache = open(&dir, http.clone(), Arc::new(InMemoryKeyValueStore::new()), |c| {
        c.with_cdn_fallback(false)
    })
    .await;

    let err = cache
        .get_image(
            "https://origin.test/a.jpg",
            GetImageOptions::default().with_cdn_id("abc"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ImageCacheError::Network { .. }));
    assert!(err.is_retryable());
    assert_eq!(http.calls_to("https://origin.test/a.jpg"), 0);
}

#[tokio::test]
async fn test_exhaustion_is_not_found_and_nothing_recorded() {
    let dir = TempDir::new().unwrap();
    let http = Arc::new(ScriptedHttp::new());
    let cache = open(&dir, http.clone(), Arc::new(InMemoryKeyValueStore::new()), |c| c).await;

    let err = cache
        .get_image(
            "https://origin.test/missing.jpg",
            GetImageOptions::default().with_cdn_id("gone"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ImageCacheError::NotFound { .. }));
    assert_eq!(http.total(), 2, "CDN and origin each tried once");
    let stats = cache.get_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.disk_entries, 0);
}

// ============================================================================
// Hit promotion and coalescing
// ============================================================================

#[tokio::test]
async fn test_disk_hit_promotes_to_memory() {
    let dir = TempDir::new().unwrap();
    let http = Arc::new(ScriptedHttp::new().body(&image_url(1), "one"));
    let cache = open(&dir, http.clone(), Arc::new(InMemoryKeyValueStore::new()), |c| c).await;

    get(&cache, &image_url(1)).await;
    cache
        .clear_cache(ClearOptions {
            memory: true,
            disk: false,
        })
        .await
        .unwrap();

    get(&cache, &image_url(1)).await;
    get(&cache, &image_url(1)).await;

    let stats = cache.get_stats();
    assert_eq!(http.total(), 1);
    assert_eq!(stats.remote_hits, 1);
    assert_eq!(stats.disk_hits, 1);
    assert_eq!(stats.memory_hits, 1);
    assert_eq!(stats.memory_entries, 1);
}

#[tokio::test]
async fn test_disk_only_clear_refetches() {
    let dir = TempDir::new().unwrap();
    let http = Arc::new(ScriptedHttp::new().body(&image_url(1), "one"));
    let cache = open(&dir, http.clone(), Arc::new(InMemoryKeyValueStore::new()), |c| c).await;

    let first = get(&cache, &image_url(1)).await;
    cache
        .clear_cache(ClearOptions {
            memory: false,
            disk: true,
        })
        .await
        .unwrap();
    assert!(!first.exists());

    let second = get(&cache, &image_url(1)).await;

    let stats = cache.get_stats();
    assert_eq!(std::fs::read(&second).unwrap(), b"one");
    assert_eq!(http.total(), 2);
    assert_eq!(stats.remote_hits, 2);
    assert_eq!(stats.memory_hits, 0);
    assert_eq!(stats.disk_entries, 1);
}

#[tokio::test]
async fn test_concurrent_requests_fetch_once() {
    let dir = TempDir::new().unwrap();
    let http = Arc::new(
        ScriptedHttp::new()
            .body(&image_url(1), "shared")
            .delayed(Duration::from_millis(100)),
    );
    let cache = Arc::new(
        open(&dir, http.clone(), Arc::new(InMemoryKeyValueStore::new()), |c| c).await,
    );

    let mut handles = Vec::new();
    for _ in 0..16 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            cache
                .get_image(&image_url(1), GetImageOptions::default())
                .await
        }));
    }

    let mut paths = Vec::new();
    for handle in handles {
        paths.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(http.total(), 1);
    assert!(paths.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(std::fs::read(&paths[0]).unwrap(), b"shared");
    assert_eq!(cache.get_stats().total_requests, 16);
}

#[tokio::test]
async fn test_concurrent_failures_share_one_error() {
    let dir = TempDir::new().unwrap();
    let http = Arc::new(
        ScriptedHttp::new()
            .status(&image_url(1), 500)
            .delayed(Duration::from_millis(100)),
    );
    let cache = Arc::new(
        open(&dir, http.clone(), Arc::new(InMemoryKeyValueStore::new()), |c| c).await,
    );

    let mut handles = Vec::new();
    for _ in 0..4 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            cache
                .get_image(&image_url(1), GetImageOptions::default())
                .await
        }));
    }
    for handle in handles {
        assert!(matches!(
            handle.await.unwrap(),
            Err(ImageCacheError::Network { .. })
        ));
    }

    assert_eq!(http.total(), 1);
}

// ============================================================================
// Budget and expiry
// ============================================================================

#[tokio::test]
async fn test_budget_evicts_least_recently_accessed() {
    let dir = TempDir::new().unwrap();
    let mut http = ScriptedHttp::new();
    for n in 0..4 {
        http = http.body(&image_url(n), vec![b'x'; 30]);
    }
    let http = Arc::new(http);
    // 100 byte budget, settle at 80
    let cache = open(&dir, http, Arc::new(InMemoryKeyValueStore::new()), |c| {
        c.with_max_disk_bytes(100).with_reclaim_ratio(0.8)
    })
    .await;

    let mut paths = Vec::new();
    for n in 0..3 {
        paths.push(get(&cache, &image_url(n)).await);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    // Touch the oldest so it is no longer least recent
    get(&cache, &image_url(0)).await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    paths.push(get(&cache, &image_url(3)).await);

    assert!(paths[0].exists(), "recently touched entry survives");
    assert!(!paths[1].exists(), "least recent entry evicted");
    assert!(!paths[2].exists(), "second least recent entry evicted");
    assert!(paths[3].exists(), "new entry survives its own budget check");

    let stats = cache.get_stats();
    assert_eq!(stats.disk_bytes, 60);
    assert_eq!(stats.disk_entries, 2);
    assert_eq!(stats.evictions, 2);
}

#[tokio::test]
async fn test_evict_lru_reports_freed_bytes() {
    let dir = TempDir::new().unwrap();
    let mut http = ScriptedHttp::new();
    for n in 0..3 {
        http = http.body(&image_url(n), vec![b'x'; 10]);
    }
    let cache = open(&dir, Arc::new(http), Arc::new(InMemoryKeyValueStore::new()), |c| c).await;
    for n in 0..3 {
        get(&cache, &image_url(n)).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let result = cache.evict_lru(15).await;

    assert_eq!(result.files_deleted, 2);
    assert_eq!(result.bytes_freed, 20);
    assert_eq!(result.size_before, 30);
    assert_eq!(result.size_after, 10);
}

#[tokio::test]
async fn test_expired_entries_purged_at_startup() {
    let dir = TempDir::new().unwrap();
    let ttl = Duration::from_secs(3600);

    let stale_key = KeyDeriver::derive("https://origin.test/stale.jpg", None);
    let fresh_key = KeyDeriver::derive("https://origin.test/fresh.jpg", None);
    let stale_path = dir.path().join(format!("{}.img", stale_key));
    let fresh_path = dir.path().join(format!("{}.img", fresh_key));
    std::fs::write(&stale_path, b"stale").unwrap();
    std::fs::write(&fresh_path, b"fresh").unwrap();

    let now = Utc::now();
    let mut stale = CacheEntry::new(
        "https://origin.test/stale.jpg",
        None,
        Some(stale_path.clone()),
        5,
        now - chrono::Duration::seconds(3601),
    );
    // Accessed a moment ago; expiry counts from creation regardless
    stale.touch(now);
    let fresh = CacheEntry::new(
        "https://origin.test/fresh.jpg",
        None,
        Some(fresh_path.clone()),
        5,
        now,
    );

    let entries: HashMap<CacheKey, CacheEntry> =
        [(stale_key, stale), (fresh_key, fresh)].into_iter().collect();
    let store = Arc::new(InMemoryKeyValueStore::new());
    store
        .set(METADATA_STORE_KEY, serde_json::to_string(&entries).unwrap())
        .unwrap();

    let http = Arc::new(ScriptedHttp::new());
    let cache = open(&dir, http.clone(), store, |c| c.with_disk_ttl(ttl)).await;

    assert!(!stale_path.exists());
    assert!(fresh_path.exists());
    assert_eq!(cache.get_stats().disk_entries, 1);

    let path = get(&cache, "https://origin.test/fresh.jpg").await;
    assert_eq!(path, fresh_path);
    assert_eq!(http.total(), 0);
}

// ============================================================================
// Persistence and startup maintenance
// ============================================================================

#[tokio::test]
async fn test_cache_survives_restart() {
    let dir = TempDir::new().unwrap();
    let url = image_url(7);

    let first_path = {
        let http = Arc::new(ScriptedHttp::new().body(&url, "persisted"));
        let cache = ImageCache::builder(ImageCacheConfig::new(dir.path()))
            .with_http_client(http)
            .build()
            .await
            .unwrap();
        let path = get(&cache, &url).await;
        cache.shutdown().await;
        path
    };

    let http = Arc::new(ScriptedHttp::new());
    let cache = ImageCache::builder(ImageCacheConfig::new(dir.path()))
        .with_http_client(http.clone())
        .build()
        .await
        .unwrap();

    let path = get(&cache, &url).await;

    assert_eq!(path, first_path);
    assert_eq!(http.total(), 0);
    let stats = cache.get_stats();
    assert_eq!(stats.disk_hits, 1);
    assert_eq!(stats.total_requests, 2, "Counters restored from last session");
}

#[tokio::test]
async fn test_startup_removes_orphans_and_drops_bad_entries() {
    let dir = TempDir::new().unwrap();
    let orphan = dir.path().join(format!(
        "{}.img",
        KeyDeriver::derive("https://origin.test/orphan.jpg", None)
    ));
    let leftover_temp = dir.path().join("0123456789abcdef.img.tmp");
    let unrelated = dir.path().join("notes.txt");
    std::fs::write(&orphan, b"orphan").unwrap();
    std::fs::write(&leftover_temp, b"partial").unwrap();
    std::fs::write(&unrelated, b"keep me").unwrap();

    let good_key = KeyDeriver::derive("https://origin.test/good.jpg", None);
    let good_path = dir.path().join(format!("{}.img", good_key));
    std::fs::write(&good_path, b"good").unwrap();
    let good = CacheEntry::new(
        "https://origin.test/good.jpg",
        None,
        Some(good_path.clone()),
        4,
        Utc::now(),
    );
    let blob = serde_json::json!({
        good_key.as_str(): good,
        "fedcba9876543210": { "sourceUri": 42 },
    });
    let store = Arc::new(InMemoryKeyValueStore::new());
    store.set(METADATA_STORE_KEY, blob.to_string()).unwrap();

    let cache = open(&dir, Arc::new(ScriptedHttp::new()), store, |c| c).await;

    assert!(!orphan.exists());
    assert!(!leftover_temp.exists());
    assert!(unrelated.exists());
    assert!(good_path.exists());
    assert_eq!(cache.get_stats().disk_entries, 1);
}

#[tokio::test]
async fn test_clear_then_stats() {
    let dir = TempDir::new().unwrap();
    let http = Arc::new(
        ScriptedHttp::new()
            .body(&image_url(1), "one")
            .body(&image_url(2), "two"),
    );
    let cache = open(&dir, http, Arc::new(InMemoryKeyValueStore::new()), |c| c).await;
    get(&cache, &image_url(1)).await;
    get(&cache, &image_url(2)).await;

    cache.clear_cache(ClearOptions::default()).await.unwrap();

    let stats = cache.get_stats();
    assert_eq!(stats.memory_entries, 0);
    assert_eq!(stats.memory_bytes, 0);
    assert_eq!(stats.disk_entries, 0);
    assert_eq!(stats.disk_bytes, 0);
    assert_eq!(stats.total_requests, 2, "Counters are not reset by clearing");
    assert!(!dir
        .path()
        .read_dir()
        .unwrap()
        .filter_map(|e| e.ok())
        .any(|e| e.path().extension().is_some_and(|ext| ext == "img")));
}

// ============================================================================
// Disk tier round-trip
// ============================================================================

#[tokio::test]
async fn test_disk_write_then_read_round_trip() {
    let dir = TempDir::new().unwrap();
    let metadata = Arc::new(MetadataStore::new(
        Arc::new(InMemoryKeyValueStore::new()),
        10,
    ));
    let disk = DiskTier::open(dir.path(), Arc::clone(&metadata))
        .await
        .unwrap();
    let key = KeyDeriver::derive("https://origin.test/rt.jpg", Some("public"));
    let bytes: Vec<u8> = (0..=255).collect();

    disk.write(&key, "https://origin.test/rt.jpg", Some("public"), &bytes)
        .await
        .unwrap();
    let path = disk.read(&key).await.unwrap().unwrap();

    assert_eq!(std::fs::read(path).unwrap(), bytes);
    let entry = metadata.get(&key).unwrap();
    assert_eq!(entry.size_bytes, 256);
    assert_eq!(entry.variant.as_deref(), Some("public"));
    assert_eq!(entry.access_count, 1);
}
