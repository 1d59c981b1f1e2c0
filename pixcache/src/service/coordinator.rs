//! Public cache facade.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::builder::ImageCacheBuilder;
use super::config::ImageCacheConfig;
use super::core::CacheCore;
use super::error::ImageCacheError;
use crate::cache::{CacheKey, CacheStats, EvictionResult, KeyDeriver};
use crate::prefetch::{
    PrefetchOutcome, PrefetchPriority, PrefetchRequest, PrefetchScheduler, PrefetchStatsSnapshot,
};
use crate::remote::ImageOrigin;
use crate::upload::{UploadMetadata, UploadService};

/// Options for [`ImageCache::get_image`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetImageOptions {
    /// CDN variant. Defaults to the configured default variant when a CDN id is set.
    pub variant: Option<String>,
    /// CDN identifier; when set the CDN is tried before the raw URI.
    pub cdn_id: Option<String>,
    /// Queue the other configured variants for background prefetch.
    pub prefetch_related: bool,
}

impl GetImageOptions {
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    pub fn with_cdn_id(mut self, cdn_id: impl Into<String>) -> Self {
        self.cdn_id = Some(cdn_id.into());
        self
    }

    pub fn with_prefetch_related(mut self, enabled: bool) -> Self {
        self.prefetch_related = enabled;
        self
    }
}

/// Tiers to clear in [`ImageCache::clear_cache`]. The default clears both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearOptions {
    pub memory: bool,
    pub disk: bool,
}

impl Default for ClearOptions {
    fn default() -> Self {
        Self {
            memory: true,
            disk: true,
        }
    }
}

/// Result of [`ImageCache::upload_and_cache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    /// Identifier assigned by the upload service.
    pub cdn_id: String,
    /// Local file holding the default variant.
    pub local_path: PathBuf,
}

/// Multi-tier image cache: memory, disk, then CDN and origin.
///
/// One instance is shared across the process; every method takes `&self`
/// and is safe to call concurrently. Concurrent lookups of the same image
/// share a single fetch.
///
/// # Example
///
/// ```ignore
/// use pixcache::service::{GetImageOptions, ImageCache, ImageCacheConfig};
///
/// let cache = ImageCache::new(ImageCacheConfig::default()).await?;
/// let path = cache
///     .get_image("https://example.com/cat.jpg", GetImageOptions::default())
///     .await?;
/// cache.shutdown().await;
/// ```
pub struct ImageCache {
    core: Arc<CacheCore>,
    prefetch: PrefetchScheduler<CacheCore>,
    uploader: Arc<dyn UploadService>,
}

impl ImageCache {
    /// Open a cache with default collaborators.
    pub async fn new(config: ImageCacheConfig) -> Result<Self, ImageCacheError> {
        ImageCacheBuilder::new(config).build().await
    }

    /// Start a builder for injecting collaborators.
    pub fn builder(config: ImageCacheConfig) -> ImageCacheBuilder {
        ImageCacheBuilder::new(config)
    }

    pub(crate) fn from_parts(
        core: Arc<CacheCore>,
        prefetch: PrefetchScheduler<CacheCore>,
        uploader: Arc<dyn UploadService>,
    ) -> Self {
        Self {
            core,
            prefetch,
            uploader,
        }
    }

    pub fn config(&self) -> &ImageCacheConfig {
        self.core.config()
    }

    /// Resolve an image to a local file path.
    ///
    /// Tries memory, then disk, then the CDN variant (when `cdn_id` is set),
    /// then the raw URI. A remote fill is written through to disk and memory.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Network` once every tier has failed; `Storage` if the
    /// fetched bytes cannot be written.
    pub async fn get_image(
        &self,
        uri: &str,
        options: GetImageOptions,
    ) -> Result<PathBuf, ImageCacheError> {
        let variant = self.effective_variant(options.cdn_id.as_deref(), options.variant);
        let (key, origin) = self.request_for(uri, options.cdn_id.as_deref(), variant.as_deref());

        let result = self.core.resolve(&key, &origin).await;

        if options.prefetch_related && result.is_ok() {
            if let Some(cdn_id) = options.cdn_id.as_deref() {
                let siblings = self.sibling_requests(uri, cdn_id, variant.as_deref());
                self.enqueue(siblings, PrefetchPriority::Normal);
            }
        }

        result
    }

    /// Queue variants of an image for background fetching.
    ///
    /// Never blocks and never fails; outcomes are reported through
    /// [`prefetch_outcomes`](Self::prefetch_outcomes). An empty `variants`
    /// list queues the image itself. Returns how many requests were queued.
    pub fn prefetch(&self, uri: &str, cdn_id: Option<&str>, variants: &[String]) -> usize {
        self.prefetch_with_priority(uri, cdn_id, variants, PrefetchPriority::Normal)
    }

    /// [`prefetch`](Self::prefetch) at an explicit priority.
    pub fn prefetch_with_priority(
        &self,
        uri: &str,
        cdn_id: Option<&str>,
        variants: &[String],
        priority: PrefetchPriority,
    ) -> usize {
        let requests: Vec<PrefetchRequest> = if variants.is_empty() {
            let variant = self.effective_variant(cdn_id, None);
            let (key, origin) = self.request_for(uri, cdn_id, variant.as_deref());
            vec![PrefetchRequest::new(key, origin)]
        } else {
            variants
                .iter()
                .map(|variant| {
                    let (key, origin) = self.request_for(uri, cdn_id, Some(variant));
                    PrefetchRequest::new(key, origin)
                })
                .collect()
        };
        self.enqueue(requests, priority)
    }

    /// Upload an image, cache its default variant, and queue the rest.
    ///
    /// # Errors
    ///
    /// `Upload` if the upload service fails; otherwise whatever resolving
    /// the uploaded default variant returns.
    pub async fn upload_and_cache(
        &self,
        data: Bytes,
        metadata: &UploadMetadata,
    ) -> Result<UploadResult, ImageCacheError> {
        let uploaded = self.uploader.upload(data, metadata).await?;
        debug!(cdn_id = %uploaded.id, url = %uploaded.default_variant_url, "Image uploaded");

        let default_variant = self.config().default_variant.clone();
        let (key, origin) = self.request_for(
            &uploaded.default_variant_url,
            Some(&uploaded.id),
            Some(&default_variant),
        );
        let local_path = self.core.resolve(&key, &origin).await?;

        let siblings = self.sibling_requests(
            &uploaded.default_variant_url,
            &uploaded.id,
            Some(&default_variant),
        );
        self.enqueue(siblings, PrefetchPriority::Low);

        Ok(UploadResult {
            cdn_id: uploaded.id,
            local_path,
        })
    }

    /// Clear the requested tiers. Clearing disk also clears metadata.
    ///
    /// Idempotent. Queued prefetches are not cancelled.
    pub async fn clear_cache(&self, options: ClearOptions) -> Result<(), ImageCacheError> {
        self.core.clear(options.memory, options.disk).await
    }

    /// Evict least recently accessed disk entries until usage is at most
    /// `target_bytes`.
    pub async fn evict_lru(&self, target_bytes: u64) -> EvictionResult {
        self.core.evict_to_budget(target_bytes).await
    }

    /// Point-in-time cache statistics.
    pub fn get_stats(&self) -> CacheStats {
        self.core.stats()
    }

    /// Subscribe to background prefetch outcomes.
    pub fn prefetch_outcomes(&self) -> broadcast::Receiver<PrefetchOutcome> {
        self.prefetch.subscribe()
    }

    pub fn prefetch_stats(&self) -> PrefetchStatsSnapshot {
        self.prefetch.stats().snapshot()
    }

    /// Wait until every queued prefetch has finished.
    pub async fn wait_for_prefetch(&self) {
        self.prefetch.wait_idle().await
    }

    /// Drop queued prefetches. In-flight ones finish.
    pub fn clear_prefetch_queue(&self) -> usize {
        self.prefetch.clear()
    }

    /// Persist pending metadata and counters.
    pub async fn flush(&self) -> Result<(), ImageCacheError> {
        self.core.flush().await
    }

    /// Stop prefetching, wait for in-flight work, then flush.
    pub async fn shutdown(&self) {
        self.prefetch.shutdown().await;
        if let Err(e) = self.core.flush().await {
            warn!(error = %e, "Failed to flush cache state on shutdown");
        }
        info!("Image cache shut down");
    }

    /// The variant a request resolves to: explicit, else the default for
    /// CDN-backed images, else none.
    fn effective_variant(&self, cdn_id: Option<&str>, variant: Option<String>) -> Option<String> {
        match (variant, cdn_id) {
            (Some(variant), _) => Some(variant),
            (None, Some(_)) => Some(self.config().default_variant.clone()),
            (None, None) => None,
        }
    }

    fn request_for(
        &self,
        uri: &str,
        cdn_id: Option<&str>,
        variant: Option<&str>,
    ) -> (CacheKey, ImageOrigin) {
        let key = match (uri.is_empty(), cdn_id) {
            (true, Some(id)) => KeyDeriver::derive(&format!("cdn:{}", id), variant),
            _ => KeyDeriver::derive(uri, variant),
        };

        let mut origin = ImageOrigin::raw(uri);
        if let Some(id) = cdn_id {
            origin = origin.with_cdn_id(id);
        }
        if let Some(variant) = variant {
            origin = origin.with_variant(variant);
        }
        (key, origin)
    }

    /// Requests for every configured variant other than `requested`.
    fn sibling_requests(
        &self,
        uri: &str,
        cdn_id: &str,
        requested: Option<&str>,
    ) -> Vec<PrefetchRequest> {
        self.config()
            .variants
            .iter()
            .filter(|variant| Some(variant.as_str()) != requested)
            .map(|variant| {
                let (key, origin) = self.request_for(uri, Some(cdn_id), Some(variant));
                PrefetchRequest::new(key, origin)
            })
            .collect()
    }

    fn enqueue(&self, requests: Vec<PrefetchRequest>, priority: PrefetchPriority) -> usize {
        if !self.config().prefetch_enabled {
            debug!(requests = requests.len(), "Prefetch disabled, ignoring requests");
            return 0;
        }
        self.prefetch.enqueue(requests, priority)
    }
}
