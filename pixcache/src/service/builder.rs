//! Wiring of collaborators into an [`ImageCache`].
//!
//! Every collaborator is optional; whatever is not injected is built from
//! the configuration (reqwest client, template CDN resolver, file-backed
//! metadata store under the cache directory).

use std::sync::Arc;

use super::config::ImageCacheConfig;
use super::core::CacheCore;
use super::coordinator::ImageCache;
use super::error::ImageCacheError;
use crate::cache::{FileKeyValueStore, KeyValueStore};
use crate::prefetch::PrefetchScheduler;
use crate::remote::{
    AsyncHttpClient, AsyncReqwestClient, CdnUrlResolver, RemoteResolver, TemplateCdnResolver,
};
use crate::upload::{NoUploadService, UploadService};

/// Builder for [`ImageCache`] with injectable collaborators.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use pixcache::cache::InMemoryKeyValueStore;
/// use pixcache::service::{ImageCacheBuilder, ImageCacheConfig};
///
/// let cache = ImageCacheBuilder::new(ImageCacheConfig::new("/tmp/pixcache"))
///     .with_store(Arc::new(InMemoryKeyValueStore::new()))
///     .build()
///     .await?;
/// ```
pub struct ImageCacheBuilder {
    config: ImageCacheConfig,
    http: Option<Arc<dyn AsyncHttpClient>>,
    cdn: Option<Arc<dyn CdnUrlResolver>>,
    uploader: Option<Arc<dyn UploadService>>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl ImageCacheBuilder {
    pub fn new(config: ImageCacheConfig) -> Self {
        Self {
            config,
            http: None,
            cdn: None,
            uploader: None,
            store: None,
        }
    }

    pub fn with_http_client(mut self, http: Arc<dyn AsyncHttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    /// Overrides `cdn_url_template` from the configuration.
    pub fn with_cdn_resolver(mut self, cdn: Arc<dyn CdnUrlResolver>) -> Self {
        self.cdn = Some(cdn);
        self
    }

    pub fn with_upload_service(mut self, uploader: Arc<dyn UploadService>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    /// Store for persisted metadata and counters.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Validate the configuration, open every tier and start prefetching.
    ///
    /// # Errors
    ///
    /// `Config` if the configuration is invalid (checked before anything
    /// touches disk or network); `Storage` if the cache directory or the
    /// persisted metadata cannot be opened.
    pub async fn build(self) -> Result<ImageCache, ImageCacheError> {
        let config = self.config;
        config.validate()?;

        let http = match self.http {
            Some(http) => http,
            None => Arc::new(
                AsyncReqwestClient::with_timeout(config.http_timeout).map_err(|e| {
                    ImageCacheError::Config(format!("failed to create HTTP client: {}", e))
                })?,
            ),
        };

        let cdn: Option<Arc<dyn CdnUrlResolver>> = match (self.cdn, &config.cdn_url_template) {
            (Some(cdn), _) => Some(cdn),
            (None, Some(template)) => Some(Arc::new(
                TemplateCdnResolver::new(template.as_str())
                    .map_err(|e| ImageCacheError::from_remote("", e))?,
            )),
            (None, None) => None,
        };

        let store = match self.store {
            Some(store) => store,
            None => Arc::new(FileKeyValueStore::open(&config.cache_dir)?),
        };

        let mut remote = RemoteResolver::new(http)
            .with_default_variant(config.default_variant.clone())
            .with_cdn_fallback(config.cdn_fallback_enabled);
        if let Some(cdn) = cdn {
            remote = remote.with_cdn(cdn);
        }

        let max_concurrent = config.max_concurrent_prefetch;
        let core = Arc::new(CacheCore::open(config, remote, store).await?);
        let prefetch = PrefetchScheduler::new(Arc::clone(&core), max_concurrent);
        let uploader = self
            .uploader
            .unwrap_or_else(|| Arc::new(NoUploadService));

        Ok(ImageCache::from_parts(core, prefetch, uploader))
    }
}
