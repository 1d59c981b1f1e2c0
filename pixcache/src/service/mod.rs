//! Public service facade for the image cache.
//!
//! [`ImageCache`] composes every tier behind a small API:
//!
//! ```ignore
//! use pixcache::service::{ClearOptions, GetImageOptions, ImageCache, ImageCacheConfig};
//!
//! let cache = ImageCache::new(ImageCacheConfig::default()).await?;
//!
//! // Resolve through memory, disk, CDN, then origin
//! let path = cache
//!     .get_image(
//!         "https://example.com/photo.jpg",
//!         GetImageOptions::default().with_cdn_id("abc123").with_prefetch_related(true),
//!     )
//!     .await?;
//!
//! println!("{}", cache.get_stats());
//! cache.clear_cache(ClearOptions::default()).await?;
//! cache.shutdown().await;
//! ```

mod builder;
mod config;
mod coordinator;
mod core;
mod error;

pub use builder::ImageCacheBuilder;
pub use config::{
    default_cache_dir, ImageCacheConfig, DEFAULT_DISK_TTL, DEFAULT_MAX_CONCURRENT_PREFETCH,
    DEFAULT_MAX_DISK_BYTES, DEFAULT_MAX_MEMORY_BYTES, DEFAULT_METADATA_SAVE_INTERVAL,
    DEFAULT_RECLAIM_RATIO, DEFAULT_VARIANT, DEFAULT_VARIANTS,
};
pub use coordinator::{ClearOptions, GetImageOptions, ImageCache, UploadResult};
pub use error::ImageCacheError;
