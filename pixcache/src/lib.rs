//! pixcache - multi-tier image cache.
//!
//! Images resolve through an in-process memory tier, an on-disk tier with
//! persisted metadata, and finally the network (CDN variant first, then the
//! original URI). Concurrent lookups of the same image share one fetch, disk
//! usage is held to a budget by LRU eviction and TTL expiry, and related
//! images can be prefetched in the background by a bounded worker pool.
//!
//! # High-Level API
//!
//! ```ignore
//! use pixcache::service::{GetImageOptions, ImageCache, ImageCacheConfig};
//!
//! let cache = ImageCache::new(ImageCacheConfig::default()).await?;
//! let path = cache
//!     .get_image("https://example.com/photo.jpg", GetImageOptions::default())
//!     .await?;
//! ```

pub mod cache;
pub mod config;
pub mod logging;
pub mod prefetch;
pub mod remote;
pub mod service;
pub mod upload;

/// Version of the library and CLI, shared across the workspace.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
