//! Settings structs for each `[section]` of the INI config file.
//!
//! Pure data; parsing lives in [`super::parser`], serialization in
//! [`super::writer`].

use std::path::PathBuf;
use std::time::Duration;

use crate::service::{
    default_cache_dir, ImageCacheConfig, DEFAULT_DISK_TTL, DEFAULT_MAX_CONCURRENT_PREFETCH,
    DEFAULT_MAX_DISK_BYTES, DEFAULT_MAX_MEMORY_BYTES, DEFAULT_METADATA_SAVE_INTERVAL,
    DEFAULT_RECLAIM_RATIO, DEFAULT_VARIANT, DEFAULT_VARIANTS,
};
use crate::remote::DEFAULT_HTTP_TIMEOUT;

/// Complete configuration loaded from `config.ini`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub cache: CacheSettings,
    pub prefetch: PrefetchSettings,
    pub cdn: CdnSettings,
    pub http: HttpSettings,
}

/// `[cache]`
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    pub directory: PathBuf,
    pub memory_size: u64,
    pub disk_size: u64,
    /// Maximum age of a disk entry, from creation.
    pub disk_ttl: Duration,
    /// Reclaim floor as a percentage of `disk_size`.
    pub reclaim_percent: u8,
    /// Access updates between batched metadata saves.
    pub metadata_save_interval: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            directory: default_cache_dir(),
            memory_size: DEFAULT_MAX_MEMORY_BYTES,
            disk_size: DEFAULT_MAX_DISK_BYTES,
            disk_ttl: DEFAULT_DISK_TTL,
            reclaim_percent: (DEFAULT_RECLAIM_RATIO * 100.0).round() as u8,
            metadata_save_interval: DEFAULT_METADATA_SAVE_INTERVAL,
        }
    }
}

/// `[prefetch]`
#[derive(Debug, Clone, PartialEq)]
pub struct PrefetchSettings {
    pub enabled: bool,
    pub max_concurrent: usize,
}

impl Default for PrefetchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent: DEFAULT_MAX_CONCURRENT_PREFETCH,
        }
    }
}

/// `[cdn]`
#[derive(Debug, Clone, PartialEq)]
pub struct CdnSettings {
    /// Template with `{id}` and `{variant}` placeholders. `None` disables the CDN.
    pub url_template: Option<String>,
    pub default_variant: String,
    pub variants: Vec<String>,
    /// Fall back to the raw URI when the CDN fails.
    pub fallback_enabled: bool,
}

impl Default for CdnSettings {
    fn default() -> Self {
        Self {
            url_template: None,
            default_variant: DEFAULT_VARIANT.to_string(),
            variants: DEFAULT_VARIANTS.iter().map(|v| v.to_string()).collect(),
            fallback_enabled: true,
        }
    }
}

/// `[http]`
#[derive(Debug, Clone, PartialEq)]
pub struct HttpSettings {
    pub timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl ConfigFile {
    /// Convert into the programmatic cache configuration.
    pub fn to_cache_config(&self) -> ImageCacheConfig {
        ImageCacheConfig {
            cache_dir: self.cache.directory.clone(),
            max_memory_bytes: self.cache.memory_size,
            max_disk_bytes: self.cache.disk_size,
            disk_ttl: self.cache.disk_ttl,
            max_concurrent_prefetch: self.prefetch.max_concurrent,
            cdn_fallback_enabled: self.cdn.fallback_enabled,
            prefetch_enabled: self.prefetch.enabled,
            reclaim_ratio: f64::from(self.cache.reclaim_percent) / 100.0,
            metadata_save_interval: self.cache.metadata_save_interval,
            http_timeout: self.http.timeout,
            default_variant: self.cdn.default_variant.clone(),
            variants: self.cdn.variants.clone(),
            cdn_url_template: self.cdn.url_template.clone(),
        }
    }
}
