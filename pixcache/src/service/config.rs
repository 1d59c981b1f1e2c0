//! Programmatic cache configuration.

use std::path::PathBuf;
use std::time::Duration;

use super::error::ImageCacheError;
use crate::remote::{DEFAULT_HTTP_TIMEOUT, ID_PLACEHOLDER};

/// Default memory tier budget (64 MB).
pub const DEFAULT_MAX_MEMORY_BYTES: u64 = 64 * 1024 * 1024;

/// Default disk tier budget (512 MB).
pub const DEFAULT_MAX_DISK_BYTES: u64 = 512 * 1024 * 1024;

/// Default disk TTL (7 days).
pub const DEFAULT_DISK_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default prefetch worker count.
pub const DEFAULT_MAX_CONCURRENT_PREFETCH: usize = 3;

/// Default reclaim floor as a fraction of the disk budget.
pub const DEFAULT_RECLAIM_RATIO: f64 = 0.8;

/// Default number of accesses between batched metadata saves.
pub const DEFAULT_METADATA_SAVE_INTERVAL: u64 = 10;

/// Default CDN variant.
pub const DEFAULT_VARIANT: &str = "public";

/// Default set of CDN variants, smallest first.
pub const DEFAULT_VARIANTS: [&str; 3] = ["thumbnail", "medium", "public"];

/// Default cache directory: the platform cache dir plus `pixcache`.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("pixcache")
}

/// Configuration for [`ImageCache`](super::ImageCache).
///
/// # Example
///
/// ```
/// use pixcache::service::ImageCacheConfig;
///
/// let config = ImageCacheConfig::new("/tmp/pixcache-doc")
///     .with_max_disk_bytes(100 * 1024 * 1024)
///     .with_max_concurrent_prefetch(2);
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.reclaim_target_bytes(), 80 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCacheConfig {
    /// Directory for image files and persisted metadata.
    pub cache_dir: PathBuf,
    /// Memory tier budget in bytes.
    pub max_memory_bytes: u64,
    /// Disk tier budget in bytes.
    pub max_disk_bytes: u64,
    /// Maximum age of a disk entry, measured from creation.
    pub disk_ttl: Duration,
    /// Background prefetch worker count.
    pub max_concurrent_prefetch: usize,
    /// Whether a CDN failure falls back to the raw URI.
    pub cdn_fallback_enabled: bool,
    /// Whether prefetch requests are accepted at all.
    pub prefetch_enabled: bool,
    /// Fraction of `max_disk_bytes` that budget eviction settles at.
    pub reclaim_ratio: f64,
    /// Access updates between batched metadata saves.
    pub metadata_save_interval: u64,
    /// Timeout for each HTTP request.
    pub http_timeout: Duration,
    /// CDN variant used when a request names none.
    pub default_variant: String,
    /// Sibling variants prefetched for related and uploaded images.
    pub variants: Vec<String>,
    /// CDN URL template with `{id}` and `{variant}` placeholders.
    pub cdn_url_template: Option<String>,
}

impl Default for ImageCacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            max_memory_bytes: DEFAULT_MAX_MEMORY_BYTES,
            max_disk_bytes: DEFAULT_MAX_DISK_BYTES,
            disk_ttl: DEFAULT_DISK_TTL,
            max_concurrent_prefetch: DEFAULT_MAX_CONCURRENT_PREFETCH,
            cdn_fallback_enabled: true,
            prefetch_enabled: true,
            reclaim_ratio: DEFAULT_RECLAIM_RATIO,
            metadata_save_interval: DEFAULT_METADATA_SAVE_INTERVAL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            default_variant: DEFAULT_VARIANT.to_string(),
            variants: DEFAULT_VARIANTS.iter().map(|v| v.to_string()).collect(),
            cdn_url_template: None,
        }
    }
}

impl ImageCacheConfig {
    /// Defaults with a specific cache directory.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_max_memory_bytes(mut self, bytes: u64) -> Self {
        self.max_memory_bytes = bytes;
        self
    }

    pub fn with_max_disk_bytes(mut self, bytes: u64) -> Self {
        self.max_disk_bytes = bytes;
        self
    }

    pub fn with_disk_ttl(mut self, ttl: Duration) -> Self {
        self.disk_ttl = ttl;
        self
    }

    pub fn with_max_concurrent_prefetch(mut self, workers: usize) -> Self {
        self.max_concurrent_prefetch = workers;
        self
    }

    pub fn with_cdn_fallback(mut self, enabled: bool) -> Self {
        self.cdn_fallback_enabled = enabled;
        self
    }

    pub fn with_prefetch(mut self, enabled: bool) -> Self {
        self.prefetch_enabled = enabled;
        self
    }

    pub fn with_reclaim_ratio(mut self, ratio: f64) -> Self {
        self.reclaim_ratio = ratio;
        self
    }

    pub fn with_metadata_save_interval(mut self, accesses: u64) -> Self {
        self.metadata_save_interval = accesses;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_default_variant(mut self, variant: impl Into<String>) -> Self {
        self.default_variant = variant.into();
        self
    }

    pub fn with_variants<I, S>(mut self, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variants = variants.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cdn_url_template(mut self, template: impl Into<String>) -> Self {
        self.cdn_url_template = Some(template.into());
        self
    }

    /// Disk usage that budget eviction settles at.
    pub fn reclaim_target_bytes(&self) -> u64 {
        (self.max_disk_bytes as f64 * self.reclaim_ratio) as u64
    }

    /// Reject configurations the cache cannot run with.
    pub fn validate(&self) -> Result<(), ImageCacheError> {
        if self.max_memory_bytes == 0 {
            return Err(config_error("max_memory_bytes must be greater than zero"));
        }
        if self.max_disk_bytes == 0 {
            return Err(config_error("max_disk_bytes must be greater than zero"));
        }
        if self.disk_ttl.is_zero() {
            return Err(config_error("disk_ttl must be greater than zero"));
        }
        if !(self.reclaim_ratio > 0.0 && self.reclaim_ratio <= 1.0) {
            return Err(config_error(format!(
                "reclaim_ratio must be in (0, 1], got {}",
                self.reclaim_ratio
            )));
        }
        if self.metadata_save_interval == 0 {
            return Err(config_error("metadata_save_interval must be at least 1"));
        }
        if self.prefetch_enabled && self.max_concurrent_prefetch == 0 {
            return Err(config_error(
                "max_concurrent_prefetch must be at least 1 when prefetch is enabled",
            ));
        }
        if self.default_variant.is_empty() {
            return Err(config_error("default_variant must not be empty"));
        }
        if let Some(template) = &self.cdn_url_template {
            if !template.contains(ID_PLACEHOLDER) {
                return Err(config_error(format!(
                    "cdn_url_template must contain {}: {}",
                    ID_PLACEHOLDER, template
                )));
            }
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> ImageCacheError {
    ImageCacheError::Config(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ImageCacheConfig::default();

        assert_eq!(config.max_memory_bytes, 64 * 1024 * 1024);
        assert_eq!(config.max_disk_bytes, 512 * 1024 * 1024);
        assert_eq!(config.disk_ttl, Duration::from_secs(604_800));
        assert_eq!(config.max_concurrent_prefetch, 3);
        assert!(config.cdn_fallback_enabled);
        assert!(config.prefetch_enabled);
        assert_eq!(config.metadata_save_interval, 10);
        assert_eq!(config.default_variant, "public");
        assert_eq!(config.variants, vec!["thumbnail", "medium", "public"]);
        assert!(config.cache_dir.ends_with("pixcache"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reclaim_target() {
        let config = ImageCacheConfig::default()
            .with_max_disk_bytes(1000)
            .with_reclaim_ratio(0.5);
        assert_eq!(config.reclaim_target_bytes(), 500);
    }

    #[test]
    fn test_zero_budgets_rejected() {
        assert!(matches!(
            ImageCacheConfig::default().with_max_memory_bytes(0).validate(),
            Err(ImageCacheError::Config(_))
        ));
        assert!(matches!(
            ImageCacheConfig::default().with_max_disk_bytes(0).validate(),
            Err(ImageCacheError::Config(_))
        ));
    }

    #[test]
    fn test_reclaim_ratio_bounds() {
        for bad in [0.0, -0.5, 1.01, f64::NAN] {
            assert!(
                ImageCacheConfig::default()
                    .with_reclaim_ratio(bad)
                    .validate()
                    .is_err(),
                "ratio {} should be rejected",
                bad
            );
        }
        assert!(ImageCacheConfig::default()
            .with_reclaim_ratio(1.0)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_prefetch_workers_only_required_when_enabled() {
        let config = ImageCacheConfig::default().with_max_concurrent_prefetch(0);
        assert!(config.validate().is_err());
        assert!(config.with_prefetch(false).validate().is_ok());
    }

    #[test]
    fn test_zero_ttl_and_interval_rejected() {
        assert!(ImageCacheConfig::default()
            .with_disk_ttl(Duration::ZERO)
            .validate()
            .is_err());
        assert!(ImageCacheConfig::default()
            .with_metadata_save_interval(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_cdn_template_needs_id() {
        assert!(ImageCacheConfig::default()
            .with_cdn_url_template("https://cdn.test/{variant}")
            .validate()
            .is_err());
        assert!(ImageCacheConfig::default()
            .with_cdn_url_template("https://cdn.test/{id}/{variant}")
            .validate()
            .is_ok());
    }
}
