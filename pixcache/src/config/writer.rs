//! Serialization of `ConfigFile` into the commented INI written to disk.

use std::path::Path;

use super::settings::ConfigFile;
use super::size::{format_duration, format_size};

/// Render a `ConfigFile` as a commented INI string.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let url_template = config.cdn.url_template.as_deref().unwrap_or("");

    format!(
        r#"[cache]
; Directory for cached images and their metadata
; If empty, defaults to the platform cache directory plus "pixcache"
directory = {}
; In-memory tier budget (default: 64MB). Supports KB, MB, GB suffixes
memory_size = {}
; On-disk tier budget (default: 512MB)
disk_size = {}
; Maximum age of a cached file, counted from when it was fetched (default: 7d)
; Supports s, m, h, d suffixes
disk_ttl = {}
; When the disk budget is exceeded, evict down to this percentage of it (default: 80)
reclaim_percent = {}
; Number of cache hits between metadata saves (default: 10)
metadata_save_interval = {}

[prefetch]
; Fetch related variants in the background (default: true)
enabled = {}
; Maximum simultaneous background fetches (default: 3)
max_concurrent = {}

[cdn]
; Delivery URL template with {{id}} and {{variant}} placeholders
; Example: https://imagedelivery.net/<account>/{{id}}/{{variant}}
; Leave empty to always fetch from the original URI
url_template = {}
; Variant used when a request names none (default: public)
default_variant = {}
; Comma-separated variants prefetched alongside a requested one
variants = {}
; Retry from the original URI when the CDN fails (default: true)
fallback_enabled = {}

[http]
; Per-request timeout (default: 30s)
timeout = {}
"#,
        path_to_string(&config.cache.directory),
        format_size(config.cache.memory_size),
        format_size(config.cache.disk_size),
        format_duration(config.cache.disk_ttl),
        config.cache.reclaim_percent,
        config.cache.metadata_save_interval,
        config.prefetch.enabled,
        config.prefetch.max_concurrent,
        url_template,
        config.cdn.default_variant,
        config.cdn.variants.join(", "),
        config.cdn.fallback_enabled,
        format_duration(config.http.timeout),
    )
}

/// Display a path, abbreviating the home directory to `~`.
fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}
