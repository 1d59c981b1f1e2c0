//! Core types for the cache tiers.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Persisted bookkeeping for one cached image.
///
/// Serialized field names are camelCase so the metadata blob stays readable
/// by other tooling that inspects the cache directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Original fetch origin.
    pub source_uri: String,
    /// Path to the cached bytes. `None` means memory-only or not yet materialized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    /// File size at write time.
    pub size_bytes: u64,
    /// When the bytes were fetched.
    pub created_at: DateTime<Utc>,
    /// Last time any tier served this key. Never moves backwards.
    pub last_accessed_at: DateTime<Utc>,
    /// Number of hits since creation.
    pub access_count: u64,
    /// Size variant, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl CacheEntry {
    /// Create an entry for freshly written bytes.
    pub fn new(
        source_uri: impl Into<String>,
        variant: Option<String>,
        local_path: Option<PathBuf>,
        size_bytes: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            source_uri: source_uri.into(),
            local_path,
            size_bytes,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            variant,
        }
    }

    /// Record a hit at `now`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_accessed_at {
            self.last_accessed_at = now;
        }
        self.access_count += 1;
    }

    /// Whether more than `ttl` has elapsed since creation.
    ///
    /// Expiry is creation-based: recent access does not extend it.
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return false;
        };
        now.signed_duration_since(self.created_at) > ttl
    }
}

/// Cache tier errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem or persisted store failure.
    #[error("Cache storage error at {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Metadata could not be encoded or decoded.
    #[error("Cache metadata serialization error: {0}")]
    Serialization(String),

    /// Invalid cache configuration.
    #[error("Invalid cache configuration: {0}")]
    Config(String),
}

impl CacheError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }
}
