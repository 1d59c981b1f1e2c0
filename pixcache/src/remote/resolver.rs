//! Remote tier: fetch image bytes from the CDN, falling back to the origin.
//!
//! Resolution order when a CDN id is present:
//!
//! 1. Build the CDN URL for the requested variant and GET it.
//! 2. On any failure (status, timeout, transport), GET the raw origin URI.
//!
//! Exactly one attempt per tier per call. Retrying is the caller's business,
//! and so is persisting the result: the resolver only talks to the network.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use super::cdn::CdnUrlResolver;
use super::http::AsyncHttpClient;
use super::RemoteError;
use crate::cache::CacheKey;

/// Where an image can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOrigin {
    /// Original image URI, used as the fallback.
    pub raw_uri: String,
    /// CDN identifier, if the image is hosted on the CDN.
    pub cdn_id: Option<String>,
    /// Requested size variant.
    pub variant: Option<String>,
}

impl ImageOrigin {
    /// Origin with only a raw URI.
    pub fn raw(uri: impl Into<String>) -> Self {
        Self {
            raw_uri: uri.into(),
            cdn_id: None,
            variant: None,
        }
    }

    pub fn with_cdn_id(mut self, cdn_id: impl Into<String>) -> Self {
        self.cdn_id = Some(cdn_id.into());
        self
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }
}

/// Which tier served a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    Cdn,
    Raw,
}

/// Bytes returned by a successful fetch.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Bytes,
    pub source: FetchSource,
    /// URL that produced the bytes.
    pub url: String,
}

/// Fetches image bytes over HTTP with CDN-then-origin fallback.
pub struct RemoteResolver {
    http: Arc<dyn AsyncHttpClient>,
    cdn: Option<Arc<dyn CdnUrlResolver>>,
    default_variant: String,
    cdn_fallback_enabled: bool,
}

impl RemoteResolver {
    pub fn new(http: Arc<dyn AsyncHttpClient>) -> Self {
        Self {
            http,
            cdn: None,
            default_variant: "public".to_string(),
            cdn_fallback_enabled: true,
        }
    }

    pub fn with_cdn(mut self, cdn: Arc<dyn CdnUrlResolver>) -> Self {
        self.cdn = Some(cdn);
        self
    }

    /// Variant used for CDN URLs when the origin names none.
    pub fn with_default_variant(mut self, variant: impl Into<String>) -> Self {
        self.default_variant = variant.into();
        self
    }

    /// Whether a CDN failure falls back to the raw URI.
    pub fn with_cdn_fallback(mut self, enabled: bool) -> Self {
        self.cdn_fallback_enabled = enabled;
        self
    }

    /// URL the CDN tier would use for `origin`, if any.
    pub fn cdn_url(&self, origin: &ImageOrigin) -> Option<String> {
        let cdn = self.cdn.as_ref()?;
        let cdn_id = origin.cdn_id.as_deref()?;
        let variant = origin.variant.as_deref().unwrap_or(&self.default_variant);
        Some(cdn.url_for(cdn_id, variant))
    }

    /// Fetch the bytes for `origin`.
    ///
    /// Returns the last tier's error if every attempted tier fails.
    pub async fn fetch(
        &self,
        key: &CacheKey,
        origin: &ImageOrigin,
    ) -> Result<FetchedImage, RemoteError> {
        let mut cdn_error = None;

        if let Some(url) = self.cdn_url(origin) {
            debug!(key = %key, url = %url, "Fetching from CDN");
            match self.http.get(&url).await {
                Ok(bytes) => {
                    return Ok(FetchedImage {
                        bytes,
                        source: FetchSource::Cdn,
                        url,
                    });
                }
                Err(e) if !self.cdn_fallback_enabled => return Err(e),
                Err(e) => {
                    warn!(key = %key, url = %url, error = %e, "CDN fetch failed, falling back to origin");
                    cdn_error = Some(e);
                }
            }
        } else if origin.cdn_id.is_some() {
            debug!(key = %key, "No CDN resolver configured, using origin");
        }

        if origin.raw_uri.is_empty() {
            return Err(cdn_error.unwrap_or(RemoteError::NoOrigin));
        }

        debug!(key = %key, url = %origin.raw_uri, "Fetching from origin");
        let bytes = self.http.get(&origin.raw_uri).await?;
        Ok(FetchedImage {
            bytes,
            source: FetchSource::Raw,
            url: origin.raw_uri.clone(),
        })
    }
}
