//! Upload collaborator interface.
//!
//! Turning raw bytes into a CDN object is owned outside the cache. The cache
//! only consumes the identifier the upload returns, then resolves and caches
//! that identifier's variants.

use std::collections::HashMap;

use bytes::Bytes;
use futures::future::BoxFuture;
use thiserror::Error;

/// Metadata passed through to the upload service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadMetadata {
    /// Original filename, if known.
    pub filename: Option<String>,
    /// MIME type, if known.
    pub content_type: Option<String>,
    /// Free-form key/value pairs stored alongside the object.
    pub attributes: HashMap<String, String>,
}

impl UploadMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// What the upload service hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    /// CDN identifier of the new object.
    pub id: String,
    /// Delivery URL of the default variant.
    pub default_variant_url: String,
}

/// Upload failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("Upload rejected: {0}")]
    Rejected(String),

    #[error("Upload failed: {0}")]
    Failed(String),

    #[error("No upload service configured")]
    NotConfigured,
}

/// External upload collaborator.
pub trait UploadService: Send + Sync {
    fn upload<'a>(
        &'a self,
        data: Bytes,
        metadata: &'a UploadMetadata,
    ) -> BoxFuture<'a, Result<UploadedImage, UploadError>>;
}

/// Placeholder used when no upload service is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUploadService;

impl UploadService for NoUploadService {
    fn upload<'a>(
        &'a self,
        _data: Bytes,
        _metadata: &'a UploadMetadata,
    ) -> BoxFuture<'a, Result<UploadedImage, UploadError>> {
        Box::pin(async { Err(UploadError::NotConfigured) })
    }
}
