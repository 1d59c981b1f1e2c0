//! Public error type for cache operations.

use thiserror::Error;

use crate::cache::CacheError;
use crate::remote::RemoteError;
use crate::upload::UploadError;

/// Errors returned by [`ImageCache`](super::ImageCache).
///
/// `Clone` so one coalesced result can be handed to every waiting caller;
/// underlying sources are flattened to their messages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImageCacheError {
    /// Filesystem write, delete, or metadata persistence failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Every network tier failed or timed out.
    #[error("Network error fetching {uri}: {message}")]
    Network { uri: String, message: String },

    /// No tier could produce the image.
    #[error("Image not found: {uri}")]
    NotFound { uri: String },

    /// Invalid configuration, detected at construction.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The upload collaborator failed.
    #[error("Upload error: {0}")]
    Upload(String),
}

impl ImageCacheError {
    /// Classify a remote failure for `uri`.
    pub fn from_remote(uri: &str, error: RemoteError) -> Self {
        match error {
            RemoteError::NoOrigin => Self::NotFound {
                uri: uri.to_string(),
            },
            e if e.is_not_found() => Self::NotFound {
                uri: uri.to_string(),
            },
            RemoteError::InvalidTemplate(template) => {
                Self::Config(format!("invalid CDN URL template: {}", template))
            }
            e => Self::Network {
                uri: uri.to_string(),
                message: e.to_string(),
            },
        }
    }

    /// Whether showing a retry affordance makes sense.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::NotFound { .. } | Self::Upload(_)
        )
    }
}

impl From<CacheError> for ImageCacheError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::Config(message) => Self::Config(message),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<UploadError> for ImageCacheError {
    fn from(e: UploadError) -> Self {
        Self::Upload(e.to_string())
    }
}
