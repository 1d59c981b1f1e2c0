//! Remote tier: HTTP client, CDN URL construction, and fallback resolution.

mod cdn;
pub(crate) mod http;
mod resolver;

use thiserror::Error;

pub use cdn::{CdnUrlResolver, TemplateCdnResolver, ID_PLACEHOLDER, VARIANT_PLACEHOLDER};
pub use http::{AsyncHttpClient, AsyncReqwestClient, DEFAULT_HTTP_TIMEOUT};
pub use resolver::{FetchSource, FetchedImage, ImageOrigin, RemoteResolver};

/// Network fetch failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    /// Connection, TLS, or body read failure.
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// No response within the configured timeout.
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    /// Neither a usable CDN id nor a raw URI was given.
    #[error("No origin to fetch from")]
    NoOrigin,

    /// CDN URL template lacks the `{id}` placeholder.
    #[error("CDN URL template must contain {{id}}: {0}")]
    InvalidTemplate(String),
}

impl RemoteError {
    /// Whether the server reported the image does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Http { status: 404 | 410, .. })
    }
}
