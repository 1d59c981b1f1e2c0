//! HTTP client abstraction for testability.

use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use tracing::{debug, trace, warn};

use super::RemoteError;

/// Default request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// User-Agent sent with every request. Some CDNs reject anonymous clients.
const DEFAULT_USER_AGENT: &str = concat!("pixcache/", env!("CARGO_PKG_VERSION"));

/// Asynchronous HTTP GET.
///
/// Object safe so the resolver can hold any client behind an `Arc<dyn _>`;
/// tests inject a mock.
pub trait AsyncHttpClient: Send + Sync {
    /// Fetch `url`, treating any non-success status as an error.
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, RemoteError>>;
}

/// Async HTTP client implementation using reqwest.
#[derive(Clone)]
pub struct AsyncReqwestClient {
    client: reqwest::Client,
}

impl AsyncReqwestClient {
    /// Creates a client with the default timeout.
    pub fn new() -> Result<Self, RemoteError> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    /// Creates a client with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            // Image bursts hit the same CDN host; keep connections warm
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| RemoteError::Transport {
                url: String::new(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }
}

impl Default for AsyncReqwestClient {
    fn default() -> Self {
        Self::new().expect("Failed to create default async HTTP client")
    }
}

impl AsyncHttpClient for AsyncReqwestClient {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, RemoteError>> {
        Box::pin(async move {
            trace!(url = url, "HTTP GET request starting");

            let response = match self.client.get(url).send().await {
                Ok(resp) => {
                    debug!(
                        url = url,
                        status = resp.status().as_u16(),
                        "HTTP response received"
                    );
                    resp
                }
                Err(e) => {
                    warn!(
                        url = url,
                        error = %e,
                        is_connect = e.is_connect(),
                        is_timeout = e.is_timeout(),
                        "HTTP request failed"
                    );
                    return Err(transport_error(url, e));
                }
            };

            let status = response.status();
            if !status.is_success() {
                warn!(url = url, status = status.as_u16(), "HTTP error status");
                return Err(RemoteError::Http {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            match response.bytes().await {
                Ok(bytes) => {
                    trace!(url = url, bytes = bytes.len(), "HTTP response body read");
                    Ok(bytes)
                }
                Err(e) => {
                    warn!(url = url, error = %e, "Failed to read response body");
                    Err(transport_error(url, e))
                }
            }
        })
    }
}

fn transport_error(url: &str, e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout {
            url: url.to_string(),
        }
    } else {
        RemoteError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}
