//! Background prefetching of images the caller is likely to need next.
//!
//! Requests flow through the same resolution path as on-demand lookups but
//! never block a caller and run under a hard concurrency cap, so prefetching
//! cannot starve foreground requests.
//!
//! The scheduler is generic over a [`PrefetchTarget`]: anything that can say
//! whether a key is already resolved and resolve it. The cache core is the
//! production target; tests use lightweight mocks.

mod queue;
mod scheduler;

use std::fmt;

use futures::future::BoxFuture;

use crate::cache::CacheKey;
use crate::remote::ImageOrigin;

pub use queue::{PrefetchQueue, QueuedPrefetch};
pub use scheduler::{PrefetchScheduler, PrefetchStats, PrefetchStatsSnapshot};

/// Prefetch urgency. Higher variants are dispatched first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum PrefetchPriority {
    Low,
    #[default]
    Normal,
    High,
}

impl fmt::Display for PrefetchPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
        }
    }
}

/// One image to prefetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchRequest {
    pub key: CacheKey,
    pub origin: ImageOrigin,
}

impl PrefetchRequest {
    pub fn new(key: CacheKey, origin: ImageOrigin) -> Self {
        Self { key, origin }
    }
}

/// How a prefetch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefetchResult {
    Completed,
    /// Resolution failed; the key stays unresolved for a later on-demand lookup.
    Failed(String),
}

/// Emitted once per finished prefetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchOutcome {
    pub key: CacheKey,
    pub uri: String,
    pub priority: PrefetchPriority,
    pub result: PrefetchResult,
}

impl PrefetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.result, PrefetchResult::Completed)
    }
}

/// What the scheduler drives requests through.
pub trait PrefetchTarget: Send + Sync + 'static {
    type Error: fmt::Display + Send;

    /// Whether `key` is already cached and needs no prefetch.
    fn is_resolved(&self, key: &CacheKey) -> bool;

    /// Resolve one request through the normal lookup path.
    fn resolve(&self, request: PrefetchRequest) -> BoxFuture<'_, Result<(), Self::Error>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(PrefetchPriority::High > PrefetchPriority::Normal);
        assert!(PrefetchPriority::Normal > PrefetchPriority::Low);
        assert_eq!(PrefetchPriority::default(), PrefetchPriority::Normal);
    }

    #[test]
    fn test_priority_display() {
        assert_eq!(PrefetchPriority::Low.to_string(), "low");
        assert_eq!(PrefetchPriority::High.to_string(), "high");
    }
}
