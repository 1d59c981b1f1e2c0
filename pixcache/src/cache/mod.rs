//! Cache tiers and their bookkeeping.
//!
//! Provides the memory and disk tiers, the persisted metadata index they
//! share, budget and TTL enforcement, request coalescing, and statistics.
//! [`crate::service`] composes these into the public cache.

mod coalesce;
mod disk;
mod eviction;
mod key;
mod kv;
mod memory;
mod metadata;
mod stats;
mod types;

pub use coalesce::{LeaderGuard, Registration, RequestCoalescer};
pub use disk::DiskTier;
pub use eviction::{EvictionManager, EvictionResult};
pub use key::{CacheKey, KeyDeriver, KEY_LENGTH};
pub use kv::{FileKeyValueStore, InMemoryKeyValueStore, KeyValueStore};
pub use memory::MemoryTier;
pub use metadata::{MetadataStore, METADATA_STORE_KEY};
pub use stats::{CacheCounters, CacheStats, PersistedCounters, STATS_STORE_KEY};
pub use types::{CacheEntry, CacheError};
