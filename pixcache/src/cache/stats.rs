//! Cache statistics tracking and reporting.
//!
//! [`CacheCounters`] holds the cumulative request counters as atomics so the
//! hot path never locks. [`CacheStats`] is a point-in-time snapshot that
//! combines those counters with tier sizes read on demand.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Store key under which counters are persisted.
pub const STATS_STORE_KEY: &str = "pixcache.stats.v1";

/// Cumulative request counters.
#[derive(Debug, Default)]
pub struct CacheCounters {
    total_requests: AtomicU64,
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    remote_hits: AtomicU64,
    misses: AtomicU64,
    coalesced_requests: AtomicU64,
}

/// Serialized form of [`CacheCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedCounters {
    pub total_requests: u64,
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub remote_hits: u64,
    pub misses: u64,
    pub coalesced_requests: u64,
}

impl CacheCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an incoming request.
    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a memory tier hit.
    pub fn record_memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a disk tier hit.
    pub fn record_disk_hit(&self) {
        self.disk_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful remote fill.
    pub fn record_remote_hit(&self) {
        self.remote_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request no tier could satisfy.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request that waited on another caller's fetch.
    pub fn record_coalesced(&self) {
        self.coalesced_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counter values.
    pub fn persisted(&self) -> PersistedCounters {
        PersistedCounters {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            remote_hits: self.remote_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced_requests: self.coalesced_requests.load(Ordering::Relaxed),
        }
    }

    /// Add previously persisted values onto the live counters.
    pub fn restore(&self, saved: &PersistedCounters) {
        self.total_requests
            .fetch_add(saved.total_requests, Ordering::Relaxed);
        self.memory_hits.fetch_add(saved.memory_hits, Ordering::Relaxed);
        self.disk_hits.fetch_add(saved.disk_hits, Ordering::Relaxed);
        self.remote_hits.fetch_add(saved.remote_hits, Ordering::Relaxed);
        self.misses.fetch_add(saved.misses, Ordering::Relaxed);
        self.coalesced_requests
            .fetch_add(saved.coalesced_requests, Ordering::Relaxed);
    }

    /// Zero every counter.
    pub fn reset(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.memory_hits.store(0, Ordering::Relaxed);
        self.disk_hits.store(0, Ordering::Relaxed);
        self.remote_hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.coalesced_requests.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_requests: u64,
    pub memory_hits: u64,
    pub disk_hits: u64,
    /// Successful remote fills
    pub remote_hits: u64,
    /// Requests that exhausted every tier
    pub misses: u64,
    pub coalesced_requests: u64,
    pub memory_bytes: u64,
    pub memory_entries: usize,
    pub disk_bytes: u64,
    pub disk_entries: usize,
    /// Disk entries removed by budget eviction or expiry
    pub evictions: u64,
}

impl CacheStats {
    /// Build a snapshot from counters plus current tier figures.
    pub fn from_counters(counters: &PersistedCounters) -> Self {
        Self {
            total_requests: counters.total_requests,
            memory_hits: counters.memory_hits,
            disk_hits: counters.disk_hits,
            remote_hits: counters.remote_hits,
            misses: counters.misses,
            coalesced_requests: counters.coalesced_requests,
            ..Default::default()
        }
    }

    /// Fraction of requests served locally (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            (self.memory_hits + self.disk_hits) as f64 / self.total_requests as f64
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Requests:        {}", self.total_requests)?;
        writeln!(
            f,
            "  Memory hits:   {}\n  Disk hits:     {}\n  Remote fills:  {}\n  Misses:        {}\n  Coalesced:     {}",
            self.memory_hits, self.disk_hits, self.remote_hits, self.misses, self.coalesced_requests
        )?;
        writeln!(f, "Hit rate:        {:.1}%", self.hit_rate() * 100.0)?;
        writeln!(
            f,
            "Memory tier:     {} entries, {}",
            self.memory_entries,
            crate::config::format_size(self.memory_bytes)
        )?;
        writeln!(
            f,
            "Disk tier:       {} entries, {}",
            self.disk_entries,
            crate::config::format_size(self.disk_bytes)
        )?;
        write!(f, "Evictions:       {}", self.evictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let counters = CacheCounters::new();
        assert_eq!(counters.persisted(), PersistedCounters::default());
    }

    #[test]
    fn test_record_methods() {
        let counters = CacheCounters::new();
        counters.record_request();
        counters.record_request();
        counters.record_memory_hit();
        counters.record_disk_hit();
        counters.record_remote_hit();
        counters.record_miss();
        counters.record_coalesced();

        let snapshot = counters.persisted();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.memory_hits, 1);
        assert_eq!(snapshot.disk_hits, 1);
        assert_eq!(snapshot.remote_hits, 1);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.coalesced_requests, 1);
    }

    #[test]
    fn test_restore_adds_to_live_values() {
        let counters = CacheCounters::new();
        counters.record_request();

        counters.restore(&PersistedCounters {
            total_requests: 10,
            memory_hits: 4,
            ..Default::default()
        });

        assert_eq!(counters.persisted().total_requests, 11);
        assert_eq!(counters.persisted().memory_hits, 4);
    }

    #[test]
    fn test_reset() {
        let counters = CacheCounters::new();
        counters.record_request();
        counters.record_miss();
        counters.reset();
        assert_eq!(counters.persisted(), PersistedCounters::default());
    }

    #[test]
    fn test_persisted_counters_tolerate_missing_fields() {
        let parsed: PersistedCounters = serde_json::from_str(r#"{"totalRequests": 5}"#).unwrap();
        assert_eq!(parsed.total_requests, 5);
        assert_eq!(parsed.misses, 0);
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            total_requests: 10,
            memory_hits: 3,
            disk_hits: 2,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.5).abs() < 0.001);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_display_mentions_tiers() {
        let stats = CacheStats {
            disk_entries: 2,
            disk_bytes: 2048,
            ..Default::default()
        };
        let text = stats.to_string();
        assert!(text.contains("Disk tier:       2 entries"));
        assert!(text.contains("Hit rate"));
    }
}
