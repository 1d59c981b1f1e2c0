//! Request coalescing for cache fills.
//!
//! When several callers ask for the same uncached key at once, only the
//! first (the leader) resolves it; the rest subscribe and receive the
//! leader's result.
//!
//! ```text
//! getImage A ─┐
//!             │                            leader
//! getImage B ─┼──► RequestCoalescer ─────► resolve ──► disk + memory
//!             │        │                      │
//! getImage C ─┘        ▼                      ▼
//!               [B, C subscribe]  ◄──── broadcast result
//! ```
//!
//! The same in-flight entry doubles as the per-key write lock: no two
//! writers ever touch the same file path at once.
//!
//! If the leader is dropped before completing (its future was cancelled),
//! the channel closes without a value. Followers observe the closure and
//! register again, so one of them takes over as leader.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::cache::key::CacheKey;

/// Outcome of [`RequestCoalescer::register`].
pub enum Registration<'a, T: Clone> {
    /// First caller for the key; must resolve and call [`LeaderGuard::complete`].
    Leader(LeaderGuard<'a, T>),
    /// Another caller is resolving; wait on the receiver.
    Follower(broadcast::Receiver<T>),
}

/// Tracks in-flight resolutions keyed by [`CacheKey`].
pub struct RequestCoalescer<T: Clone> {
    in_flight: Mutex<HashMap<CacheKey, broadcast::Sender<T>>>,
}

impl<T: Clone> RequestCoalescer<T> {
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Join or start the resolution for `key`.
    pub fn register(&self, key: &CacheKey) -> Registration<'_, T> {
        let mut in_flight = self.in_flight.lock();

        if let Some(tx) = in_flight.get(key) {
            debug!(key = %key, "Coalescing request onto in-flight fetch");
            return Registration::Follower(tx.subscribe());
        }

        // Typical fan-in is a handful of callers; every follower gets one value
        let (tx, _rx) = broadcast::channel(1);
        in_flight.insert(key.clone(), tx);
        Registration::Leader(LeaderGuard {
            coalescer: self,
            key: key.clone(),
            completed: false,
        })
    }

    /// Number of keys currently being resolved.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Whether `key` is currently being resolved.
    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.in_flight.lock().contains_key(key)
    }
}

impl<T: Clone> Default for RequestCoalescer<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Held by the leader for one key. Releases the key when dropped.
pub struct LeaderGuard<'a, T: Clone> {
    coalescer: &'a RequestCoalescer<T>,
    key: CacheKey,
    completed: bool,
}

impl<T: Clone> LeaderGuard<'_, T> {
    /// Broadcast the result to every follower and release the key.
    pub fn complete(mut self, value: T) {
        let sender = self.coalescer.in_flight.lock().remove(&self.key);
        self.completed = true;

        if let Some(tx) = sender {
            let waiters = tx.receiver_count();
            // Receivers may have gone away; nothing to do then
            let _ = tx.send(value);
            if waiters > 0 {
                debug!(key = %self.key, waiters = waiters, "Broadcast result to coalesced waiters");
            }
        }
    }
}

impl<T: Clone> Drop for LeaderGuard<'_, T> {
    fn drop(&mut self) {
        if !self.completed {
            // Dropping the sender closes every follower's receiver
            self.coalescer.in_flight.lock().remove(&self.key);
            debug!(key = %self.key, "Leader abandoned in-flight fetch");
        }
    }
}
