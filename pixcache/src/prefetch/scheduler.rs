//! Bounded background worker pool for prefetch requests.
//!
//! A single dispatcher task waits for a free permit on a semaphore sized to
//! `max_concurrent`, pops the next request from the priority queue, and
//! spawns it. Each worker holds its permit until the request finishes, so a
//! finished worker immediately frees a slot for the next queued item.
//!
//! ```text
//! enqueue ──► PrefetchQueue ──► dispatcher ──► [worker × max_concurrent]
//!    │            (heap)          │ permit         │
//!    └── dedup ◄──────────────────┘                └──► PrefetchOutcome (broadcast)
//! ```
//!
//! Failures never propagate: each finished item is reported on the outcome
//! channel and counted in [`PrefetchStats`], then the pool moves on.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashSet;
use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use super::queue::{PrefetchQueue, QueuedPrefetch};
use super::{PrefetchOutcome, PrefetchPriority, PrefetchRequest, PrefetchResult, PrefetchTarget};
use crate::cache::CacheKey;

/// Capacity of the outcome broadcast channel. Slow subscribers lag, never block.
const OUTCOME_CHANNEL_CAPACITY: usize = 256;

/// Prefetch scheduler statistics for monitoring.
#[derive(Debug, Default)]
pub struct PrefetchStats {
    /// Requests accepted into the queue.
    pub queued: AtomicU64,
    /// Requests resolved successfully.
    pub completed: AtomicU64,
    /// Requests that failed.
    pub failed: AtomicU64,
    /// Requests skipped as already resolved, queued, or in flight.
    pub deduplicated: AtomicU64,
    /// Queued requests dropped by `clear()` or shutdown.
    pub dropped: AtomicU64,
}

impl PrefetchStats {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self) -> PrefetchStatsSnapshot {
        PrefetchStatsSnapshot {
            queued: self.queued.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of prefetch statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchStatsSnapshot {
    pub queued: u64,
    pub completed: u64,
    pub failed: u64,
    pub deduplicated: u64,
    pub dropped: u64,
}

/// State shared between the handle, the dispatcher, and workers.
struct Shared<T: PrefetchTarget> {
    target: Arc<T>,
    queue: Mutex<PrefetchQueue>,
    /// Keys queued or in flight.
    tracked: DashSet<CacheKey>,
    /// Workers currently running. Only changed while holding `queue`.
    in_flight: AtomicUsize,
    permits: Arc<Semaphore>,
    /// Wakes the dispatcher when work arrives.
    work_available: Notify,
    /// Wakes `wait_idle` callers when the pool drains.
    idle: Notify,
    stats: PrefetchStats,
    outcomes: broadcast::Sender<PrefetchOutcome>,
    shutdown: CancellationToken,
    workers: TaskTracker,
}

impl<T: PrefetchTarget> Shared<T> {
    fn is_idle(&self) -> bool {
        let queue = self.queue.lock();
        queue.is_empty() && self.in_flight.load(Ordering::SeqCst) == 0
    }

    /// Pop the next item and count it as in flight in one step.
    fn take_next(&self) -> Option<QueuedPrefetch> {
        let mut queue = self.queue.lock();
        let item = queue.pop()?;
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Some(item)
    }

    fn signal_if_idle(&self) {
        if self.is_idle() {
            self.idle.notify_waiters();
        }
    }

    async fn run(&self, item: QueuedPrefetch) {
        let QueuedPrefetch {
            priority, request, ..
        } = item;
        let key = request.key.clone();
        let uri = request.origin.raw_uri.clone();

        trace!(key = %key, uri = %uri, ?priority, "Prefetch starting");
        let result = match self.target.resolve(request).await {
            Ok(()) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, uri = %uri, "Prefetch completed");
                PrefetchResult::Completed
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, uri = %uri, error = %e, "Prefetch failed");
                PrefetchResult::Failed(e.to_string())
            }
        };

        // No subscribers is fine
        let _ = self.outcomes.send(PrefetchOutcome {
            key: key.clone(),
            uri,
            priority,
            result,
        });

        self.tracked.remove(&key);
        {
            let _queue = self.queue.lock();
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        self.signal_if_idle();
    }

    fn drop_queued(&self) -> usize {
        let drained = self.queue.lock().drain();
        for item in &drained {
            self.tracked.remove(&item.request.key);
        }
        self.stats
            .dropped
            .fetch_add(drained.len() as u64, Ordering::Relaxed);
        drained.len()
    }
}

/// Priority queue plus bounded worker pool.
///
/// Must be created inside a Tokio runtime: construction spawns the
/// dispatcher task. Dropping the scheduler stops dispatching; in-flight
/// workers run to completion.
pub struct PrefetchScheduler<T: PrefetchTarget> {
    shared: Arc<Shared<T>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    max_concurrent: usize,
}

impl<T: PrefetchTarget> PrefetchScheduler<T> {
    /// Start a scheduler running at most `max_concurrent` requests at once.
    ///
    /// A `max_concurrent` of zero is treated as one.
    pub fn new(target: Arc<T>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        let (outcomes, _) = broadcast::channel(OUTCOME_CHANNEL_CAPACITY);

        let shared = Arc::new(Shared {
            target,
            queue: Mutex::new(PrefetchQueue::new()),
            tracked: DashSet::new(),
            in_flight: AtomicUsize::new(0),
            permits: Arc::new(Semaphore::new(max_concurrent)),
            work_available: Notify::new(),
            idle: Notify::new(),
            stats: PrefetchStats::default(),
            outcomes,
            shutdown: CancellationToken::new(),
            workers: TaskTracker::new(),
        });

        let dispatcher = tokio::spawn(dispatch(Arc::clone(&shared)));
        debug!(max_concurrent = max_concurrent, "Prefetch scheduler started");

        Self {
            shared,
            dispatcher: Mutex::new(Some(dispatcher)),
            max_concurrent,
        }
    }

    /// Queue requests at `priority`. Returns how many were actually queued.
    ///
    /// Requests whose key is already resolved, queued, or in flight are
    /// skipped. Never blocks on network or disk.
    pub fn enqueue(
        &self,
        requests: impl IntoIterator<Item = PrefetchRequest>,
        priority: PrefetchPriority,
    ) -> usize {
        if self.shared.shutdown.is_cancelled() {
            return 0;
        }

        let mut queued = 0;
        let mut skipped = 0;
        for request in requests {
            if self.shared.target.is_resolved(&request.key) {
                skipped += 1;
                continue;
            }
            if !self.shared.tracked.insert(request.key.clone()) {
                skipped += 1;
                continue;
            }
            self.shared.queue.lock().push(priority, request);
            queued += 1;
        }

        self.shared
            .stats
            .queued
            .fetch_add(queued as u64, Ordering::Relaxed);
        self.shared
            .stats
            .deduplicated
            .fetch_add(skipped as u64, Ordering::Relaxed);

        if queued > 0 {
            trace!(queued = queued, skipped = skipped, ?priority, "Prefetch requests queued");
            self.shared.work_available.notify_one();
        }
        queued
    }

    /// Drop every queued request. In-flight requests are left to finish.
    ///
    /// Returns the number of requests dropped.
    pub fn clear(&self) -> usize {
        let dropped = self.shared.drop_queued();
        if dropped > 0 {
            debug!(dropped = dropped, "Prefetch queue cleared");
        }
        self.shared.signal_if_idle();
        dropped
    }

    /// Requests waiting for a worker.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Requests currently running.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    /// Worker pool size.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Whether `key` is queued or in flight.
    pub fn is_tracked(&self, key: &CacheKey) -> bool {
        self.shared.tracked.contains(key)
    }

    /// Subscribe to per-request outcomes.
    pub fn subscribe(&self) -> broadcast::Receiver<PrefetchOutcome> {
        self.shared.outcomes.subscribe()
    }

    /// Shared statistics.
    pub fn stats(&self) -> &PrefetchStats {
        &self.shared.stats
    }

    /// Wait until the queue is empty and no worker is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shared.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Stop dispatching, drop queued requests, and wait for in-flight workers.
    pub async fn shutdown(&self) {
        self.shared.shutdown.cancel();
        let dropped = self.shared.drop_queued();

        let dispatcher = self.dispatcher.lock().take();
        if let Some(handle) = dispatcher {
            let _ = handle.await;
        }

        self.shared.workers.close();
        self.shared.workers.wait().await;
        self.shared.signal_if_idle();

        info!(
            dropped = dropped,
            completed = self.shared.stats.completed.load(Ordering::Relaxed),
            failed = self.shared.stats.failed.load(Ordering::Relaxed),
            "Prefetch scheduler stopped"
        );
    }
}

impl<T: PrefetchTarget> Drop for PrefetchScheduler<T> {
    fn drop(&mut self) {
        // Breaks the dispatcher's reference cycle through `shared`
        self.shared.shutdown.cancel();
    }
}

/// Dispatcher loop: one permit, one item, one worker.
async fn dispatch<T: PrefetchTarget>(shared: Arc<Shared<T>>) {
    loop {
        let permit = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            permit = Arc::clone(&shared.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let item = loop {
            let notified = shared.work_available.notified();
            if let Some(item) = shared.take_next() {
                break Some(item);
            }
            tokio::select! {
                _ = shared.shutdown.cancelled() => break None,
                _ = notified => {}
            }
        };
        let Some(item) = item else {
            break;
        };

        let worker = Arc::clone(&shared);
        shared.workers.spawn(async move {
            worker.run(item).await;
            drop(permit);
        });
    }

    trace!("Prefetch dispatcher exiting");
}
