use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};

use crate::telemetry;
use crate::telemetry::tags;

/// A bounded, thread-safe free list of reusable objects.
///
/// Objects are handed out with [`ObjectCache::acquire_or`] and returned
/// explicitly with [`ObjectCache::recycle`]. The pool uses it to keep the
/// hand-off slots of exited workers around for the next worker it spawns.
///
/// # Example
/// ```
/// use corral_core::ObjectCache;
///
/// let cache = ObjectCache::new(4);
/// let slot = cache.acquire_or(|| vec![0u8; 16]);
/// assert!(cache.recycle(slot));
/// assert_eq!(cache.len(), 1);
/// ```
#[derive(Debug)]
pub struct ObjectCache<T> {
    recycler: Sender<T>,
    receiver: Receiver<T>,
    max_objects: usize,
    metrics: CacheMetricsInner,
}

impl<T> ObjectCache<T> {
    /// Creates a cache that retains at most `max_objects` objects.
    pub fn new(max_objects: usize) -> Self {
        let (tx, rx) = bounded(max_objects);
        Self {
            recycler: tx,
            receiver: rx,
            max_objects,
            metrics: CacheMetricsInner::default(),
        }
    }

    /// Takes a cached object, or builds a fresh one with `make` when the cache is empty.
    pub fn acquire_or(&self, make: impl FnOnce() -> T) -> T {
        match self.receiver.try_recv() {
            Ok(object) => {
                self.metrics.recycled.fetch_add(1, Ordering::Relaxed);
                telemetry::count(tags::METRIC_CACHE_ACQUIRE_RECYCLED_COUNT, 1);
                object
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                self.metrics.created.fetch_add(1, Ordering::Relaxed);
                telemetry::count(tags::METRIC_CACHE_ACQUIRE_CREATED_COUNT, 1);
                make()
            }
        }
    }

    /// Returns an object to the cache. Returns `false` if the cache was full
    /// and the object was dropped instead.
    pub fn recycle(&self, object: T) -> bool {
        match self.recycler.try_send(object) {
            Ok(()) => {
                telemetry::count(tags::METRIC_CACHE_RECYCLE_OK_COUNT, 1);
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                telemetry::count(tags::METRIC_CACHE_RECYCLE_DROPPED_COUNT, 1);
                false
            }
        }
    }

    /// Drops every cached object and returns how many were discarded.
    pub fn clear(&self) -> usize {
        let discarded = self.receiver.try_iter().count();
        if discarded > 0 {
            tracing::debug!(target: tags::TARGET_CACHE, discarded, "object cache cleared");
        }
        discarded
    }

    /// Number of objects currently cached.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Maximum number of objects the cache retains.
    pub fn max_objects(&self) -> usize {
        self.max_objects
    }

    /// Returns a snapshot of the current cache metrics.
    pub fn metrics(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            created: self.metrics.created.load(Ordering::Relaxed),
            recycled: self.metrics.recycled.load(Ordering::Relaxed),
            dropped: self.metrics.dropped.load(Ordering::Relaxed),
        }
    }
}

/// A snapshot of object cache metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheMetricsSnapshot {
    /// Objects built because the cache was empty
    pub created: usize,
    /// Objects served from the cache
    pub recycled: usize,
    /// Objects dropped on return because the cache was full
    pub dropped: usize,
}

#[derive(Debug, Default)]
struct CacheMetricsInner {
    created: AtomicUsize,
    recycled: AtomicUsize,
    dropped: AtomicUsize,
}
