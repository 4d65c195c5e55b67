//! Object cache backing the size-class pool.
//!
//! The pool only needs "put one, get one" from its cache; any concurrent
//! container can sit behind [`ObjectCache`].

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Thread-safe cache of reusable objects.
pub trait ObjectCache<T>: Send + Sync {
    /// Take any cached object, or `None` if the cache is empty.
    fn get(&self) -> Option<T>;

    /// Offer an object back; returns `false` if the cache dropped it.
    fn put(&self, value: T) -> bool;
}

/// Lock-free fixed-capacity cache.
///
/// Values offered while the queue is full are dropped.
pub struct BoundedCache<T> {
    queue: ArrayQueue<T>,
    /// Statistics: values dropped because the queue was full.
    overflows: AtomicUsize,
}

impl<T> BoundedCache<T> {
    /// Create a cache holding at most `capacity` values.
    ///
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            overflows: AtomicUsize::new(0),
        }
    }

    /// Current number of cached values.
    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Values dropped on a full queue so far.
    pub fn overflows(&self) -> usize {
        self.overflows.load(Ordering::Relaxed)
    }
}

impl<T: Send> ObjectCache<T> for BoundedCache<T> {
    #[inline]
    fn get(&self) -> Option<T> {
        self.queue.pop()
    }

    #[inline]
    fn put(&self, value: T) -> bool {
        if self.queue.push(value).is_err() {
            self.overflows.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        true
    }
}
