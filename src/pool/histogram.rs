//! Lock-free release histogram over the pool's size classes.

use std::sync::atomic::{AtomicU64, Ordering};

use super::size_class::{size_class_index, STEPS};

/// Per-class release counts since the last calibration.
pub struct SizeHistogram {
    calls: [AtomicU64; STEPS],
}

impl SizeHistogram {
    /// Create a new empty histogram.
    pub const fn new() -> Self {
        Self {
            calls: [
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
            ],
        }
    }

    /// Record a buffer of `len` bytes; returns the updated count of its class.
    #[inline]
    pub fn record(&self, len: usize) -> u64 {
        let idx = size_class_index(len);
        self.calls[idx].fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Take the current counts, zeroing each class.
    pub fn drain(&self) -> [u64; STEPS] {
        std::array::from_fn(|i| self.calls[i].swap(0, Ordering::Relaxed))
    }

    /// Current counts without resetting.
    pub fn counts(&self) -> [u64; STEPS] {
        std::array::from_fn(|i| self.calls[i].load(Ordering::Relaxed))
    }

    /// Total releases recorded since the last drain.
    pub fn total(&self) -> u64 {
        self.counts().iter().sum()
    }
}

impl Default for SizeHistogram {
    fn default() -> Self {
        Self::new()
    }
}
