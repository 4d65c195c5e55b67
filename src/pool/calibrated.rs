//! Self-calibrating pool of [`DirectBuffer`]s.
//!
//! Every release is counted in one of four size classes. Once a class has
//! seen `calibrate_threshold` releases, one thread recomputes the default
//! allocation size (the busiest class) and the retain ceiling (the classes
//! covering 95% of releases). Buffers above the ceiling are dropped rather
//! than cached, so one oversized payload cannot pin memory in the pool.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;

use tracing::{debug, trace};

use super::buffer::DirectBuffer;
use super::cache::{BoundedCache, ObjectCache};
use super::config::PoolConfig;
use super::histogram::SizeHistogram;
use super::size_class::{self, STEPS};

/// Relaxed ordering for statistics counters.
const RELAXED: Ordering = Ordering::Relaxed;

/// Process-wide pool behind [`acquire`] and [`release`].
static DEFAULT_POOL: OnceLock<SizeClassPool> = OnceLock::new();

/// Get the process-wide pool.
pub fn default_pool() -> &'static SizeClassPool {
    DEFAULT_POOL.get_or_init(SizeClassPool::new)
}

/// Acquire a buffer from the process-wide pool.
#[inline]
pub fn acquire() -> DirectBuffer {
    default_pool().acquire()
}

/// Return a buffer to the process-wide pool.
#[inline]
pub fn release(buf: DirectBuffer) {
    default_pool().release(buf)
}

/// Size-class pool with periodic recalibration.
pub struct SizeClassPool<C = BoundedCache<DirectBuffer>> {
    histogram: SizeHistogram,
    calibrating: AtomicBool,

    default_size: AtomicUsize,
    max_retain_size: AtomicUsize,

    cache: C,
    config: PoolConfig,

    /// Statistics: acquires served from the cache.
    hits: AtomicU64,
    /// Statistics: acquires that allocated a new buffer.
    misses: AtomicU64,
    /// Statistics: releases kept by the cache.
    retained: AtomicU64,
    /// Statistics: releases dropped for exceeding the retain ceiling.
    discarded: AtomicU64,
    /// Statistics: releases the cache dropped because it was full.
    overflows: AtomicU64,
    /// Statistics: completed calibration passes.
    calibrations: AtomicU64,
}

impl SizeClassPool {
    /// Create a pool with default configuration.
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Create a pool backed by a [`BoundedCache`] sized from `config`.
    pub fn with_config(config: PoolConfig) -> Self {
        let cache = BoundedCache::new(config.cache_capacity);
        Self::with_cache(config, cache)
    }
}

impl Default for SizeClassPool {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ObjectCache<DirectBuffer>> SizeClassPool<C> {
    /// Create a pool on top of a caller-provided cache.
    pub fn with_cache(config: PoolConfig, cache: C) -> Self {
        Self {
            histogram: SizeHistogram::new(),
            calibrating: AtomicBool::new(false),
            default_size: AtomicUsize::new(0),
            max_retain_size: AtomicUsize::new(0),
            cache,
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            retained: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            overflows: AtomicU64::new(0),
            calibrations: AtomicU64::new(0),
        }
    }

    /// Get an empty buffer, reusing a cached one when available.
    ///
    /// New buffers are pre-sized to the current default size estimate.
    pub fn acquire(&self) -> DirectBuffer {
        if let Some(buf) = self.cache.get() {
            self.hits.fetch_add(1, RELAXED);
            return buf;
        }
        self.misses.fetch_add(1, RELAXED);
        DirectBuffer::with_limits(
            self.default_size.load(Ordering::Acquire),
            self.config.max_buffer_size,
        )
    }

    /// Return a buffer to the pool.
    ///
    /// The buffer's length is recorded in the histogram. It is then cleared
    /// and cached unless its capacity exceeds the retain ceiling or the
    /// pool's buffer size limit. Cached buffers take the pool's limit.
    pub fn release(&self, mut buf: DirectBuffer) {
        if self.histogram.record(buf.len()) > self.config.calibrate_threshold {
            self.calibrate();
        }

        let limit = self.config.max_buffer_size;
        if buf.capacity() > limit {
            trace!(
                "Discarding buffer with capacity {} (pool limit {})",
                buf.capacity(),
                limit
            );
            self.discarded.fetch_add(1, RELAXED);
            return;
        }

        let max = self.max_retain_size.load(Ordering::Acquire);
        if max == 0 || buf.capacity() <= max {
            buf.clear();
            buf.set_max_size(limit);
            if self.cache.put(buf) {
                self.retained.fetch_add(1, RELAXED);
            } else {
                self.overflows.fetch_add(1, RELAXED);
            }
        } else {
            trace!(
                "Discarding buffer with capacity {} (retain limit {})",
                buf.capacity(),
                max
            );
            self.discarded.fetch_add(1, RELAXED);
        }
    }

    /// Acquire a buffer that returns itself to this pool on drop.
    pub fn lease(&self) -> PooledBuffer<'_, C> {
        PooledBuffer {
            buf: self.acquire(),
            pool: Some(self),
        }
    }

    /// Recompute the size estimates from the histogram.
    ///
    /// Only one caller runs a pass at a time; concurrent callers return
    /// `false` immediately. A pass with no recorded releases keeps the
    /// previous estimates.
    pub fn calibrate(&self) -> bool {
        if self
            .calibrating
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }

        let calls: [u64; STEPS] = self.histogram.drain();
        if let Some(estimates) = size_class::estimate(&calls, self.config.max_percentile) {
            self.default_size
                .store(estimates.default_size, Ordering::Release);
            self.max_retain_size
                .store(estimates.max_retain_size, Ordering::Release);
            self.calibrations.fetch_add(1, RELAXED);
            debug!(
                "Pool calibrated: calls={:?} default_size={} max_retain_size={}",
                calls, estimates.default_size, estimates.max_retain_size
            );
        }

        self.calibrating.store(false, Ordering::Release);
        true
    }

    /// Capacity new buffers are allocated with (0 before the first calibration).
    #[inline]
    pub fn default_size(&self) -> usize {
        self.default_size.load(Ordering::Acquire)
    }

    /// Capacity above which released buffers are dropped (0 means no limit yet).
    #[inline]
    pub fn max_retain_size(&self) -> usize {
        self.max_retain_size.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// The underlying object cache.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Get pool statistics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            hits: self.hits.load(RELAXED),
            misses: self.misses.load(RELAXED),
            retained: self.retained.load(RELAXED),
            discarded: self.discarded.load(RELAXED),
            overflows: self.overflows.load(RELAXED),
            calibrations: self.calibrations.load(RELAXED),
            class_calls: self.histogram.counts(),
            default_size: self.default_size(),
            max_retain_size: self.max_retain_size(),
        }
    }
}

/// Pool statistics for monitoring.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    /// Buffers acquired from the cache.
    pub hits: u64,
    /// Buffers created new (cache misses).
    pub misses: u64,
    /// Buffers kept by the cache.
    pub retained: u64,
    /// Buffers dropped for exceeding the retain ceiling or size limit.
    pub discarded: u64,
    /// Buffers dropped because the cache was full.
    pub overflows: u64,
    /// Completed calibration passes.
    pub calibrations: u64,
    /// Releases per size class since the last calibration.
    pub class_calls: [u64; STEPS],
    pub default_size: usize,
    pub max_retain_size: usize,
}

impl PoolStats {
    /// Calculate hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Format as INFO-style `key:value` lines.
    pub fn to_info_string(&self) -> String {
        let mut out = String::with_capacity(512);

        out.push_str("# Pool\r\n");
        out.push_str(&format!("pool_hits:{}\r\n", self.hits));
        out.push_str(&format!("pool_misses:{}\r\n", self.misses));
        out.push_str(&format!("pool_hit_rate:{:.4}\r\n", self.hit_rate()));
        out.push_str(&format!("pool_retained:{}\r\n", self.retained));
        out.push_str(&format!("pool_discarded:{}\r\n", self.discarded));
        out.push_str(&format!("pool_overflows:{}\r\n", self.overflows));
        out.push_str("\r\n");

        out.push_str("# Calibration\r\n");
        out.push_str(&format!("calibrations:{}\r\n", self.calibrations));
        out.push_str(&format!("default_size:{}\r\n", self.default_size));
        out.push_str(&format!("max_retain_size:{}\r\n", self.max_retain_size));
        for (idx, calls) in self.class_calls.iter().enumerate() {
            out.push_str(&format!(
                "class_{}_calls:{}\r\n",
                size_class::class_size(idx),
                calls
            ));
        }
        out.push_str("\r\n");

        out
    }
}

/// RAII guard that returns its buffer to the pool on drop.
pub struct PooledBuffer<'a, C: ObjectCache<DirectBuffer> = BoundedCache<DirectBuffer>> {
    buf: DirectBuffer,
    pool: Option<&'a SizeClassPool<C>>,
}

impl<C: ObjectCache<DirectBuffer>> PooledBuffer<'_, C> {
    /// Take the buffer, preventing return to pool.
    pub fn into_inner(mut self) -> DirectBuffer {
        self.pool = None;
        std::mem::take(&mut self.buf)
    }
}

impl<C: ObjectCache<DirectBuffer>> std::ops::Deref for PooledBuffer<'_, C> {
    type Target = DirectBuffer;

    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl<C: ObjectCache<DirectBuffer>> std::ops::DerefMut for PooledBuffer<'_, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl<C: ObjectCache<DirectBuffer>> Drop for PooledBuffer<'_, C> {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release(std::mem::take(&mut self.buf));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::MAX_BUFFER_SIZE;
    use std::io::{self, Read};

    fn small_pool(threshold: u64) -> SizeClassPool {
        SizeClassPool::with_config(PoolConfig::default().calibrate_threshold(threshold))
    }

    fn filled(pool: &SizeClassPool, len: usize) -> DirectBuffer {
        let mut buf = pool.acquire();
        buf.fill_from(&mut io::repeat(0xAB).take(len as u64)).unwrap();
        buf
    }

    #[test]
    fn test_fresh_pool_allocates_empty() {
        let pool = SizeClassPool::new();
        let buf = pool.acquire();
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.capacity(), 0);
        assert_eq!(pool.default_size(), 0);
        assert_eq!(pool.max_retain_size(), 0);

        let stats = pool.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_release_then_acquire_reuses() {
        let pool = SizeClassPool::new();
        let buf = filled(&pool, 100);
        let cap = buf.capacity();
        pool.release(buf);

        let again = pool.acquire();
        assert_eq!(again.len(), 0);
        assert_eq!(again.capacity(), cap);

        let stats = pool.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.retained, 1);
    }

    #[test]
    fn test_no_calibration_below_threshold() {
        let pool = small_pool(10);
        for _ in 0..10 {
            let buf = filled(&pool, 200);
            pool.release(buf);
        }
        assert_eq!(pool.stats().calibrations, 0);
        assert_eq!(pool.stats().class_calls, [0, 0, 10, 0]);
        assert_eq!(pool.default_size(), 0);
    }

    #[test]
    fn test_calibration_converges_on_dominant_size() {
        let pool = small_pool(100);
        for _ in 0..101 {
            let buf = filled(&pool, 200);
            pool.release(buf);
        }

        assert_eq!(pool.stats().calibrations, 1);
        assert_eq!(pool.default_size(), 256);
        assert_eq!(pool.max_retain_size(), 256);
        // Counters restart after the pass
        assert_eq!(pool.stats().class_calls, [0; STEPS]);

        // Drain the cache so the next acquire allocates
        while pool.cache().get().is_some() {}
        let fresh = pool.acquire();
        assert!(fresh.capacity() >= 200);
        assert_eq!(fresh.len(), 0);
    }

    #[test]
    fn test_oversized_buffer_not_retained_after_calibration() {
        let pool = small_pool(50);
        for _ in 0..60 {
            let buf = filled(&pool, 100);
            pool.release(buf);
        }
        assert_eq!(pool.max_retain_size(), 128);
        while pool.cache().get().is_some() {}

        let mut huge = DirectBuffer::new();
        huge.append(&vec![0u8; 1 << 20]).unwrap();
        pool.release(huge);

        assert_eq!(pool.stats().discarded, 1);
        assert!(pool.cache().is_empty());
        assert_eq!(pool.acquire().capacity(), 128);
    }

    #[test]
    fn test_oversized_buffer_retained_before_calibration() {
        let pool = SizeClassPool::new();
        let mut big = DirectBuffer::new();
        big.append(&[1u8; 4096]).unwrap();
        pool.release(big);

        assert_eq!(pool.stats().discarded, 0);
        assert_eq!(pool.cache().len(), 1);
    }

    #[test]
    fn test_rare_large_releases_do_not_raise_ceiling() {
        let pool = small_pool(500);
        for i in 0..1001 {
            let len = if i % 50 == 0 { 400 } else { 100 };
            let buf = filled(&pool, len);
            pool.release(buf);
        }
        assert_eq!(pool.default_size(), 128);
        assert_eq!(pool.max_retain_size(), 128);
    }

    #[test]
    fn test_calibrate_without_traffic_keeps_estimates() {
        let pool = SizeClassPool::new();
        assert!(pool.calibrate());
        assert_eq!(pool.default_size(), 0);
        assert_eq!(pool.stats().calibrations, 0);
    }

    #[test]
    fn test_calibrate_skips_when_busy() {
        let pool = SizeClassPool::new();
        pool.calibrating.store(true, Ordering::Relaxed);
        assert!(!pool.calibrate());
        pool.calibrating.store(false, Ordering::Relaxed);
        assert!(pool.calibrate());
    }

    #[test]
    fn test_released_buffer_takes_pool_limit() {
        let pool = SizeClassPool::new();
        pool.release(DirectBuffer::with_limits(0, 64));

        let mut buf = pool.acquire();
        assert_eq!(buf.max_size(), pool.config().max_buffer_size);
        let added = buf.fill_from(&mut io::repeat(1).take(100)).unwrap();
        assert_eq!(added, 100);
        pool.release(buf);

        pool.release(DirectBuffer::with_limits(0, 1 << 30));
        while let Some(buf) = pool.cache().get() {
            assert_eq!(buf.max_size(), MAX_BUFFER_SIZE);
        }
    }

    #[test]
    fn test_buffer_above_pool_limit_discarded() {
        let pool = SizeClassPool::with_config(PoolConfig::default().max_buffer_size(1024));
        let mut big = DirectBuffer::new();
        big.append(&[0u8; 4096]).unwrap();
        pool.release(big);

        assert_eq!(pool.stats().discarded, 1);
        assert!(pool.cache().is_empty());

        let mut buf = pool.acquire();
        let err = buf.fill_from(&mut io::repeat(1)).unwrap_err();
        assert_eq!(err.partial_bytes(), 1024);
    }

    #[test]
    fn test_full_cache_counts_overflow() {
        let pool = SizeClassPool::with_config(PoolConfig::default().cache_capacity(1));
        pool.release(DirectBuffer::new());
        pool.release(DirectBuffer::new());

        let stats = pool.stats();
        assert_eq!(stats.retained, 1);
        assert_eq!(stats.overflows, 1);
        assert!(stats.to_info_string().contains("pool_overflows:1"));
    }

    #[test]
    fn test_lease_returns_on_drop() {
        let pool = SizeClassPool::new();
        {
            let mut buf = pool.lease();
            buf.append(b"test").unwrap();
        }
        assert_eq!(pool.cache().len(), 1);

        let buf = pool.acquire();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_lease_into_inner_detaches() {
        let pool = SizeClassPool::new();
        let mut lease = pool.lease();
        lease.append(b"keep").unwrap();
        let buf = lease.into_inner();

        assert_eq!(buf.as_bytes(), b"keep");
        assert!(pool.cache().is_empty());
        assert_eq!(pool.stats().retained, 0);
    }

    #[test]
    fn test_concurrent_acquire_release() {
        let pool = small_pool(1000);
        std::thread::scope(|s| {
            for t in 0..8 {
                let pool = &pool;
                s.spawn(move || {
                    for i in 0..2000 {
                        let len = 100 + (i + t) % 20;
                        let mut buf = pool.acquire();
                        assert!(buf.is_empty());
                        let mut src = io::repeat(t as u8).take(len as u64);
                        buf.fill_from(&mut src).unwrap();
                        assert_eq!(buf.len(), len);
                        assert!(buf.as_bytes().iter().all(|&b| b == t as u8));
                        pool.release(buf);
                    }
                });
            }
        });

        let stats = pool.stats();
        assert_eq!(stats.hits + stats.misses, 16_000);
        assert!(stats.calibrations >= 1);
        assert_eq!(pool.default_size(), 128);
        assert_eq!(pool.max_retain_size(), 128);
    }

    #[test]
    fn test_custom_cache() {
        struct NoCache;

        impl ObjectCache<DirectBuffer> for NoCache {
            fn get(&self) -> Option<DirectBuffer> {
                None
            }

            fn put(&self, _value: DirectBuffer) -> bool {
                false
            }
        }

        let pool = SizeClassPool::with_cache(PoolConfig::default(), NoCache);
        pool.release(DirectBuffer::with_capacity(64));
        assert_eq!(pool.acquire().capacity(), 0);
        assert_eq!(pool.stats().misses, 1);
    }

    #[test]
    fn test_default_pool_functions() {
        let buf = acquire();
        assert!(buf.is_empty());
        release(buf);
        assert!(std::ptr::eq(default_pool(), default_pool()));
    }

    #[test]
    fn test_info_string() {
        let pool = SizeClassPool::new();
        let buf = pool.acquire();
        pool.release(buf);

        let info = pool.stats().to_info_string();
        assert!(info.contains("# Pool"));
        assert!(info.contains("pool_misses:1"));
        assert!(info.contains("class_64_calls:1"));
    }

    #[test]
    fn test_hit_rate() {
        let stats = PoolStats {
            hits: 75,
            misses: 25,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < 0.001);
    }
}
