use super::buffer::MAX_BUFFER_SIZE;

/// Configuration for a [`SizeClassPool`](super::SizeClassPool).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Releases into one size class before a recalibration is attempted (default: 42000)
    pub calibrate_threshold: u64,

    /// Share of observed traffic the retain ceiling must cover (default: 0.95)
    pub max_percentile: f64,

    /// Hard ceiling for buffers created by the pool (default: 10MB)
    pub max_buffer_size: usize,

    /// Number of idle buffers the object cache can hold (default: 1024)
    pub cache_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            calibrate_threshold: 42_000,
            max_percentile: 0.95,
            max_buffer_size: MAX_BUFFER_SIZE,
            cache_capacity: 1024,
        }
    }
}

impl PoolConfig {
    /// Set the per-class call count that triggers calibration.
    pub fn calibrate_threshold(mut self, threshold: u64) -> Self {
        self.calibrate_threshold = threshold;
        self
    }

    /// Set the idle buffer capacity of the object cache.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Set the maximum size of buffers handed out by the pool.
    pub fn max_buffer_size(mut self, max: usize) -> Self {
        self.max_buffer_size = max;
        self
    }
}
