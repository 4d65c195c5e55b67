use clap::Parser;

use crate::pool::{PoolConfig, MAX_BUFFER_SIZE};

/// adaptive-buf - load driver for the self-tuning buffer pool
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Worker threads acquiring and releasing buffers
    #[arg(short, long, default_value = "4")]
    pub threads: usize,

    /// Acquire/fill/drain/release cycles per thread
    #[arg(short, long, default_value = "200000")]
    pub iterations: u64,

    /// Typical payload size in bytes
    #[arg(short, long, default_value = "200")]
    pub payload_size: usize,

    /// Payload sizes vary by up to this many bytes above the typical size
    #[arg(long, default_value = "50")]
    pub payload_spread: usize,

    /// Every Nth payload is oversized (0 disables)
    #[arg(long, default_value = "100")]
    pub outlier_every: u64,

    /// Size of oversized payloads in bytes
    #[arg(long, default_value = "65536")]
    pub outlier_size: usize,

    /// Releases per size class before recalibration
    #[arg(long, default_value = "42000")]
    pub threshold: u64,

    /// Idle buffers kept by the pool
    #[arg(long, default_value = "1024")]
    pub cache_capacity: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse_args() -> Self {
        Config::parse()
    }

    /// Pool settings derived from this configuration.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::default()
            .calibrate_threshold(self.threshold)
            .cache_capacity(self.cache_capacity)
            .max_buffer_size(MAX_BUFFER_SIZE)
    }

    /// Payload length for the `i`-th cycle of a worker.
    pub fn payload_len(&self, worker: usize, i: u64) -> usize {
        if self.outlier_every > 0 && i % self.outlier_every == self.outlier_every - 1 {
            return self.outlier_size;
        }
        let spread = self.payload_spread as u64 + 1;
        // Cheap deterministic scatter; distinct per worker
        let jitter = (i.wrapping_mul(2_654_435_761) ^ worker as u64) % spread;
        self.payload_size + jitter as usize
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threads: 4,
            iterations: 200_000,
            payload_size: 200,
            payload_spread: 50,
            outlier_every: 100,
            outlier_size: 65_536,
            threshold: 42_000,
            cache_capacity: 1024,
            log_level: "info".to_string(),
        }
    }
}
