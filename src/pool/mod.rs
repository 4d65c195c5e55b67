//! Buffer pooling for reducing allocation overhead.
//!
//! [`DirectBuffer`] is a growable byte buffer with a hard ceiling.
//! [`SizeClassPool`] hands those buffers out and takes them back, tuning
//! the size of new buffers and which returned buffers are worth keeping
//! from a histogram of observed sizes.

mod buffer;
mod cache;
mod calibrated;
mod config;
mod histogram;
pub mod size_class;

pub use buffer::{DirectBuffer, MAX_BUFFER_SIZE, MIN_CAPACITY, READ_WINDOW};
pub use cache::{BoundedCache, ObjectCache};
pub use calibrated::{acquire, default_pool, release, PoolStats, PooledBuffer, SizeClassPool};
pub use config::PoolConfig;
pub use histogram::SizeHistogram;
