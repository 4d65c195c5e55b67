pub mod config;
pub mod error;
pub mod pool;

pub use config::Config;
pub use error::{Error, Result};
pub use pool::{
    acquire, default_pool, release, DirectBuffer, ObjectCache, PoolConfig, PooledBuffer,
    SizeClassPool,
};
