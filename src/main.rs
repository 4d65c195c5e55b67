use std::io::{self, Read};
use std::time::Instant;

use adaptive_buf::config::Config;
use adaptive_buf::pool::SizeClassPool;

use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration
    let config = Config::parse_args();

    // Initialize tracing
    let log_level = match config.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("adaptive-buf v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration: {} threads, {} iterations, payload {}+{} bytes, threshold={}",
        config.threads,
        config.iterations,
        config.payload_size,
        config.payload_spread,
        config.threshold
    );

    let pool = SizeClassPool::with_config(config.pool_config());
    let start = Instant::now();

    let failures: u64 = std::thread::scope(|s| {
        let workers: Vec<_> = (0..config.threads)
            .map(|worker| {
                let pool = &pool;
                let config = &config;
                s.spawn(move || run_worker(pool, config, worker))
            })
            .collect();

        workers
            .into_iter()
            .map(|w| w.join().unwrap_or(1))
            .sum()
    });

    let elapsed = start.elapsed();
    let cycles = config.threads as u64 * config.iterations;
    info!(
        "Completed {} cycles in {:?} ({:.0} cycles/s)",
        cycles,
        elapsed,
        cycles as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    if failures > 0 {
        warn!("{} cycles failed", failures);
    }

    for line in pool.stats().to_info_string().lines() {
        if !line.is_empty() {
            info!("{}", line);
        }
    }

    Ok(())
}

/// Acquire, fill, drain and release buffers; returns the number of failed cycles.
fn run_worker(pool: &SizeClassPool, config: &Config, worker: usize) -> u64 {
    let mut failures = 0;
    let mut sink = io::sink();

    for i in 0..config.iterations {
        let len = config.payload_len(worker, i);
        let mut buf = pool.acquire();

        let mut source = io::repeat(worker as u8).take(len as u64);
        let result = buf
            .fill_from(&mut source)
            .and_then(|_| buf.drain_to(&mut sink));
        if let Err(e) = result {
            tracing::debug!("Worker {} cycle {} failed: {}", worker, i, e);
            failures += 1;
        }

        pool.release(buf);
    }

    failures
}
