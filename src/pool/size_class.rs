//! Size classes and the calibration maths.
//!
//! Buffers are bucketed into `STEPS` power-of-two classes starting at
//! `MIN_SIZE`. A calibration pass turns per-class call counts into two
//! estimates: the size new buffers should be allocated with and the
//! largest capacity worth keeping around.

/// log2 of the smallest class anchor.
pub const MIN_BIT_SIZE: u32 = 6;

/// Number of size classes.
pub const STEPS: usize = 4;

/// Smallest class anchor (64 bytes).
pub const MIN_SIZE: usize = 1 << MIN_BIT_SIZE;

/// Largest class anchor (512 bytes).
pub const MAX_SIZE: usize = 1 << (MIN_BIT_SIZE as usize + STEPS - 1);

/// Map a byte length to the smallest class whose anchor covers it.
///
/// Lengths above the largest anchor land in the top class.
///
/// | length      | class |
/// |-------------|-------|
/// | 0..=64      | 0     |
/// | 65..=128    | 1     |
/// | 129..=256   | 2     |
/// | 257..       | 3     |
#[inline]
pub fn size_class_index(len: usize) -> usize {
    let mut n = len.saturating_sub(1) >> MIN_BIT_SIZE;
    let mut idx = 0;
    while n > 0 {
        n >>= 1;
        idx += 1;
    }
    idx.min(STEPS - 1)
}

/// Anchor size of class `idx`.
#[inline]
pub const fn class_size(idx: usize) -> usize {
    MIN_SIZE << idx
}

/// Pool size estimates produced by one calibration pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Estimates {
    /// Anchor of the most frequently released class
    pub default_size: usize,
    /// Largest anchor needed to cover the configured percentile
    pub max_retain_size: usize,
}

#[derive(Debug, Clone, Copy)]
struct ClassCalls {
    size: usize,
    calls: u64,
}

/// Compute new estimates from a snapshot of per-class call counts.
///
/// Returns `None` when nothing was observed.
pub fn estimate(calls: &[u64; STEPS], max_percentile: f64) -> Option<Estimates> {
    let total: u64 = calls.iter().sum();
    if total == 0 {
        return None;
    }

    let mut classes: [ClassCalls; STEPS] = std::array::from_fn(|i| ClassCalls {
        size: class_size(i),
        calls: calls[i],
    });
    // Stable: ties keep the smaller class first
    classes.sort_by(|a, b| b.calls.cmp(&a.calls));

    let default_size = classes[0].size;
    let mut max_retain_size = default_size;

    let max_sum = (total as f64 * max_percentile) as u64;
    let mut sum = 0u64;
    for class in &classes {
        if sum > max_sum {
            break;
        }
        sum += class.calls;
        max_retain_size = max_retain_size.max(class.size);
    }

    Some(Estimates {
        default_size,
        max_retain_size,
    })
}
