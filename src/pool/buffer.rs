//! Growable byte buffer with a hard size ceiling.
//!
//! Reads grow the backing store by doubling, starting at 64 bytes, so a
//! fill of `n` bytes costs O(log n) reallocations. Growth past the
//! buffer's maximum size is reported instead of truncating or growing
//! without bound.

use bytes::{Bytes, BytesMut};
use std::fmt;
use std::io::{self, Read, Write};

use crate::error::{Error, Result};

/// Default hard ceiling for a single buffer.
pub const MAX_BUFFER_SIZE: usize = 10 * 1024 * 1024;

/// Capacity allocated by the first growth of an empty buffer.
pub const MIN_CAPACITY: usize = 64;

/// Most tail bytes zeroed ahead of a single read.
pub const READ_WINDOW: usize = 8192;

/// Owned, resizable byte store with doubling growth.
///
/// `len() <= capacity() <= max_size()` holds after every operation.
pub struct DirectBuffer {
    data: BytesMut,
    max_size: usize,
}

impl DirectBuffer {
    /// Create an empty buffer with no backing store.
    pub fn new() -> Self {
        Self {
            data: BytesMut::new(),
            max_size: MAX_BUFFER_SIZE,
        }
    }

    /// Create an empty buffer pre-sized to `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_limits(capacity, MAX_BUFFER_SIZE)
    }

    /// Create an empty buffer pre-sized to `capacity` with a custom ceiling.
    ///
    /// The initial capacity is clamped to `max_size`.
    pub fn with_limits(capacity: usize, max_size: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity.min(max_size)),
            max_size,
        }
    }

    /// Read from `src` into the tail until end-of-data.
    ///
    /// Returns the number of bytes added by this call. On failure the bytes
    /// read so far stay in the buffer and their count is carried by the
    /// error.
    pub fn fill_from<R: Read + ?Sized>(&mut self, src: &mut R) -> Result<usize> {
        let start = self.data.len();
        let mut n = start;
        let mut cap = self.data.capacity();

        if cap == 0 {
            cap = MIN_CAPACITY;
            if cap > self.max_size {
                return Err(Error::CapacityExceeded {
                    added: 0,
                    max: self.max_size,
                });
            }
            self.data = BytesMut::with_capacity(cap);
        }

        loop {
            if n == cap {
                cap *= 2;
                if cap > self.max_size {
                    tracing::debug!(
                        "Buffer ceiling reached at {} bytes (limit {})",
                        n,
                        self.max_size
                    );
                    self.data.truncate(n);
                    return Err(Error::CapacityExceeded {
                        added: n - start,
                        max: self.max_size,
                    });
                }
                self.regrow(n, cap);
            }

            // Zeroed tail beyond `n` survives across reads; trimmed back on exit.
            let window = cap.min(n + READ_WINDOW);
            if self.data.len() < window {
                self.data.resize(window, 0);
            }

            match src.read(&mut self.data[n..window]) {
                Ok(0) => {
                    self.data.truncate(n);
                    return Ok(n - start);
                }
                Ok(read) => n += read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.data.truncate(n);
                    return Err(Error::SourceRead {
                        added: n - start,
                        source: e,
                    });
                }
            }
        }
    }

    /// Write the whole logical content to `dst`.
    ///
    /// The buffer itself is left untouched.
    pub fn drain_to<W: Write + ?Sized>(&self, dst: &mut W) -> Result<usize> {
        let mut written = 0;
        while written < self.data.len() {
            match dst.write(&self.data[written..]) {
                Ok(0) => {
                    return Err(Error::SinkWrite {
                        written,
                        source: io::Error::new(io::ErrorKind::WriteZero, "sink accepted no bytes"),
                    })
                }
                Ok(w) => written += w,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::SinkWrite { written, source: e }),
            }
        }
        Ok(written)
    }

    /// Append `src` to the tail, doubling the store as needed.
    ///
    /// Fails without modifying the buffer if the result would exceed the
    /// maximum size.
    pub fn append(&mut self, src: &[u8]) -> Result<usize> {
        let len = self.data.len();
        let needed = match len.checked_add(src.len()) {
            Some(needed) if needed <= self.max_size => needed,
            _ => {
                return Err(Error::CapacityExceeded {
                    added: 0,
                    max: self.max_size,
                })
            }
        };

        if needed > self.data.capacity() {
            let mut cap = self.data.capacity().max(MIN_CAPACITY);
            while cap < needed {
                cap = cap.saturating_mul(2);
            }
            self.regrow(len, cap.min(self.max_size));
        }
        self.data.extend_from_slice(src);
        Ok(src.len())
    }

    /// Reset the ceiling when a pool takes the buffer back.
    pub(crate) fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
    }

    /// Swap in a fresh store of `cap` bytes holding the first `keep` bytes.
    fn regrow(&mut self, keep: usize, cap: usize) {
        let mut grown = BytesMut::with_capacity(cap);
        grown.extend_from_slice(&self.data[..keep]);
        self.data = grown;
    }

    /// Number of valid bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes currently allocated.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// View of the valid bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Reset the length to zero, keeping the backing store.
    #[inline]
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Convert into immutable `Bytes` without copying.
    ///
    /// The store leaves the pool's reach for good.
    pub fn freeze(self) -> Bytes {
        self.data.freeze()
    }
}

impl Default for DirectBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<[u8]> for DirectBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Write for DirectBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Debug for DirectBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectBuffer")
            .field("len", &self.data.len())
            .field("capacity", &self.data.capacity())
            .field("max_size", &self.max_size)
            .finish()
    }
}

impl fmt::Display for DirectBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.data.is_empty() {
            write!(f, "DirectBuffer: empty")
        } else {
            write!(f, "DirectBuffer: {:?}", &self.data[..])
        }
    }
}
