use std::fmt;
use std::io;

/// Unified error type for buffer fill/drain operations.
///
/// Every variant carries the number of bytes already transferred before the
/// failure so callers can decide whether the partial data is usable.
#[derive(Debug)]
pub enum Error {
    /// Growing the buffer would exceed its maximum size
    CapacityExceeded {
        /// Bytes added by the failing call before growth stopped
        added: usize,
        /// The ceiling that would have been crossed
        max: usize,
    },

    /// The byte source failed with something other than end-of-data
    SourceRead { added: usize, source: io::Error },

    /// The byte sink failed while draining
    SinkWrite { written: usize, source: io::Error },
}

impl Error {
    /// Bytes transferred by the failing call before the error.
    pub fn partial_bytes(&self) -> usize {
        match self {
            Error::CapacityExceeded { added, .. } => *added,
            Error::SourceRead { added, .. } => *added,
            Error::SinkWrite { written, .. } => *written,
        }
    }

    /// True for the capacity ceiling, which retrying cannot fix.
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, Error::CapacityExceeded { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::CapacityExceeded { added, max } => write!(
                f,
                "DirectBuffer too large: limit {} bytes ({} bytes added)",
                max, added
            ),
            Error::SourceRead { added, source } => {
                write!(f, "Read error after {} bytes: {}", added, source)
            }
            Error::SinkWrite { written, source } => {
                write!(f, "Write error after {} bytes: {}", written, source)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::SourceRead { source, .. } => Some(source),
            Error::SinkWrite { source, .. } => Some(source),
            Error::CapacityExceeded { .. } => None,
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::SourceRead { source, .. } => source,
            Error::SinkWrite { source, .. } => source,
            e @ Error::CapacityExceeded { .. } => io::Error::new(io::ErrorKind::OutOfMemory, e),
        }
    }
}

/// Result type alias for buffer operations
pub type Result<T> = std::result::Result<T, Error>;
