//! Error types for RustLite's MVCC core.

use std::fmt;

/// The main error type for RustLite's timely-resource engine.
#[derive(Debug)]
pub enum Error {
    /// A lock was poisoned (internal error)
    LockPoisoned,

    /// I/O error, surfaced by ambient engine machinery (logging, background threads)
    Io(std::io::Error),

    /// `add_version` lost a race, hit a write-write conflict, or a blocking
    /// write-write wait resolved against the caller.
    Rollback(String),

    /// A blocking write-write wait was interrupted by engine shutdown.
    Interrupted,

    /// A commit-status lookup or write-write wait exceeded its deadline.
    Timeout,

    /// `set_primordial` was called on a chain with more than one entry.
    InvalidArgument(String),

    /// An invariant was violated while pruning a version chain (multiple
    /// uncommitted entries, or broken handle monotonicity). Fatal for the
    /// resource, not for the process.
    CorruptedState(String),

    /// One or more payload `prune()` callbacks failed during a sweep.
    Storage(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::LockPoisoned => write!(f, "lock poisoned"),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Rollback(msg) => write!(f, "rollback: {}", msg),
            Error::Interrupted => write!(f, "interrupted while waiting on a write-write dependency"),
            Error::Timeout => write!(f, "timed out waiting on a write-write dependency"),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Error::CorruptedState(msg) => write!(f, "corrupted version chain: {}", msg),
            Error::Storage(msg) => write!(f, "storage error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

/// A specialized `Result` type for RustLite's MVCC core.
pub type Result<T> = std::result::Result<T, Error>;
