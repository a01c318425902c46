//! Logical timestamp allocation.
//!
//! Timestamps here are a monotonic counter, not wall-clock time: the only
//! guarantee the rest of the engine relies on is that `next()` never returns
//! the same value twice and never returns a smaller value than a previous
//! call observed by another thread.

use std::sync::atomic::{AtomicU64, Ordering};

/// A logical timestamp tick. Zero is reserved (see [`crate::handle::PRIMORDIAL`]),
/// so the allocator's first dispensed value is `1`.
pub type Timestamp = u64;

/// Dispenses strictly increasing logical timestamps.
///
/// One allocator is shared by every transaction started against an
/// [`crate::engine::Engine`]; it is the sole source of both transaction start
/// timestamps and auto-commit version timestamps.
#[derive(Debug, Default)]
pub struct TimestampAllocator {
    next: AtomicU64,
}

impl TimestampAllocator {
    /// Create an allocator whose first `next()` call returns `1`.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Create an allocator that resumes from `floor + 1`, for engines
    /// recovering a previously observed high-water mark.
    pub fn starting_after(floor: Timestamp) -> Self {
        Self {
            next: AtomicU64::new(floor.saturating_add(1)),
        }
    }

    /// Dispense the next timestamp. Never returns `0`.
    pub fn next(&self) -> Timestamp {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// The most recently dispensed timestamp, or `0` if none has been
    /// dispensed yet.
    pub fn current(&self) -> Timestamp {
        self.next.load(Ordering::SeqCst).saturating_sub(1)
    }
}
