//! Version handles and commit-status sentinels.
//!
//! A version handle (`vh`) packs the timestamp that created a version
//! together with a small per-timestamp step counter into one `u64`, so a
//! chain entry can be addressed and ordered with a single compare.

use crate::timestamp::Timestamp;

/// Bits reserved for the step counter in the low end of a handle.
const STEP_BITS: u32 = 8;
const STEP_MASK: u64 = (1 << STEP_BITS) - 1;

/// A packed `(timestamp, step)` identifier for one entry in a version chain.
pub type VersionHandle = u64;

/// Pack a timestamp and step into a [`VersionHandle`].
///
/// `step` distinguishes multiple versions created by the same transaction at
/// the same timestamp (e.g. several `add_version` calls before commit); it
/// must fit in [`STEP_BITS`] bits.
pub fn encode(ts: Timestamp, step: u32) -> VersionHandle {
    debug_assert!(
        (step as u64) <= STEP_MASK,
        "step counter overflowed its reserved bits"
    );
    (ts << STEP_BITS) | (step as u64 & STEP_MASK)
}

/// Recover the timestamp component of a handle.
pub fn decode_ts(vh: VersionHandle) -> Timestamp {
    vh >> STEP_BITS
}

/// Recover the step component of a handle.
pub fn decode_step(vh: VersionHandle) -> u32 {
    (vh & STEP_MASK) as u32
}

/// Sentinel handle for the single entry of a chain seeded via `set_primordial`.
/// No transaction ever allocates a real handle equal to this value because
/// the timestamp component would require `ts == u64::MAX >> STEP_BITS`, which
/// the allocator in [`crate::timestamp`] cannot reach in practice.
pub const PRIMORDIAL_VH: VersionHandle = VersionHandle::MAX;

/// Commit status of the transaction that created a particular version.
///
/// Mirrors the four sentinel values from the data model plus the ordinary
/// case of "committed at timestamp `tc`". Kept as its own type (rather than a
/// bare `i64`) so callers cannot accidentally compare a commit status against
/// a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    /// Seeded directly via `set_primordial`; visible to every snapshot.
    Primordial,
    /// The creating transaction has not yet committed or aborted.
    Uncommitted,
    /// The creating transaction aborted; this version is permanently invisible.
    Aborted,
    /// The creating transaction's commit-status lookup timed out.
    TimedOut,
    /// The creating transaction committed at this timestamp.
    Committed(Timestamp),
}

impl CommitStatus {
    pub fn is_committed(self) -> bool {
        matches!(self, CommitStatus::Committed(_) | CommitStatus::Primordial)
    }

    pub fn is_aborted(self) -> bool {
        matches!(self, CommitStatus::Aborted | CommitStatus::TimedOut)
    }

    pub fn is_uncommitted(self) -> bool {
        matches!(self, CommitStatus::Uncommitted)
    }

    /// The effective commit timestamp to compare against a reader's snapshot,
    /// if this status resolves to a fixed point in time.
    pub fn commit_timestamp(self) -> Option<Timestamp> {
        match self {
            CommitStatus::Primordial => Some(0),
            CommitStatus::Committed(tc) => Some(tc),
            CommitStatus::Uncommitted | CommitStatus::Aborted | CommitStatus::TimedOut => None,
        }
    }
}
