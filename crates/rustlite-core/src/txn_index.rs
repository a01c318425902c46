//! Transaction index: the engine's view of which transactions are active,
//! and the contract the version-chain visibility and pruning logic drives
//! through it.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::handle::{decode_step, decode_ts, CommitStatus, VersionHandle, PRIMORDIAL_VH};
use crate::status::TransactionStatus;
use crate::timestamp::Timestamp;

/// Tracks every transaction whose commit outcome a live version might still
/// depend on.
///
/// A transaction is registered at `begin()` and stays in the index until
/// `forget()` is called on it. The engine only calls `forget()` once a
/// transaction's start timestamp has fallen below the oldest snapshot any
/// reader could still hold, at which point its outcome can no longer change
/// what any reader sees — see [`TransactionIndex::commit_status`] for the
/// fallback this makes safe.
#[derive(Debug, Default)]
pub struct TransactionIndex {
    transactions: RwLock<HashMap<Timestamp, Arc<TransactionStatus>>>,
}

impl TransactionIndex {
    pub fn new() -> Self {
        Self {
            transactions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a freshly started transaction and return its shared status
    /// handle, through which the transaction itself later reports commit or
    /// abort.
    pub fn register(&self, ts: Timestamp) -> Result<Arc<TransactionStatus>> {
        let status = Arc::new(TransactionStatus::new(ts));
        let mut transactions = self.transactions.write().map_err(|_| Error::LockPoisoned)?;
        transactions.insert(ts, Arc::clone(&status));
        Ok(status)
    }

    /// Drop a transaction's status once it can no longer affect any live
    /// visibility or write-write decision.
    ///
    /// This is an explicit, caller-verified operation, never invoked
    /// automatically by the engine: forgetting a transaction whose real
    /// commit timestamp differs from its start timestamp before every
    /// snapshot that could distinguish the two has moved on would corrupt
    /// visibility (see `commit_status`'s fallback). Safe callers only forget
    /// transactions they have independently proven unreachable, e.g. ones
    /// whose every authored version has already been pruned from every
    /// resource.
    pub fn forget(&self, ts: Timestamp) -> Result<()> {
        let mut transactions = self.transactions.write().map_err(|_| Error::LockPoisoned)?;
        transactions.remove(&ts);
        Ok(())
    }

    fn lookup(&self, ts: Timestamp) -> Result<Option<Arc<TransactionStatus>>> {
        let transactions = self.transactions.read().map_err(|_| Error::LockPoisoned)?;
        Ok(transactions.get(&ts).cloned())
    }

    /// Resolve the effective commit status of the transaction that created
    /// `vh`, filtered for an observer reading under snapshot `(snapshot_ts,
    /// snapshot_step)`.
    ///
    /// `PRIMORDIAL_VH` always resolves to [`CommitStatus::Primordial`]. A
    /// version authored by the observer's own transaction is visible to
    /// itself for every step up to and including `snapshot_step` (so a
    /// transaction sees its own uncommitted writes), and treated as
    /// committed at its own start timestamp for that comparison. A handle
    /// whose creator has been forgotten resolves to `Committed(ts)`:
    /// forgetting only happens once the transaction is behind every reader's
    /// snapshot, so treating it as committed at its own start timestamp is
    /// indistinguishable from the truth to any caller still around to ask.
    pub fn commit_status(
        &self,
        vh: VersionHandle,
        snapshot_ts: Timestamp,
        snapshot_step: u32,
    ) -> Result<CommitStatus> {
        if vh == PRIMORDIAL_VH {
            return Ok(CommitStatus::Primordial);
        }
        let ts = decode_ts(vh);
        let step = decode_step(vh);
        if ts == snapshot_ts && step <= snapshot_step {
            return Ok(CommitStatus::Committed(ts));
        }
        match self.lookup(ts)? {
            Some(status) => status.peek(),
            None => Ok(CommitStatus::Committed(ts)),
        }
    }

    /// Block (bounded by `max_wait`) until the transaction that created `vh`
    /// resolves, to break a write-write conflict instead of failing it
    /// immediately. A `max_wait` of zero behaves as a non-blocking probe:
    /// if the creator is still active, it returns `TimedOut` immediately
    /// rather than blocking. `cancel`, checked on every wakeup, lets the
    /// engine's shutdown path interrupt an in-flight wait.
    pub fn ww_dependency(
        &self,
        vh: VersionHandle,
        max_wait: Duration,
        cancel: &AtomicBool,
    ) -> Result<CommitStatus> {
        if vh == PRIMORDIAL_VH {
            return Ok(CommitStatus::Primordial);
        }
        let ts = decode_ts(vh);
        match self.lookup(ts)? {
            Some(status) => status.wait_cancelable(max_wait, cancel),
            None => Ok(CommitStatus::Committed(ts)),
        }
    }

    /// True iff some transaction registered in the index has a lifetime that
    /// overlaps the half-open interval `[tc_a, tc_b)`. A still-active
    /// transaction's lifetime is treated as unbounded on the right. An
    /// aborted (or timed-out) transaction's `TxnHandle` was consumed the
    /// moment it resolved, so it can never issue another read; it never
    /// counts toward concurrency, regardless of when it started. Used by
    /// pruning to decide whether an older committed version might still be
    /// visible to some snapshot.
    pub fn has_concurrent_transaction(&self, tc_a: Timestamp, tc_b: Timestamp) -> Result<bool> {
        let transactions = self.transactions.read().map_err(|_| Error::LockPoisoned)?;
        for status in transactions.values() {
            let start = status.start_timestamp();
            let overlaps = match status.peek()? {
                CommitStatus::Uncommitted => start < tc_b,
                CommitStatus::Committed(tc) => start < tc_b && tc >= tc_a,
                CommitStatus::Aborted | CommitStatus::TimedOut | CommitStatus::Primordial => false,
            };
            if overlaps {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Number of transactions currently registered. Exposed for the
    /// background sweeper's diagnostics, not used in any visibility
    /// decision.
    pub fn active_count(&self) -> Result<usize> {
        let transactions = self.transactions.read().map_err(|_| Error::LockPoisoned)?;
        Ok(transactions.len())
    }

    /// Resolve a status by timestamp and require that it still be
    /// registered, for callers (commit/rollback) that must not silently fall
    /// back to the forgotten-transaction default.
    pub fn require(&self, ts: Timestamp) -> Result<Arc<TransactionStatus>> {
        self.lookup(ts)?
            .ok_or_else(|| Error::CorruptedState(format!("transaction {} is not registered", ts)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::encode;
    use std::sync::atomic::AtomicBool;

    fn never() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn primordial_handle_is_always_primordial() {
        let index = TransactionIndex::new();
        assert_eq!(
            index.commit_status(PRIMORDIAL_VH, 100, 0).unwrap(),
            CommitStatus::Primordial
        );
    }

    #[test]
    fn registered_transaction_is_uncommitted_to_other_observers() {
        let index = TransactionIndex::new();
        index.register(10).unwrap();
        assert_eq!(
            index.commit_status(encode(10, 0), 20, 0).unwrap(),
            CommitStatus::Uncommitted
        );
    }

    #[test]
    fn own_writes_are_self_visible_before_commit() {
        let index = TransactionIndex::new();
        index.register(10).unwrap();
        // The same transaction observing its own step-0 write at step 1.
        assert_eq!(
            index.commit_status(encode(10, 0), 10, 1).unwrap(),
            CommitStatus::Committed(10)
        );
        // But not a step it hasn't reached yet.
        assert_eq!(
            index.commit_status(encode(10, 2), 10, 1).unwrap(),
            CommitStatus::Uncommitted
        );
    }

    #[test]
    fn commit_resolves_for_other_observers() {
        let index = TransactionIndex::new();
        let status = index.register(10).unwrap();
        status.commit(20).unwrap();
        assert_eq!(
            index.commit_status(encode(10, 0), 30, 0).unwrap(),
            CommitStatus::Committed(20)
        );
    }

    #[test]
    fn forgotten_transaction_falls_back_to_committed_at_own_ts() {
        let index = TransactionIndex::new();
        index.register(10).unwrap();
        index.forget(10).unwrap();
        assert_eq!(
            index.commit_status(encode(10, 0), 30, 0).unwrap(),
            CommitStatus::Committed(10)
        );
    }

    #[test]
    fn ww_dependency_never_returns_uncommitted() {
        let index = TransactionIndex::new();
        index.register(10).unwrap();
        let cancel = never();
        let outcome = index
            .ww_dependency(encode(10, 0), Duration::ZERO, &cancel)
            .unwrap();
        assert_eq!(outcome, CommitStatus::TimedOut);
    }

    #[test]
    fn has_concurrent_transaction_detects_overlap() {
        let index = TransactionIndex::new();
        let a = index.register(10).unwrap();
        a.commit(15).unwrap();
        assert!(index.has_concurrent_transaction(10, 15).unwrap());
        assert!(!index.has_concurrent_transaction(16, 20).unwrap());
    }

    #[test]
    fn has_concurrent_transaction_ignores_resolved_aborts() {
        let index = TransactionIndex::new();
        let a = index.register(10).unwrap();
        a.abort().unwrap();
        // a's handle is gone the moment it aborted; its window can never be
        // observed by a future read, so it never counts as concurrent.
        assert!(!index.has_concurrent_transaction(5, 20).unwrap());
    }

    #[test]
    fn has_concurrent_transaction_counts_a_still_active_transaction() {
        let index = TransactionIndex::new();
        let _b = index.register(12).unwrap();
        assert!(index.has_concurrent_transaction(5, 20).unwrap());
        assert!(!index.has_concurrent_transaction(1, 8).unwrap());
    }

    #[test]
    fn require_errors_on_unknown_transaction() {
        let index = TransactionIndex::new();
        assert!(index.require(99).is_err());
    }
}
