//! Per-transaction commit status, shared between the owning transaction and
//! any reader blocked on a write-write dependency.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::handle::CommitStatus;
use crate::timestamp::Timestamp;

/// The mutable half of a transaction's status: starts `Uncommitted` and is
/// resolved exactly once, by the owning transaction, to `Committed`,
/// `Aborted`, or (from the waiter's point of view) observed as `TimedOut`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Uncommitted,
    Committed(Timestamp),
    Aborted,
}

/// Tracks one in-flight (or recently finished) transaction's start timestamp
/// and eventual commit outcome, and lets other threads block until that
/// outcome is known.
///
/// Registered in the [`crate::txn_index::TransactionIndex`] under the
/// transaction's start timestamp for as long as other transactions might
/// still need to resolve a write-write dependency against it.
#[derive(Debug)]
pub struct TransactionStatus {
    /// Start timestamp of the transaction this status describes.
    ts: Timestamp,
    state: Mutex<Resolution>,
    resolved: Condvar,
}

impl TransactionStatus {
    /// Create a status for a freshly started transaction.
    pub fn new(ts: Timestamp) -> Self {
        Self {
            ts,
            state: Mutex::new(Resolution::Uncommitted),
            resolved: Condvar::new(),
        }
    }

    pub fn start_timestamp(&self) -> Timestamp {
        self.ts
    }

    /// Resolve the transaction as committed at `tc` and wake any waiters.
    ///
    /// Panics if called more than once, or after `abort()` — a transaction's
    /// outcome is decided exactly once.
    pub fn commit(&self, tc: Timestamp) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| Error::LockPoisoned)?;
        assert_eq!(
            *state,
            Resolution::Uncommitted,
            "transaction status resolved twice"
        );
        *state = Resolution::Committed(tc);
        drop(state);
        self.resolved.notify_all();
        Ok(())
    }

    /// Resolve the transaction as aborted and wake any waiters.
    pub fn abort(&self) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| Error::LockPoisoned)?;
        assert_eq!(
            *state,
            Resolution::Uncommitted,
            "transaction status resolved twice"
        );
        *state = Resolution::Aborted;
        drop(state);
        self.resolved.notify_all();
        Ok(())
    }

    /// Non-blocking snapshot of the current resolution.
    pub fn peek(&self) -> Result<CommitStatus> {
        let state = self.state.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(match *state {
            Resolution::Uncommitted => CommitStatus::Uncommitted,
            Resolution::Committed(tc) => CommitStatus::Committed(tc),
            Resolution::Aborted => CommitStatus::Aborted,
        })
    }

    /// Block until the transaction resolves or `max_wait` elapses, whichever
    /// is first. Returns `CommitStatus::TimedOut` rather than blocking
    /// forever on a stuck transaction. Never interruptible; see
    /// [`TransactionStatus::wait_cancelable`] for the engine-shutdown path.
    pub fn wait(&self, max_wait: Duration) -> Result<CommitStatus> {
        static NEVER: AtomicBool = AtomicBool::new(false);
        self.wait_cancelable(max_wait, &NEVER)
    }

    /// Block until the transaction resolves, `max_wait` elapses, or `cancel`
    /// is set (checked on every wakeup), whichever is first. A set `cancel`
    /// flag is how the engine's shutdown path interrupts a sweeper-driven
    /// prune or an in-flight `add_version` wait.
    pub fn wait_cancelable(&self, max_wait: Duration, cancel: &AtomicBool) -> Result<CommitStatus> {
        let deadline = Instant::now() + max_wait;
        let mut state = self.state.lock().map_err(|_| Error::LockPoisoned)?;
        loop {
            match *state {
                Resolution::Uncommitted => {}
                Resolution::Committed(tc) => return Ok(CommitStatus::Committed(tc)),
                Resolution::Aborted => return Ok(CommitStatus::Aborted),
            }
            if cancel.load(Ordering::SeqCst) {
                return Err(Error::Interrupted);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(CommitStatus::TimedOut);
            }
            let (guard, timeout) = self
                .resolved
                .wait_timeout(state, deadline - now)
                .map_err(|_| Error::LockPoisoned)?;
            state = guard;
            if cancel.load(Ordering::SeqCst) {
                return Err(Error::Interrupted);
            }
            if timeout.timed_out() {
                if let Resolution::Uncommitted = *state {
                    return Ok(CommitStatus::TimedOut);
                }
            }
        }
    }
}
