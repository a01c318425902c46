//! Version entries: the nodes of a version chain, and the capability traits
//! a payload type can implement.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};
use crate::handle::VersionHandle;

/// Marker trait every payload stored in a [`crate::timely::TimelyResource`]
/// must implement. Carries no behavior of its own; it exists so the core can
/// bound its generic parameter without requiring every payload to know about
/// pruning.
pub trait Version: Send + Sync + 'static {}

/// Extension of [`Version`] for payloads that own resources which must be
/// released when their version is pruned (e.g. an on-disk page, a file
/// handle). `prune()` returns whether the release succeeded; a `false`
/// return is collected by the resource and surfaced as a storage error after
/// the sweep finishes.
pub trait PrunableVersion: Version {
    fn prune(&self) -> bool;
}

/// One node in a version chain.
///
/// `deleted` is a monotonic `AtomicBool` (set at most once, never cleared)
/// and `vh` is rewritten only by `set_primordial`, both cheap enough to read
/// without a lock. `previous` is an `RwLock`, the same primitive the teacher
/// uses for every other piece of shared state (mirrored in this repo by
/// `TransactionIndex`'s `RwLock<HashMap<...>>` in `txn_index.rs`): pruning (the
/// only writer, always under the owning resource's mutex) relinks a kept
/// entry's predecessor, and a poisoned lock is surfaced to the caller rather
/// than silently recovered.
pub struct Entry<V> {
    vh: AtomicU64,
    payload: V,
    deleted: AtomicBool,
    previous: RwLock<Option<Arc<Entry<V>>>>,
}

impl<V> Entry<V> {
    /// Build a fresh, non-deleted entry linking to `previous`.
    pub fn new(
        vh: VersionHandle,
        payload: V,
        deleted: bool,
        previous: Option<Arc<Entry<V>>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            vh: AtomicU64::new(vh),
            payload,
            deleted: AtomicBool::new(deleted),
            previous: RwLock::new(previous),
        })
    }

    pub fn vh(&self) -> VersionHandle {
        self.vh.load(Ordering::Acquire)
    }

    /// Overwrite this entry's handle with the primordial sentinel. Caller
    /// must hold the owning resource's mutex.
    pub fn set_primordial_handle(&self, primordial: VersionHandle) {
        self.vh.store(primordial, Ordering::Release);
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    /// Set the deletion flag. Idempotent; never clears an already-set flag.
    pub fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
    }

    pub fn payload(&self) -> &V {
        &self.payload
    }

    pub fn previous(&self) -> Result<Option<Arc<Entry<V>>>> {
        let previous = self.previous.read().map_err(|_| Error::LockPoisoned)?;
        Ok(previous.clone())
    }

    /// Relink this entry's predecessor. Caller must hold the owning
    /// resource's mutex; pruning is the only writer.
    pub fn relink(&self, previous: Option<Arc<Entry<V>>>) -> Result<()> {
        let mut slot = self.previous.write().map_err(|_| Error::LockPoisoned)?;
        *slot = previous;
        Ok(())
    }
}

impl<V: std::fmt::Debug> std::fmt::Debug for Entry<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("vh", &self.vh())
            .field("payload", &self.payload)
            .field("deleted", &self.is_deleted())
            .field("has_previous", &self.previous().ok().flatten().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl Version for i32 {}

    #[test]
    fn fresh_entry_is_not_deleted() {
        let e = Entry::new(crate::handle::encode(1, 0), 7, false, None);
        assert!(!e.is_deleted());
        assert_eq!(*e.payload(), 7);
    }

    #[test]
    fn mark_deleted_is_sticky() {
        let e = Entry::new(crate::handle::encode(1, 0), 7, false, None);
        e.mark_deleted();
        e.mark_deleted();
        assert!(e.is_deleted());
    }

    #[test]
    fn set_primordial_handle_overwrites_vh() {
        let e = Entry::new(crate::handle::encode(1, 0), 7, false, None);
        e.set_primordial_handle(crate::handle::PRIMORDIAL_VH);
        assert_eq!(e.vh(), crate::handle::PRIMORDIAL_VH);
    }

    #[test]
    fn chains_link_to_previous() {
        let old = Entry::new(crate::handle::encode(1, 0), 1, false, None);
        let new = Entry::new(crate::handle::encode(2, 0), 2, false, Some(old.clone()));
        assert_eq!(*new.previous().unwrap().unwrap().payload(), *old.payload());
    }

    #[test]
    fn relink_skips_a_removed_predecessor() {
        let oldest = Entry::new(crate::handle::encode(1, 0), 1, false, None);
        let middle = Entry::new(crate::handle::encode(2, 0), 2, false, Some(oldest.clone()));
        let newest = Entry::new(crate::handle::encode(3, 0), 3, false, Some(middle.clone()));
        newest.relink(middle.previous().unwrap()).unwrap();
        assert_eq!(*newest.previous().unwrap().unwrap().payload(), *oldest.payload());
    }
}
