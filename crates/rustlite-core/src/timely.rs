//! The Timely Resource: an MVCC version chain attached to one container.

use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use tracing::{trace, warn};

use crate::engine::{Engine, TxnHandle};
use crate::entry::{Entry, PrunableVersion, Version};
use crate::error::{Error, Result};
use crate::handle::{self, CommitStatus, PRIMORDIAL_VH};
use crate::registry::PruneSweep;
use crate::timestamp::Timestamp;

/// A borrowed view of a version currently held live by its chain entry.
/// Keeps the owning [`Entry`] alive for as long as the reference is held,
/// without requiring payload types to implement `Clone`.
pub struct VersionRef<V>(Arc<Entry<V>>);

impl<V> Deref for VersionRef<V> {
    type Target = V;
    fn deref(&self) -> &V {
        self.0.payload()
    }
}

/// Builds a payload on demand for [`TimelyResource::get_version_or_create`].
pub trait VersionCreator<C, V> {
    fn create(&self, resource: &TimelyResource<C, V>) -> V;
}

/// An MVCC version chain attached to one container `C`, holding a
/// newest-to-oldest singly linked list of `V` payloads.
///
/// Registers itself weakly with the owning [`Engine`] at construction so the
/// background sweeper will prune it; the engine never keeps `container`
/// alive on the resource's behalf.
pub struct TimelyResource<C, V> {
    container: Arc<C>,
    first: RwLock<Option<Arc<Entry<V>>>>,
    mutex: Mutex<()>,
    engine: Arc<Engine>,
    prune_hook: Option<fn(&V) -> bool>,
    _marker: PhantomData<V>,
}

impl<C, V> TimelyResource<C, V>
where
    C: Send + Sync + 'static,
    V: Version,
{
    /// Create a resource over `container` and register it with `engine` for
    /// periodic pruning. The payload type's prune capability, if any, is
    /// discovered through [`TimelyResource::new_prunable`] instead — this
    /// constructor never invokes a prune callback.
    pub fn new(engine: &Arc<Engine>, container: Arc<C>) -> Arc<Self> {
        Self::with_prune_hook(engine, container, None)
    }

    fn with_prune_hook(
        engine: &Arc<Engine>,
        container: Arc<C>,
        prune_hook: Option<fn(&V) -> bool>,
    ) -> Arc<Self> {
        let resource = Arc::new(Self {
            container,
            first: RwLock::new(None),
            mutex: Mutex::new(()),
            engine: Arc::clone(engine),
            prune_hook,
            _marker: PhantomData,
        });
        let weak: Weak<dyn PruneSweep> = Arc::downgrade(&resource) as Weak<dyn PruneSweep>;
        engine.register(weak).expect("engine registry lock poisoned");
        resource
    }

    pub fn container(&self) -> &Arc<C> {
        &self.container
    }

    fn head(&self) -> Result<Option<Arc<Entry<V>>>> {
        let first = self.first.read().map_err(|_| Error::LockPoisoned)?;
        Ok(first.clone())
    }

    fn set_head(&self, entry: Option<Arc<Entry<V>>>) -> Result<()> {
        let mut first = self.first.write().map_err(|_| Error::LockPoisoned)?;
        *first = entry;
        Ok(())
    }

    /// Insert a new version.
    ///
    /// `txn` of `None` means auto-commit: the version is stamped with a
    /// fresh timestamp and is immediately visible, as if committed by a
    /// transaction nobody else can ever see as concurrent.
    pub fn add_version(&self, payload: V, txn: Option<&TxnHandle>) -> Result<()> {
        'retry: loop {
            let guard = self.mutex.lock().map_err(|_| Error::LockPoisoned)?;

            let vh_new = match txn {
                Some(t) => handle::encode(t.ts(), t.next_step()),
                None => handle::encode(self.engine.allocator().next(), 0),
            };

            let head = self.head()?;
            if let Some(first) = &head {
                if vh_new <= first.vh() {
                    return Err(Error::Rollback(
                        "lost the race to append a new version".into(),
                    ));
                }
            }

            if let Some(t) = txn {
                let mut cursor = head.clone();
                while let Some(entry) = cursor {
                    let dep = self.engine.txn_index().ww_dependency(
                        entry.vh(),
                        Duration::ZERO,
                        t.shutdown_flag(),
                    )?;
                    match dep {
                        CommitStatus::Primordial | CommitStatus::Aborted => {
                            cursor = entry.previous()?;
                            continue;
                        }
                        CommitStatus::TimedOut => {
                            drop(guard);
                            let resolved = self.engine.txn_index().ww_dependency(
                                entry.vh(),
                                t.max_wait(),
                                t.shutdown_flag(),
                            )?;
                            match resolved {
                                CommitStatus::Primordial | CommitStatus::Aborted => {
                                    continue 'retry;
                                }
                                _ => {
                                    return Err(Error::Rollback(
                                        "write-write dependency resolved against us".into(),
                                    ))
                                }
                            }
                        }
                        CommitStatus::Committed(their_tc) => {
                            // Resolved, but was it resolved before or after our snapshot
                            // began? A committer that finished before we started is a safe
                            // ancestor to build on; one that finished after is exactly the
                            // concurrent write-write conflict this walk exists to catch.
                            if their_tc > t.ts() {
                                return Err(Error::Rollback(
                                    "write-write conflict with a concurrently committed version".into(),
                                ));
                            }
                            cursor = entry.previous()?;
                            continue;
                        }
                        CommitStatus::Uncommitted => {
                            return Err(Error::CorruptedState(
                                "ww_dependency unexpectedly reported an active transaction".into(),
                            ))
                        }
                    }
                }
            }

            let entry = Entry::new(vh_new, payload, false, head);
            self.set_head(Some(entry))?;

            let len = self.version_count()?;
            if len >= self.engine.config().version_chain_warn_len() {
                warn!(len, "version chain exceeds configured warning length");
            }
            trace!(vh = vh_new, "version appended");
            return Ok(());
        }
    }

    /// Tombstone the current head: insert a new entry carrying the same
    /// payload but marked deleted, through the normal `add_version` path so
    /// it participates in write-write conflict detection. No-op on an empty
    /// chain.
    pub fn delete(&self, txn: Option<&TxnHandle>) -> Result<()>
    where
        V: Clone,
    {
        let Some(current) = self.head()? else {
            return Ok(());
        };
        let payload = current.payload().clone();

        'retry: loop {
            let guard = self.mutex.lock().map_err(|_| Error::LockPoisoned)?;
            let vh_new = match txn {
                Some(t) => handle::encode(t.ts(), t.next_step()),
                None => handle::encode(self.engine.allocator().next(), 0),
            };
            let head = self.head()?;
            if let Some(first) = &head {
                if vh_new <= first.vh() {
                    return Err(Error::Rollback(
                        "lost the race to append a tombstone".into(),
                    ));
                }
            }
            if let Some(t) = txn {
                let mut cursor = head.clone();
                while let Some(entry) = cursor {
                    let dep = self.engine.txn_index().ww_dependency(
                        entry.vh(),
                        Duration::ZERO,
                        t.shutdown_flag(),
                    )?;
                    match dep {
                        CommitStatus::Primordial | CommitStatus::Aborted => {
                            cursor = entry.previous()?;
                            continue;
                        }
                        CommitStatus::TimedOut => {
                            drop(guard);
                            let resolved = self.engine.txn_index().ww_dependency(
                                entry.vh(),
                                t.max_wait(),
                                t.shutdown_flag(),
                            )?;
                            match resolved {
                                CommitStatus::Primordial | CommitStatus::Aborted => {
                                    continue 'retry;
                                }
                                _ => {
                                    return Err(Error::Rollback(
                                        "write-write dependency resolved against us".into(),
                                    ))
                                }
                            }
                        }
                        CommitStatus::Committed(their_tc) => {
                            if their_tc > t.ts() {
                                return Err(Error::Rollback(
                                    "write-write conflict with a concurrently committed version".into(),
                                ));
                            }
                            cursor = entry.previous()?;
                            continue;
                        }
                        CommitStatus::Uncommitted => {
                            return Err(Error::CorruptedState(
                                "ww_dependency unexpectedly reported an active transaction".into(),
                            ))
                        }
                    }
                }
            }
            let entry = Entry::new(vh_new, payload, true, head);
            self.set_head(Some(entry))?;
            trace!(vh = vh_new, "tombstone appended");
            return Ok(());
        }
    }

    /// Read the version visible to `txn`'s snapshot (or the latest globally
    /// committed version, if `txn` is `None`). Walks from a single snapshot
    /// of the head, taking the resource's read lock once per hop; appends
    /// only ever prepend, so a walk never observes a torn predecessor link.
    pub fn get_version(&self, txn: Option<&TxnHandle>) -> Result<Option<VersionRef<V>>> {
        let (snapshot_ts, snapshot_step) = match txn {
            Some(t) => (t.ts(), t.current_step()),
            None => (Timestamp::MAX, u32::MAX),
        };

        let mut cursor = self.head()?;
        while let Some(entry) = cursor {
            let status = self
                .engine
                .txn_index()
                .commit_status(entry.vh(), snapshot_ts, snapshot_step)?;
            if status.is_committed() {
                return Ok(Some(VersionRef(entry)));
            }
            cursor = entry.previous()?;
        }
        Ok(None)
    }

    /// Read the visible version, or create and publish one via `creator` if
    /// none exists.
    pub fn get_version_or_create<Cr>(&self, txn: Option<&TxnHandle>, creator: &Cr) -> Result<VersionRef<V>>
    where
        Cr: VersionCreator<C, V>,
    {
        if let Some(existing) = self.get_version(txn)? {
            return Ok(existing);
        }
        let payload = creator.create(self);
        self.add_version(payload, txn)?;
        self.get_version(txn)?
            .ok_or_else(|| Error::CorruptedState("version vanished immediately after add".into()))
    }

    /// Whether the chain is structurally empty (no entries at all).
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.head()?.is_none())
    }

    /// Number of entries currently linked in the chain.
    pub fn version_count(&self) -> Result<usize> {
        let mut count = 0;
        let mut cursor = self.head()?;
        while let Some(entry) = cursor {
            count += 1;
            cursor = entry.previous()?;
        }
        Ok(count)
    }

    /// Collapse a single-entry chain to the primordial sentinel. Fails if
    /// the chain is empty or has more than one entry.
    pub fn set_primordial(&self) -> Result<()> {
        let _guard = self.mutex.lock().map_err(|_| Error::LockPoisoned)?;
        let head = self
            .head()?
            .ok_or_else(|| Error::InvalidArgument("cannot seed an empty chain as primordial".into()))?;
        if head.previous()?.is_some() {
            return Err(Error::InvalidArgument(
                "set_primordial requires a chain with exactly one entry".into(),
            ));
        }
        head.set_primordial_handle(PRIMORDIAL_VH);
        Ok(())
    }

    /// Reclaim obsolete entries. See module-level documentation for the
    /// two-phase algorithm: Phase A relinks the chain under the mutex, Phase
    /// B invokes prune callbacks for dropped non-deleted entries outside it.
    pub fn prune(&self) -> Result<()> {
        let to_prune = {
            let _guard = self.mutex.lock().map_err(|_| Error::LockPoisoned)?;
            self.prune_phase_a()?
        };

        if to_prune.is_empty() {
            return Ok(());
        }

        let Some(hook) = self.prune_hook else {
            return Ok(());
        };

        let mut failures = 0usize;
        for entry in &to_prune {
            if !hook(entry.payload()) {
                failures += 1;
            }
        }
        if failures > 0 {
            return Err(Error::Storage(format!(
                "{} of {} prune callbacks failed",
                failures,
                to_prune.len()
            )));
        }
        Ok(())
    }

    fn prune_phase_a(&self) -> Result<Vec<Arc<Entry<V>>>> {
        let index = self.engine.txn_index();
        let mut to_prune = Vec::new();

        let mut newer: Option<Arc<Entry<V>>> = None;
        let mut last_tc: Option<Timestamp> = None;
        let mut uncommitted_ts: Option<Timestamp> = None;
        let mut latest: Option<Arc<Entry<V>>> = None;
        let mut is_primordial = true;

        let mut cursor = self.head()?;
        while let Some(entry) = cursor {
            let next = entry.previous()?;
            let tc = index.commit_status(entry.vh(), Timestamp::MAX, u32::MAX)?;

            let keep = match tc {
                CommitStatus::Aborted | CommitStatus::TimedOut => {
                    if !entry.is_deleted() {
                        to_prune.push(Arc::clone(&entry));
                    }
                    false
                }
                CommitStatus::Uncommitted => {
                    let ts = handle::decode_ts(entry.vh());
                    if let Some(existing) = uncommitted_ts {
                        if existing != ts {
                            return Err(Error::CorruptedState(
                                "more than one uncommitted version in chain".into(),
                            ));
                        }
                    }
                    uncommitted_ts = Some(ts);
                    is_primordial = false;
                    true
                }
                CommitStatus::Committed(this_tc) => {
                    let is_first_kept_committed = latest.is_none();
                    let concurrent = if is_first_kept_committed {
                        false
                    } else {
                        match last_tc {
                            Some(lt) => index.has_concurrent_transaction(this_tc, lt)?,
                            None => false,
                        }
                    };
                    let keep_this = is_first_kept_committed || concurrent;

                    if keep_this && is_first_kept_committed {
                        latest = Some(Arc::clone(&entry));
                    }
                    if concurrent {
                        is_primordial = false;
                    }

                    if let Some(lt) = last_tc {
                        if this_tc > lt {
                            return Err(Error::CorruptedState(
                                "version chain handles are not monotonically ordered".into(),
                            ));
                        }
                    }
                    last_tc = Some(this_tc);

                    if !keep_this && !entry.is_deleted() {
                        to_prune.push(Arc::clone(&entry));
                    }
                    keep_this
                }
                CommitStatus::Primordial => {
                    // Invariant 3 guarantees a primordial entry is the tail: if
                    // nothing newer has already been chosen to survive, this
                    // entry is the resource's base state and is kept as-is.
                    // Otherwise it is fully superseded and must be unlinked —
                    // keeping it would leave the eventual promoted survivor
                    // with a predecessor, violating invariant 3. A deleted
                    // tombstone at this level still masks the resource and is
                    // kept regardless of `latest`.
                    if entry.is_deleted() {
                        true
                    } else if latest.is_none() {
                        latest = Some(Arc::clone(&entry));
                        true
                    } else {
                        to_prune.push(Arc::clone(&entry));
                        is_primordial = false;
                        false
                    }
                }
            };

            if keep {
                match &newer {
                    None => {}
                    Some(n) => n.relink(Some(Arc::clone(&entry)))?,
                }
                newer = Some(entry);
            } else {
                match &newer {
                    None => self.set_head(next.clone())?,
                    Some(n) => n.relink(next.clone())?,
                }
            }

            cursor = next;
        }

        if let Some(head) = self.head()? {
            if head.is_deleted() && head.previous()?.is_none() {
                self.set_head(None)?;
            } else if is_primordial {
                debug_assert!(head.previous()?.is_none());
                head.set_primordial_handle(PRIMORDIAL_VH);
            }
        }

        Ok(to_prune)
    }
}

impl<C, V> PruneSweep for TimelyResource<C, V>
where
    C: Send + Sync + 'static,
    V: Version,
{
    fn prune_sweep(&self) -> Result<()> {
        self.prune()
    }
}

impl<C, V> TimelyResource<C, V>
where
    C: Send + Sync + 'static,
    V: PrunableVersion,
{
    /// Like [`TimelyResource::new`], but for payloads that must release a
    /// resource when pruned: `V::prune` is invoked for every dropped,
    /// non-deleted entry.
    pub fn new_prunable(engine: &Arc<Engine>, container: Arc<C>) -> Arc<Self> {
        Self::with_prune_hook(engine, container, Some(V::prune))
    }
}
