//! Engine-wide registry of live Timely Resources, consulted by the
//! background sweeper.

use std::sync::{Mutex, Weak};

use crate::error::{Error, Result};

/// Object-safe handle a [`crate::timely::TimelyResource`] implements so the
/// engine can drive its pruning without naming its container/payload type
/// parameters.
pub trait PruneSweep: Send + Sync {
    fn prune_sweep(&self) -> Result<()>;
}

/// Weak-referenced collection of every live Timely Resource.
///
/// Resources register themselves at construction and are never explicitly
/// unregistered: once a resource's strong count drops to zero its `Weak`
/// simply fails to upgrade, and the next sweep quietly drops the dead entry.
/// The teacher's own background worker (`TTLCleaner` in a different pack
/// repo, not this one) holds a single `Arc` to the store it cleans and has
/// no registry to speak of; this collection has no direct teacher
/// precedent — it exists because one engine here can own many independent
/// version chains, each needing its own periodic sweep, so it is built
/// fresh on the teacher's plain `Mutex<Vec<...>>` idiom for shared
/// collections.
#[derive(Default)]
pub struct Registry {
    resources: Mutex<Vec<Weak<dyn PruneSweep>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            resources: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, resource: Weak<dyn PruneSweep>) -> Result<()> {
        let mut resources = self.resources.lock().map_err(|_| Error::LockPoisoned)?;
        resources.push(resource);
        Ok(())
    }

    /// Prune every still-live resource, dropping expired weak references in
    /// the same pass. Collects every error rather than stopping at the
    /// first, so one corrupted resource doesn't block the rest of the sweep.
    pub fn sweep(&self) -> Result<()> {
        let live: Vec<_> = {
            let mut resources = self.resources.lock().map_err(|_| Error::LockPoisoned)?;
            resources.retain(|r| r.strong_count() > 0);
            resources.clone()
        };

        let mut failures = Vec::new();
        for weak in live {
            if let Some(resource) = weak.upgrade() {
                if let Err(e) = resource.prune_sweep() {
                    failures.push(e.to_string());
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Storage(failures.join("; ")))
        }
    }

    /// Number of resources currently registered, live or not yet reaped.
    /// Exposed for tests and sweeper diagnostics.
    pub fn len(&self) -> Result<usize> {
        let resources = self.resources.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(resources.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
