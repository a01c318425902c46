//! The ambient process-wide engine: owns the timestamp allocator, the
//! transaction index and the resource registry, and drives a background
//! sweeper thread that periodically prunes every live resource.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::registry::{PruneSweep, Registry};
use crate::status::TransactionStatus;
use crate::timestamp::{Timestamp, TimestampAllocator};
use crate::txn_index::TransactionIndex;

/// Tunables for an [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    default_max_wait: Duration,
    sweep_interval: Duration,
    version_chain_warn_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_wait: Duration::from_millis(500),
            sweep_interval: Duration::from_secs(30),
            version_chain_warn_len: 64,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    pub fn default_max_wait(&self) -> Duration {
        self.default_max_wait
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    pub fn version_chain_warn_len(&self) -> usize {
        self.version_chain_warn_len
    }
}

/// Builder for [`EngineConfig`], in the teacher's `LogConfig`-style fluent
/// idiom.
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    inner: EngineConfig,
}

impl EngineConfigBuilder {
    /// Bound on how long `add_version` will block on a write-write
    /// dependency before rolling back.
    pub fn default_max_wait(mut self, wait: Duration) -> Self {
        self.inner.default_max_wait = wait;
        self
    }

    /// How often the background sweeper prunes every registered resource.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.inner.sweep_interval = interval;
        self
    }

    /// Chain length past which `add_version` logs a warning, as an early
    /// signal that pruning isn't keeping up.
    pub fn version_chain_warn_len(mut self, len: usize) -> Self {
        self.inner.version_chain_warn_len = len;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.inner
    }
}

/// Owns every piece of ambient state a [`crate::timely::TimelyResource`]
/// needs: the timestamp allocator, the transaction index, the resource
/// registry, and the shutdown flag blocking waits honor.
pub struct Engine {
    allocator: TimestampAllocator,
    txn_index: TransactionIndex,
    registry: Registry,
    shutdown: AtomicBool,
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Arc<Self> {
        Arc::new(Self {
            allocator: TimestampAllocator::new(),
            txn_index: TransactionIndex::new(),
            registry: Registry::new(),
            shutdown: AtomicBool::new(false),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn allocator(&self) -> &TimestampAllocator {
        &self.allocator
    }

    pub fn txn_index(&self) -> &TransactionIndex {
        &self.txn_index
    }

    pub fn shutdown_flag(&self) -> &AtomicBool {
        &self.shutdown
    }

    /// Register a resource with the engine so the background sweeper will
    /// prune it. Held weakly: the engine never keeps a container alive past
    /// its owner.
    pub fn register(&self, resource: Weak<dyn PruneSweep>) -> Result<()> {
        self.registry.register(resource)
    }

    pub fn registered_resource_count(&self) -> Result<usize> {
        self.registry.len()
    }

    /// Start a new transaction: allocates a start timestamp and registers
    /// its status with the transaction index.
    ///
    /// Panics if the transaction index's lock has been poisoned by a
    /// panicked holder — there is no caller-facing fallible path through
    /// `begin`, and an engine whose bookkeeping lock is poisoned cannot
    /// safely hand out further transactions anyway.
    pub fn begin(self: &Arc<Self>) -> TxnHandle {
        let ts = self.allocator.next();
        let status = self
            .txn_index
            .register(ts)
            .expect("transaction index lock poisoned");
        debug!(ts, "transaction started");
        TxnHandle {
            engine: Arc::clone(self),
            ts,
            step: AtomicU32::new(0),
            status,
            finished: AtomicBool::new(false),
        }
    }

    /// Run one pruning pass over every live registered resource.
    pub fn sweep_once(&self) -> Result<()> {
        self.registry.sweep()
    }

    /// Spawn a background thread that calls `sweep_once` every
    /// `config().sweep_interval()` until [`SweeperHandle::stop`] is called
    /// or the handle is dropped, mirroring the teacher's `TTLCleaner`
    /// background-worker pattern.
    pub fn spawn_sweeper(self: &Arc<Self>) -> SweeperHandle {
        let engine = Arc::clone(self);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let interval = self.config.sweep_interval;

        let handle = std::thread::spawn(move || {
            info!(?interval, "sweeper thread started");
            while !thread_stop.load(Ordering::SeqCst) {
                std::thread::sleep(interval);
                if thread_stop.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(e) = engine.sweep_once() {
                    warn!(error = %e, "sweep encountered errors");
                }
            }
            info!("sweeper thread stopped");
        });

        SweeperHandle {
            stop,
            thread: Some(handle),
        }
    }

    /// Signal every blocking write-write wait (and the sweeper thread, via
    /// its own stop flag) that the engine is shutting down.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

/// A running background sweeper thread.
pub struct SweeperHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Ask the sweeper thread to stop and wait for it to exit.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// A guard over one active transaction's lifecycle.
///
/// Rolls back automatically on drop if neither `commit` nor `rollback` was
/// called, matching the teacher's `Transaction` guard in the now-retired
/// `rustlite-core::transaction` module.
pub struct TxnHandle {
    engine: Arc<Engine>,
    ts: Timestamp,
    step: AtomicU32,
    status: Arc<TransactionStatus>,
    finished: AtomicBool,
}

impl TxnHandle {
    pub fn ts(&self) -> Timestamp {
        self.ts
    }

    /// Allocate the next step for a new version this transaction is about
    /// to create, for use in `encode(ts, step)`.
    pub fn next_step(&self) -> u32 {
        self.step.fetch_add(1, Ordering::SeqCst)
    }

    /// The highest step this transaction has used so far (its own read
    /// snapshot for `get_version`).
    pub fn current_step(&self) -> u32 {
        self.step.load(Ordering::SeqCst)
    }

    pub fn max_wait(&self) -> Duration {
        self.engine.config.default_max_wait
    }

    pub(crate) fn shutdown_flag(&self) -> &AtomicBool {
        &self.engine.shutdown
    }

    pub(crate) fn txn_index(&self) -> &TransactionIndex {
        &self.engine.txn_index
    }

    /// Commit: allocate a commit timestamp and resolve the transaction
    /// status, making every version this transaction wrote visible to
    /// snapshots starting after it. Ownership of the handle is consumed, so
    /// a transaction cannot be committed twice.
    pub fn commit(self) -> Result<Timestamp> {
        let tc = self.engine.allocator.next();
        self.status.commit(tc)?;
        self.finished.store(true, Ordering::SeqCst);
        debug!(ts = self.ts, tc, "transaction committed");
        Ok(tc)
    }

    /// Roll back: every version this transaction wrote becomes permanently
    /// invisible and is unlinked on the next prune.
    pub fn rollback(self) -> Result<()> {
        self.status.abort()?;
        self.finished.store(true, Ordering::SeqCst);
        debug!(ts = self.ts, "transaction rolled back");
        Ok(())
    }
}

impl Drop for TxnHandle {
    fn drop(&mut self) {
        if !self.finished.swap(true, Ordering::SeqCst) {
            warn!(ts = self.ts, "transaction dropped without commit or rollback, aborting");
            // Drop can't propagate a lock-poisoning failure to a caller; log
            // it instead, the same way the sweeper thread logs a failed
            // sweep rather than panicking the background thread.
            if let Err(e) = self.status.abort() {
                warn!(ts = self.ts, error = %e, "failed to abort transaction status on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_registers_an_active_transaction() {
        let engine = Engine::new(EngineConfig::default());
        let txn = engine.begin();
        assert!(engine
            .txn_index()
            .has_concurrent_transaction(txn.ts(), txn.ts() + 1)
            .unwrap());
    }

    #[test]
    fn commit_allocates_a_later_timestamp() {
        let engine = Engine::new(EngineConfig::default());
        let txn = engine.begin();
        let ts = txn.ts();
        let tc = txn.commit().unwrap();
        assert!(tc > ts);
    }

    #[test]
    fn commit_survives_the_handle_drop() {
        let engine = Engine::new(EngineConfig::default());
        let txn = engine.begin();
        let ts = txn.ts();
        let tc = txn.commit().unwrap();
        let status = engine
            .txn_index()
            .commit_status(crate::handle::encode(ts, 0), ts + 100, 0)
            .unwrap();
        assert_eq!(status, crate::handle::CommitStatus::Committed(tc));
    }

    #[test]
    fn drop_without_resolution_rolls_back() {
        let engine = Engine::new(EngineConfig::default());
        let ts = {
            let txn = engine.begin();
            txn.ts()
        };
        let status = engine
            .txn_index()
            .commit_status(crate::handle::encode(ts, 0), ts + 100, 0)
            .unwrap();
        assert_eq!(status, crate::handle::CommitStatus::Aborted);
    }

    #[test]
    fn explicit_rollback_resolves_as_aborted() {
        let engine = Engine::new(EngineConfig::default());
        let txn = engine.begin();
        let ts = txn.ts();
        txn.rollback().unwrap();
        let status = engine
            .txn_index()
            .commit_status(crate::handle::encode(ts, 0), ts + 100, 0)
            .unwrap();
        assert_eq!(status, crate::handle::CommitStatus::Aborted);
    }

    #[test]
    fn sweeper_can_be_stopped() {
        let engine = Engine::new(
            EngineConfig::builder()
                .sweep_interval(Duration::from_millis(10))
                .build(),
        );
        let sweeper = engine.spawn_sweeper();
        std::thread::sleep(Duration::from_millis(30));
        sweeper.stop();
    }
}
