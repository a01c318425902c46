//! # RustLite
//!
//! The MVCC version-chain engine underneath RustLite's embedded storage
//! layer: concurrent transactions see, create, logically delete, and
//! garbage-collect distinct versions of a resource under snapshot isolation.
//!
//! ## Quick Start
//!
//! ```rust
//! use rustlite::{Engine, EngineConfig};
//! use rustlite::storage::{open_tree_handle, Page};
//!
//! let engine = Engine::new(EngineConfig::default());
//! let tree = open_tree_handle(&engine, "users");
//!
//! // Auto-commit write, immediately visible.
//! tree.add_version(Page::new(b"Alice".to_vec()), None).unwrap();
//! assert_eq!(tree.get_version(None).unwrap().unwrap().as_slice(), b"Alice");
//!
//! // A transaction sees its own uncommitted write, nobody else does yet.
//! let txn = engine.begin();
//! tree.add_version(Page::new(b"Alice Cooper".to_vec()), Some(&txn)).unwrap();
//! assert_eq!(tree.get_version(Some(&txn)).unwrap().unwrap().as_slice(), b"Alice Cooper");
//! txn.commit().unwrap();
//! ```
//!
//! ## Features
//!
//! - **v0.6.0**: MVCC version chains (`TimelyResource`) with snapshot
//!   isolation, write-write conflict detection, and background pruning.
//! - Persistence (WAL, SSTables, snapshots/backups) and a query language are
//!   different subsystems, not covered by this crate.

pub use rustlite_core::{
    decode_step, decode_ts, encode, CommitStatus, Engine, EngineConfig, Error, PrunableVersion,
    Result, SweeperHandle, TimelyResource, TxnHandle, Version, VersionCreator, VersionRef,
    VersionHandle, PRIMORDIAL_VH,
};

/// Container support: the minimal in-memory "tree handle" a `TimelyResource`
/// attaches to.
pub mod storage {
    pub use rustlite_storage::{open_tree_handle, Container, Page, PooledPage, TreeHandle};
}

pub mod logging;

/// Crate version, read from `Cargo.toml` at build time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
