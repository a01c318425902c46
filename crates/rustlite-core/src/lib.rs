//! # RustLite Core
//!
//! The MVCC version-chain engine at the heart of RustLite: a `TimelyResource`
//! attaches to an arbitrary container and lets concurrent transactions see,
//! create, logically delete, and garbage-collect distinct versions of that
//! resource under snapshot-isolation semantics.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod entry;
pub mod error;
pub mod handle;
pub mod registry;
pub mod status;
pub mod timely;
pub mod timestamp;
pub mod txn_index;

pub use engine::{Engine, EngineConfig, SweeperHandle, TxnHandle};
pub use entry::{PrunableVersion, Version};
pub use error::{Error, Result};
pub use handle::{decode_step, decode_ts, encode, CommitStatus, VersionHandle, PRIMORDIAL_VH};
pub use timely::{TimelyResource, VersionCreator, VersionRef};
