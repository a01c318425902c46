//! Minimal container support for RustLite's MVCC core.
//!
//! This crate supplies the "tree handle" the version-chain engine attaches
//! to: [`Container`], a lightweight in-memory stand-in for a real B-tree
//! page handle, plus [`TreeHandle`], a ready-made `TimelyResource` over it.
//! Persistence (WAL, SSTables, compaction, manifests) is a different
//! subsystem and is out of scope here.

pub mod container;

pub use container::{open_tree_handle, Container, Page, PooledPage, TreeHandle};
