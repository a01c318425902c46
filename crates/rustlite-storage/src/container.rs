//! A minimal in-memory stand-in for "the tree handle" a real Timely
//! Resource would attach to.
//!
//! The MVCC version-chain core treats its container generically (`C` in
//! `TimelyResource<C, V>`) and never inspects it; a real embedded engine
//! would plug in a B-tree page handle here. `Container` carries just enough
//! identity to exercise that generic parameter end-to-end without a real
//! page store.

use std::sync::atomic::{AtomicU64, Ordering};

use rustlite_core::{Engine, PrunableVersion, TimelyResource, Version};

/// Opaque owner of a version chain. Two containers are distinct resources
/// even if they happen to carry the same label.
#[derive(Debug)]
pub struct Container {
    id: u64,
    label: String,
}

static NEXT_CONTAINER_ID: AtomicU64 = AtomicU64::new(1);

impl Container {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: NEXT_CONTAINER_ID.fetch_add(1, Ordering::SeqCst),
            label: label.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// A byte-string payload, standing in for a serialized page image or record
/// value. Wraps `Vec<u8>` so the orphan rules let this crate implement
/// `rustlite_core`'s capability traits for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page(pub Vec<u8>);

impl Page {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl Version for Page {}

/// A page that releases a tracked counter when pruned, standing in for
/// releasing a buffer-pool frame back to its pool.
#[derive(Debug, Clone)]
pub struct PooledPage {
    pub bytes: Vec<u8>,
    pub released: std::sync::Arc<AtomicU64>,
}

impl Version for PooledPage {}

impl PrunableVersion for PooledPage {
    fn prune(&self) -> bool {
        self.released.fetch_add(1, Ordering::SeqCst);
        true
    }
}

/// A version chain of [`Page`]s attached to one [`Container`].
pub type TreeHandle = TimelyResource<Container, Page>;

/// Convenience constructor mirroring `TimelyResource::new` but spelling out
/// the concrete types this crate exercises.
pub fn open_tree_handle(engine: &std::sync::Arc<Engine>, label: impl Into<String>) -> std::sync::Arc<TreeHandle> {
    TimelyResource::new(engine, std::sync::Arc::new(Container::new(label)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustlite_core::EngineConfig;

    #[test]
    fn containers_get_distinct_ids() {
        let a = Container::new("a");
        let b = Container::new("b");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn tree_handle_round_trips_a_page() {
        let engine = Engine::new(EngineConfig::default());
        let tree = open_tree_handle(&engine, "root-page");
        tree.add_version(Page::new(b"hello".to_vec()), None).unwrap();
        let read = tree.get_version(None).unwrap().unwrap();
        assert_eq!(read.as_slice(), b"hello");
    }

    #[test]
    fn pruning_a_pooled_page_releases_it() {
        let engine = Engine::new(EngineConfig::default());
        let released = std::sync::Arc::new(AtomicU64::new(0));
        let resource: std::sync::Arc<TimelyResource<Container, PooledPage>> =
            TimelyResource::new_prunable(&engine, std::sync::Arc::new(Container::new("pooled")));

        let a = engine.begin();
        resource
            .add_version(
                PooledPage {
                    bytes: vec![1, 2, 3],
                    released: released.clone(),
                },
                Some(&a),
            )
            .unwrap();
        a.rollback().unwrap();

        resource.prune().unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
