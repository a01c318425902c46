//! Run with: cargo run -p rustlite --example logging_demo

use rustlite::logging::LogConfig;
use rustlite::storage::{open_tree_handle, Page};
use rustlite::{Engine, EngineConfig};

fn main() {
    let _guard = LogConfig::debug().init();

    println!("=== RustLite Logging Demo ===\n");

    let engine = Engine::new(EngineConfig::default());
    let tree = open_tree_handle(&engine, "users");

    println!("1. Auto-commit write...");
    tree.add_version(Page::new(b"Alice".to_vec()), None).unwrap();

    println!("2. Starting a transaction and writing through it...");
    let txn = engine.begin();
    tree.add_version(Page::new(b"Alice Cooper".to_vec()), Some(&txn))
        .unwrap();

    println!("3. Committing...");
    txn.commit().unwrap();

    println!("4. Pruning the version chain...");
    tree.prune().unwrap();

    println!("\n=== Demo Complete ===");
    println!("Check the logs above for tracing output from the engine.");
}
