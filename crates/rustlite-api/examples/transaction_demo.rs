//! Transaction Demo
//!
//! This example demonstrates RustLite's MVCC transaction support. It shows:
//! - Basic transaction operations (begin, write, commit)
//! - Rollback functionality
//! - Snapshot isolation between concurrent transactions
//! - A balance-transfer example across two resources
//! - Pruning old versions once they are no longer reachable

use rustlite::storage::{open_tree_handle, Page};
use rustlite::{Engine, EngineConfig};

fn page(bytes: &[u8]) -> Page {
    Page::new(bytes.to_vec())
}

fn text(page: &Page) -> std::borrow::Cow<'_, str> {
    String::from_utf8_lossy(page.as_slice())
}

fn main() {
    println!("=== RustLite Transaction Demo ===\n");

    let engine = Engine::new(EngineConfig::default());

    // Demo 1: Basic Transaction
    println!("1. Basic Transaction:");
    {
        let alice = open_tree_handle(&engine, "user:alice");
        let bob = open_tree_handle(&engine, "user:bob");

        let txn = engine.begin();
        alice.add_version(page(b"Alice Smith"), Some(&txn)).unwrap();
        bob.add_version(page(b"Bob Jones"), Some(&txn)).unwrap();
        txn.commit().unwrap();
        println!("   Committed 2 users");

        let reader = engine.begin();
        let value = alice.get_version(Some(&reader)).unwrap().unwrap();
        println!("   Read back: {:?}", text(&value));
    }

    // Demo 2: Rollback
    println!("\n2. Rollback Demo:");
    {
        let temp = open_tree_handle(&engine, "temp:data");

        let txn = engine.begin();
        temp.add_version(page(b"temporary"), Some(&txn)).unwrap();
        println!("   Wrote temporary data");
        txn.rollback().unwrap();
        println!("   Rolled back transaction");

        let reader = engine.begin();
        let result = temp.get_version(Some(&reader)).unwrap();
        println!(
            "   Data after rollback: {:?}",
            result.as_deref().map(text)
        );
        assert!(result.is_none(), "data should not exist after rollback");
    }

    // Demo 3: Snapshot Isolation
    println!("\n3. Snapshot Isolation:");
    {
        let counter = open_tree_handle(&engine, "counter");

        let init = engine.begin();
        counter.add_version(page(b"100"), Some(&init)).unwrap();
        init.commit().unwrap();
        println!("   Initial counter value: 100");

        // Transaction 1 takes a snapshot before the update below commits.
        let txn1 = engine.begin();
        let value1 = text(&counter.get_version(Some(&txn1)).unwrap().unwrap()).into_owned();
        println!("   Transaction 1 reads: {}", value1);

        // Transaction 2 updates the counter and commits.
        let txn2 = engine.begin();
        counter.add_version(page(b"200"), Some(&txn2)).unwrap();
        txn2.commit().unwrap();
        println!("   Transaction 2 commits new value: 200");

        // Transaction 1 still sees its own snapshot.
        let value1_again = text(&counter.get_version(Some(&txn1)).unwrap().unwrap()).into_owned();
        println!(
            "   Transaction 1 still sees: {} (snapshot isolation)",
            value1_again
        );
        assert_eq!(value1, value1_again, "transaction should see its snapshot");
        txn1.commit().unwrap();
    }

    // Demo 4: Balance Transfer
    println!("\n4. Balance Transfer:");
    {
        let alice_balance = open_tree_handle(&engine, "balance:alice");
        let bob_balance = open_tree_handle(&engine, "balance:bob");

        let seed = engine.begin();
        alice_balance.add_version(page(b"1000"), Some(&seed)).unwrap();
        bob_balance.add_version(page(b"500"), Some(&seed)).unwrap();
        seed.commit().unwrap();
        println!("   Initial balances: Alice=$1000, Bob=$500");

        let txn = engine.begin();
        let alice_amount: i32 = text(&alice_balance.get_version(Some(&txn)).unwrap().unwrap())
            .parse()
            .unwrap();
        let bob_amount: i32 = text(&bob_balance.get_version(Some(&txn)).unwrap().unwrap())
            .parse()
            .unwrap();

        let transfer = 200;
        if alice_amount >= transfer {
            let new_alice = (alice_amount - transfer).to_string();
            let new_bob = (bob_amount + transfer).to_string();
            alice_balance
                .add_version(page(new_alice.as_bytes()), Some(&txn))
                .unwrap();
            bob_balance
                .add_version(page(new_bob.as_bytes()), Some(&txn))
                .unwrap();
            txn.commit().unwrap();
            println!(
                "   Transfer successful: Alice -${}, Bob +${}",
                transfer, transfer
            );
        } else {
            txn.rollback().unwrap();
            println!("   Insufficient funds, rolled back");
        }

        let reader = engine.begin();
        println!(
            "   Final balances: Alice=${}, Bob=${}",
            text(&alice_balance.get_version(Some(&reader)).unwrap().unwrap()),
            text(&bob_balance.get_version(Some(&reader)).unwrap().unwrap()),
        );
    }

    // Demo 5: Pruning
    println!("\n5. Pruning:");
    {
        let versioned = open_tree_handle(&engine, "versioned:key");

        for i in 0..5 {
            let txn = engine.begin();
            versioned
                .add_version(page(format!("version{}", i).as_bytes()), Some(&txn))
                .unwrap();
            txn.commit().unwrap();
        }
        println!(
            "   Created 5 versions of a key ({} entries in the chain)",
            versioned.version_count().unwrap()
        );

        versioned.prune().unwrap();
        println!("   Pruned to {} entries", versioned.version_count().unwrap());
    }

    println!("\n=== Demo Complete ===");
    println!("All transaction features demonstrated successfully!");
}
