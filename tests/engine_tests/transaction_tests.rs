//! Tests for Transactions
//!
//! These tests verify:
//! - Commit / abort / drop semantics
//! - Poisoning after a failed write
//! - Mode and scope enforcement
//! - Lock conflicts, sharing and timeouts
//! - Serialization of overlapping writers
//! - Waiting writers are not starved by a stream of readers

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use symboldb::config::Config;
use symboldb::schema::{CollectionDef, IndexDef, SchemaRegistry};
use symboldb::{Database, Record, StorageMode, SymbolDbError, TransactionMode, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn open_db(lock_timeout_ms: u64) -> Database {
    let config = Config::builder()
        .storage_mode(StorageMode::Memory)
        .lock_timeout_ms(lock_timeout_ms)
        .build();

    let mut registry = SchemaRegistry::new();
    registry
        .declare(
            1,
            vec![
                CollectionDef::new("symbols", "symbol")
                    .index(IndexDef::new("symbol", true))
                    .index(IndexDef::new("name", false)),
                CollectionDef::new("watchlist", "symbol"),
                CollectionDef::new("counters", "id"),
                CollectionDef::new("users", "id").index(IndexDef::new("email", true)),
            ],
        )
        .unwrap();

    Database::open(config, "txndb", &registry).unwrap()
}

fn symbol(sym: &str, name: &str) -> Record {
    Record::new().with("symbol", sym).with("name", name)
}

// =============================================================================
// Commit / Abort Tests
// =============================================================================

#[test]
fn test_commit_makes_writes_visible() {
    let db = open_db(1_000);

    let mut txn = db.begin(TransactionMode::ReadWrite, &["symbols"]).unwrap();
    txn.put("symbols", symbol("aapl", "apple")).unwrap();
    txn.put("symbols", symbol("msft", "microsoft")).unwrap();
    assert_eq!(txn.pending_writes(), 2);
    txn.commit().unwrap();

    assert_eq!(db.list_all("symbols").unwrap().len(), 2);
}

#[test]
fn test_reads_see_own_writes_in_order() {
    let db = open_db(1_000);

    let mut txn = db.begin(TransactionMode::ReadWrite, &["symbols"]).unwrap();
    txn.put("symbols", symbol("aapl", "apple")).unwrap();
    assert_eq!(txn.count("symbols").unwrap(), 1);
    assert_eq!(txn.index_lookup("symbols", "name", "apple").unwrap().len(), 1);

    txn.delete("symbols", "aapl").unwrap();
    assert!(txn.get("symbols", "aapl").unwrap().is_none());

    txn.put("symbols", symbol("aapl", "apple inc")).unwrap();
    txn.commit().unwrap();

    assert_eq!(db.get("symbols", "aapl").unwrap(), Some(symbol("aapl", "apple inc")));
}

#[test]
fn test_drop_without_commit_discards() {
    let db = open_db(1_000);

    {
        let mut txn = db.begin(TransactionMode::ReadWrite, &["symbols"]).unwrap();
        txn.put("symbols", symbol("aapl", "apple")).unwrap();
    }

    assert!(db.list_all("symbols").unwrap().is_empty());
}

#[test]
fn test_abort_discards() {
    let db = open_db(1_000);
    db.put("watchlist", Record::new().with("symbol", "aapl")).unwrap();

    let mut txn = db.begin(TransactionMode::ReadWrite, &["watchlist"]).unwrap();
    txn.clear("watchlist").unwrap();
    assert_eq!(txn.count("watchlist").unwrap(), 0);
    txn.abort();

    assert_eq!(db.list_all("watchlist").unwrap().len(), 1);
}

#[test]
fn test_write_closure_error_aborts() {
    let db = open_db(1_000);

    let result: symboldb::Result<()> = db.write(&["symbols"], |txn| {
        txn.put("symbols", symbol("aapl", "apple"))?;
        Err(SymbolDbError::Config("stop".to_string()))
    });

    assert!(result.is_err());
    assert!(db.list_all("symbols").unwrap().is_empty());
}

#[test]
fn test_multi_collection_commit() {
    let db = open_db(1_000);

    db.write(&["symbols", "watchlist"], |txn| {
        txn.put("symbols", symbol("aapl", "apple"))?;
        txn.put("watchlist", Record::new().with("symbol", "aapl"))
    })
    .unwrap();

    assert_eq!(db.list_all("symbols").unwrap().len(), 1);
    assert_eq!(db.list_all("watchlist").unwrap().len(), 1);
}

// =============================================================================
// Poisoning Tests
// =============================================================================

#[test]
fn test_failed_write_poisons_transaction() {
    let db = open_db(1_000);

    let mut txn = db.begin(TransactionMode::ReadWrite, &["symbols", "watchlist"]).unwrap();
    txn.put("watchlist", Record::new().with("symbol", "aapl")).unwrap();
    txn.put("symbols", symbol("aapl", "apple")).unwrap();

    let result = txn.put("symbols", Record::new().with("name", "no key"));
    assert!(matches!(result, Err(SymbolDbError::InvalidRecord { .. })));
    assert!(txn.is_poisoned());

    // Later writes are refused
    assert!(matches!(
        txn.put("symbols", symbol("msft", "microsoft")),
        Err(SymbolDbError::TransactionAborted(_))
    ));

    assert!(matches!(txn.commit(), Err(SymbolDbError::TransactionAborted(_))));
    assert!(db.list_all("symbols").unwrap().is_empty());
    assert!(db.list_all("watchlist").unwrap().is_empty());
}

#[test]
fn test_unique_violation_poisons_transaction() {
    let db = open_db(1_000);
    db.put("users", Record::new().with("id", 1).with("email", "a@x")).unwrap();

    let mut txn = db.begin(TransactionMode::ReadWrite, &["users"]).unwrap();
    txn.put("users", Record::new().with("id", 3).with("email", "c@x")).unwrap();
    let result = txn.put("users", Record::new().with("id", 2).with("email", "a@x"));

    assert!(matches!(result, Err(SymbolDbError::UniqueConstraintViolation { .. })));
    assert!(matches!(txn.commit(), Err(SymbolDbError::TransactionAborted(_))));
    assert_eq!(db.list_all("users").unwrap().len(), 1);
}

#[test]
fn test_failed_read_does_not_poison() {
    let db = open_db(1_000);

    let mut txn = db.begin(TransactionMode::ReadWrite, &["symbols"]).unwrap();
    txn.put("symbols", symbol("aapl", "apple")).unwrap();
    assert!(txn.index_lookup("symbols", "exchange", "x").is_err());
    assert!(!txn.is_poisoned());
    txn.commit().unwrap();

    assert_eq!(db.list_all("symbols").unwrap().len(), 1);
}

// =============================================================================
// Mode and Scope Tests
// =============================================================================

#[test]
fn test_read_only_rejects_writes() {
    let db = open_db(1_000);

    let mut txn = db.begin(TransactionMode::ReadOnly, &["symbols"]).unwrap();
    let result = txn.put("symbols", symbol("aapl", "apple"));

    assert!(matches!(result, Err(SymbolDbError::ReadOnlyTransaction(_))));
    assert!(txn.commit().is_err());
    assert!(db.list_all("symbols").unwrap().is_empty());
}

#[test]
fn test_out_of_scope_access() {
    let db = open_db(1_000);

    let mut txn = db.begin(TransactionMode::ReadWrite, &["watchlist"]).unwrap();

    assert!(matches!(
        txn.get("symbols", "aapl"),
        Err(SymbolDbError::OutOfScope(ref name)) if name == "symbols"
    ));
    assert!(matches!(
        txn.put("symbols", symbol("aapl", "apple")),
        Err(SymbolDbError::OutOfScope(_))
    ));
}

#[test]
fn test_begin_unknown_collection() {
    let db = open_db(1_000);

    let result = db.begin(TransactionMode::ReadOnly, &["alerts"]);

    assert!(matches!(result, Err(SymbolDbError::UnknownCollection(_))));
}

#[test]
fn test_structural_change_requires_version_change() {
    let db = open_db(1_000);

    let mut txn = db.begin(TransactionMode::ReadWrite, &["symbols"]).unwrap();
    let result = txn.create_index("symbols", IndexDef::new("exchange", false));

    assert!(matches!(result, Err(SymbolDbError::InvalidSchema(_))));
}

#[test]
fn test_version_change_sees_everything() {
    let db = open_db(1_000);
    db.put("symbols", symbol("aapl", "apple")).unwrap();

    let mut txn = db.begin(TransactionMode::VersionChange, &[]).unwrap();
    assert_eq!(txn.collection_names(), vec!["counters", "symbols", "users", "watchlist"]);
    assert!(txn.create_index("symbols", IndexDef::new("exchange", false)).unwrap());
    assert_eq!(txn.indexes("symbols").unwrap().len(), 3);
    txn.commit().unwrap();

    assert_eq!(db.collection_info("symbols").unwrap().indexes.len(), 3);
}

#[test]
fn test_index_range_and_keys() {
    let db = open_db(1_000);
    for (sym, name) in [("a", "alpha"), ("b", "beta"), ("c", "gamma")] {
        db.put("symbols", symbol(sym, name)).unwrap();
    }

    let txn = db.begin(TransactionMode::ReadOnly, &["symbols"]).unwrap();
    let found = txn
        .index_range("symbols", "name", Value::from("b")..Value::from("g"))
        .unwrap();
    assert_eq!(found, vec![symbol("b", "beta")]);
    assert_eq!(txn.keys("symbols").unwrap().len(), 3);
}

// =============================================================================
// Locking Tests
// =============================================================================

#[test]
fn test_overlapping_writer_times_out() {
    let db = open_db(50);

    let _holder = db.begin(TransactionMode::ReadWrite, &["symbols"]).unwrap();

    assert!(matches!(
        db.begin(TransactionMode::ReadWrite, &["symbols", "watchlist"]),
        Err(SymbolDbError::LockTimeout(50))
    ));
    assert!(matches!(
        db.begin(TransactionMode::ReadOnly, &["symbols"]),
        Err(SymbolDbError::LockTimeout(_))
    ));
}

#[test]
fn test_disjoint_writers_proceed() {
    let db = open_db(50);

    let mut first = db.begin(TransactionMode::ReadWrite, &["symbols"]).unwrap();
    let mut second = db.begin(TransactionMode::ReadWrite, &["watchlist"]).unwrap();

    first.put("symbols", symbol("aapl", "apple")).unwrap();
    second.put("watchlist", Record::new().with("symbol", "msft")).unwrap();
    second.commit().unwrap();
    first.commit().unwrap();

    assert_eq!(db.list_all("symbols").unwrap().len(), 1);
    assert_eq!(db.list_all("watchlist").unwrap().len(), 1);
}

#[test]
fn test_readers_share() {
    let db = open_db(50);

    let first = db.begin(TransactionMode::ReadOnly, &["symbols"]).unwrap();
    let second = db.begin(TransactionMode::ReadOnly, &["symbols"]).unwrap();

    assert!(matches!(
        db.begin(TransactionMode::ReadWrite, &["symbols"]),
        Err(SymbolDbError::LockTimeout(_))
    ));

    first.commit().unwrap();
    second.commit().unwrap();
    db.begin(TransactionMode::ReadWrite, &["symbols"]).unwrap();
}

#[test]
fn test_version_change_waits_for_active_transactions() {
    let db = open_db(50);

    let reader = db.begin(TransactionMode::ReadOnly, &["watchlist"]).unwrap();
    assert!(matches!(
        db.begin(TransactionMode::VersionChange, &[]),
        Err(SymbolDbError::LockTimeout(_))
    ));
    drop(reader);

    let upgrade = db.begin(TransactionMode::VersionChange, &[]).unwrap();
    assert!(matches!(
        db.begin(TransactionMode::ReadOnly, &["watchlist"]),
        Err(SymbolDbError::LockTimeout(_))
    ));
    drop(upgrade);
}

#[test]
fn test_overlapping_writers_serialize() {
    let db = open_db(10_000);
    db.put("counters", Record::new().with("id", 1).with("value", 0)).unwrap();

    let threads = 8;
    let increments = 25;
    let committed = AtomicUsize::new(0);

    crossbeam::scope(|s| {
        for _ in 0..threads {
            s.spawn(|_| {
                for _ in 0..increments {
                    db.write(&["counters"], |txn| {
                        let current = txn
                            .get("counters", 1)?
                            .and_then(|r| r.get("value").and_then(Value::as_i64))
                            .unwrap_or(0);
                        txn.put(
                            "counters",
                            Record::new().with("id", 1).with("value", current + 1),
                        )
                    })
                    .unwrap();
                    committed.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    })
    .unwrap();

    let record = db.get("counters", 1).unwrap().unwrap();
    assert_eq!(committed.load(Ordering::SeqCst), threads * increments);
    assert_eq!(record.get("value"), Some(&Value::Int((threads * increments) as i64)));
}

#[test]
fn test_reader_queues_behind_waiting_writer() {
    let db = open_db(2_000);
    let order = AtomicUsize::new(0);
    let writer_turn = AtomicUsize::new(usize::MAX);
    let reader_turn = AtomicUsize::new(usize::MAX);

    let first_reader = db.begin(TransactionMode::ReadOnly, &["watchlist"]).unwrap();

    crossbeam::scope(|s| {
        s.spawn(|_| {
            let mut txn = db.begin(TransactionMode::ReadWrite, &["watchlist"]).unwrap();
            writer_turn.store(order.fetch_add(1, Ordering::SeqCst), Ordering::SeqCst);
            txn.put("watchlist", Record::new().with("symbol", "aapl")).unwrap();
            thread::sleep(Duration::from_millis(50));
            txn.commit().unwrap();
        });

        // Let the writer block on the first reader
        thread::sleep(Duration::from_millis(100));

        s.spawn(|_| {
            let txn = db.begin(TransactionMode::ReadOnly, &["watchlist"]).unwrap();
            reader_turn.store(order.fetch_add(1, Ordering::SeqCst), Ordering::SeqCst);
            assert!(txn.get("watchlist", "aapl").unwrap().is_some());
        });

        thread::sleep(Duration::from_millis(100));
        drop(first_reader);
    })
    .unwrap();

    assert_eq!(writer_turn.load(Ordering::SeqCst), 0);
    assert_eq!(reader_turn.load(Ordering::SeqCst), 1);
}

#[test]
fn test_writer_not_starved_by_reader_stream() {
    let db = open_db(1_500);
    let stop = AtomicBool::new(false);
    let reads = AtomicUsize::new(0);

    crossbeam::scope(|s| {
        for _ in 0..4 {
            s.spawn(|_| {
                while !stop.load(Ordering::SeqCst) {
                    let txn = db.begin(TransactionMode::ReadOnly, &["watchlist"]).unwrap();
                    thread::sleep(Duration::from_millis(5));
                    txn.commit().unwrap();
                    reads.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        thread::sleep(Duration::from_millis(20));
        let result = db.put("watchlist", Record::new().with("symbol", "msft"));
        stop.store(true, Ordering::SeqCst);
        result.unwrap();
    })
    .unwrap();

    assert!(reads.load(Ordering::SeqCst) > 0);
    assert!(db.get("watchlist", "msft").unwrap().is_some());
}
