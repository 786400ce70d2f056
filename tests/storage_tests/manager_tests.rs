//! Tests for StorageManager
//!
//! These tests verify:
//! - Opening/creating database directories
//! - Rebuilding the catalog from WAL replay
//! - Checkpoints (snapshot + WAL truncation)
//! - Recovery from snapshot plus newer WAL entries
//! - Memory mode

use std::fs;

use symboldb::storage::{Catalog, StorageManager};
use symboldb::wal::Operation;
use symboldb::{Config, Record, StorageMode, SymbolDbError, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_storage() -> (TempDir, Config) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder().data_dir(temp_dir.path()).build();
    (temp_dir, config)
}

fn create_watchlist() -> Vec<Operation> {
    vec![
        Operation::CreateCollection {
            name: "watchlist".to_string(),
            primary_key: "symbol".to_string(),
        },
        Operation::SetVersion { version: 1 },
    ]
}

fn put(symbol: &str) -> Operation {
    Operation::Put {
        collection: "watchlist".to_string(),
        record: Record::new().with("symbol", symbol),
    }
}

/// Apply a batch to the catalog and log it, the way a commit does
fn commit(manager: &StorageManager, catalog: &mut Catalog, batch: Vec<Operation>) -> u64 {
    for op in &batch {
        catalog.apply(op).unwrap();
    }
    manager.append(batch).unwrap()
}

fn watched(catalog: &Catalog) -> Vec<Value> {
    catalog.table("watchlist").unwrap().keys().cloned().collect()
}

// =============================================================================
// Open/Create Tests
// =============================================================================

#[test]
fn test_open_creates_directory() {
    let (_temp, config) = setup_temp_storage();
    let dir = StorageManager::database_dir(&config, "db");
    assert!(!dir.exists());

    let (manager, catalog) = StorageManager::open(&config, "db").unwrap();

    assert!(dir.is_dir());
    assert_eq!(manager.dir(), Some(dir));
    assert_eq!(catalog.version(), 0);
    assert!(catalog.table_names().is_empty());
    assert_eq!(manager.last_lsn(), 0);
}

#[test]
fn test_open_unwritable_location() {
    let (temp, _) = setup_temp_storage();
    // A regular file where the data directory should be
    let blocker = temp.path().join("blocker");
    fs::write(&blocker, b"not a directory").unwrap();
    let config = Config::builder().data_dir(&blocker).build();

    let result = StorageManager::open(&config, "db");

    assert!(matches!(result, Err(SymbolDbError::StorageUnavailable { .. })));
}

// =============================================================================
// Replay Tests
// =============================================================================

#[test]
fn test_reopen_replays_wal() {
    let (_temp, config) = setup_temp_storage();

    {
        let (manager, mut catalog) = StorageManager::open(&config, "db").unwrap();
        assert_eq!(commit(&manager, &mut catalog, create_watchlist()), 1);
        assert_eq!(commit(&manager, &mut catalog, vec![put("aapl"), put("msft")]), 2);
        commit(
            &manager,
            &mut catalog,
            vec![Operation::Delete {
                collection: "watchlist".to_string(),
                key: "aapl".into(),
            }],
        );
    }

    let (manager, catalog) = StorageManager::open(&config, "db").unwrap();

    assert_eq!(catalog.version(), 1);
    assert_eq!(watched(&catalog), vec![Value::from("msft")]);
    assert_eq!(manager.last_lsn(), 3);
    assert_eq!(manager.append(vec![put("goog")]).unwrap(), 4);
}

#[test]
fn test_reopen_discards_torn_tail() {
    let (_temp, config) = setup_temp_storage();

    {
        let (manager, mut catalog) = StorageManager::open(&config, "db").unwrap();
        commit(&manager, &mut catalog, create_watchlist());
        commit(&manager, &mut catalog, vec![put("aapl")]);
    }

    let wal_path = StorageManager::wal_path(&config, "db");
    let mut bytes = fs::read(&wal_path).unwrap();
    bytes.extend_from_slice(&[9, 9, 9, 9, 9]);
    fs::write(&wal_path, &bytes).unwrap();

    let (manager, catalog) = StorageManager::open(&config, "db").unwrap();

    assert_eq!(watched(&catalog), vec![Value::from("aapl")]);
    assert_eq!(manager.wal_size(), (bytes.len() - 5) as u64);
}

// =============================================================================
// Checkpoint Tests
// =============================================================================

#[test]
fn test_checkpoint_truncates_wal() {
    let (_temp, config) = setup_temp_storage();
    let (manager, mut catalog) = StorageManager::open(&config, "db").unwrap();
    commit(&manager, &mut catalog, create_watchlist());
    commit(&manager, &mut catalog, vec![put("aapl")]);
    assert!(manager.wal_size() > 0);

    manager.checkpoint(&catalog).unwrap();

    assert_eq!(manager.wal_size(), 0);
    assert!(StorageManager::snapshot_path(&config, "db").exists());
    assert_eq!(manager.last_lsn(), 2);
}

#[test]
fn test_recover_from_snapshot_and_newer_wal() {
    let (_temp, config) = setup_temp_storage();

    {
        let (manager, mut catalog) = StorageManager::open(&config, "db").unwrap();
        commit(&manager, &mut catalog, create_watchlist());
        commit(&manager, &mut catalog, vec![put("aapl")]);
        manager.checkpoint(&catalog).unwrap();
        assert_eq!(commit(&manager, &mut catalog, vec![put("msft")]), 3);
    }

    let (manager, catalog) = StorageManager::open(&config, "db").unwrap();

    assert_eq!(watched(&catalog), vec![Value::from("aapl"), Value::from("msft")]);
    assert_eq!(manager.last_lsn(), 3);
}

#[test]
fn test_lsn_continues_after_checkpoint_and_reopen() {
    let (_temp, config) = setup_temp_storage();

    {
        let (manager, mut catalog) = StorageManager::open(&config, "db").unwrap();
        commit(&manager, &mut catalog, create_watchlist());
        commit(&manager, &mut catalog, vec![put("aapl")]);
        manager.checkpoint(&catalog).unwrap();
    }

    let (manager, _) = StorageManager::open(&config, "db").unwrap();
    assert_eq!(manager.append(vec![put("msft")]).unwrap(), 3);
}

#[test]
fn test_needs_checkpoint_threshold() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .checkpoint_threshold(1)
        .build();
    let (manager, mut catalog) = StorageManager::open(&config, "db").unwrap();
    assert!(!manager.needs_checkpoint());

    commit(&manager, &mut catalog, create_watchlist());

    assert!(manager.needs_checkpoint());
}

// =============================================================================
// Memory Mode / Destroy Tests
// =============================================================================

#[test]
fn test_memory_mode_writes_nothing() {
    let (temp, _) = setup_temp_storage();
    let config = Config::builder()
        .data_dir(temp.path())
        .storage_mode(StorageMode::Memory)
        .build();

    let (manager, mut catalog) = StorageManager::open(&config, "db").unwrap();
    assert_eq!(commit(&manager, &mut catalog, create_watchlist()), 1);
    assert_eq!(commit(&manager, &mut catalog, vec![put("aapl")]), 2);
    manager.checkpoint(&catalog).unwrap();

    assert_eq!(manager.dir(), None);
    assert_eq!(manager.last_lsn(), 2);
    assert!(!manager.needs_checkpoint());
    assert!(!StorageManager::database_dir(&config, "db").exists());
}

#[test]
fn test_destroy_removes_files() {
    let (_temp, config) = setup_temp_storage();
    {
        let (manager, mut catalog) = StorageManager::open(&config, "db").unwrap();
        commit(&manager, &mut catalog, create_watchlist());
    }

    assert!(StorageManager::destroy(&config, "db").unwrap());
    assert!(!StorageManager::database_dir(&config, "db").exists());
    assert!(!StorageManager::destroy(&config, "db").unwrap());
}
