//! Engine Module
//!
//! The database handle that coordinates all components.
//!
//! ## Responsibilities
//! - Open storage and rebuild the catalog (snapshot + WAL replay)
//! - Run pending schema migrations on open
//! - Hand out transactions and install their commits
//! - Trigger checkpoints when the WAL grows past its threshold

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use parking_lot::RwLock;

use crate::config::Config;
use crate::error::{Result, SymbolDbError};
use crate::migration::{MigrationReport, MigrationRunner};
use crate::record::{Record, Value};
use crate::schema::{IndexDef, SchemaRegistry};
use crate::storage::{Catalog, StorageManager};
use crate::txn::{LockManager, Transaction, TransactionMode};
use crate::wal::Operation;

/// Summary of one collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    pub primary_key: String,
    pub indexes: Vec<IndexDef>,
    pub record_count: usize,
}

/// An open database
///
/// ## Concurrency Model
///
/// - **Transactions** declare their collections; the lock manager serializes
///   overlapping writers and lets readers share
/// - **Commits** take the catalog write lock, log the batch, then swap in the
///   transaction's tables: readers see all of a commit or none of it
/// - **Checkpoints** hold the catalog read lock, so no commit can slip in
///   between the snapshot and the WAL truncation
///
/// Lock order: collection locks → catalog → storage backend.
pub struct Database {
    /// Database name (directory under `data_dir`)
    name: String,

    /// Engine configuration
    config: Config,

    /// Committed state
    catalog: RwLock<Catalog>,

    /// WAL + snapshots
    storage: StorageManager,

    /// Collection-level transaction locks
    locks: LockManager,
}

impl Database {
    /// Open or create a database and bring its schema up to the registry's
    /// current version
    ///
    /// Fails with `StorageUnavailable` when the files cannot be opened,
    /// `VersionDowngrade` when the stored version is newer than the registry,
    /// and `Migration` when an upgrade step fails (the stored data stays at
    /// the last committed version).
    pub fn open(config: Config, name: &str, registry: &SchemaRegistry) -> Result<Self> {
        let db = Self::open_unmigrated(config, name)?;
        let report = db.migrate(registry)?;

        tracing::info!(
            db = %db.name,
            version = report.to_version,
            upgraded_from = report.from_version,
            "database ready"
        );
        Ok(db)
    }

    /// Open or create a database without touching its schema
    pub fn open_unmigrated(config: Config, name: &str) -> Result<Self> {
        Self::validate_name(name)?;

        let (storage, catalog) = StorageManager::open(&config, name)?;
        let locks = LockManager::new(Duration::from_millis(config.lock_timeout_ms));

        tracing::debug!(
            db = name,
            version = catalog.version(),
            collections = catalog.table_names().len(),
            "storage opened"
        );

        Ok(Self {
            name: name.to_string(),
            config,
            catalog: RwLock::new(catalog),
            storage,
            locks,
        })
    }

    fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(SymbolDbError::Config(format!(
                "invalid database name '{}'",
                name
            )));
        }
        Ok(())
    }

    /// Apply any schema versions the database has not seen yet
    pub fn migrate(&self, registry: &SchemaRegistry) -> Result<MigrationReport> {
        MigrationRunner::migrate(self, registry)
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Start a transaction over `collections`
    ///
    /// Blocks until the locks are granted. `VersionChange` ignores the scope
    /// and waits for exclusive access to the whole database.
    pub fn begin(&self, mode: TransactionMode, collections: &[&str]) -> Result<Transaction<'_>> {
        let scope: BTreeSet<String> = match mode {
            TransactionMode::VersionChange => BTreeSet::new(),
            _ => collections.iter().map(|c| c.to_string()).collect(),
        };

        let guard = self.locks.acquire(mode, scope)?;

        // Snapshot after the locks: nobody else can be writing our scope now
        let view = self.catalog.read().clone();
        for name in guard.scope() {
            if !view.contains(name) {
                return Err(SymbolDbError::UnknownCollection(name.clone()));
            }
        }

        Ok(Transaction::new(self, view, guard))
    }

    /// Run `f` in a read-only transaction
    pub fn read<T>(
        &self,
        collections: &[&str],
        f: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let txn = self.begin(TransactionMode::ReadOnly, collections)?;
        let value = f(&txn)?;
        txn.commit()?;
        Ok(value)
    }

    /// Run `f` in a read-write transaction, committing when it succeeds
    ///
    /// An error from `f` aborts the transaction.
    pub fn write<T>(
        &self,
        collections: &[&str],
        f: impl FnOnce(&mut Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut txn = self.begin(TransactionMode::ReadWrite, collections)?;
        let value = f(&mut txn)?;
        txn.commit()?;
        Ok(value)
    }

    /// Install a committed transaction (called by `Transaction::commit`)
    ///
    /// Steps:
    /// 1. Take the catalog write lock
    /// 2. Append the batch to the WAL (durability guarantee)
    /// 3. Swap in the transaction's tables
    /// 4. Checkpoint if the WAL is large enough
    pub(crate) fn install(
        &self,
        mode: TransactionMode,
        ops: Vec<Operation>,
        view: Catalog,
        dirty: BTreeSet<String>,
    ) -> Result<()> {
        let writes = ops.len();
        {
            let mut live = self.catalog.write();

            // Step 1: Log first; a failed append leaves the catalog untouched
            let lsn = self.storage.append(ops)?;

            // Step 2: Make the writes visible
            match mode {
                TransactionMode::VersionChange => *live = view,
                _ => {
                    for name in &dirty {
                        live.adopt(&view, name);
                    }
                }
            }

            tracing::trace!(db = %self.name, lsn, writes, "transaction committed");
        }

        // Step 3: The commit is durable already; a failed checkpoint only
        // means the WAL keeps growing until the next attempt
        if self.storage.needs_checkpoint() {
            if let Err(e) = self.checkpoint() {
                tracing::warn!(db = %self.name, error = %e, "checkpoint failed");
            }
        }

        Ok(())
    }

    /// Write a snapshot and truncate the WAL
    pub fn checkpoint(&self) -> Result<()> {
        let catalog = self.catalog.read();
        self.storage.checkpoint(&catalog)
    }

    // =========================================================================
    // Auto-commit Conveniences
    // =========================================================================

    /// Get a record by key; `None` when absent
    pub fn get(&self, collection: &str, key: impl Into<Value>) -> Result<Option<Record>> {
        self.read(&[collection], |txn| txn.get(collection, key))
    }

    /// Insert or replace one record
    pub fn put(&self, collection: &str, record: Record) -> Result<()> {
        self.write(&[collection], |txn| txn.put(collection, record))
    }

    /// Delete a record; absent keys are a no-op
    pub fn delete(&self, collection: &str, key: impl Into<Value>) -> Result<()> {
        self.write(&[collection], |txn| txn.delete(collection, key))
    }

    /// Remove every record of a collection
    pub fn clear(&self, collection: &str) -> Result<()> {
        self.write(&[collection], |txn| txn.clear(collection))
    }

    /// All records in primary-key order
    pub fn list_all(&self, collection: &str) -> Result<Vec<Record>> {
        self.read(&[collection], |txn| txn.list_all(collection))
    }

    /// Records whose `index` value equals `value`
    pub fn index_lookup(
        &self,
        collection: &str,
        index: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<Record>> {
        self.read(&[collection], |txn| txn.index_lookup(collection, index, value))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Committed schema version
    pub fn version(&self) -> u32 {
        self.catalog.read().version()
    }

    /// Collection names in order
    pub fn collection_names(&self) -> Vec<String> {
        self.catalog.read().table_names()
    }

    pub fn collection_info(&self, name: &str) -> Option<CollectionInfo> {
        let catalog = self.catalog.read();
        catalog.table(name).map(|table| CollectionInfo {
            name: table.name().to_string(),
            primary_key: table.primary_key().to_string(),
            indexes: table.index_defs(),
            record_count: table.len(),
        })
    }

    /// Directory holding the database files (None in memory mode)
    pub fn dir(&self) -> Option<PathBuf> {
        self.storage.dir()
    }

    /// Current WAL size in bytes
    pub fn wal_size(&self) -> u64 {
        self.storage.wal_size()
    }

    /// LSN of the most recent commit
    pub fn last_lsn(&self) -> u64 {
        self.storage.last_lsn()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Close the database gracefully
    ///
    /// Checkpoints so the next open does not need to replay the WAL.
    pub fn close(self) -> Result<()> {
        self.checkpoint()?;
        self.storage.sync()
    }
}
