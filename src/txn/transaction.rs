//! Transaction
//!
//! A unit of isolated reads and atomic writes over a declared set of
//! collections.

use std::collections::BTreeSet;
use std::ops::RangeBounds;

use crate::engine::Database;
use crate::error::{Result, SymbolDbError};
use crate::record::{Record, Value};
use crate::schema::IndexDef;
use crate::storage::{Catalog, Table};
use crate::wal::Operation;

use super::{LockGuard, TransactionMode};

/// An open transaction
///
/// ## Lifecycle
/// - Created by [`Database::begin`] once its locks are granted
/// - Operations apply in program order to a private view
/// - [`commit`](Self::commit) logs the batch, then installs it atomically
/// - Dropping without committing aborts: nothing is applied
///
/// A failed write poisons the transaction; commit then returns
/// `TransactionAborted` and none of its writes become visible.
pub struct Transaction<'db> {
    db: &'db Database,
    mode: TransactionMode,

    /// Catalog as of lock acquisition, plus this transaction's writes
    view: Catalog,

    /// Logged form of every successful write, in order
    ops: Vec<Operation>,

    /// Collections written (or created/dropped)
    dirty: BTreeSet<String>,

    /// First failure, if any
    poisoned: Option<String>,

    finished: bool,

    /// Held until the transaction ends
    locks: LockGuard<'db>,
}

impl<'db> Transaction<'db> {
    pub(crate) fn new(db: &'db Database, view: Catalog, locks: LockGuard<'db>) -> Self {
        Self {
            db,
            mode: locks.mode(),
            view,
            ops: Vec::new(),
            dirty: BTreeSet::new(),
            poisoned: None,
            finished: false,
            locks,
        }
    }

    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Collections declared for this transaction
    pub fn scope(&self) -> &BTreeSet<String> {
        self.locks.scope()
    }

    /// Schema version as seen by this transaction
    pub fn version(&self) -> u32 {
        self.view.version()
    }

    /// Whether a write has failed
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    /// Number of writes staged so far
    pub fn pending_writes(&self) -> usize {
        self.ops.len()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    fn table(&self, collection: &str) -> Result<&Table> {
        if self.mode != TransactionMode::VersionChange && !self.scope().contains(collection) {
            return Err(SymbolDbError::OutOfScope(collection.to_string()));
        }
        self.view
            .table(collection)
            .ok_or_else(|| SymbolDbError::UnknownCollection(collection.to_string()))
    }

    /// Get a record by primary key; `None` when absent
    pub fn get(&self, collection: &str, key: impl Into<Value>) -> Result<Option<Record>> {
        let key = key.into();
        Ok(self.table(collection)?.get(&key).cloned())
    }

    /// All records in primary-key order
    ///
    /// Each call returns the full sequence again.
    pub fn list_all(&self, collection: &str) -> Result<Vec<Record>> {
        Ok(self.table(collection)?.scan().cloned().collect())
    }

    /// Primary keys in order
    pub fn keys(&self, collection: &str) -> Result<Vec<Value>> {
        Ok(self.table(collection)?.keys().cloned().collect())
    }

    pub fn count(&self, collection: &str) -> Result<usize> {
        Ok(self.table(collection)?.len())
    }

    /// Records whose `index` value equals `value`
    pub fn index_lookup(
        &self,
        collection: &str,
        index: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<Record>> {
        let value = value.into();
        let records = self.table(collection)?.lookup(index, &value)?;
        Ok(records.into_iter().cloned().collect())
    }

    /// Records whose `index` value falls in `range`, in index order
    pub fn index_range<R: RangeBounds<Value>>(
        &self,
        collection: &str,
        index: &str,
        range: R,
    ) -> Result<Vec<Record>> {
        let records = self.table(collection)?.range(index, range)?;
        Ok(records.into_iter().cloned().collect())
    }

    /// Index definitions of a collection
    pub fn indexes(&self, collection: &str) -> Result<Vec<IndexDef>> {
        Ok(self.table(collection)?.index_defs())
    }

    /// Collection names visible to this transaction
    pub fn collection_names(&self) -> Vec<String> {
        self.view.table_names()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Apply one operation to the private view, poisoning on failure
    fn stage(&mut self, op: Operation) -> Result<bool> {
        if let Some(reason) = &self.poisoned {
            return Err(SymbolDbError::TransactionAborted(reason.clone()));
        }

        let result = self.check_writable(&op).and_then(|_| self.view.apply(&op));
        match result {
            Ok(changed) => {
                if changed {
                    if let Some(collection) = affected_collection(&op) {
                        self.dirty.insert(collection.to_string());
                    }
                    self.ops.push(op);
                }
                Ok(changed)
            }
            Err(e) => {
                tracing::debug!(error = %e, "transaction poisoned");
                self.poisoned = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn check_writable(&self, op: &Operation) -> Result<()> {
        let structural = !matches!(
            op,
            Operation::Put { .. } | Operation::Delete { .. } | Operation::Clear { .. }
        );

        match self.mode {
            TransactionMode::VersionChange => Ok(()),
            TransactionMode::ReadOnly => Err(SymbolDbError::ReadOnlyTransaction(
                affected_collection(op).unwrap_or("*").to_string(),
            )),
            TransactionMode::ReadWrite if structural => Err(SymbolDbError::InvalidSchema(
                "structural changes require a version-change transaction".to_string(),
            )),
            TransactionMode::ReadWrite => {
                // Unknown collections surface as UnknownCollection from apply
                self.table(affected_collection(op).unwrap_or_default())
                    .map(|_| ())
            }
        }
    }

    /// Insert or replace a record
    ///
    /// Fails with `InvalidRecord` when the primary key is missing and with
    /// `UniqueConstraintViolation` when a unique index already maps the
    /// record's value to another key.
    pub fn put(&mut self, collection: &str, record: Record) -> Result<()> {
        self.stage(Operation::Put {
            collection: collection.to_string(),
            record,
        })
        .map(|_| ())
    }

    /// Delete a record; absent keys are a no-op
    pub fn delete(&mut self, collection: &str, key: impl Into<Value>) -> Result<()> {
        self.stage(Operation::Delete {
            collection: collection.to_string(),
            key: key.into(),
        })
        .map(|_| ())
    }

    /// Remove every record of a collection and empty its indexes
    pub fn clear(&mut self, collection: &str) -> Result<()> {
        self.stage(Operation::Clear {
            collection: collection.to_string(),
        })
        .map(|_| ())
    }

    // =========================================================================
    // Structural Changes (VersionChange only)
    // =========================================================================

    /// Returns `false` when the collection already exists
    pub fn create_collection(&mut self, name: &str, primary_key: &str) -> Result<bool> {
        self.stage(Operation::CreateCollection {
            name: name.to_string(),
            primary_key: primary_key.to_string(),
        })
    }

    /// Returns `false` when the collection did not exist
    pub fn drop_collection(&mut self, name: &str) -> Result<bool> {
        self.stage(Operation::DropCollection {
            name: name.to_string(),
        })
    }

    /// Returns `false` when an identical index already exists
    pub fn create_index(&mut self, collection: &str, index: IndexDef) -> Result<bool> {
        self.stage(Operation::CreateIndex {
            collection: collection.to_string(),
            index,
        })
    }

    /// Returns `false` when the index did not exist
    pub fn drop_index(&mut self, collection: &str, index: &str) -> Result<bool> {
        self.stage(Operation::DropIndex {
            collection: collection.to_string(),
            index: index.to_string(),
        })
    }

    pub fn set_version(&mut self, version: u32) -> Result<bool> {
        self.stage(Operation::SetVersion { version })
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Commit all staged writes atomically
    ///
    /// Read-only and write-free transactions simply release their locks.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;

        if let Some(reason) = self.poisoned.take() {
            return Err(SymbolDbError::TransactionAborted(reason));
        }
        if self.ops.is_empty() {
            return Ok(());
        }

        let ops = std::mem::take(&mut self.ops);
        let dirty = std::mem::take(&mut self.dirty);
        let view = std::mem::take(&mut self.view);
        self.db.install(self.mode, ops, view, dirty)
    }

    /// Discard all staged writes
    pub fn abort(mut self) {
        self.finished = true;
        if !self.ops.is_empty() {
            tracing::debug!(writes = self.ops.len(), "transaction aborted");
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished && !self.ops.is_empty() {
            tracing::debug!(
                writes = self.ops.len(),
                "transaction dropped without commit, discarding writes"
            );
        }
    }
}

/// Collection an operation touches (None for version bumps)
fn affected_collection(op: &Operation) -> Option<&str> {
    match op {
        Operation::Put { collection, .. }
        | Operation::Delete { collection, .. }
        | Operation::Clear { collection }
        | Operation::CreateIndex { collection, .. }
        | Operation::DropIndex { collection, .. } => Some(collection),
        Operation::CreateCollection { name, .. } | Operation::DropCollection { name } => {
            Some(name)
        }
        Operation::SetVersion { .. } => None,
    }
}
