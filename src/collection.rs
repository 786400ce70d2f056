//! Collection API
//!
//! A handle bound to one collection, applying that collection's declared
//! policies (required fields, lowercase normalization) before delegating to
//! the engine.

use std::sync::Arc;

use crate::engine::Database;
use crate::error::{Result, SymbolDbError};
use crate::record::{Record, Value};
use crate::schema::{CollectionDef, SchemaRegistry};

/// Handle to one collection of a shared database
#[derive(Clone)]
pub struct Collection {
    db: Arc<Database>,
    def: CollectionDef,
}

impl Collection {
    pub fn new(db: Arc<Database>, def: CollectionDef) -> Self {
        Self { db, def }
    }

    /// Bind to `name` as declared at the registry's current version
    pub fn from_registry(db: Arc<Database>, registry: &SchemaRegistry, name: &str) -> Result<Self> {
        let def = registry
            .collection(name)
            .cloned()
            .ok_or_else(|| SymbolDbError::UnknownCollection(name.to_string()))?;
        Ok(Self::new(db, def))
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn definition(&self) -> &CollectionDef {
        &self.def
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    // =========================================================================
    // Policies
    // =========================================================================

    /// Validate required fields and lowercase the normalized ones
    pub fn normalize(&self, mut record: Record) -> Result<Record> {
        for field in &self.def.required {
            if record.get(field).map_or(true, Value::is_null) {
                return Err(SymbolDbError::InvalidRecord {
                    collection: self.def.name.clone(),
                    reason: format!("missing required field '{}'", field),
                });
            }
        }

        for field in &self.def.normalize {
            if let Some(value) = record.get_mut(field) {
                *value = value.lowercased();
            }
        }
        Ok(record)
    }

    /// Lookup key in stored form
    fn normalize_key(&self, key: Value) -> Value {
        if self.def.is_normalized(&self.def.primary_key) {
            key.lowercased()
        } else {
            key
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Insert or replace a record, returning it as stored
    pub fn save(&self, record: Record) -> Result<Record> {
        let record = self.normalize(record)?;
        self.db.put(&self.def.name, record.clone())?;
        Ok(record)
    }

    /// Get a record by primary key; `None` when absent
    pub fn get(&self, key: impl Into<Value>) -> Result<Option<Record>> {
        self.db.get(&self.def.name, self.normalize_key(key.into()))
    }

    /// All records in primary-key order
    pub fn list(&self) -> Result<Vec<Record>> {
        self.db.list_all(&self.def.name)
    }

    /// Delete a record; absent keys are a no-op
    pub fn remove(&self, key: impl Into<Value>) -> Result<()> {
        self.db.delete(&self.def.name, self.normalize_key(key.into()))
    }

    /// Remove every record
    pub fn clear(&self) -> Result<()> {
        self.db.clear(&self.def.name)
    }

    pub fn count(&self) -> Result<usize> {
        let name = self.def.name.as_str();
        self.db.read(&[name], |txn| txn.count(name))
    }

    /// Replace the whole collection with `records` in one transaction
    ///
    /// Readers see either the old set or the new one. If any record is
    /// rejected the previous contents stay in place.
    pub fn replace_all<I>(&self, records: I) -> Result<usize>
    where
        I: IntoIterator<Item = Record>,
    {
        // Validate before taking the lock
        let records = records
            .into_iter()
            .map(|record| self.normalize(record))
            .collect::<Result<Vec<_>>>()?;

        let name = self.def.name.as_str();
        let count = self.db.write(&[name], |txn| {
            txn.clear(name)?;
            for record in records {
                txn.put(name, record)?;
            }
            txn.count(name)
        })?;

        tracing::debug!(collection = name, count, "collection replaced");
        Ok(count)
    }

    /// Records whose `index` value equals `value`
    ///
    /// The value is lowercased when the indexed field is normalized.
    pub fn find_by(&self, index: &str, value: impl Into<Value>) -> Result<Vec<Record>> {
        let mut value = value.into();
        let normalized = self
            .def
            .find_index(index)
            .map(|def| self.def.is_normalized(&def.field))
            .unwrap_or(false);
        if normalized {
            value = value.lowercased();
        }
        self.db.index_lookup(&self.def.name, index, value)
    }
}
