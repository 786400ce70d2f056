//! Table
//!
//! Records of one collection in primary-key order, plus its secondary
//! indexes.

use std::collections::BTreeMap;
use std::ops::RangeBounds;

use crate::error::{Result, SymbolDbError};
use crate::record::{Record, Value};
use crate::schema::IndexDef;

use super::SecondaryIndex;

/// One collection's records and indexes
///
/// Every mutation validates first and mutates second, so a failed call
/// leaves the table untouched.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    primary_key: String,
    records: BTreeMap<Value, Record>,
    indexes: BTreeMap<String, SecondaryIndex>,
}

impl Table {
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
            records: BTreeMap::new(),
            indexes: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Extract and validate the primary key of `record`
    pub fn key_of(&self, record: &Record) -> Result<Value> {
        match record.get(&self.primary_key) {
            Some(value) if value.is_key() => Ok(value.clone()),
            Some(value) => Err(SymbolDbError::InvalidRecord {
                collection: self.name.clone(),
                reason: format!(
                    "primary key '{}' must be text or integer, got {}",
                    self.primary_key, value
                ),
            }),
            None => Err(SymbolDbError::InvalidRecord {
                collection: self.name.clone(),
                reason: format!("missing primary key field '{}'", self.primary_key),
            }),
        }
    }

    // =========================================================================
    // Records
    // =========================================================================

    pub fn get(&self, key: &Value) -> Option<&Record> {
        self.records.get(key)
    }

    /// Insert or replace a record, returning the one it replaced
    ///
    /// Unique indexes are checked before anything changes. Then the old
    /// record's index entries are removed and the new record's inserted.
    pub fn put(&mut self, record: Record) -> Result<Option<Record>> {
        let pk = self.key_of(&record)?;

        for index in self.indexes.values() {
            index.check(&self.name, &pk, &record)?;
        }

        let previous = self.records.remove(&pk);
        if let Some(old) = &previous {
            for index in self.indexes.values_mut() {
                index.remove(&pk, old);
            }
        }
        for index in self.indexes.values_mut() {
            index.insert(&pk, &record);
        }
        self.records.insert(pk, record);

        Ok(previous)
    }

    /// Remove a record; absent keys are a no-op
    pub fn delete(&mut self, key: &Value) -> Option<Record> {
        let removed = self.records.remove(key)?;
        for index in self.indexes.values_mut() {
            index.remove(key, &removed);
        }
        Some(removed)
    }

    /// Remove all records and empty every index
    pub fn clear(&mut self) {
        self.records.clear();
        for index in self.indexes.values_mut() {
            index.clear();
        }
    }

    /// Records in primary-key order
    pub fn scan(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.records.keys()
    }

    // =========================================================================
    // Indexes
    // =========================================================================

    pub fn index(&self, name: &str) -> Option<&SecondaryIndex> {
        self.indexes.get(name)
    }

    /// Index definitions in name order
    pub fn index_defs(&self) -> Vec<IndexDef> {
        self.indexes.values().map(|index| index.def().clone()).collect()
    }

    /// Create an index and populate it from existing records
    ///
    /// Returns `false` when an identical index already exists. An index with
    /// the same name but a different definition is rebuilt.
    pub fn create_index(&mut self, def: IndexDef) -> Result<bool> {
        if self.indexes.get(&def.name).map(|index| index.def()) == Some(&def) {
            return Ok(false);
        }

        let mut index = SecondaryIndex::new(def);
        for (pk, record) in &self.records {
            index.check(&self.name, pk, record)?;
            index.insert(pk, record);
        }

        self.indexes.insert(index.name().to_string(), index);
        Ok(true)
    }

    /// Drop an index; returns `false` when it did not exist
    pub fn drop_index(&mut self, name: &str) -> bool {
        self.indexes.remove(name).is_some()
    }

    fn require_index(&self, name: &str) -> Result<&SecondaryIndex> {
        self.indexes
            .get(name)
            .ok_or_else(|| SymbolDbError::UnknownIndex {
                collection: self.name.clone(),
                index: name.to_string(),
            })
    }

    /// Records whose indexed field equals `value`, in primary-key order
    pub fn lookup(&self, index: &str, value: &Value) -> Result<Vec<&Record>> {
        let keys = self.require_index(index)?.lookup(value);
        Ok(keys.iter().filter_map(|pk| self.records.get(pk)).collect())
    }

    /// Records whose indexed field falls in `range`, in index order
    pub fn range<R: RangeBounds<Value>>(&self, index: &str, range: R) -> Result<Vec<&Record>> {
        let keys = self.require_index(index)?.range(range);
        Ok(keys.iter().filter_map(|pk| self.records.get(pk)).collect())
    }
}
