//! Secondary Index
//!
//! Ordered mapping from an indexed field value to the primary keys of the
//! records carrying it.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeBounds;

use crate::error::{Result, SymbolDbError};
use crate::record::{Record, Value};
use crate::schema::IndexDef;

/// A secondary index over one field
///
/// Records where the field is absent or null are not indexed.
#[derive(Debug, Clone)]
pub struct SecondaryIndex {
    def: IndexDef,
    entries: BTreeMap<Value, BTreeSet<Value>>,
}

impl SecondaryIndex {
    pub fn new(def: IndexDef) -> Self {
        Self {
            def,
            entries: BTreeMap::new(),
        }
    }

    pub fn def(&self) -> &IndexDef {
        &self.def
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn is_unique(&self) -> bool {
        self.def.unique
    }

    /// The value this index would file `record` under, if any
    pub fn indexed_value<'r>(&self, record: &'r Record) -> Option<&'r Value> {
        record.get(&self.def.field).filter(|v| !v.is_null())
    }

    /// Check that filing `record` under primary key `pk` keeps the index valid
    pub fn check(&self, collection: &str, pk: &Value, record: &Record) -> Result<()> {
        if !self.def.unique {
            return Ok(());
        }

        let Some(value) = self.indexed_value(record) else {
            return Ok(());
        };

        match self.entries.get(value) {
            Some(owners) if owners.iter().any(|owner| owner != pk) => {
                Err(SymbolDbError::UniqueConstraintViolation {
                    collection: collection.to_string(),
                    index: self.def.name.clone(),
                    value: value.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    pub fn insert(&mut self, pk: &Value, record: &Record) {
        if let Some(value) = self.indexed_value(record) {
            self.entries
                .entry(value.clone())
                .or_default()
                .insert(pk.clone());
        }
    }

    pub fn remove(&mut self, pk: &Value, record: &Record) {
        let Some(value) = self.indexed_value(record) else {
            return;
        };

        if let Some(owners) = self.entries.get_mut(value) {
            owners.remove(pk);
            if owners.is_empty() {
                self.entries.remove(value);
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Primary keys filed under exactly `value`
    pub fn lookup(&self, value: &Value) -> Vec<Value> {
        self.entries
            .get(value)
            .map(|owners| owners.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Primary keys whose indexed value falls in `range`, in index order
    pub fn range<R: RangeBounds<Value>>(&self, range: R) -> Vec<Value> {
        self.entries
            .range(range)
            .flat_map(|(_, owners)| owners.iter().cloned())
            .collect()
    }

    /// Number of distinct indexed values
    pub fn distinct_values(&self) -> usize {
        self.entries.len()
    }
}
