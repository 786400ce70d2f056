//! Catalog
//!
//! The complete state of a database: its schema version and every table.
//!
//! Tables sit behind `Arc` so a transaction can take a cheap copy of the
//! catalog and only pay for cloning the tables it actually writes.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Result, SymbolDbError};
use crate::schema::IndexDef;
use crate::wal::Operation;

use super::{SnapshotData, Table, TableImage};

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    version: u32,
    tables: BTreeMap<String, Arc<Table>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name).map(|table| table.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Collection names in order
    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .map(Arc::make_mut)
            .ok_or_else(|| SymbolDbError::UnknownCollection(name.to_string()))
    }

    /// Copy `name` from `other` into this catalog, or remove it when `other`
    /// no longer has it
    pub(crate) fn adopt(&mut self, other: &Catalog, name: &str) {
        match other.tables.get(name) {
            Some(table) => {
                self.tables.insert(name.to_string(), Arc::clone(table));
            }
            None => {
                self.tables.remove(name);
            }
        }
    }

    // =========================================================================
    // Applying Operations
    // =========================================================================

    /// Apply one logged operation
    ///
    /// Returns whether the catalog changed: structural operations that find
    /// their target already in the requested state are no-ops.
    pub fn apply(&mut self, op: &Operation) -> Result<bool> {
        match op {
            Operation::Put { collection, record } => {
                self.table_mut(collection)?.put(record.clone())?;
                Ok(true)
            }
            Operation::Delete { collection, key } => {
                Ok(self.table_mut(collection)?.delete(key).is_some())
            }
            Operation::Clear { collection } => {
                self.table_mut(collection)?.clear();
                Ok(true)
            }
            Operation::CreateCollection { name, primary_key } => {
                self.create_collection(name, primary_key)
            }
            Operation::DropCollection { name } => Ok(self.tables.remove(name).is_some()),
            Operation::CreateIndex { collection, index } => {
                self.create_index(collection, index)
            }
            Operation::DropIndex { collection, index } => {
                if !self.tables.contains_key(collection) {
                    return Ok(false);
                }
                Ok(self.table_mut(collection)?.drop_index(index))
            }
            Operation::SetVersion { version } => {
                let changed = self.version != *version;
                self.version = *version;
                Ok(changed)
            }
        }
    }

    fn create_collection(&mut self, name: &str, primary_key: &str) -> Result<bool> {
        if let Some(existing) = self.tables.get(name) {
            if existing.primary_key() != primary_key {
                return Err(SymbolDbError::InvalidSchema(format!(
                    "collection '{}' already exists with primary key '{}'",
                    name,
                    existing.primary_key()
                )));
            }
            return Ok(false);
        }

        self.tables
            .insert(name.to_string(), Arc::new(Table::new(name, primary_key)));
        Ok(true)
    }

    fn create_index(&mut self, collection: &str, index: &IndexDef) -> Result<bool> {
        // Avoid cloning the table when the index is already in place
        let unchanged = self
            .table(collection)
            .and_then(|table| table.index(&index.name))
            .map(|existing| existing.def() == index)
            .unwrap_or(false);
        if unchanged {
            return Ok(false);
        }

        self.table_mut(collection)?.create_index(index.clone())
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub fn to_snapshot(&self) -> SnapshotData {
        SnapshotData {
            version: self.version,
            tables: self
                .tables
                .values()
                .map(|table| TableImage {
                    name: table.name().to_string(),
                    primary_key: table.primary_key().to_string(),
                    indexes: table.index_defs(),
                    records: table.scan().cloned().collect(),
                })
                .collect(),
        }
    }

    /// Rebuild a catalog (records and indexes) from a snapshot
    pub fn from_snapshot(data: SnapshotData) -> Result<Self> {
        let mut catalog = Catalog {
            version: data.version,
            tables: BTreeMap::new(),
        };

        for image in data.tables {
            let mut table = Table::new(image.name.clone(), image.primary_key);
            for record in image.records {
                table.put(record)?;
            }
            for index in image.indexes {
                table.create_index(index)?;
            }
            catalog.tables.insert(image.name, Arc::new(table));
        }

        Ok(catalog)
    }
}
