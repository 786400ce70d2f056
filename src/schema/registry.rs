//! Schema Registry
//!
//! Holds the full schema declared at each version and computes the
//! structural changes between versions.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use crate::error::{Result, SymbolDbError};

use super::{CollectionDef, IndexDef, SchemaChange};

/// One hop of an upgrade: the changes that bring the previous version to
/// `version`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeStep {
    pub version: u32,
    pub changes: Vec<SchemaChange>,
}

/// Registry of schema declarations, keyed by version
///
/// Each declaration is the complete schema at that version, not a delta.
/// Version 0 is the implicit empty schema of a freshly created database.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    versions: BTreeMap<u32, Vec<CollectionDef>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the schema at `version`
    ///
    /// Versions must be declared in strictly increasing order, starting at 1.
    pub fn declare(&mut self, version: u32, collections: Vec<CollectionDef>) -> Result<&mut Self> {
        if version == 0 {
            return Err(SymbolDbError::InvalidSchema(
                "version 0 is reserved for the empty schema".to_string(),
            ));
        }
        if let Some(&latest) = self.versions.keys().next_back() {
            if version <= latest {
                return Err(SymbolDbError::InvalidSchema(format!(
                    "version {} must be greater than the latest declared version {}",
                    version, latest
                )));
            }
        }

        Self::validate(version, &collections)?;

        // A collection keeps its primary key for as long as it exists
        let previous = self.current_schema();
        for collection in &collections {
            if let Some(old) = previous.iter().find(|c| c.name == collection.name) {
                if old.primary_key != collection.primary_key {
                    return Err(SymbolDbError::InvalidSchema(format!(
                        "version {}: primary key of '{}' changes from '{}' to '{}'",
                        version, collection.name, old.primary_key, collection.primary_key
                    )));
                }
            }
        }

        self.versions.insert(version, collections);
        Ok(self)
    }

    fn validate(version: u32, collections: &[CollectionDef]) -> Result<()> {
        let invalid = |reason: String| {
            Err(SymbolDbError::InvalidSchema(format!(
                "version {}: {}",
                version, reason
            )))
        };

        let mut names = BTreeSet::new();
        for collection in collections {
            if collection.name.is_empty() {
                return invalid("collection with an empty name".to_string());
            }
            if !names.insert(collection.name.as_str()) {
                return invalid(format!("collection '{}' declared twice", collection.name));
            }
            if collection.primary_key.is_empty() {
                return invalid(format!("collection '{}' has an empty primary key", collection.name));
            }

            let mut index_names = BTreeSet::new();
            for index in &collection.indexes {
                if index.name.is_empty() || index.field.is_empty() {
                    return invalid(format!(
                        "collection '{}' declares an index with an empty name or field",
                        collection.name
                    ));
                }
                if !index_names.insert(index.name.as_str()) {
                    return invalid(format!(
                        "collection '{}' declares index '{}' twice",
                        collection.name, index.name
                    ));
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Latest declared version, or 0 when nothing is declared
    pub fn current_version(&self) -> u32 {
        self.versions.keys().next_back().copied().unwrap_or(0)
    }

    /// All declared versions in ascending order
    pub fn versions(&self) -> impl Iterator<Item = u32> + '_ {
        self.versions.keys().copied()
    }

    /// Effective schema at `version`: the latest declaration at or below it
    pub fn schema_at(&self, version: u32) -> &[CollectionDef] {
        self.versions
            .range(..=version)
            .next_back()
            .map(|(_, collections)| collections.as_slice())
            .unwrap_or(&[])
    }

    pub fn current_schema(&self) -> &[CollectionDef] {
        self.schema_at(self.current_version())
    }

    /// Collection definition at the current version
    pub fn collection(&self, name: &str) -> Option<&CollectionDef> {
        self.current_schema().iter().find(|c| c.name == name)
    }

    // =========================================================================
    // Diff
    // =========================================================================

    /// Ordered structural changes turning the schema at `from` into the schema
    /// at `to`
    ///
    /// Drops come before creates; within each group collections and indexes
    /// are visited in name order.
    pub fn diff(&self, from: u32, to: u32) -> Result<Vec<SchemaChange>> {
        if from > to {
            return Err(SymbolDbError::VersionDowngrade {
                stored: from,
                requested: to,
            });
        }

        let source: BTreeMap<&str, &CollectionDef> = self
            .schema_at(from)
            .iter()
            .map(|c| (c.name.as_str(), c))
            .collect();
        let target: BTreeMap<&str, &CollectionDef> = self
            .schema_at(to)
            .iter()
            .map(|c| (c.name.as_str(), c))
            .collect();

        let mut drops = Vec::new();
        let mut creates = Vec::new();

        for (name, old) in &source {
            match target.get(name) {
                None => drops.push(SchemaChange::DropCollection {
                    name: name.to_string(),
                }),
                Some(new) => {
                    if old.primary_key != new.primary_key {
                        return Err(SymbolDbError::InvalidSchema(format!(
                            "primary key of '{}' differs between versions {} and {}",
                            name, from, to
                        )));
                    }
                    for index in sorted_indexes(old) {
                        if new.find_index(&index.name) != Some(index) {
                            drops.push(SchemaChange::DropIndex {
                                collection: name.to_string(),
                                index: index.name.clone(),
                            });
                        }
                    }
                }
            }
        }

        for (name, new) in &target {
            let old = source.get(name);
            if old.is_none() {
                creates.push(SchemaChange::CreateCollection {
                    name: name.to_string(),
                    primary_key: new.primary_key.clone(),
                });
            }
            for index in sorted_indexes(new) {
                let unchanged = old.and_then(|o| o.find_index(&index.name)) == Some(index);
                if !unchanged {
                    creates.push(SchemaChange::CreateIndex {
                        collection: name.to_string(),
                        index: index.clone(),
                    });
                }
            }
        }

        drops.extend(creates);
        Ok(drops)
    }

    /// One step per declared version above `from`, each diffed against the
    /// step before it
    pub fn upgrade_path(&self, from: u32) -> Result<Vec<UpgradeStep>> {
        let current = self.current_version();
        if from > current {
            return Err(SymbolDbError::VersionDowngrade {
                stored: from,
                requested: current,
            });
        }

        let mut steps = Vec::new();
        let mut previous = from;
        for version in self
            .versions
            .range((Bound::Excluded(from), Bound::Unbounded))
            .map(|(v, _)| *v)
        {
            steps.push(UpgradeStep {
                version,
                changes: self.diff(previous, version)?,
            });
            previous = version;
        }
        Ok(steps)
    }
}

fn sorted_indexes(collection: &CollectionDef) -> Vec<&IndexDef> {
    let mut indexes: Vec<&IndexDef> = collection.indexes.iter().collect();
    indexes.sort_by(|a, b| a.name.cmp(&b.name));
    indexes
}
