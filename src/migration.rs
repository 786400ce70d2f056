//! Migration Runner
//!
//! Brings a database from its stored schema version to the registry's
//! current version, one declared version at a time.
//!
//! Each version hop runs in its own `VersionChange` transaction that also
//! persists the new version number, so structure and version advance
//! together. A failing hop leaves the database at the previous version.

use crate::engine::Database;
use crate::error::{Result, SymbolDbError};
use crate::schema::{SchemaChange, SchemaRegistry};
use crate::txn::{Transaction, TransactionMode};

/// Outcome of a migration run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Stored version before the run
    pub from_version: u32,

    /// Stored version after the run
    pub to_version: u32,

    /// Changes that altered the structure
    pub applied: usize,

    /// Changes that found their target already in place
    pub skipped: usize,
}

impl MigrationReport {
    pub fn upgraded(&self) -> bool {
        self.to_version > self.from_version
    }
}

pub struct MigrationRunner;

impl MigrationRunner {
    /// Upgrade `db` to `registry.current_version()`
    ///
    /// Safe to run any number of times: at the current version it performs no
    /// structural change.
    pub fn migrate(db: &Database, registry: &SchemaRegistry) -> Result<MigrationReport> {
        let stored = db.version();
        let target = registry.current_version();
        if stored > target {
            return Err(SymbolDbError::VersionDowngrade {
                stored,
                requested: target,
            });
        }

        let mut report = MigrationReport {
            from_version: stored,
            to_version: stored,
            ..Default::default()
        };

        for step in registry.upgrade_path(stored)? {
            let mut txn = db.begin(TransactionMode::VersionChange, &[])?;

            // Another opener may have migrated while we waited for the lock
            if txn.version() >= step.version {
                report.to_version = txn.version();
                continue;
            }

            for (index, change) in step.changes.iter().enumerate() {
                let changed = Self::apply(&mut txn, change).map_err(|e| {
                    SymbolDbError::Migration {
                        version: step.version,
                        step: index,
                        reason: format!("{}: {}", change, e),
                    }
                })?;

                if changed {
                    tracing::debug!(version = step.version, step = index, %change, "applied");
                    report.applied += 1;
                } else {
                    report.skipped += 1;
                }
            }

            let commit_step = step.changes.len();
            txn.set_version(step.version)
                .and_then(|_| txn.commit())
                .map_err(|e| SymbolDbError::Migration {
                    version: step.version,
                    step: commit_step,
                    reason: e.to_string(),
                })?;

            tracing::info!(
                db = db.name(),
                version = step.version,
                changes = step.changes.len(),
                "schema upgraded"
            );
            report.to_version = step.version;
        }

        Ok(report)
    }

    fn apply(txn: &mut Transaction<'_>, change: &SchemaChange) -> Result<bool> {
        match change {
            SchemaChange::CreateCollection { name, primary_key } => {
                txn.create_collection(name, primary_key)
            }
            SchemaChange::DropCollection { name } => txn.drop_collection(name),
            SchemaChange::CreateIndex { collection, index } => {
                txn.create_index(collection, index.clone())
            }
            SchemaChange::DropIndex { collection, index } => txn.drop_index(collection, index),
        }
    }
}
