//! Storage Manager
//!
//! Owns the durable side of a database: the WAL and the snapshot file.
//!
//! ## Responsibilities
//! - Create the database directory on first open
//! - Rebuild the catalog on startup: snapshot first, then newer WAL entries
//! - Log every committed batch before it becomes visible
//! - Checkpoint: write a snapshot and truncate the WAL once it grows large

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::{Config, StorageMode};
use crate::error::{Result, SymbolDbError};
use crate::wal::{Operation, RecoveryResult, WalRecovery, WalWriter};

use super::{Catalog, Snapshot};

/// Where committed batches go
enum Backend {
    Disk {
        dir: PathBuf,
        wal: WalWriter,
    },

    /// Nothing is persisted; LSNs are still handed out
    Memory { next_lsn: u64 },
}

/// Manages the durable storage of one database
///
/// ## Concurrency:
/// - `backend`: Mutex; appends and checkpoints are exclusive
/// - Callers hold the catalog lock first, then this one
pub struct StorageManager {
    backend: Mutex<Backend>,

    /// WAL size that makes `needs_checkpoint` true
    checkpoint_threshold: u64,
}

impl StorageManager {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";
    const SNAPSHOT_FILENAME: &'static str = "snapshot.db";

    /// Open or create storage for database `name`
    ///
    /// On startup:
    /// 1. Create `{data_dir}/{name}/` if it doesn't exist
    /// 2. Load the snapshot, if any
    /// 3. Recover the WAL (cutting a torn tail) and replay entries newer than
    ///    the snapshot
    /// 4. Open the WAL for appending, continuing LSNs after both
    pub fn open(config: &Config, name: &str) -> Result<(Self, Catalog)> {
        if config.storage_mode == StorageMode::Memory {
            let manager = Self {
                backend: Mutex::new(Backend::Memory { next_lsn: 1 }),
                checkpoint_threshold: config.checkpoint_threshold,
            };
            return Ok((manager, Catalog::new()));
        }

        let dir = Self::database_dir(config, name);
        fs::create_dir_all(&dir).map_err(|e| unavailable(&dir, e))?;

        // Step 1: Snapshot
        let snapshot_path = dir.join(Self::SNAPSHOT_FILENAME);
        let (snapshot_lsn, mut catalog) = match Snapshot::read(&snapshot_path)? {
            Some((lsn, data)) => (lsn, Catalog::from_snapshot(data)?),
            None => (0, Catalog::new()),
        };

        // Step 2: WAL replay
        let wal_path = dir.join(Self::WAL_FILENAME);
        let (entries, recovery) = WalRecovery::recover(&wal_path).map_err(|e| match e {
            SymbolDbError::Io(io) => unavailable(&wal_path, io),
            other => other,
        })?;

        let mut replayed = 0;
        for entry in entries.iter().filter(|entry| entry.lsn > snapshot_lsn) {
            for op in &entry.batch {
                catalog.apply(op).map_err(|e| {
                    SymbolDbError::Storage(format!(
                        "replay of WAL entry {} failed: {}",
                        entry.lsn, e
                    ))
                })?;
            }
            replayed += 1;
        }
        Self::log_recovery(&dir, snapshot_lsn, replayed, &recovery);

        // Step 3: Writer
        let next_lsn = snapshot_lsn.max(recovery.last_lsn) + 1;
        let wal = WalWriter::open_at(&wal_path, config.wal_sync_strategy, next_lsn)
            .map_err(|e| match e {
                SymbolDbError::Io(io) => unavailable(&wal_path, io),
                other => other,
            })?;

        let manager = Self {
            backend: Mutex::new(Backend::Disk { dir, wal }),
            checkpoint_threshold: config.checkpoint_threshold,
        };
        Ok((manager, catalog))
    }

    fn log_recovery(dir: &Path, snapshot_lsn: u64, replayed: usize, recovery: &RecoveryResult) {
        if replayed > 0 || recovery.entries_corrupted > 0 {
            tracing::info!(
                dir = %dir.display(),
                snapshot_lsn,
                replayed,
                corrupted = recovery.entries_corrupted,
                last_lsn = recovery.last_lsn,
                "WAL recovery complete"
            );
        }
    }

    /// Log a committed batch, returning its LSN
    pub fn append(&self, batch: Vec<Operation>) -> Result<u64> {
        match &mut *self.backend.lock() {
            Backend::Disk { wal, .. } => wal.append(batch),
            Backend::Memory { next_lsn } => {
                let lsn = *next_lsn;
                *next_lsn += 1;
                Ok(lsn)
            }
        }
    }

    /// Whether the WAL has grown past the checkpoint threshold
    pub fn needs_checkpoint(&self) -> bool {
        match &*self.backend.lock() {
            Backend::Disk { wal, .. } => wal.size_bytes() >= self.checkpoint_threshold,
            Backend::Memory { .. } => false,
        }
    }

    /// Write `catalog` as a snapshot and truncate the WAL
    ///
    /// The caller must keep commits out (hold the catalog lock) until this
    /// returns, so the snapshot covers exactly the logged entries.
    pub fn checkpoint(&self, catalog: &Catalog) -> Result<()> {
        let mut backend = self.backend.lock();
        let Backend::Disk { dir, wal } = &mut *backend else {
            return Ok(());
        };

        let lsn = wal.last_lsn();
        let bytes = Snapshot::write(
            &dir.join(Self::SNAPSHOT_FILENAME),
            lsn,
            &catalog.to_snapshot(),
        )?;
        wal.truncate()?;

        tracing::debug!(dir = %dir.display(), lsn, bytes, "checkpoint written");
        Ok(())
    }

    /// Force sync of the WAL
    pub fn sync(&self) -> Result<()> {
        match &mut *self.backend.lock() {
            Backend::Disk { wal, .. } => wal.sync(),
            Backend::Memory { .. } => Ok(()),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Directory holding the database files (None in memory mode)
    pub fn dir(&self) -> Option<PathBuf> {
        match &*self.backend.lock() {
            Backend::Disk { dir, .. } => Some(dir.clone()),
            Backend::Memory { .. } => None,
        }
    }

    /// Current WAL size in bytes
    pub fn wal_size(&self) -> u64 {
        match &*self.backend.lock() {
            Backend::Disk { wal, .. } => wal.size_bytes(),
            Backend::Memory { .. } => 0,
        }
    }

    /// LSN of the most recent committed batch
    pub fn last_lsn(&self) -> u64 {
        match &*self.backend.lock() {
            Backend::Disk { wal, .. } => wal.last_lsn(),
            Backend::Memory { next_lsn } => *next_lsn - 1,
        }
    }

    /// Directory a database named `name` lives in
    pub fn database_dir(config: &Config, name: &str) -> PathBuf {
        config.data_dir.join(name)
    }

    pub fn wal_path(config: &Config, name: &str) -> PathBuf {
        Self::database_dir(config, name).join(Self::WAL_FILENAME)
    }

    pub fn snapshot_path(config: &Config, name: &str) -> PathBuf {
        Self::database_dir(config, name).join(Self::SNAPSHOT_FILENAME)
    }

    /// Delete a database's files (administrative; the database must be closed)
    pub fn destroy(config: &Config, name: &str) -> Result<bool> {
        let dir = Self::database_dir(config, name);
        if config.storage_mode == StorageMode::Memory || !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir)?;
        Ok(true)
    }
}

fn unavailable(path: &Path, err: io::Error) -> SymbolDbError {
    SymbolDbError::StorageUnavailable {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
