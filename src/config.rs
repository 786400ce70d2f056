//! Configuration for symboldb
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Main configuration for a symboldb instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all databases
    /// Internal structure:
    ///   {data_dir}/
    ///     └── {db_name}/
    ///           ├── wal.log        (write-ahead log)
    ///           └── snapshot.db    (latest checkpoint)
    pub data_dir: PathBuf,

    /// Whether data lives on disk or only in memory
    pub storage_mode: StorageMode,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    /// WAL size (in bytes) that triggers a snapshot + WAL truncation
    pub checkpoint_threshold: u64,

    // -------------------------------------------------------------------------
    // Transaction Configuration
    // -------------------------------------------------------------------------
    /// Max time a transaction waits for its collection locks (milliseconds)
    pub lock_timeout_ms: u64,
}

/// Where the engine keeps its data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// WAL + snapshot files under `data_dir`
    Disk,

    /// Nothing is written; data is lost when the database is dropped
    Memory,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./symboldb_data"),
            storage_mode: StorageMode::Disk,
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
            checkpoint_threshold: 4 * 1024 * 1024, // 4 MB
            lock_timeout_ms: 30_000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Config for a database that never touches the filesystem
    pub fn in_memory() -> Self {
        Self {
            storage_mode: StorageMode::Memory,
            ..Self::default()
        }
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all databases)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the storage mode
    pub fn storage_mode(mut self, mode: StorageMode) -> Self {
        self.config.storage_mode = mode;
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the WAL size (in bytes) that triggers a checkpoint
    pub fn checkpoint_threshold(mut self, bytes: u64) -> Self {
        self.config.checkpoint_threshold = bytes;
        self
    }

    /// Set the lock wait timeout (in milliseconds)
    pub fn lock_timeout_ms(mut self, ms: u64) -> Self {
        self.config.lock_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
