//! Storage Module
//!
//! In-memory tables backed by a write-ahead log and periodic snapshots.
//!
//! ## Responsibilities
//! - Hold every collection's records in primary-key order
//! - Maintain secondary indexes on every insert/update/delete
//! - Apply logged operations (live commits and WAL replay share one path)
//! - Persist checkpoints so the WAL can be truncated
//!
//! ## On-disk Layout
//! ```text
//! {data_dir}/{db_name}/
//!   ├── wal.log        committed batches since the last checkpoint
//!   └── snapshot.db    full image of all tables at some LSN
//! ```
//!
//! ## Snapshot Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                       │
//! │   Magic: "SYDB" (4) | Format: u16 (2) | LSN: u64 (8)    │
//! ├─────────────────────────────────────────────────────────┤
//! │ Body (variable)                                         │
//! │   bincode(schema version, tables + records)             │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (8 bytes)                                        │
//! │   BodyCRC: u32 (4) | BodyLen: u32 (4)                   │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod catalog;
mod index;
mod manager;
mod snapshot;
mod table;

pub use catalog::Catalog;
pub use index::SecondaryIndex;
pub use manager::StorageManager;
pub use snapshot::{Snapshot, SnapshotData, TableImage};
pub use table::Table;

// =============================================================================
// Shared Constants
// =============================================================================

/// Magic bytes identifying a symboldb snapshot file
pub(crate) const MAGIC: &[u8; 4] = b"SYDB";

/// Current snapshot format version
pub(crate) const FORMAT_VERSION: u16 = 1;

/// Header size: Magic (4) + Format (2) + LSN (8) = 14 bytes
pub(crate) const HEADER_SIZE: usize = 14;

/// Footer size: BodyCRC (4) + BodyLen (4) = 8 bytes
pub(crate) const FOOTER_SIZE: usize = 8;
