//! Transaction Module
//!
//! Scoped, isolated, all-or-nothing access to a database.
//!
//! ## Concurrency Model
//! - Each transaction declares the collections it touches up front
//! - `ReadOnly` transactions share a collection; `ReadWrite` ones hold it
//!   exclusively, so overlapping writers are serialized
//! - `VersionChange` is exclusive over the whole database
//! - All locks of a transaction are granted together or not at all, so
//!   lock ordering can never deadlock
//!
//! ## Isolation
//! A transaction works on its own copy of the catalog taken when its locks
//! are granted. Writes land in private copies of the touched tables and are
//! installed (after being logged) only by `commit`.

mod lock;
mod transaction;

pub use lock::{LockGuard, LockManager};
pub use transaction::Transaction;

/// Access mode of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Reads only; shares collections with other readers
    ReadOnly,

    /// Reads and record writes on the declared collections
    ReadWrite,

    /// Structural changes; excludes every other transaction
    VersionChange,
}

impl TransactionMode {
    pub fn is_writable(self) -> bool {
        !matches!(self, TransactionMode::ReadOnly)
    }
}
