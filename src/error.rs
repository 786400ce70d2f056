//! Error types for symboldb
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using SymbolDbError
pub type Result<T> = std::result::Result<T, SymbolDbError>;

/// Unified error type for symboldb operations
#[derive(Debug, Error)]
pub enum SymbolDbError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing medium could not be opened (permission denied, quota, ...)
    #[error("Storage unavailable at {path}: {reason}")]
    StorageUnavailable { path: PathBuf, reason: String },

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    #[error("WAL write failed: {0}")]
    WalWrite(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Unknown index '{index}' on collection '{collection}'")]
    UnknownIndex { collection: String, index: String },

    #[error("Invalid record for '{collection}': {reason}")]
    InvalidRecord { collection: String, reason: String },

    #[error("Unique index '{index}' on '{collection}' already holds value {value}")]
    UniqueConstraintViolation {
        collection: String,
        index: String,
        value: String,
    },

    // -------------------------------------------------------------------------
    // Schema Errors
    // -------------------------------------------------------------------------
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Stored schema version {stored} is newer than requested version {requested}")]
    VersionDowngrade { stored: u32, requested: u32 },

    #[error("Migration to version {version} failed at step {step}: {reason}")]
    Migration {
        version: u32,
        step: usize,
        reason: String,
    },

    // -------------------------------------------------------------------------
    // Transaction Errors
    // -------------------------------------------------------------------------
    #[error("Write to '{0}' attempted in a read-only transaction")]
    ReadOnlyTransaction(String),

    #[error("Collection '{0}' is not in the transaction scope")]
    OutOfScope(String),

    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("Timed out after {0} ms waiting for collection locks")]
    LockTimeout(u64),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for SymbolDbError {
    fn from(err: bincode::Error) -> Self {
        SymbolDbError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for SymbolDbError {
    fn from(err: serde_json::Error) -> Self {
        SymbolDbError::Serialization(err.to_string())
    }
}
