//! # symboldb
//!
//! An embedded, versioned record store for market symbol reference data and
//! a user watchlist:
//! - Named collections of flat records keyed by a declared primary key
//! - Secondary indexes (unique or not) maintained on every write
//! - Declarative schema versions with idempotent migrations
//! - Scoped, isolated, all-or-nothing transactions
//! - Write-Ahead Logging (WAL) with snapshots for durability
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │          MarketStore  (symbols / watchlist handles)          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │        Collection API  (required fields, normalization)      │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │   Database  ──  Transactions (lock manager)  ──  Migrations  │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     WAL     │          │   Catalog   │
//!   │  (Append)   │          │  (Tables +  │
//!   └──────┬──────┘          │   Indexes)  │
//!          │                 └──────┬──────┘
//!          └──────────┬─────────────┘
//!                     ▼
//!             ┌─────────────┐
//!             │  Snapshot   │
//!             └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use symboldb::{Config, MarketStore, Record};
//!
//! let store = MarketStore::shared(&Config::default()).unwrap();
//! store
//!     .symbols()
//!     .replace_all(vec![Record::new().with("symbol", "AAPL").with("name", "Apple Inc")])
//!     .unwrap();
//! store.watchlist().save(Record::new().with("symbol", "aapl")).unwrap();
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod record;

pub mod schema;
pub mod wal;
pub mod storage;
pub mod txn;
pub mod engine;
pub mod migration;
pub mod collection;
pub mod shared;
pub mod market;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{SymbolDbError, Result};
pub use config::{Config, StorageMode, WalSyncStrategy};
pub use record::{Record, Value};
pub use schema::{CollectionDef, IndexDef, SchemaChange, SchemaRegistry};
pub use engine::{CollectionInfo, Database};
pub use txn::{Transaction, TransactionMode};
pub use migration::{MigrationReport, MigrationRunner};
pub use collection::Collection;
pub use market::MarketStore;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of symboldb
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
