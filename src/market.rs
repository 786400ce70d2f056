//! Market Store
//!
//! The concrete database for market symbol reference data and the user's
//! watchlist.
//!
//! ## Schema History
//! - v1: `symbols` (key `symbol`), `watchlist` (key `symbol`)
//! - v2: `symbols` gains indexes `symbol` (unique) and `name`
//!
//! Symbol and name are stored lowercased so lookups are case-insensitive.
//! The watchlist lowercases its key as well, so a symbol saved as "AAPL" can
//! be removed as "aapl"; its other fields are stored as given.

use std::sync::Arc;

use crate::collection::Collection;
use crate::config::Config;
use crate::engine::Database;
use crate::error::Result;
use crate::schema::{CollectionDef, IndexDef, SchemaRegistry};
use crate::shared;

/// Name of the market database
pub const DB_NAME: &str = "MarketSymbolsDB";

/// Current schema version
pub const DB_VERSION: u32 = 2;

pub const SYMBOLS: &str = "symbols";
pub const WATCHLIST: &str = "watchlist";

/// Primary key of both collections
pub const SYMBOL_FIELD: &str = "symbol";
pub const NAME_FIELD: &str = "name";

fn symbols_v1() -> CollectionDef {
    CollectionDef::new(SYMBOLS, SYMBOL_FIELD)
        .normalize(SYMBOL_FIELD)
        .normalize(NAME_FIELD)
        .require(SYMBOL_FIELD)
        .require(NAME_FIELD)
}

fn watchlist() -> CollectionDef {
    CollectionDef::new(WATCHLIST, SYMBOL_FIELD)
        .normalize(SYMBOL_FIELD)
        .require(SYMBOL_FIELD)
}

/// Schema registry with the full version history of the market database
pub fn registry() -> Result<SchemaRegistry> {
    let mut registry = SchemaRegistry::new();
    registry
        .declare(1, vec![symbols_v1(), watchlist()])?
        .declare(
            DB_VERSION,
            vec![
                symbols_v1()
                    .index(IndexDef::new(SYMBOL_FIELD, true))
                    .index(IndexDef::new(NAME_FIELD, false)),
                watchlist(),
            ],
        )?;
    Ok(registry)
}

/// Handle to the market database and its two collections
#[derive(Clone)]
pub struct MarketStore {
    db: Arc<Database>,
    symbols: Collection,
    watchlist: Collection,
}

impl MarketStore {
    /// Open a private handle (not shared with other callers)
    pub fn open(config: Config) -> Result<Self> {
        let registry = registry()?;
        let db = Arc::new(Database::open(config, DB_NAME, &registry)?);
        Self::bind(db, &registry)
    }

    /// Open (once per process) the shared handle for this configuration
    pub fn shared(config: &Config) -> Result<Self> {
        let registry = registry()?;
        let db = shared::open_shared(config, DB_NAME, &registry)?;
        Self::bind(db, &registry)
    }

    fn bind(db: Arc<Database>, registry: &SchemaRegistry) -> Result<Self> {
        Ok(Self {
            symbols: Collection::from_registry(Arc::clone(&db), registry, SYMBOLS)?,
            watchlist: Collection::from_registry(Arc::clone(&db), registry, WATCHLIST)?,
            db,
        })
    }

    /// Symbol directory
    pub fn symbols(&self) -> &Collection {
        &self.symbols
    }

    /// User watchlist
    pub fn watchlist(&self) -> &Collection {
        &self.watchlist
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }
}
