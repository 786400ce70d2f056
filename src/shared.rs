//! Shared Handles
//!
//! Process-wide registry of open databases. The first caller for a given
//! database opens it; every later (or concurrent) caller gets the same
//! handle. Handles live until the process exits.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::config::{Config, StorageMode};
use crate::engine::Database;
use crate::error::Result;
use crate::schema::SchemaRegistry;

/// Identity of an open database
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum HandleKey {
    Disk(PathBuf),
    Memory(String),
}

impl HandleKey {
    fn new(config: &Config, name: &str) -> Self {
        match config.storage_mode {
            StorageMode::Disk => HandleKey::Disk(config.data_dir.join(name)),
            StorageMode::Memory => HandleKey::Memory(name.to_string()),
        }
    }
}

/// One entry per database; empty until an open succeeds
type Slot = Arc<Mutex<Option<Arc<Database>>>>;

fn handles() -> &'static Mutex<HashMap<HandleKey, Slot>> {
    static HANDLES: OnceLock<Mutex<HashMap<HandleKey, Slot>>> = OnceLock::new();
    HANDLES.get_or_init(|| Mutex::new(HashMap::new()))
}

fn slot(key: HandleKey) -> Slot {
    Arc::clone(handles().lock().entry(key).or_default())
}

/// Open `name` once per process and return the shared handle
///
/// Opens are serialized per database: concurrent callers for the same one
/// wait for the in-flight open instead of racing a second one, while opens
/// of other databases proceed. A failed open is not cached; the next call
/// tries again. Calling again with a newer registry migrates the existing
/// handle.
pub fn open_shared(config: &Config, name: &str, registry: &SchemaRegistry) -> Result<Arc<Database>> {
    let slot = slot(HandleKey::new(config, name));
    let mut handle = slot.lock();

    if let Some(db) = handle.as_ref() {
        db.migrate(registry)?;
        return Ok(Arc::clone(db));
    }

    let db = Arc::new(Database::open(config.clone(), name, registry)?);
    *handle = Some(Arc::clone(&db));
    Ok(db)
}

/// Whether a shared handle for `name` is currently open
pub fn is_open(config: &Config, name: &str) -> bool {
    let slot = handles().lock().get(&HandleKey::new(config, name)).cloned();
    slot.map(|slot| slot.lock().is_some()).unwrap_or(false)
}
