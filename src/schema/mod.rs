//! Schema Module
//!
//! Declarative description of collections and their indexes per schema
//! version.
//!
//! ## Responsibilities
//! - Collection and index definitions
//! - Validation of declarations (`InvalidSchema`)
//! - Structural diff between any two declared versions
//!
//! Everything here is pure computation; applying a diff is the job of the
//! migration runner.

mod registry;

pub use registry::{SchemaRegistry, UpgradeStep};

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Definitions
// =============================================================================

/// A secondary index over one field of a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name, unique within its collection
    pub name: String,

    /// Field whose value is indexed
    pub field: String,

    /// Reject two records sharing the same indexed value
    pub unique: bool,
}

impl IndexDef {
    /// Index named after the field it covers
    pub fn new(field: impl Into<String>, unique: bool) -> Self {
        let field = field.into();
        Self {
            name: field.clone(),
            field,
            unique,
        }
    }

    /// Index with an explicit name
    pub fn named(name: impl Into<String>, field: impl Into<String>, unique: bool) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            unique,
        }
    }
}

/// A collection declaration
///
/// `normalize` and `required` are API-boundary policies: the engine stores
/// whatever it is given, the collection layer lowercases and validates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDef {
    pub name: String,
    pub primary_key: String,
    pub indexes: Vec<IndexDef>,

    /// Text fields lowercased before storage
    pub normalize: Vec<String>,

    /// Fields every saved record must carry
    pub required: Vec<String>,
}

impl CollectionDef {
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
            indexes: Vec::new(),
            normalize: Vec::new(),
            required: Vec::new(),
        }
    }

    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn normalize(mut self, field: impl Into<String>) -> Self {
        self.normalize.push(field.into());
        self
    }

    pub fn require(mut self, field: impl Into<String>) -> Self {
        self.required.push(field.into());
        self
    }

    pub fn find_index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|index| index.name == name)
    }

    pub fn is_normalized(&self, field: &str) -> bool {
        self.normalize.iter().any(|f| f == field)
    }
}

// =============================================================================
// Structural Changes
// =============================================================================

/// One structural step produced by [`SchemaRegistry::diff`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaChange {
    CreateCollection { name: String, primary_key: String },
    DropCollection { name: String },
    CreateIndex { collection: String, index: IndexDef },
    DropIndex { collection: String, index: String },
}

impl fmt::Display for SchemaChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaChange::CreateCollection { name, primary_key } => {
                write!(f, "create collection {} (key: {})", name, primary_key)
            }
            SchemaChange::DropCollection { name } => write!(f, "drop collection {}", name),
            SchemaChange::CreateIndex { collection, index } => write!(
                f,
                "create {}index {}.{} on {}",
                if index.unique { "unique " } else { "" },
                collection,
                index.name,
                index.field
            ),
            SchemaChange::DropIndex { collection, index } => {
                write!(f, "drop index {}.{}", collection, index)
            }
        }
    }
}
