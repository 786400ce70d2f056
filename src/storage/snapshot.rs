//! Snapshot
//!
//! Full image of every table at a given LSN, written atomically via a
//! temporary file and rename.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use bytes::Buf;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SymbolDbError};
use crate::record::Record;
use crate::schema::IndexDef;

use super::{FOOTER_SIZE, FORMAT_VERSION, HEADER_SIZE, MAGIC};

/// Serialized body of a snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotData {
    /// Schema version of the database
    pub version: u32,

    /// Tables in name order
    pub tables: Vec<TableImage>,
}

/// One table inside a snapshot; indexes are rebuilt on load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableImage {
    pub name: String,
    pub primary_key: String,
    pub indexes: Vec<IndexDef>,
    pub records: Vec<Record>,
}

/// Reads and writes snapshot files
pub struct Snapshot;

impl Snapshot {
    /// Write a snapshot taken at `lsn`, returning its size in bytes
    ///
    /// The file is written next to `path`, fsynced, then renamed over it, so
    /// a crash leaves either the old snapshot or the new one.
    pub fn write(path: &Path, lsn: u64, data: &SnapshotData) -> Result<u64> {
        let body = bincode::serialize(data)?;
        if body.len() > u32::MAX as usize {
            return Err(SymbolDbError::Storage(format!(
                "snapshot body of {} bytes is too large",
                body.len()
            )));
        }

        let tmp_path = path.with_extension("db.tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);

            writer.write_all(MAGIC)?;
            writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
            writer.write_all(&lsn.to_le_bytes())?;
            writer.write_all(&body)?;
            writer.write_all(&crc32fast::hash(&body).to_le_bytes())?;
            writer.write_all(&(body.len() as u32).to_le_bytes())?;

            let file = writer.into_inner().map_err(|e| {
                SymbolDbError::Storage(format!("Failed to flush snapshot: {}", e))
            })?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;

        Ok((HEADER_SIZE + body.len() + FOOTER_SIZE) as u64)
    }

    /// Read a snapshot, returning its LSN and contents
    ///
    /// `Ok(None)` when no snapshot exists yet.
    pub fn read(path: &Path) -> Result<Option<(u64, SnapshotData)>> {
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(path)?;
        if bytes.len() < HEADER_SIZE + FOOTER_SIZE {
            return Err(SymbolDbError::Storage(format!(
                "snapshot {} is truncated ({} bytes)",
                path.display(),
                bytes.len()
            )));
        }

        let mut header = &bytes[..HEADER_SIZE];
        if &header[..4] != MAGIC {
            return Err(SymbolDbError::Storage(format!(
                "Invalid snapshot magic: expected SYDB, got {:?}",
                &header[..4]
            )));
        }
        header.advance(4);

        let format = header.get_u16_le();
        if format != FORMAT_VERSION {
            return Err(SymbolDbError::Storage(format!(
                "Unsupported snapshot format: {}",
                format
            )));
        }
        let lsn = header.get_u64_le();

        let mut footer = &bytes[bytes.len() - FOOTER_SIZE..];
        let crc = footer.get_u32_le();
        let body_len = footer.get_u32_le() as usize;

        let body = &bytes[HEADER_SIZE..bytes.len() - FOOTER_SIZE];
        if body.len() != body_len {
            return Err(SymbolDbError::Storage(format!(
                "snapshot body is {} bytes, footer says {}",
                body.len(),
                body_len
            )));
        }
        if crc32fast::hash(body) != crc {
            return Err(SymbolDbError::Storage(
                "snapshot CRC mismatch".to_string(),
            ));
        }

        let data = bincode::deserialize(body)?;
        Ok(Some((lsn, data)))
    }
}
