//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their framing.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SymbolDbError};
use crate::record::{Record, Value};
use crate::schema::IndexDef;

/// Frame header size: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Largest payload a frame may declare (64 MB); anything bigger is corruption
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// A single entry in the WAL: one committed transaction
#[derive(Debug, Clone, PartialEq)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// Operations of the transaction, in program order
    pub batch: Vec<Operation>,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
///
/// Data operations come from read-write transactions; the structural ones
/// only from version-change transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Insert or replace a record
    Put { collection: String, record: Record },

    /// Delete a record by primary key
    Delete { collection: String, key: Value },

    /// Remove every record of a collection
    Clear { collection: String },

    CreateCollection { name: String, primary_key: String },

    DropCollection { name: String },

    CreateIndex { collection: String, index: IndexDef },

    DropIndex { collection: String, index: String },

    /// Persist a new schema version
    SetVersion { version: u32 },
}

impl WalEntry {
    /// Create an entry stamped with the current time
    pub fn new(lsn: u64, batch: Vec<Operation>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            lsn,
            batch,
            timestamp,
        }
    }

    /// Encode the full frame: header + payload
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(&(self.timestamp, &self.batch))?;
        if payload.len() > MAX_PAYLOAD_SIZE as usize {
            return Err(SymbolDbError::WalWrite(format!(
                "entry of {} bytes exceeds the {} byte limit",
                payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }

        let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        frame.put_u64_le(self.lsn);
        frame.put_u32_le(crc32fast::hash(&payload));
        frame.put_u32_le(payload.len() as u32);
        frame.put_slice(&payload);

        Ok(frame.to_vec())
    }

    /// Decode a full frame produced by [`WalEntry::serialize`]
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(SymbolDbError::WalCorruption(format!(
                "frame of {} bytes is shorter than the header",
                bytes.len()
            )));
        }

        let (lsn, crc, len) = Self::decode_header(&bytes[..HEADER_SIZE])?;
        let payload = &bytes[HEADER_SIZE..];
        if payload.len() != len as usize {
            return Err(SymbolDbError::WalCorruption(format!(
                "entry {} declares {} payload bytes, found {}",
                lsn,
                len,
                payload.len()
            )));
        }

        Self::from_parts(lsn, crc, payload)
    }

    /// Split a header into (lsn, crc, payload length)
    pub fn decode_header(header: &[u8]) -> Result<(u64, u32, u32)> {
        if header.len() < HEADER_SIZE {
            return Err(SymbolDbError::WalCorruption("truncated entry header".to_string()));
        }

        let mut buf = header;
        let lsn = buf.get_u64_le();
        let crc = buf.get_u32_le();
        let len = buf.get_u32_le();

        if len > MAX_PAYLOAD_SIZE {
            return Err(SymbolDbError::WalCorruption(format!(
                "entry {} declares an implausible payload of {} bytes",
                lsn, len
            )));
        }

        Ok((lsn, crc, len))
    }

    /// Rebuild an entry from its header fields and payload, checking the CRC
    pub fn from_parts(lsn: u64, crc: u32, payload: &[u8]) -> Result<Self> {
        let actual = crc32fast::hash(payload);
        if actual != crc {
            return Err(SymbolDbError::WalCorruption(format!(
                "CRC mismatch on entry {}: stored {:08x}, computed {:08x}",
                lsn, crc, actual
            )));
        }

        let (timestamp, batch): (u64, Vec<Operation>) = bincode::deserialize(payload)
            .map_err(|e| SymbolDbError::WalCorruption(format!("entry {}: {}", lsn, e)))?;

        Ok(Self {
            lsn,
            batch,
            timestamp,
        })
    }
}
