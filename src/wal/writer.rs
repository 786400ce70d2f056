//! WAL Writer
//!
//! Handles appending entries to the WAL file.
//!
//! An append either lands as one complete frame or leaves the file exactly as
//! it was. A failed write or fsync cuts the log back to its previous length,
//! so a later append never follows torn bytes that recovery would discard.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::{Result, SymbolDbError};

use super::{Operation, WalEntry, WalReader};

/// File operations the writer needs beyond plain writes
pub trait LogFile: Write + Seek {
    /// Current length in bytes
    fn byte_len(&self) -> io::Result<u64>;

    /// Cut or extend the file to `len` bytes
    fn set_len(&mut self, len: u64) -> io::Result<()>;

    /// Flush file contents to stable storage
    fn sync_data(&mut self) -> io::Result<()>;

    /// Flush file contents and metadata to stable storage
    fn sync_all(&mut self) -> io::Result<()>;
}

impl LogFile for File {
    fn byte_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }

    fn sync_data(&mut self) -> io::Result<()> {
        File::sync_data(self)
    }

    fn sync_all(&mut self) -> io::Result<()> {
        File::sync_all(self)
    }
}

/// Writes entries to the WAL file
pub struct WalWriter<F: LogFile = File> {
    /// Path of the log file
    path: PathBuf,

    /// Log handle; each frame goes out in a single write
    file: F,

    /// LSN the next append will receive
    next_lsn: u64,

    /// How often appends are fsynced
    sync_strategy: WalSyncStrategy,

    /// Entries appended since the last fsync
    uncommitted: usize,

    /// Current file length in bytes
    size_bytes: u64,

    /// Set when a failed append could not be cut back out of the file
    failed: Option<String>,
}

impl WalWriter<File> {
    /// Open or create a WAL file
    ///
    /// LSNs continue after the last valid entry already in the file.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        Self::open_at(path, sync_strategy, 1)
    }

    /// Open or create a WAL file, never handing out an LSN below `min_lsn`
    ///
    /// Used after a checkpoint truncated the log: numbering resumes after the
    /// snapshot instead of starting over.
    pub fn open_at(path: &Path, sync_strategy: WalSyncStrategy, min_lsn: u64) -> Result<Self> {
        let mut last_lsn = 0;
        if path.exists() {
            let mut reader = WalReader::open(path)?;
            // Stop quietly at a torn tail; recovery is responsible for cutting it
            while let Ok(Some(entry)) = reader.next_entry() {
                last_lsn = entry.lsn;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let next_lsn = (last_lsn + 1).max(min_lsn.max(1));
        Self::from_file(path, file, sync_strategy, next_lsn)
    }
}

impl<F: LogFile> WalWriter<F> {
    /// Wrap an already opened log positioned at its end
    ///
    /// The caller vouches that `file` holds only complete frames numbered
    /// below `next_lsn`.
    pub fn from_file(
        path: &Path,
        mut file: F,
        sync_strategy: WalSyncStrategy,
        next_lsn: u64,
    ) -> Result<Self> {
        let size_bytes = file.byte_len()?;
        file.seek(SeekFrom::Start(size_bytes))?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            next_lsn: next_lsn.max(1),
            sync_strategy,
            uncommitted: 0,
            size_bytes,
            failed: None,
        })
    }

    /// Append a batch as one entry, returning its LSN
    ///
    /// On error nothing of the entry remains in the log and the LSN is not
    /// consumed.
    pub fn append(&mut self, batch: Vec<Operation>) -> Result<u64> {
        if let Some(reason) = &self.failed {
            return Err(SymbolDbError::WalWrite(format!("log unusable: {}", reason)));
        }

        let lsn = self.next_lsn;
        let frame = WalEntry::new(lsn, batch).serialize()?;

        let should_sync = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.uncommitted + 1 >= count,
        };

        let written = self.file.write_all(&frame).and_then(|_| self.file.flush());
        let outcome = written.and_then(|_| {
            if should_sync {
                self.file.sync_data()
            } else {
                Ok(())
            }
        });

        if let Err(e) = outcome {
            self.rollback(lsn, &e);
            return Err(SymbolDbError::WalWrite(format!("append of entry {}: {}", lsn, e)));
        }

        self.next_lsn += 1;
        self.size_bytes += frame.len() as u64;
        self.uncommitted = if should_sync { 0 } else { self.uncommitted + 1 };

        Ok(lsn)
    }

    /// Cut a failed frame back out of the log
    fn rollback(&mut self, lsn: u64, cause: &io::Error) {
        let start = self.size_bytes;
        let restored = self
            .file
            .set_len(start)
            .and_then(|_| self.file.seek(SeekFrom::Start(start)))
            .and_then(|_| self.file.sync_data());

        match restored {
            Ok(_) => {
                tracing::warn!(lsn, error = %cause, "WAL append failed, log restored to {} bytes", start);
            }
            Err(e) => {
                tracing::error!(lsn, error = %e, "WAL rollback failed, refusing further appends");
                self.failed = Some(format!("rollback of entry {} failed: {}", lsn, e));
            }
        }
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        self.uncommitted = 0;
        Ok(())
    }

    /// Drop every entry (after a checkpoint made them redundant)
    ///
    /// LSN numbering is not reset. A writer refusing appends after a failed
    /// rollback is usable again once this succeeds.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.sync_all()?;

        self.size_bytes = 0;
        self.uncommitted = 0;
        self.failed = None;
        Ok(())
    }

    /// Get the LSN the next append will receive
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// LSN of the most recent append (0 if nothing was ever written)
    pub fn last_lsn(&self) -> u64 {
        self.next_lsn - 1
    }

    /// Entries written but not yet fsynced
    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted
    }

    /// Current size of the log in bytes
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Whether appends are refused after an unrecoverable write failure
    pub fn is_failed(&self) -> bool {
        self.failed.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
