//! WAL Writer
//!
//! Handles appending entries to a commit log file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::Result;

use super::{WalEntry, WalRecovery};

/// Writes entries to a commit log file
pub struct WalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    /// LSN the next append will receive
    next_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Entries appended since the last fsync
    uncommitted: usize,
    /// Current file length in bytes
    size: u64,
}

impl WalWriter {
    /// Open or create a commit log file.
    ///
    /// An existing file is recovered first (torn tail removed) and appending
    /// continues after its last LSN.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let (next_lsn, size) = if path.exists() {
            let (_, result) = WalRecovery::recover(path)?;
            (result.last_lsn + 1, result.valid_bytes)
        } else {
            (1, 0)
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            next_lsn,
            sync_strategy,
            uncommitted: 0,
            size,
        })
    }

    /// Append a record, returning its LSN
    pub fn append(&mut self, record_id: u64, payload: &[u8]) -> Result<u64> {
        let lsn = self.next_lsn;
        let entry = WalEntry::new(lsn, record_id, payload.to_vec());
        let frame = entry.serialize()?;

        self.writer.write_all(&frame)?;
        self.next_lsn += 1;
        self.size += frame.len() as u64;
        self.uncommitted += 1;

        let should_sync = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.uncommitted >= count.max(1),
        };

        if should_sync {
            self.sync()?;
        } else {
            self.writer.flush()?;
        }

        Ok(lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.uncommitted = 0;
        Ok(())
    }

    /// Get the LSN the next append will receive
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// Entries written since the last fsync
    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted
    }

    /// Current file size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }
}
