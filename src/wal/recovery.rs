//! WAL Recovery
//!
//! Handles crash recovery by replaying a commit log file.

use std::fs::OpenOptions;
use std::path::Path;

use crate::error::Result;

use super::reader::{Frame, WalReader};
use super::WalEntry;

/// Handles commit log recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted frames found (at most one: scanning stops there)
    pub entries_corrupted: u64,

    /// Last valid LSN (0 if none)
    pub last_lsn: u64,

    /// Length of the valid prefix of the file
    pub valid_bytes: u64,

    /// Whether the file was truncated (partial or corrupt tail removed)
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover entries from a commit log file.
    ///
    /// This will:
    /// 1. Read all valid entries in order
    /// 2. Stop at the first torn or corrupt frame
    /// 3. Truncate the file to its valid prefix
    /// 4. Return the valid entries
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let (entries, mut result, file_len) = Self::scan(path)?;

        if result.valid_bytes < file_len {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(result.valid_bytes)?;
            file.sync_all()?;
            result.was_truncated = true;

            tracing::warn!(
                "commit log {} truncated from {} to {} bytes ({} corrupt frames)",
                path.display(),
                file_len,
                result.valid_bytes,
                result.entries_corrupted
            );
        }

        Ok((entries, result))
    }

    /// Verify integrity of a commit log file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        let (_, mut result, file_len) = Self::scan(path)?;
        result.was_truncated = result.valid_bytes < file_len;
        Ok(result)
    }

    fn scan(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult, u64)> {
        let file_len = std::fs::metadata(path)?.len();
        let mut reader = WalReader::open(path)?;

        let mut entries = Vec::new();
        let mut result = RecoveryResult {
            entries_recovered: 0,
            entries_corrupted: 0,
            last_lsn: 0,
            valid_bytes: 0,
            was_truncated: false,
        };

        loop {
            match reader.read_frame()? {
                Frame::Entry(entry, frame_size) => {
                    result.entries_recovered += 1;
                    result.last_lsn = entry.lsn;
                    result.valid_bytes += frame_size;
                    entries.push(entry);
                }
                Frame::Eof | Frame::Torn => break,
                Frame::Corrupt(reason) => {
                    tracing::warn!("commit log {}: {}", path.display(), reason);
                    result.entries_corrupted += 1;
                    break;
                }
            }
        }

        Ok((entries, result, file_len))
    }
}
