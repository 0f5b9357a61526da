//! WAL Entry definitions
//!
//! Defines the structure of individual commit log entries and their framing.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{LogTableError, Result};

/// Frame header: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Largest accepted frame body (64 MB); anything bigger is treated as corruption
pub const MAX_ENTRY_SIZE: u32 = 64 * 1024 * 1024;

/// A single entry in the commit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log Sequence Number - carried in the frame header, not the body
    #[serde(skip)]
    pub lsn: u64,

    /// Caller-supplied record id
    pub record_id: u64,

    /// Opaque record payload
    pub payload: Vec<u8>,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

impl WalEntry {
    /// Create an entry stamped with the current wall-clock time
    pub fn new(lsn: u64, record_id: u64, payload: Vec<u8>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            lsn,
            record_id,
            payload,
            timestamp,
        }
    }

    /// Encode as a complete frame: header followed by the bincode body
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self)?;
        if body.len() > MAX_ENTRY_SIZE as usize {
            return Err(LogTableError::Serialization(format!(
                "commit log entry of {} bytes exceeds limit of {}",
                body.len(),
                MAX_ENTRY_SIZE
            )));
        }

        let len = body.len() as u32;
        let crc = Self::compute_crc(self.lsn, len, &body);

        let mut frame = Vec::with_capacity(HEADER_SIZE + body.len());
        frame.extend_from_slice(&self.lsn.to_le_bytes());
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Decode one complete frame, verifying its CRC
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(LogTableError::CorruptFormat(format!(
                "commit log frame too short: {} bytes",
                bytes.len()
            )));
        }

        let (lsn, crc, len) = Self::parse_header(&bytes[..HEADER_SIZE]);
        if len > MAX_ENTRY_SIZE {
            return Err(LogTableError::CorruptFormat(format!(
                "commit log frame length {} exceeds limit",
                len
            )));
        }

        let end = HEADER_SIZE + len as usize;
        if bytes.len() < end {
            return Err(LogTableError::CorruptFormat(format!(
                "commit log frame truncated: expected {} bytes, got {}",
                end,
                bytes.len()
            )));
        }

        Self::decode_body(lsn, crc, len, &bytes[HEADER_SIZE..end])
    }

    /// Split a frame header into (lsn, crc, len)
    pub(crate) fn parse_header(header: &[u8]) -> (u64, u32, u32) {
        let mut lsn = [0u8; 8];
        let mut crc = [0u8; 4];
        let mut len = [0u8; 4];
        lsn.copy_from_slice(&header[0..8]);
        crc.copy_from_slice(&header[8..12]);
        len.copy_from_slice(&header[12..16]);
        (
            u64::from_le_bytes(lsn),
            u32::from_le_bytes(crc),
            u32::from_le_bytes(len),
        )
    }

    /// Verify the CRC and decode the body of a frame
    pub(crate) fn decode_body(lsn: u64, crc: u32, len: u32, body: &[u8]) -> Result<Self> {
        let actual = Self::compute_crc(lsn, len, body);
        if actual != crc {
            return Err(LogTableError::CorruptFormat(format!(
                "commit log CRC mismatch at lsn {}: stored {:08x}, computed {:08x}",
                lsn, crc, actual
            )));
        }

        let mut entry: WalEntry = bincode::deserialize(body)
            .map_err(|e| LogTableError::CorruptFormat(format!("commit log body: {}", e)))?;
        entry.lsn = lsn;
        Ok(entry)
    }

    /// CRC32 over LSN, length and body
    pub fn compute_crc(lsn: u64, len: u32, body: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&lsn.to_le_bytes());
        hasher.update(&len.to_le_bytes());
        hasher.update(body);
        hasher.finalize()
    }

    /// Size of this entry's frame on disk
    pub fn frame_size(&self) -> Result<usize> {
        Ok(HEADER_SIZE + bincode::serialized_size(self)? as usize)
    }
}
