//! Chunk file header
//!
//! Encodes and decodes the fixed header plus the checksummed userdata section.

use std::io::Read;

use bytes::BufMut;

use crate::checksum::fnv32;
use crate::error::{LogTableError, Result};

use super::{FLAG_FINALIZED, MAGIC, MAX_USERDATA_SIZE, VERSION, VERSION_LEGACY};

/// Parsed chunk header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u16,
    pub flags: u64,
    pub body_size: u64,
    pub userdata_checksum: u32,
    pub userdata: Vec<u8>,
}

impl FileHeader {
    /// A current-version header with a freshly computed userdata checksum
    pub fn new(flags: u64, body_size: u64, userdata: Vec<u8>) -> Self {
        Self {
            version: VERSION,
            flags,
            body_size,
            userdata_checksum: fnv32(&userdata),
            userdata,
        }
    }

    /// Fixed part of the header for a given version
    pub fn fixed_size(version: u16) -> u64 {
        match version {
            VERSION_LEGACY => 4 + 2 + 8 + 4 + 4,
            _ => 4 + 2 + 8 + 8 + 4 + 4,
        }
    }

    /// Total header length including userdata
    pub fn header_size(&self) -> u64 {
        Self::fixed_size(self.version) + self.userdata.len() as u64
    }

    /// Serialize; the flags field is only written for version 2+
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.header_size() as usize);
        buf.put_u32_le(MAGIC);
        buf.put_u16_le(self.version);
        if self.version != VERSION_LEGACY {
            buf.put_u64_le(self.flags);
        }
        buf.put_u64_le(self.body_size);
        buf.put_u32_le(self.userdata_checksum);
        buf.put_u32_le(self.userdata.len() as u32);
        buf.put_slice(&self.userdata);
        buf
    }

    /// Read a header from the start of a chunk file
    pub fn read_from(reader: &mut impl Read) -> Result<Self> {
        let magic = u32::from_le_bytes(read_array(reader)?);
        if magic != MAGIC {
            return Err(LogTableError::CorruptFormat(format!(
                "not a valid chunk: bad magic {:08x}",
                magic
            )));
        }

        let version = u16::from_le_bytes(read_array(reader)?);
        let mut flags = match version {
            VERSION_LEGACY => 0,
            VERSION => u64::from_le_bytes(read_array(reader)?),
            other => {
                return Err(LogTableError::CorruptFormat(format!(
                    "unsupported chunk version {}",
                    other
                )))
            }
        };

        let body_size = u64::from_le_bytes(read_array(reader)?);
        let userdata_checksum = u32::from_le_bytes(read_array(reader)?);
        let userdata_size = u32::from_le_bytes(read_array(reader)?);

        if userdata_size > MAX_USERDATA_SIZE {
            return Err(LogTableError::CorruptFormat(format!(
                "chunk userdata of {} bytes exceeds limit",
                userdata_size
            )));
        }

        let mut userdata = vec![0u8; userdata_size as usize];
        reader.read_exact(&mut userdata).map_err(truncated)?;

        // legacy headers imply finalization through a non-empty body
        if version == VERSION_LEGACY && body_size > 0 {
            flags |= FLAG_FINALIZED;
        }

        Ok(Self {
            version,
            flags,
            body_size,
            userdata_checksum,
            userdata,
        })
    }

    /// Recompute the userdata checksum; the header is trusted only if it matches
    pub fn verify(&self) -> bool {
        self.userdata.is_empty() || fnv32(&self.userdata) == self.userdata_checksum
    }

    pub fn is_finalized(&self) -> bool {
        self.flags & FLAG_FINALIZED != 0
    }

    pub fn has_flag(&self, flag: u64) -> bool {
        self.flags & flag != 0
    }
}

fn read_array<const N: usize>(reader: &mut impl Read) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf).map_err(truncated)?;
    Ok(buf)
}

fn truncated(e: std::io::Error) -> LogTableError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        LogTableError::CorruptFormat("truncated chunk header".to_string())
    } else {
        LogTableError::Io(e)
    }
}
