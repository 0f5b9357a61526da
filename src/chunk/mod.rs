//! Chunk Module
//!
//! Immutable, finalized files holding a contiguous, deduplicated range of
//! records. Written once by compaction, read by every other component.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header                                                  │
//! │   Magic: u32 | Version: u16 | Flags: u64 (v2 only)      │
//! │   BodySize: u64 | UserdataChecksum: u32 (FNV-1a)        │
//! │   UserdataSize: u32 | Userdata (chunk tag)              │
//! ├─────────────────────────────────────────────────────────┤
//! │ Body (BodySize bytes)                                   │
//! │   [RecordId: u64][PayloadLen: varuint][Payload]         │
//! │   ... repeated for each record ...                      │
//! ├─────────────────────────────────────────────────────────┤
//! │ Trailer (only if FLAG_HAS_TRAILER)                      │
//! │   BodyCRC: u32 | TrailerMagic: u32                      │
//! └─────────────────────────────────────────────────────────┘
//! ```
//! Version 1 headers carry no flags; they count as finalized when
//! `BodySize > 0`. All fixed-width integers are little-endian.

mod builder;
mod header;
mod iterator;
mod reader;

use std::path::PathBuf;

use bytes::BufMut;

use crate::codec;
use crate::error::Result;

pub use builder::ChunkWriter;
pub use header::FileHeader;
pub use iterator::ChunkIterator;
pub use reader::ChunkReader;

// =============================================================================
// Shared Constants (used by builder, reader, iterator)
// =============================================================================

/// Magic number at the start of every chunk file
pub const MAGIC: u32 = 0x4c54_4348;

/// Header version without a flags field
pub const VERSION_LEGACY: u16 = 0x01;

/// Current header version
pub const VERSION: u16 = 0x02;

/// The body is complete and the header is final
pub const FLAG_FINALIZED: u64 = 1 << 0;

/// A body CRC trailer follows the body
pub const FLAG_HAS_TRAILER: u64 = 1 << 1;

/// Magic number closing the trailer
pub const TRAILER_MAGIC: u32 = 0x4c54_4554;

/// Trailer size: BodyCRC (4) + TrailerMagic (4)
pub const TRAILER_SIZE: u64 = 8;

/// Largest userdata section accepted on read
pub const MAX_USERDATA_SIZE: u32 = 1024 * 1024;

// =============================================================================
// Chunk Tag (userdata)
// =============================================================================

/// Identity and position of a chunk, stored in the header userdata
///
/// ```text
/// [varuint len][replica_id][varuint len][chunk_id][start_sequence: u64][num_records: u64]
/// ```
/// The two counters are fixed-width so the tag keeps its length when the
/// header is rewritten at finalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkTag {
    pub replica_id: String,
    pub chunk_id: String,
    pub start_sequence: u64,
    pub num_records: u64,
}

impl ChunkTag {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        codec::put_string(&mut buf, &self.replica_id);
        codec::put_string(&mut buf, &self.chunk_id);
        buf.put_u64_le(self.start_sequence);
        buf.put_u64_le(self.num_records);
        buf
    }

    pub fn decode(mut data: &[u8]) -> Result<Self> {
        let buf = &mut data;
        Ok(Self {
            replica_id: codec::get_string(buf)?,
            chunk_id: codec::get_string(buf)?,
            start_sequence: codec::get_u64_le(buf)?,
            num_records: codec::get_u64_le(buf)?,
        })
    }
}

/// Size of one record in the chunk body
pub fn encoded_record_len(payload_len: usize) -> u64 {
    8 + codec::varuint_len(payload_len as u64) as u64 + payload_len as u64
}

// =============================================================================
// Chunk Metadata
// =============================================================================

/// Description of a finished chunk file
#[derive(Debug, Clone)]
pub struct ChunkMeta {
    /// Path to the chunk file
    pub path: PathBuf,
    /// Identity and record range
    pub tag: ChunkTag,
    /// Body size in bytes
    pub body_size: u64,
    /// Whole file size in bytes
    pub file_size: u64,
    /// FNV-1a 64 of the whole file
    pub checksum: u64,
}

impl ChunkMeta {
    /// Get the number of records
    pub fn num_records(&self) -> u64 {
        self.tag.num_records
    }
}
