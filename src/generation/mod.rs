//! Generation Module
//!
//! A generation is the reader-visible, immutable list of chunks of one
//! partition at a point in time. Compaction publishes generation N+1 by
//! atomically creating `<table>.<replica>.<N+1>.idx`; readers pick the
//! highest-numbered file that exists.
//!
//! ## Generation Index Format
//! ```text
//! byte     version             (0x01)
//! varuint  generation
//! varuint  table_name_len; bytes table_name
//! varuint  last_log_seq        (highest commit log folded into this generation)
//! varuint  chunk_count
//! repeated {
//!   varuint replica_id_len; bytes replica_id
//!   varuint chunk_id_len;   bytes chunk_id
//!   varuint start_sequence
//!   varuint num_records
//!   varuint size             (chunk file size)
//!   u64     checksum         (FNV-1a 64 of the chunk file)
//! }
//! ```

mod reader;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::chunk::ChunkMeta;
use crate::codec;
use crate::commitlog::Record;
use crate::error::{LogTableError, Result};
use crate::fsutil;

pub use reader::{find_head_generation, TableReader, DEFAULT_PROBE_LIMIT};

/// Current generation index format version
pub const FORMAT_VERSION: u8 = 0x01;

/// Extension of generation index files
pub const GENERATION_EXT: &str = "idx";

/// Extension of chunk files
pub const CHUNK_EXT: &str = "sst";

// =============================================================================
// Types
// =============================================================================

/// One chunk as listed in a generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    pub replica_id: String,
    pub chunk_id: String,
    /// Partition sequence number of the chunk's first record
    pub start_sequence: u64,
    pub num_records: u64,
    /// Chunk file size in bytes
    pub size: u64,
    /// FNV-1a 64 of the chunk file
    pub checksum: u64,
}

impl ChunkRef {
    /// One past the last sequence number held by this chunk
    pub fn end_sequence(&self) -> u64 {
        self.start_sequence + self.num_records
    }

    /// Whether `sequence` falls in `[start_sequence, end_sequence)`
    pub fn contains(&self, sequence: u64) -> bool {
        self.start_sequence <= sequence && sequence < self.end_sequence()
    }
}

impl From<&ChunkMeta> for ChunkRef {
    fn from(meta: &ChunkMeta) -> Self {
        Self {
            replica_id: meta.tag.replica_id.clone(),
            chunk_id: meta.tag.chunk_id.clone(),
            start_sequence: meta.tag.start_sequence,
            num_records: meta.tag.num_records,
            size: meta.file_size,
            checksum: meta.checksum,
        }
    }
}

/// Immutable snapshot of a partition's chunk list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableGeneration {
    pub table_name: String,
    pub generation: u64,
    pub last_log_seq: u64,
    pub chunks: Vec<ChunkRef>,
}

impl TableGeneration {
    /// Total number of records across all chunks
    pub fn num_records(&self) -> u64 {
        self.chunks.iter().map(|c| c.num_records).sum()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.put_u8(FORMAT_VERSION);
        codec::put_varuint(&mut buf, self.generation);
        codec::put_string(&mut buf, &self.table_name);
        codec::put_varuint(&mut buf, self.last_log_seq);
        codec::put_varuint(&mut buf, self.chunks.len() as u64);

        for c in &self.chunks {
            codec::put_string(&mut buf, &c.replica_id);
            codec::put_string(&mut buf, &c.chunk_id);
            codec::put_varuint(&mut buf, c.start_sequence);
            codec::put_varuint(&mut buf, c.num_records);
            codec::put_varuint(&mut buf, c.size);
            buf.put_u64_le(c.checksum);
        }

        buf
    }

    pub fn decode(mut data: &[u8]) -> Result<Self> {
        let buf = &mut data;

        let version = codec::get_u8(buf)?;
        if version != FORMAT_VERSION {
            return Err(LogTableError::CorruptFormat(format!(
                "unsupported generation index version {}",
                version
            )));
        }

        let generation = codec::get_varuint(buf)?;
        let table_name = codec::get_string(buf)?;
        let last_log_seq = codec::get_varuint(buf)?;
        let num_chunks = codec::get_varuint(buf)?;

        let mut chunks = Vec::new();
        for _ in 0..num_chunks {
            chunks.push(ChunkRef {
                replica_id: codec::get_string(buf)?,
                chunk_id: codec::get_string(buf)?,
                start_sequence: codec::get_varuint(buf)?,
                num_records: codec::get_varuint(buf)?,
                size: codec::get_varuint(buf)?,
                checksum: codec::get_u64_le(buf)?,
            });
        }

        if !buf.is_empty() {
            return Err(LogTableError::CorruptFormat(format!(
                "{} trailing bytes after generation index",
                buf.len()
            )));
        }

        Ok(Self {
            table_name,
            generation,
            last_log_seq,
            chunks,
        })
    }
}

// =============================================================================
// File Naming
// =============================================================================

/// `<table>.<replica>.<generation>.idx`
pub fn generation_file_name(table: &str, replica: &str, generation: u64) -> String {
    format!("{}.{}.{}.{}", table, replica, generation, GENERATION_EXT)
}

/// `<table>.<replica>.<chunk_id>.sst`
pub fn chunk_file_name(table: &str, replica: &str, chunk_id: &str) -> String {
    format!("{}.{}.{}.{}", table, replica, chunk_id, CHUNK_EXT)
}

/// Parse the generation number out of a generation index file name
pub fn parse_generation_file_name(file_name: &str, table: &str, replica: &str) -> Option<u64> {
    let rest = file_name.strip_prefix(table)?.strip_prefix('.')?;
    let rest = rest.strip_prefix(replica)?.strip_prefix('.')?;
    let number = rest.strip_suffix(GENERATION_EXT)?.strip_suffix('.')?;
    number.parse().ok()
}

// =============================================================================
// Publication
// =============================================================================

/// Atomically publish a generation index file, returning its path
pub fn publish_generation(dir: &Path, replica: &str, generation: &TableGeneration) -> Result<PathBuf> {
    let path = dir.join(generation_file_name(
        &generation.table_name,
        replica,
        generation.generation,
    ));

    if path.exists() {
        return Err(LogTableError::DuplicateName(format!(
            "generation {} already published at {}",
            generation.generation,
            path.display()
        )));
    }

    fsutil::atomic_write(&path, &generation.encode())?;

    tracing::info!(
        "published generation {} of {}.{} ({} chunks, {} records)",
        generation.generation,
        generation.table_name,
        replica,
        generation.chunks.len(),
        generation.num_records()
    );

    Ok(path)
}

/// Load a generation index file
pub fn load_generation(path: &Path) -> Result<TableGeneration> {
    let data = std::fs::read(path)?;
    TableGeneration::decode(&data).map_err(|e| match e {
        LogTableError::CorruptFormat(msg) => {
            LogTableError::CorruptFormat(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

// =============================================================================
// Reader Abstraction
// =============================================================================

/// Source of generation snapshots and chunk records, consumed by tail cursors
pub trait SnapshotReader {
    /// Resolve and load the current generation
    fn get_snapshot(&self) -> Result<Arc<TableGeneration>>;

    /// Deliver up to `limit` records of `replica_id` starting at
    /// `start_sequence`, without crossing a chunk boundary.
    /// Returns the number of records delivered.
    fn fetch_records(
        &self,
        replica_id: &str,
        start_sequence: u64,
        limit: Option<usize>,
        visit: &mut dyn FnMut(&Record),
    ) -> Result<usize>;
}

impl<T: SnapshotReader + ?Sized> SnapshotReader for Arc<T> {
    fn get_snapshot(&self) -> Result<Arc<TableGeneration>> {
        (**self).get_snapshot()
    }

    fn fetch_records(
        &self,
        replica_id: &str,
        start_sequence: u64,
        limit: Option<usize>,
        visit: &mut dyn FnMut(&Record),
    ) -> Result<usize> {
        (**self).fetch_records(replica_id, start_sequence, limit, visit)
    }
}
