//! Chunk Builder
//!
//! Writes records to a new chunk file and finalizes its header.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::BufMut;

use crate::checksum::file_checksum;
use crate::codec;
use crate::error::{LogTableError, Result};

use super::{
    encoded_record_len, ChunkMeta, ChunkTag, FileHeader, FLAG_FINALIZED, FLAG_HAS_TRAILER,
    TRAILER_MAGIC,
};

/// Builder for a single chunk file
///
/// The header is written up front with `flags = 0` and patched by `finish()`,
/// so a crash mid-write leaves a chunk that readers reject as unfinished.
pub struct ChunkWriter {
    /// Output file path
    path: PathBuf,
    /// Buffered writer for performance
    writer: BufWriter<File>,
    /// Identity and running record count
    tag: ChunkTag,
    /// Bytes written to the body so far
    body_size: u64,
    /// Running CRC of the body, stored in the trailer
    body_hasher: crc32fast::Hasher,
    /// Reused encode buffer
    scratch: Vec<u8>,
}

impl ChunkWriter {
    /// Create (or truncate) a chunk file and write its provisional header
    pub fn create(
        path: &Path,
        replica_id: &str,
        chunk_id: &str,
        start_sequence: u64,
    ) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let tag = ChunkTag {
            replica_id: replica_id.to_string(),
            chunk_id: chunk_id.to_string(),
            start_sequence,
            num_records: 0,
        };

        let mut writer = BufWriter::new(file);
        writer.write_all(&FileHeader::new(0, 0, tag.encode()).encode())?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            tag,
            body_size: 0,
            body_hasher: crc32fast::Hasher::new(),
            scratch: Vec::new(),
        })
    }

    /// Append a record to the body
    pub fn add(&mut self, id: u64, payload: &[u8]) -> Result<()> {
        self.scratch.clear();
        self.scratch.put_u64_le(id);
        codec::put_varuint(&mut self.scratch, payload.len() as u64);

        self.writer.write_all(&self.scratch)?;
        self.writer.write_all(payload)?;
        self.body_hasher.update(&self.scratch);
        self.body_hasher.update(payload);

        self.body_size += (self.scratch.len() + payload.len()) as u64;
        self.tag.num_records += 1;
        Ok(())
    }

    /// Whether adding a payload of this length would push a non-empty body
    /// past `max_body_size`
    pub fn would_overflow(&self, payload_len: usize, max_body_size: u64) -> bool {
        self.tag.num_records > 0
            && self.body_size.saturating_add(encoded_record_len(payload_len)) > max_body_size
    }

    /// Records written so far
    pub fn num_records(&self) -> u64 {
        self.tag.num_records
    }

    /// Body bytes written so far
    pub fn body_size(&self) -> u64 {
        self.body_size
    }

    /// Sequence number of the first record
    pub fn start_sequence(&self) -> u64 {
        self.tag.start_sequence
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Finish building: write the trailer, finalize the header, fsync
    pub fn finish(mut self) -> Result<ChunkMeta> {
        let body_crc = self.body_hasher.clone().finalize();
        self.writer.write_all(&body_crc.to_le_bytes())?;
        self.writer.write_all(&TRAILER_MAGIC.to_le_bytes())?;
        self.writer.flush()?;

        let mut file = self.writer.into_inner().map_err(|e| {
            LogTableError::Io(std::io::Error::new(
                e.error().kind(),
                format!("failed to flush chunk {}: {}", self.path.display(), e.error()),
            ))
        })?;

        // tag length is unchanged: counters are fixed-width
        let header = FileHeader::new(
            FLAG_FINALIZED | FLAG_HAS_TRAILER,
            self.body_size,
            self.tag.encode(),
        );
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header.encode())?;
        file.sync_all()?;

        let file_size = file.metadata()?.len();
        drop(file);

        let checksum = file_checksum(&self.path)?;

        tracing::debug!(
            "finalized chunk {} ({} records, {} body bytes)",
            self.path.display(),
            self.tag.num_records,
            self.body_size
        );

        Ok(ChunkMeta {
            path: self.path,
            tag: self.tag,
            body_size: self.body_size,
            file_size,
            checksum,
        })
    }

    /// Discard the partially written file
    pub fn abort(self) -> Result<()> {
        let path = self.path.clone();
        drop(self.writer);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
