//! Chunk Reader
//!
//! Opens chunk files, validates the header and streams the body.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{LogTableError, Result};

use super::iterator::ChunkIterator;
use super::{ChunkTag, FileHeader, FLAG_HAS_TRAILER, TRAILER_MAGIC, TRAILER_SIZE};

/// Reader for a chunk file
pub struct ChunkReader {
    path: PathBuf,
    file: BufReader<File>,
    header: FileHeader,
    /// Offset of the first body byte
    body_offset: u64,
}

impl ChunkReader {
    /// Open a chunk and parse its header (magic, version and the body bounds
    /// are checked here; the userdata checksum is checked by `verify`)
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();

        let mut file = BufReader::new(file);
        let header = FileHeader::read_from(&mut file)?;
        let body_offset = header.header_size();

        let trailer = if header.has_flag(FLAG_HAS_TRAILER) {
            TRAILER_SIZE
        } else {
            0
        };
        let end = body_offset
            .checked_add(header.body_size)
            .and_then(|n| n.checked_add(trailer));
        if end.map_or(true, |end| end > file_len) {
            return Err(LogTableError::CorruptFormat(format!(
                "chunk body of {} bytes exceeds file length {}: {}",
                header.body_size,
                file_len,
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            header,
            body_offset,
        })
    }

    /// Open, verify the header checksum and require a finalized chunk
    pub fn open_finalized(path: &Path) -> Result<Self> {
        let reader = Self::open(path)?;

        if !reader.verify() {
            return Err(LogTableError::CorruptFormat(format!(
                "chunk header checksum mismatch: {}",
                path.display()
            )));
        }

        if !reader.is_finalized() {
            return Err(LogTableError::UnfinishedChunk(path.to_path_buf()));
        }

        Ok(reader)
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_finalized(&self) -> bool {
        self.header.is_finalized()
    }

    pub fn body_size(&self) -> u64 {
        self.header.body_size
    }

    /// Recompute the userdata checksum
    pub fn verify(&self) -> bool {
        self.header.verify()
    }

    /// Decode the chunk tag stored in the userdata
    pub fn tag(&self) -> Result<ChunkTag> {
        ChunkTag::decode(&self.header.userdata)
    }

    /// Check the body against the trailer CRC.
    ///
    /// Chunks written without a trailer have nothing to check and pass.
    pub fn verify_body(&mut self) -> Result<bool> {
        if !self.header.has_flag(FLAG_HAS_TRAILER) {
            return Ok(true);
        }

        self.file.seek(SeekFrom::Start(self.body_offset))?;

        let mut hasher = crc32fast::Hasher::new();
        let mut remaining = self.header.body_size;
        let mut buf = [0u8; 64 * 1024];
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            self.file.read_exact(&mut buf[..want]).map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    LogTableError::CorruptFormat(format!(
                        "chunk body truncated: {}",
                        self.path.display()
                    ))
                } else {
                    LogTableError::Io(e)
                }
            })?;
            hasher.update(&buf[..want]);
            remaining -= want as u64;
        }

        let mut trailer = [0u8; TRAILER_SIZE as usize];
        if self.file.read_exact(&mut trailer).is_err() {
            return Ok(false);
        }

        let mut crc = [0u8; 4];
        let mut magic = [0u8; 4];
        crc.copy_from_slice(&trailer[0..4]);
        magic.copy_from_slice(&trailer[4..8]);

        Ok(u32::from_le_bytes(magic) == TRAILER_MAGIC
            && u32::from_le_bytes(crc) == hasher.finalize())
    }

    /// Iterate over all records in body order
    pub fn iter(&mut self) -> Result<ChunkIterator<'_>> {
        self.file.seek(SeekFrom::Start(self.body_offset))?;
        Ok(ChunkIterator::new(&mut self.file, self.header.body_size))
    }
}
