//! Chunk Iterator
//!
//! Sequential iteration over the records of a chunk body.

use std::fs::File;
use std::io::{BufReader, Read};

use crate::codec::{self, MAX_VARUINT_LEN};
use crate::commitlog::Record;
use crate::error::{LogTableError, Result};

/// Iterator over chunk records in body order
pub struct ChunkIterator<'a> {
    file: &'a mut BufReader<File>,
    /// Body bytes not yet consumed
    remaining: u64,
    /// Set after the first error so iteration stops
    failed: bool,
}

impl<'a> ChunkIterator<'a> {
    /// `file` must be positioned at the start of the body
    pub(super) fn new(file: &'a mut BufReader<File>, body_size: u64) -> Self {
        Self {
            file,
            remaining: body_size,
            failed: false,
        }
    }

    fn read_record(&mut self) -> Result<Record> {
        let mut id = [0u8; 8];
        self.file.read_exact(&mut id).map_err(truncated)?;

        let (len, len_bytes) = self.read_varuint()?;
        let consumed = 8 + len_bytes as u64 + len;
        if consumed > self.remaining {
            return Err(LogTableError::CorruptFormat(format!(
                "chunk record of {} bytes overruns body ({} bytes left)",
                consumed, self.remaining
            )));
        }

        let mut payload = vec![0u8; len as usize];
        self.file.read_exact(&mut payload).map_err(truncated)?;
        self.remaining -= consumed;

        Ok(Record {
            id: u64::from_le_bytes(id),
            payload,
        })
    }

    fn read_varuint(&mut self) -> Result<(u64, usize)> {
        let mut raw = [0u8; MAX_VARUINT_LEN];
        for i in 0..MAX_VARUINT_LEN {
            let mut byte = [0u8; 1];
            self.file.read_exact(&mut byte).map_err(truncated)?;
            raw[i] = byte[0];
            if byte[0] & 0x80 == 0 {
                let value = codec::get_varuint(&mut &raw[..=i])?;
                return Ok((value, i + 1));
            }
        }
        Err(LogTableError::CorruptFormat(
            "chunk record length varuint too long".to_string(),
        ))
    }
}

impl<'a> Iterator for ChunkIterator<'a> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining == 0 {
            return None;
        }

        match self.read_record() {
            Ok(record) => Some(Ok(record)),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

fn truncated(e: std::io::Error) -> LogTableError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        LogTableError::CorruptFormat("chunk body truncated".to_string())
    } else {
        LogTableError::Io(e)
    }
}
