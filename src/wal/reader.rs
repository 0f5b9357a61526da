//! WAL Reader
//!
//! Handles reading entries from a commit log file.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{LogTableError, Result};

use super::entry::{HEADER_SIZE, MAX_ENTRY_SIZE};
use super::WalEntry;

/// Outcome of reading one frame
pub(super) enum Frame {
    /// A valid entry and its frame size
    Entry(WalEntry, u64),
    /// Clean end of file on a frame boundary
    Eof,
    /// The file ends in the middle of a frame (partial write)
    Torn,
    /// The frame is complete but fails validation
    Corrupt(String),
}

/// Reads entries from a commit log file
pub struct WalReader {
    file: BufReader<File>,
    /// Byte offset of the next frame
    position: u64,
}

impl WalReader {
    /// Open a commit log file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            file: BufReader::new(file),
            position: 0,
        })
    }

    /// Read the next entry from the log.
    ///
    /// Returns `Ok(None)` at a clean end of file; torn or corrupt frames are
    /// reported as `CorruptFormat`.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        match self.read_frame()? {
            Frame::Entry(entry, _) => Ok(Some(entry)),
            Frame::Eof => Ok(None),
            Frame::Torn => Err(LogTableError::CorruptFormat(format!(
                "partial commit log frame at offset {}",
                self.position
            ))),
            Frame::Corrupt(reason) => Err(LogTableError::CorruptFormat(format!(
                "{} (offset {})",
                reason, self.position
            ))),
        }
    }

    /// Iterate over all valid entries
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }

    /// Byte offset of the next unread frame
    pub fn position(&self) -> u64 {
        self.position
    }

    pub(super) fn read_frame(&mut self) -> Result<Frame> {
        let mut header = [0u8; HEADER_SIZE];
        match read_full(&mut self.file, &mut header)? {
            0 => return Ok(Frame::Eof),
            n if n < HEADER_SIZE => return Ok(Frame::Torn),
            _ => {}
        }

        let (lsn, crc, len) = WalEntry::parse_header(&header);
        if len > MAX_ENTRY_SIZE {
            return Ok(Frame::Corrupt(format!(
                "commit log frame length {} exceeds limit",
                len
            )));
        }

        let mut body = vec![0u8; len as usize];
        if read_full(&mut self.file, &mut body)? < body.len() {
            return Ok(Frame::Torn);
        }

        match WalEntry::decode_body(lsn, crc, len, &body) {
            Ok(entry) => {
                let frame_size = (HEADER_SIZE + body.len()) as u64;
                self.position += frame_size;
                Ok(Frame::Entry(entry, frame_size))
            }
            Err(e) => Ok(Frame::Corrupt(e.to_string())),
        }
    }
}

/// Read until `buf` is full or EOF; returns the number of bytes read
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Iterator over commit log entries; stops after the first error
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
