//! Tail Module
//!
//! Incremental, resumable consumption of a partition's chunks. The cursor
//! holds one consumed offset per replica; the consumer persists it with
//! [`TailCursor::encode`] and resumes with [`LogTableTail::with_cursor`].
//!
//! ## Cursor Format
//! ```text
//! varuint offset_count
//! repeated { varuint replica_id_len; bytes replica_id; varuint consumed_offset }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::codec;
use crate::commitlog::Record;
use crate::error::{LogTableError, Result};
use crate::generation::{SnapshotReader, TableGeneration};

// =============================================================================
// Cursor
// =============================================================================

/// Consumed offset of one replica
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailOffset {
    pub replica_id: String,
    pub consumed_offset: u64,
}

/// Persistable position of a tail consumer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TailCursor {
    pub offsets: Vec<TailOffset>,
}

impl TailCursor {
    /// Consumed offset of `replica_id`, if tracked
    pub fn offset(&self, replica_id: &str) -> Option<u64> {
        self.offsets
            .iter()
            .find(|o| o.replica_id == replica_id)
            .map(|o| o.consumed_offset)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        codec::put_varuint(&mut buf, self.offsets.len() as u64);
        for o in &self.offsets {
            codec::put_string(&mut buf, &o.replica_id);
            codec::put_varuint(&mut buf, o.consumed_offset);
        }
        buf
    }

    pub fn decode(mut data: &[u8]) -> Result<Self> {
        let buf = &mut data;
        let count = codec::get_varuint(buf)?;

        let mut offsets = Vec::new();
        for _ in 0..count {
            offsets.push(TailOffset {
                replica_id: codec::get_string(buf)?,
                consumed_offset: codec::get_varuint(buf)?,
            });
        }

        if !buf.is_empty() {
            return Err(LogTableError::CorruptFormat(format!(
                "{} trailing bytes after tail cursor",
                buf.len()
            )));
        }

        Ok(Self { offsets })
    }
}

impl fmt::Display for TailCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, o) in self.offsets.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", o.replica_id, o.consumed_offset)?;
        }
        Ok(())
    }
}

// =============================================================================
// Tail
// =============================================================================

/// Round-robin consumer over the chunks of the current generation
pub struct LogTableTail<R: SnapshotReader> {
    reader: R,
    /// replica -> next sequence to deliver
    offsets: BTreeMap<String, u64>,
    /// Cached generation, dropped once it has nothing left to deliver
    snapshot: Option<Arc<TableGeneration>>,
    /// Rotating start position over the chunk list
    rr: usize,
}

impl<R: SnapshotReader> LogTableTail<R> {
    /// Start from the oldest data of every replica
    pub fn new(reader: R) -> Result<Self> {
        let mut tail = Self {
            reader,
            offsets: BTreeMap::new(),
            snapshot: None,
            rr: 0,
        };
        tail.load_snapshot()?;
        Ok(tail)
    }

    /// Resume from a persisted cursor
    pub fn with_cursor(reader: R, cursor: &TailCursor) -> Self {
        Self {
            reader,
            offsets: cursor
                .offsets
                .iter()
                .map(|o| (o.replica_id.clone(), o.consumed_offset))
                .collect(),
            snapshot: None,
            rr: 0,
        }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Resolve the current generation and seed offsets of replicas seen for
    /// the first time (or whose consumed data is no longer listed)
    fn load_snapshot(&mut self) -> Result<Arc<TableGeneration>> {
        let snapshot = self.reader.get_snapshot()?;

        let mut oldest: BTreeMap<&str, u64> = BTreeMap::new();
        for chunk in &snapshot.chunks {
            let start = oldest
                .entry(chunk.replica_id.as_str())
                .or_insert(chunk.start_sequence);
            *start = (*start).min(chunk.start_sequence);
        }

        for (replica, start) in oldest {
            let offset = self.offsets.entry(replica.to_string()).or_insert(start);
            if *offset < start {
                tracing::warn!(
                    "tail: replica {} skipped from {} to {} (older chunks gone)",
                    replica,
                    offset,
                    start
                );
                *offset = start;
            }
        }

        self.snapshot = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Deliver the next batch of up to `limit` records (at least one when
    /// data is available) from a single chunk.
    ///
    /// Returns false when the cached generation holds nothing unconsumed;
    /// the next call then resolves the generation again.
    pub fn fetch_next<F>(&mut self, limit: Option<usize>, mut visit: F) -> Result<bool>
    where
        F: FnMut(&Record),
    {
        let snapshot = match &self.snapshot {
            Some(snapshot) => Arc::clone(snapshot),
            None => self.load_snapshot()?,
        };

        let limit = limit.map(|l| l.max(1));
        let nchunks = snapshot.chunks.len();

        for i in 0..nchunks {
            let chunk = &snapshot.chunks[self.rr.wrapping_add(i) % nchunks];
            let offset = self.offsets.get(&chunk.replica_id).copied().unwrap_or(0);

            if !chunk.contains(offset) {
                continue;
            }

            let delivered =
                self.reader
                    .fetch_records(&chunk.replica_id, offset, limit, &mut visit)?;
            if delivered == 0 {
                continue;
            }

            self.offsets
                .insert(chunk.replica_id.clone(), offset + delivered as u64);
            self.rr = self.rr.wrapping_add(1);
            return Ok(true);
        }

        self.snapshot = None;
        Ok(false)
    }

    /// Current position
    pub fn get_cursor(&self) -> TailCursor {
        TailCursor {
            offsets: self
                .offsets
                .iter()
                .map(|(replica_id, &consumed_offset)| TailOffset {
                    replica_id: replica_id.clone(),
                    consumed_offset,
                })
                .collect(),
        }
    }
}
