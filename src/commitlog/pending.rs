//! Pending log implementation
//!
//! Insertion-ordered, id-deduplicated record buffer with RwLock for concurrency.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::Record;

/// In-memory log of records added since the last roll
pub struct PendingLog {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    records: Vec<Record>,
    /// record id -> position in `records`
    positions: HashMap<u64, usize>,
    /// Approximate payload footprint in bytes
    size: usize,
}

impl PendingLog {
    /// Create a new empty pending log
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Insert or overwrite the record for `id` (write lock).
    ///
    /// Returns true if the id was not present before.
    pub fn insert(&self, id: u64, payload: Vec<u8>) -> bool {
        let mut inner = self.inner.write();

        match inner.positions.get(&id).copied() {
            Some(pos) => {
                let old_len = inner.records[pos].payload.len();
                inner.size = inner.size - old_len + payload.len();
                inner.records[pos].payload = payload;
                false
            }
            None => {
                let pos = inner.records.len();
                inner.size += 8 + payload.len();
                inner.records.push(Record { id, payload });
                inner.positions.insert(id, pos);
                true
            }
        }
    }

    /// Get the pending payload for `id` (read lock)
    pub fn get(&self, id: u64) -> Option<Vec<u8>> {
        let inner = self.inner.read();
        inner
            .positions
            .get(&id)
            .map(|&pos| inner.records[pos].payload.clone())
    }

    /// Whether `id` is pending
    pub fn contains(&self, id: u64) -> bool {
        self.inner.read().positions.contains_key(&id)
    }

    /// Number of distinct records
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }

    /// Approximate size in bytes (ids + payloads)
    pub fn size(&self) -> usize {
        self.inner.read().size
    }

    /// Copy of all records in insertion order
    pub fn records(&self) -> Vec<Record> {
        self.inner.read().records.clone()
    }

    /// All pending ids
    pub fn ids(&self) -> Vec<u64> {
        self.inner.read().records.iter().map(|r| r.id).collect()
    }

    /// Move all records out, leaving the log empty
    pub fn take(&self) -> Vec<Record> {
        let mut inner = self.inner.write();
        inner.positions.clear();
        inner.size = 0;
        std::mem::take(&mut inner.records)
    }

    /// Clear all entries
    pub fn clear(&self) {
        self.take();
    }
}

impl Default for PendingLog {
    fn default() -> Self {
        Self::new()
    }
}
