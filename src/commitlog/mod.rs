//! Commit Log Module
//!
//! In-memory side of the write path: the active pending log and the backlog
//! of rolled logs waiting for compaction.
//!
//! ## Responsibilities
//! - At most one entry per record id in a pending log (overwrite in place)
//! - Preserve insertion order so compaction output is deterministic
//! - Single-writer/multi-reader access to the pending log
//!
//! ## Data Structure Choice
//! A `Vec` of records plus a `HashMap` from id to position, wrapped in an
//! RwLock: insertion order for compaction, O(1) dedup on insert.

mod pending;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use pending::PendingLog;

/// A record as stored by the engine: caller-supplied id and opaque payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    pub payload: Vec<u8>,
}

impl Record {
    pub fn new(id: u64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }
}

/// An immutable former pending log, kept until compaction consumes it
#[derive(Debug, Clone)]
pub struct RolledLog {
    /// Roll sequence number (the commit log file's sequence)
    pub seq: u64,

    /// Commit log file backing this log
    pub path: PathBuf,

    /// Deduplicated records in insertion order
    pub records: Vec<Record>,
}

impl RolledLog {
    /// Number of distinct records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
