//! # logtable
//!
//! A log-structured chunked record store with:
//! - Durable commit logs with torn-tail recovery
//! - Deduplicating compaction into immutable, size-bounded chunks
//! - Crash-safe artifact catalog (temp-write + rename, file-locked writers)
//! - Generation snapshots for lock-free readers
//! - Resumable per-replica tailing cursors
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  RecordSet (single writer)                   │
//! │        add_record · roll_commitlog · compact · state         │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │                                  │
//!            ▼                                  ▼
//!   ┌─────────────────┐                ┌─────────────────┐
//!   │  Commit Logs    │                │     Chunks      │
//!   │ (WAL + pending) │                │  (header/body)  │
//!   └─────────────────┘                └────────┬────────┘
//!                                               │ publish
//!                          ┌────────────────────┴─────────┐
//!                          ▼                              ▼
//!                 ┌─────────────────┐            ┌─────────────────┐
//!                 │  Generation     │            │ Artifact Index  │
//!                 │  (.idx files)   │            │    (.afx)       │
//!                 └────────┬────────┘            └─────────────────┘
//!                          │
//!                          ▼
//!                 ┌─────────────────┐     ┌─────────────────┐
//!                 │  TableReader    │────►│  LogTableTail   │
//!                 │ (many readers)  │     │ (TailCursor)    │
//!                 └─────────────────┘     └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod checksum;
pub mod flock;
pub mod fsutil;

pub mod wal;
pub mod commitlog;
pub mod chunk;
pub mod generation;
pub mod artifact;
pub mod recordset;
pub mod tail;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{LogTableError, Result};
pub use config::{Config, ConfigBuilder, WalSyncStrategy};

pub use artifact::{ArtifactFileRef, ArtifactIndex, ArtifactRef, ArtifactStatus};
pub use commitlog::Record;
pub use generation::{ChunkRef, SnapshotReader, TableGeneration, TableReader};
pub use recordset::{CompactionSummary, RecordSet, RecordSetState};
pub use tail::{LogTableTail, TailCursor, TailOffset};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of logtable
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
