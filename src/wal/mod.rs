//! Commit Log Files
//!
//! Every pending log is mirrored to an append-only file so that records added
//! since the last compaction survive a crash.
//!
//! ## Responsibilities
//! - Append one frame per `add_record` before the in-memory log is touched
//! - CRC32 checksums for corruption detection
//! - Log Sequence Numbers (LSN) for ordering within a file
//! - Crash recovery: replay valid frames, cut the file at the first torn or
//!   corrupt frame
//!
//! ## Frame Layout
//! ```text
//! <table>.<replica>.<seq>.log
//!
//!  offset  0        8        12       16
//!          ┌────────┬────────┬────────┬──────────────────────────┐
//!          │ lsn    │ crc32  │ len    │ body (len bytes)         │  frame 1
//!          ├────────┼────────┼────────┼──────────────────────────┤
//!          │ lsn+1  │ crc32  │ len    │ body                     │  frame 2
//!          └────────┴────────┴────────┴──────────────────────────┘
//! ```
//! The body is the bincode encoding of (record id, payload, timestamp); the
//! CRC covers lsn, len and body. All integers are little-endian.

mod entry;
mod writer;
mod reader;
mod recovery;

pub use entry::{WalEntry, HEADER_SIZE, MAX_ENTRY_SIZE};
pub use writer::WalWriter;
pub use reader::{WalIterator, WalReader};
pub use recovery::{WalRecovery, RecoveryResult};
