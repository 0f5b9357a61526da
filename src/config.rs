//! Configuration for logtable
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{LogTableError, Result};

/// Configuration for one table partition
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Partition Layout
    // -------------------------------------------------------------------------
    /// Base directory of the partition. Internal structure:
    ///   {data_dir}/
    ///     ├── {table}.{replica}.{seq}.log         (commit logs)
    ///     ├── {table}.{replica}.{chunk_id}.sst    (chunks)
    ///     ├── {table}.{replica}.{generation}.idx  (generation index files)
    ///     └── {artifact_index}.afx / .afx.lck     (artifact catalog)
    pub data_dir: PathBuf,

    /// Table name, first component of every file name
    pub table_name: String,

    /// Replica identity of the local writer
    pub replica_id: String,

    // -------------------------------------------------------------------------
    // Compaction Configuration
    // -------------------------------------------------------------------------
    /// Upper bound on the body size of a chunk, in bytes
    pub max_datafile_size: u64,

    // -------------------------------------------------------------------------
    // Commit Log Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync the active commit log
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // Reader Configuration
    // -------------------------------------------------------------------------
    /// How many generation numbers `get_snapshot` probes forward before
    /// falling back to a directory scan
    pub generation_probe_limit: u64,

    // -------------------------------------------------------------------------
    // Artifact Catalog Configuration
    // -------------------------------------------------------------------------
    /// Name of the artifact index mirrored by compaction (None = disabled)
    pub artifact_index: Option<String>,

    /// How long a metadata writer waits for the index file lock (None = block)
    pub lock_timeout_ms: Option<u64>,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./logtable_data"),
            table_name: "table".to_string(),
            replica_id: "local".to_string(),
            max_datafile_size: u64::MAX,
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
            generation_probe_limit: 100,
            artifact_index: None,
            lock_timeout_ms: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Lock timeout as a Duration
    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    /// Reject names that would break the `<table>.<replica>.<n>.<ext>` scheme
    pub fn validate(&self) -> Result<()> {
        for (what, name) in [("table name", &self.table_name), ("replica id", &self.replica_id)] {
            if name.is_empty() {
                return Err(LogTableError::Config(format!("{} must not be empty", what)));
            }
            if name.contains('.') || name.contains('/') {
                return Err(LogTableError::Config(format!(
                    "{} '{}' must not contain '.' or '/'",
                    what, name
                )));
            }
        }

        if self.max_datafile_size == 0 {
            return Err(LogTableError::Config(
                "max_datafile_size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the partition base directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the table name
    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.config.table_name = name.into();
        self
    }

    /// Set the local replica id
    pub fn replica_id(mut self, id: impl Into<String>) -> Self {
        self.config.replica_id = id.into();
        self
    }

    /// Set the maximum chunk body size (in bytes)
    pub fn max_datafile_size(mut self, size: u64) -> Self {
        self.config.max_datafile_size = size;
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the forward probe window used when resolving the head generation
    pub fn generation_probe_limit(mut self, limit: u64) -> Self {
        self.config.generation_probe_limit = limit;
        self
    }

    /// Mirror compacted chunks into the named artifact index
    pub fn artifact_index(mut self, name: impl Into<String>) -> Self {
        self.config.artifact_index = Some(name.into());
        self
    }

    /// Bound the wait for the artifact index file lock (in milliseconds)
    pub fn lock_timeout_ms(mut self, ms: u64) -> Self {
        self.config.lock_timeout_ms = Some(ms);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
