//! Table Reader
//!
//! Resolves the head generation of a partition and reads records out of its
//! chunks. Readers never take the index lock; they only ever see complete
//! generation files because publication is a rename.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::chunk::ChunkReader;
use crate::commitlog::Record;
use crate::config::Config;
use crate::error::Result;

use super::{
    chunk_file_name, generation_file_name, load_generation, parse_generation_file_name, ChunkRef,
    SnapshotReader, TableGeneration,
};

/// Default forward probe window of `get_snapshot`
pub const DEFAULT_PROBE_LIMIT: u64 = 100;

/// Snapshot and record reader for one `(table, replica)` partition
pub struct TableReader {
    db_path: PathBuf,
    table_name: String,
    replica_id: String,
    probe_limit: u64,
    /// Last generation seen; the next probe starts here
    head_gen: Mutex<u64>,
}

impl TableReader {
    pub fn open(db_path: impl AsRef<Path>, table_name: &str, replica_id: &str) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let head = find_head_generation(&db_path, table_name, replica_id)?;

        Ok(Self {
            db_path,
            table_name: table_name.to_string(),
            replica_id: replica_id.to_string(),
            probe_limit: DEFAULT_PROBE_LIMIT,
            head_gen: Mutex::new(head),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let mut reader = Self::open(&config.data_dir, &config.table_name, &config.replica_id)?;
        reader.probe_limit = config.generation_probe_limit.max(1);
        Ok(reader)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn replica_id(&self) -> &str {
        &self.replica_id
    }

    /// Generation number resolved by the last `get_snapshot`
    pub fn head_generation(&self) -> u64 {
        *self.head_gen.lock()
    }

    fn generation_path(&self, generation: u64) -> PathBuf {
        self.db_path.join(generation_file_name(
            &self.table_name,
            &self.replica_id,
            generation,
        ))
    }

    fn generation_exists(&self, generation: u64) -> bool {
        generation > 0 && self.generation_path(generation).exists()
    }

    /// Path of a chunk listed in a generation
    pub fn chunk_path(&self, chunk: &ChunkRef) -> PathBuf {
        self.db_path.join(chunk_file_name(
            &self.table_name,
            &chunk.replica_id,
            &chunk.chunk_id,
        ))
    }

    /// Resolve the head generation and load it.
    ///
    /// Probes forward from the last known generation, falls back to a
    /// directory scan, then advances while a newer file exists. An empty
    /// generation (number 0) is returned when nothing was published yet.
    pub fn get_snapshot(&self) -> Result<Arc<TableGeneration>> {
        let mut head_gen = self.head_gen.lock();

        let mut gen = *head_gen;
        let max_gen = gen.saturating_add(self.probe_limit);
        while gen < max_gen && !self.generation_exists(gen) {
            gen += 1;
        }

        if !self.generation_exists(gen) {
            gen = find_head_generation(&self.db_path, &self.table_name, &self.replica_id)?;
        }

        while self.generation_exists(gen + 1) {
            gen += 1;
        }

        *head_gen = gen;
        drop(head_gen);

        if gen == 0 {
            return Ok(Arc::new(TableGeneration {
                table_name: self.table_name.clone(),
                ..TableGeneration::default()
            }));
        }

        tracing::trace!("{}.{}: head generation {}", self.table_name, self.replica_id, gen);
        Ok(Arc::new(load_generation(&self.generation_path(gen))?))
    }

    /// Deliver up to `limit` records of `replica_id` starting at
    /// `start_sequence`, from the single chunk containing it
    pub fn fetch_records<F>(
        &self,
        replica_id: &str,
        start_sequence: u64,
        limit: Option<usize>,
        mut visit: F,
    ) -> Result<usize>
    where
        F: FnMut(&Record),
    {
        let snapshot = self.get_snapshot()?;

        let Some(chunk) = snapshot
            .chunks
            .iter()
            .find(|c| c.replica_id == replica_id && c.contains(start_sequence))
        else {
            return Ok(0);
        };

        let available = (chunk.end_sequence() - start_sequence) as usize;
        let limit = limit.map_or(available, |l| l.min(available));

        self.fetch_chunk_records(chunk, start_sequence - chunk.start_sequence, limit, &mut visit)
    }

    /// Stream `limit` records of a chunk beginning at local `offset`
    pub fn fetch_chunk_records(
        &self,
        chunk: &ChunkRef,
        offset: u64,
        limit: usize,
        visit: &mut dyn FnMut(&Record),
    ) -> Result<usize> {
        let path = self.chunk_path(chunk);
        let mut reader = ChunkReader::open_finalized(&path)?;

        if reader.body_size() == 0 {
            tracing::warn!("chunk {} has an empty body", path.display());
            return Ok(0);
        }

        let mut delivered = 0;
        for record in reader.iter()?.skip(offset as usize).take(limit) {
            visit(&record?);
            delivered += 1;
        }

        Ok(delivered)
    }
}

impl SnapshotReader for TableReader {
    fn get_snapshot(&self) -> Result<Arc<TableGeneration>> {
        TableReader::get_snapshot(self)
    }

    fn fetch_records(
        &self,
        replica_id: &str,
        start_sequence: u64,
        limit: Option<usize>,
        visit: &mut dyn FnMut(&Record),
    ) -> Result<usize> {
        TableReader::fetch_records(self, replica_id, start_sequence, limit, visit)
    }
}

/// Highest generation number present in `db_path`, or 0 if there is none
pub fn find_head_generation(db_path: &Path, table: &str, replica: &str) -> Result<u64> {
    let entries = match fs::read_dir(db_path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut head = 0;
    for entry in entries {
        let entry = entry?;
        if let Some(gen) = entry
            .file_name()
            .to_str()
            .and_then(|name| parse_generation_file_name(name, table, replica))
        {
            head = head.max(gen);
        }
    }

    Ok(head)
}
