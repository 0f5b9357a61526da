//! RecordSet Module
//!
//! The write path of one `(table, replica)` partition.
//!
//! ## Responsibilities
//! - Accept records into the pending log (mirrored to a commit log file)
//! - Roll the pending log into the backlog of rolled logs
//! - Compact the backlog and the current chunks into new size-bounded chunks
//! - Publish the new chunk list as the next generation
//! - Capture and restore recovery state
//!
//! ## Write Path
//! ```text
//! add_record ──► PendingLog + <t>.<r>.<seq>.log
//!                      │ roll_commitlog
//!                      ▼
//!                 old_logs (RolledLog, roll order)
//!                      │ compact
//!                      ▼
//!   chunks <t>.<r>.<gen>-<n>.sst ──► <t>.<r>.<gen>.idx (commit point)
//!                      └──────────► <index>.afx (catalog mirror)
//! ```
//!
//! ## Concurrency Model
//! Mutating methods take `&mut self`: one writer per partition. Readers use
//! their own [`TableReader`](crate::TableReader) and never touch this type.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactIndex, ArtifactRef};
use crate::chunk::{ChunkMeta, ChunkReader, ChunkWriter};
use crate::commitlog::{PendingLog, Record, RolledLog};
use crate::config::Config;
use crate::error::Result;
use crate::fsutil;
use crate::generation::{
    chunk_file_name, find_head_generation, generation_file_name, load_generation,
    publish_generation, ChunkRef, TableGeneration,
};
use crate::wal::{WalRecovery, WalWriter};

/// Extension of commit log files
pub const COMMITLOG_EXT: &str = "log";

/// `<table>.<replica>.<seq>.log`
pub fn commitlog_file_name(table: &str, replica: &str, seq: u64) -> String {
    format!("{}.{}.{}.{}", table, replica, seq, COMMITLOG_EXT)
}

fn parse_commitlog_file_name(file_name: &str, table: &str, replica: &str) -> Option<u64> {
    let rest = file_name.strip_prefix(table)?.strip_prefix('.')?;
    let rest = rest.strip_prefix(replica)?.strip_prefix('.')?;
    let number = rest.strip_suffix(COMMITLOG_EXT)?.strip_suffix('.')?;
    number.parse().ok()
}

// =============================================================================
// Recovery State
// =============================================================================

/// Snapshot of the engine's bookkeeping, persisted by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSetState {
    /// Active commit log file name, if it holds records
    pub commitlog: Option<String>,

    /// Bytes in the active commit log
    pub commitlog_bytes: u64,

    /// Rolled commit log file names, in roll order
    pub old_commitlogs: Vec<String>,

    /// Chunk list of the current generation
    pub datafiles: Vec<ChunkRef>,

    /// Current generation number
    pub generation: u64,

    /// Highest commit log sequence folded into `datafiles`
    pub last_log_seq: u64,

    /// Sequence the next commit log will use
    pub next_log_seq: u64,
}

impl RecordSetState {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Outcome of a compaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionSummary {
    /// Generation published by this compaction (0 if nothing was done)
    pub generation: u64,

    /// Distinct records taken from the backlog
    pub records_compacted: usize,

    /// Chunks carried over unchanged
    pub chunks_kept: usize,

    /// Chunks written by this compaction
    pub chunks_written: Vec<ChunkRef>,

    /// Rolled commit logs consumed
    pub logs_compacted: usize,

    /// Files no longer referenced by the new generation. Readers holding an
    /// older snapshot may still use them; see [`RecordSet::remove_files`].
    pub obsolete_files: Vec<PathBuf>,
}

impl CompactionSummary {
    pub fn is_noop(&self) -> bool {
        self.generation == 0
    }
}

// =============================================================================
// RecordSet
// =============================================================================

/// Compaction engine for one partition
pub struct RecordSet {
    config: Config,

    /// Bound on chunk body bytes
    max_datafile_size: u64,

    /// Records added since the last roll
    pending: PendingLog,

    /// Commit log backing `pending`, opened on the first add after a roll
    active_log: Option<(u64, WalWriter)>,

    /// Rolled logs waiting for compaction, in roll order
    old_logs: Vec<RolledLog>,

    /// Distinct ids across `old_logs`
    backlog_ids: HashSet<u64>,

    /// Current generation
    generation: TableGeneration,

    /// Sequence of the next commit log file
    next_log_seq: u64,

    /// record id -> partition sequence, built on first use
    id_index: Option<HashMap<u64, u64>>,

    /// Catalog mirrored by compaction
    artifact_index: Option<ArtifactIndex>,

    /// The catalog may not list the current chunk set
    catalog_dirty: bool,
}

impl RecordSet {
    /// Open a partition, replaying any commit logs left on disk
    pub fn open(config: Config) -> Result<Self> {
        Self::load(config, None)
    }

    /// Open a partition from previously captured state.
    ///
    /// The on-disk head generation and commit logs are authoritative; the
    /// state only raises counters and flags logs that went missing.
    pub fn reopen(config: Config, state: &RecordSetState) -> Result<Self> {
        Self::load(config, Some(state))
    }

    fn load(config: Config, hints: Option<&RecordSetState>) -> Result<Self> {
        config.validate()?;

        // Step 1: Create data directory if it doesn't exist
        fs::create_dir_all(&config.data_dir)?;

        let table = config.table_name.as_str();
        let replica = config.replica_id.as_str();

        // Step 2: Load the head generation
        let head = find_head_generation(&config.data_dir, table, replica)?;
        let generation = if head > 0 {
            load_generation(&config.data_dir.join(generation_file_name(table, replica, head)))?
        } else {
            TableGeneration {
                table_name: config.table_name.clone(),
                ..TableGeneration::default()
            }
        };

        let mut next_log_seq = generation.last_log_seq + 1;

        if let Some(state) = hints {
            if state.generation > generation.generation {
                tracing::warn!(
                    "{}.{}: state refers to generation {} but disk head is {}",
                    table,
                    replica,
                    state.generation,
                    generation.generation
                );
            }

            for name in state.commitlog.iter().chain(state.old_commitlogs.iter()) {
                let seq = parse_commitlog_file_name(name, table, replica);
                let compacted = seq.map_or(false, |s| s <= generation.last_log_seq);
                if !compacted && !config.data_dir.join(name).exists() {
                    tracing::warn!("{}.{}: commit log {} is missing", table, replica, name);
                }
            }

            next_log_seq = next_log_seq.max(state.next_log_seq);
        }

        // Step 3: Discover commit logs, oldest first
        let mut logs = Vec::new();
        for entry in fs::read_dir(&config.data_dir)? {
            let entry = entry?;
            if let Some(seq) = entry
                .file_name()
                .to_str()
                .and_then(|name| parse_commitlog_file_name(name, table, replica))
            {
                logs.push((seq, entry.path()));
            }
        }
        logs.sort();

        // Step 4: Replay logs not yet folded into the generation
        let pending = PendingLog::new();
        let mut replayed = Vec::new();

        for (seq, path) in logs {
            next_log_seq = next_log_seq.max(seq + 1);

            if seq <= generation.last_log_seq {
                tracing::debug!("removing compacted commit log {}", path.display());
                fsutil::remove_if_exists(&path)?;
                continue;
            }

            let (entries, result) = WalRecovery::recover(&path)?;
            tracing::info!(
                "replayed commit log {}: {} entries, last_lsn={}",
                path.display(),
                result.entries_recovered,
                result.last_lsn
            );

            for entry in entries {
                pending.insert(entry.record_id, entry.payload);
            }
            replayed.push(path);
        }

        let mut recordset = Self {
            max_datafile_size: config.max_datafile_size,
            pending,
            active_log: None,
            old_logs: Vec::new(),
            backlog_ids: HashSet::new(),
            generation,
            next_log_seq,
            id_index: None,
            artifact_index: None,
            catalog_dirty: false,
            config,
        };

        // Step 5: Coalesce replayed logs into one fresh commit log
        if !recordset.pending.is_empty() {
            for record in recordset.pending.records() {
                recordset.log_writer()?.append(record.id, &record.payload)?;
            }
            recordset.log_writer()?.sync()?;
        }
        for path in &replayed {
            fsutil::remove_if_exists(path)?;
        }

        if let Some(name) = &recordset.config.artifact_index {
            recordset.artifact_index = Some(
                ArtifactIndex::new(&recordset.config.data_dir, name, false)
                    .with_lock_timeout(recordset.config.lock_timeout()),
            );
            // a crash or failure after the last publish may have left it behind
            recordset.catalog_dirty = true;
            recordset.sync_catalog();
        }

        tracing::info!(
            "opened {}.{} at generation {} ({} chunks, {} pending records)",
            recordset.config.table_name,
            recordset.config.replica_id,
            recordset.generation.generation,
            recordset.generation.chunks.len(),
            recordset.pending.len()
        );

        Ok(recordset)
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Chunks of the current generation
    pub fn datafiles(&self) -> &[ChunkRef] {
        &self.generation.chunks
    }

    /// Current generation number
    pub fn generation(&self) -> u64 {
        self.generation.generation
    }

    /// Number of rolled logs waiting for compaction
    pub fn old_commitlogs(&self) -> usize {
        self.old_logs.len()
    }

    /// Distinct records in the active pending log
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Distinct record ids not yet compacted (pending log plus backlog)
    pub fn commitlog_size(&self) -> usize {
        let pending_only = self
            .pending
            .ids()
            .into_iter()
            .filter(|id| !self.backlog_ids.contains(id))
            .count();
        self.backlog_ids.len() + pending_only
    }

    pub fn max_datafile_size(&self) -> u64 {
        self.max_datafile_size
    }

    pub fn set_max_datafile_size(&mut self, size: u64) {
        self.max_datafile_size = size.max(1);
    }

    pub fn artifact_index(&self) -> Option<&ArtifactIndex> {
        self.artifact_index.as_ref()
    }

    /// Whether the artifact catalog still lags behind the current generation
    pub fn catalog_is_stale(&self) -> bool {
        self.catalog_dirty
    }

    fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    fn commitlog_path(&self, seq: u64) -> PathBuf {
        self.data_dir().join(commitlog_file_name(
            &self.config.table_name,
            &self.config.replica_id,
            seq,
        ))
    }

    pub fn chunk_path(&self, chunk: &ChunkRef) -> PathBuf {
        self.data_dir().join(chunk_file_name(
            &self.config.table_name,
            &chunk.replica_id,
            &chunk.chunk_id,
        ))
    }

    fn log_writer(&mut self) -> Result<&mut WalWriter> {
        let active = match self.active_log.take() {
            Some(active) => active,
            None => {
                let seq = self.next_log_seq;
                let writer =
                    WalWriter::open(&self.commitlog_path(seq), self.config.wal_sync_strategy)?;
                self.next_log_seq += 1;
                (seq, writer)
            }
        };

        Ok(&mut self.active_log.insert(active).1)
    }

    // -------------------------------------------------------------------------
    // Write Path
    // -------------------------------------------------------------------------

    /// Insert or overwrite the record for `id`.
    ///
    /// The commit log append happens first; an I/O error leaves the pending
    /// log unchanged.
    pub fn add_record(&mut self, id: u64, payload: &[u8]) -> Result<()> {
        self.log_writer()?.append(id, payload)?;
        self.pending.insert(id, payload.to_vec());
        Ok(())
    }

    /// fsync the active commit log
    pub fn sync(&mut self) -> Result<()> {
        match self.active_log.as_mut() {
            Some((_, writer)) => writer.sync(),
            None => Ok(()),
        }
    }

    /// Move the pending log to the backlog and start a new one.
    /// Does nothing when the pending log is empty.
    pub fn roll_commitlog(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let Some((seq, mut writer)) = self.active_log.take() else {
            return Ok(());
        };

        if let Err(e) = writer.sync() {
            self.active_log = Some((seq, writer));
            return Err(e);
        }

        let path = writer.path().to_path_buf();
        drop(writer);

        let records = self.pending.take();
        self.backlog_ids.extend(records.iter().map(|r| r.id));

        tracing::info!(
            "rolled commit log {} ({} records, {} in backlog)",
            path.display(),
            records.len(),
            self.backlog_ids.len()
        );

        self.old_logs.push(RolledLog { seq, path, records });
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Compaction
    // -------------------------------------------------------------------------

    /// Merge every rolled log into the chunk set and publish the result as
    /// the next generation.
    ///
    /// Nothing observable changes unless the new generation file is
    /// published; a failure before that removes the new chunk files. Once
    /// published the call succeeds; a catalog that could not be updated is
    /// retried by the next `compact` or `open`.
    pub fn compact(&mut self) -> Result<CompactionSummary> {
        if self.old_logs.is_empty() {
            self.sync_catalog();
            return Ok(CompactionSummary::default());
        }

        // Step 1: Merge the backlog, later logs overwrite earlier ones
        let mut merged: Vec<Record> = Vec::new();
        let mut positions: HashMap<u64, usize> = HashMap::new();
        for log in &self.old_logs {
            for record in &log.records {
                match positions.get(&record.id) {
                    Some(&pos) => merged[pos].payload = record.payload.clone(),
                    None => {
                        positions.insert(record.id, merged.len());
                        merged.push(record.clone());
                    }
                }
            }
        }

        // Step 2: Split into overwrites of stored records and appends
        self.ensure_id_index()?;
        let id_index = self.id_index.as_ref();
        let chunks = &self.generation.chunks;

        let mut overwrites: HashMap<u64, &[u8]> = HashMap::new();
        let mut appends: Vec<&Record> = Vec::new();
        let mut first_changed = chunks.len().saturating_sub(1);

        for record in &merged {
            match id_index.and_then(|idx| idx.get(&record.id)) {
                Some(&sequence) => {
                    let chunk = chunks.partition_point(|c| c.end_sequence() <= sequence);
                    first_changed = first_changed.min(chunk);
                    overwrites.insert(record.id, &record.payload);
                }
                None => appends.push(record),
            }
        }

        let kept = &chunks[..first_changed];
        let rewritten = &chunks[first_changed..];
        let start_sequence = rewritten.first().map_or(0, |c| c.start_sequence);
        let new_gen = self.generation.generation + 1;

        // Step 3: Stream the rewrite window into new chunks
        let mut sink = ChunkSink {
            dir: self.data_dir().to_path_buf(),
            table: self.config.table_name.clone(),
            replica: self.config.replica_id.clone(),
            generation: new_gen,
            max_body_size: self.max_datafile_size,
            next_sequence: start_sequence,
            current: None,
            finished: Vec::new(),
        };

        let written = self
            .stream_compaction(&mut sink, rewritten, &overwrites, &appends)
            .and_then(|()| sink.finish());
        let written = match written {
            Ok(written) => written,
            Err(e) => {
                tracing::error!("compaction of {}.{} failed: {}", sink.table, sink.replica, e);
                sink.abort();
                return Err(e);
            }
        };

        let new_refs: Vec<ChunkRef> = written.iter().map(ChunkRef::from).collect();

        // Step 4: Publish the next generation (commit point)
        let next = TableGeneration {
            table_name: self.config.table_name.clone(),
            generation: new_gen,
            last_log_seq: self.old_logs.iter().map(|l| l.seq).max().unwrap_or(0),
            chunks: kept.iter().cloned().chain(new_refs.iter().cloned()).collect(),
        };

        if let Err(e) = publish_generation(self.data_dir(), &self.config.replica_id, &next) {
            for meta in &written {
                let _ = fsutil::remove_if_exists(&meta.path);
            }
            return Err(e);
        }

        // Step 5: Collect what the new generation no longer references
        let mut obsolete_files: Vec<PathBuf> =
            rewritten.iter().map(|c| self.chunk_path(c)).collect();
        if self.generation.generation > 0 {
            obsolete_files.push(self.data_dir().join(generation_file_name(
                &self.config.table_name,
                &self.config.replica_id,
                self.generation.generation,
            )));
        }

        let chunks_kept = kept.len();
        let records_compacted = merged.len();

        // Step 6: Assign sequences to appended records
        let mut next_sequence = next.num_records() - appends.len() as u64;
        let appended_ids: Vec<u64> = appends.iter().map(|r| r.id).collect();
        if let Some(idx) = self.id_index.as_mut() {
            for id in appended_ids {
                idx.insert(id, next_sequence);
                next_sequence += 1;
            }
        }

        // Step 7: Swap in the new state and drop compacted logs
        self.generation = next;
        let logs = std::mem::take(&mut self.old_logs);
        self.backlog_ids.clear();

        for log in &logs {
            if let Err(e) = fsutil::remove_if_exists(&log.path) {
                tracing::warn!("failed to remove commit log {}: {}", log.path.display(), e);
            }
        }

        tracing::info!(
            "compacted {} logs ({} records) into generation {}: {} chunks kept, {} written",
            logs.len(),
            records_compacted,
            new_gen,
            chunks_kept,
            new_refs.len()
        );

        // Step 8: Mirror the chunk set into the artifact catalog
        self.catalog_dirty = self.artifact_index.is_some();
        self.sync_catalog();

        Ok(CompactionSummary {
            generation: new_gen,
            records_compacted,
            chunks_kept,
            chunks_written: new_refs,
            logs_compacted: logs.len(),
            obsolete_files,
        })
    }

    fn stream_compaction(
        &self,
        sink: &mut ChunkSink,
        rewritten: &[ChunkRef],
        overwrites: &HashMap<u64, &[u8]>,
        appends: &[&Record],
    ) -> Result<()> {
        for chunk in rewritten {
            let mut reader = ChunkReader::open_finalized(&self.chunk_path(chunk))?;
            for record in reader.iter()? {
                let record = record?;
                let payload = overwrites
                    .get(&record.id)
                    .copied()
                    .unwrap_or(record.payload.as_slice());
                sink.push(record.id, payload)?;
            }
        }

        for record in appends {
            sink.push(record.id, &record.payload)?;
        }

        Ok(())
    }

    fn ensure_id_index(&mut self) -> Result<()> {
        if self.id_index.is_some() {
            return Ok(());
        }

        let mut index = HashMap::new();
        for chunk in &self.generation.chunks {
            let mut reader = ChunkReader::open_finalized(&self.chunk_path(chunk))?;
            for (i, record) in reader.iter()?.enumerate() {
                index.insert(record?.id, chunk.start_sequence + i as u64);
            }
        }

        self.id_index = Some(index);
        Ok(())
    }

    fn chunk_artifact(&self, chunk: &ChunkRef) -> ArtifactRef {
        let filename = chunk_file_name(&self.config.table_name, &chunk.replica_id, &chunk.chunk_id);

        ArtifactRef::new(format!(
            "{}.{}.{}",
            self.config.table_name, chunk.replica_id, chunk.chunk_id
        ))
        .with_attribute("table", self.config.table_name.clone())
        .with_attribute("replica", chunk.replica_id.clone())
        .with_attribute("chunk_id", chunk.chunk_id.clone())
        .with_attribute("start_sequence", chunk.start_sequence.to_string())
        .with_attribute("num_records", chunk.num_records.to_string())
        .with_file(filename, chunk.checksum, chunk.size)
    }

    /// Retry the catalog mirror if it is behind; failures are logged and
    /// leave the flag set
    fn sync_catalog(&mut self) {
        if !self.catalog_dirty {
            return;
        }

        match self.sync_artifact_index() {
            Ok(()) => self.catalog_dirty = false,
            Err(e) => tracing::warn!(
                "artifact index of {}.{} is stale at generation {}: {}",
                self.config.table_name,
                self.config.replica_id,
                self.generation.generation,
                e
            ),
        }
    }

    /// Make the catalog list exactly the current chunks of this partition
    fn sync_artifact_index(&self) -> Result<()> {
        let Some(index) = &self.artifact_index else {
            return Ok(());
        };

        let prefix = format!("{}.{}.", self.config.table_name, self.config.replica_id);
        let desired: Vec<ArtifactRef> = self
            .generation
            .chunks
            .iter()
            .map(|c| self.chunk_artifact(c))
            .collect();

        let wanted: BTreeSet<&str> = desired.iter().map(|a| a.name.as_str()).collect();
        let listed: BTreeSet<String> = index
            .snapshot()?
            .artifacts
            .iter()
            .filter(|a| a.name.starts_with(&prefix))
            .map(|a| a.name.clone())
            .collect();
        if listed.iter().map(String::as_str).eq(wanted.iter().copied()) {
            return Ok(());
        }

        let (added, removed) = index.update(|snapshot| {
            let names: HashSet<&str> = desired.iter().map(|a| a.name.as_str()).collect();

            let before = snapshot.artifacts.len();
            snapshot
                .artifacts
                .retain(|a| !a.name.starts_with(&prefix) || names.contains(a.name.as_str()));
            let removed = before - snapshot.artifacts.len();

            let mut added = 0;
            for artifact in &desired {
                if snapshot.find(&artifact.name).is_none() {
                    snapshot.artifacts.push(artifact.clone());
                    added += 1;
                }
            }

            Ok((added, removed))
        })?;

        tracing::debug!(
            "artifact index {}: {} added, {} removed",
            index.index_name(),
            added,
            removed
        );
        Ok(())
    }

    /// Delete files reported obsolete by compaction, returning how many
    /// were removed
    pub fn remove_files(&self, files: &[PathBuf]) -> Result<usize> {
        let mut removed = 0;
        for path in files {
            if fsutil::remove_if_exists(path)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    // -------------------------------------------------------------------------
    // Read Path
    // -------------------------------------------------------------------------

    /// Ids of all records stored in chunks
    pub fn list_records(&self) -> Result<BTreeSet<u64>> {
        if let Some(index) = &self.id_index {
            return Ok(index.keys().copied().collect());
        }

        let mut ids = BTreeSet::new();
        for chunk in &self.generation.chunks {
            let mut reader = ChunkReader::open_finalized(&self.chunk_path(chunk))?;
            for record in reader.iter()? {
                ids.insert(record?.id);
            }
        }
        Ok(ids)
    }

    /// Visit up to `limit` chunk records starting at sequence `offset`,
    /// continuing across chunk boundaries. Returns the number delivered.
    pub fn fetch_records<F>(&self, offset: u64, limit: Option<usize>, mut visit: F) -> Result<usize>
    where
        F: FnMut(&Record),
    {
        let chunks = &self.generation.chunks;
        let mut idx = chunks.partition_point(|c| c.end_sequence() <= offset);
        let mut next = offset;
        let mut delivered = 0;

        while idx < chunks.len() && limit.map_or(true, |l| delivered < l) {
            let chunk = &chunks[idx];
            let skip = next.saturating_sub(chunk.start_sequence) as usize;
            let mut reader = ChunkReader::open_finalized(&self.chunk_path(chunk))?;

            for record in reader.iter()?.skip(skip) {
                if limit.map_or(false, |l| delivered >= l) {
                    break;
                }
                visit(&record?);
                delivered += 1;
            }

            next = chunk.end_sequence();
            idx += 1;
        }

        Ok(delivered)
    }

    // -------------------------------------------------------------------------
    // State
    // -------------------------------------------------------------------------

    pub fn get_state(&self) -> RecordSetState {
        let file_name = |path: &Path| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };

        let (commitlog, commitlog_bytes) = match &self.active_log {
            Some((_, writer)) if !self.pending.is_empty() => {
                (Some(file_name(writer.path())), writer.size())
            }
            _ => (None, 0),
        };

        RecordSetState {
            commitlog,
            commitlog_bytes,
            old_commitlogs: self.old_logs.iter().map(|l| file_name(&l.path)).collect(),
            datafiles: self.generation.chunks.clone(),
            generation: self.generation.generation,
            last_log_seq: self.generation.last_log_seq,
            next_log_seq: self.next_log_seq,
        }
    }
}

// =============================================================================
// Chunk Sink
// =============================================================================

/// Splits a record stream into chunks of at most `max_body_size` body bytes
struct ChunkSink {
    dir: PathBuf,
    table: String,
    replica: String,
    generation: u64,
    max_body_size: u64,
    next_sequence: u64,
    current: Option<ChunkWriter>,
    finished: Vec<ChunkMeta>,
}

impl ChunkSink {
    fn push(&mut self, id: u64, payload: &[u8]) -> Result<()> {
        if self
            .current
            .as_ref()
            .map_or(false, |w| w.would_overflow(payload.len(), self.max_body_size))
        {
            self.seal()?;
        }

        if self.current.is_none() {
            let chunk_id = format!("{}-{}", self.generation, self.finished.len());
            let path = self
                .dir
                .join(chunk_file_name(&self.table, &self.replica, &chunk_id));
            self.current = Some(ChunkWriter::create(
                &path,
                &self.replica,
                &chunk_id,
                self.next_sequence,
            )?);
        }

        if let Some(writer) = self.current.as_mut() {
            writer.add(id, payload)?;
            self.next_sequence += 1;
        }
        Ok(())
    }

    fn seal(&mut self) -> Result<()> {
        let Some(writer) = self.current.take() else {
            return Ok(());
        };

        let path = writer.path().to_path_buf();
        match writer.finish() {
            Ok(meta) => {
                self.finished.push(meta);
                Ok(())
            }
            Err(e) => {
                let _ = fsutil::remove_if_exists(&path);
                Err(e)
            }
        }
    }

    fn finish(&mut self) -> Result<Vec<ChunkMeta>> {
        self.seal()?;
        Ok(std::mem::take(&mut self.finished))
    }

    /// Remove every file this sink created
    fn abort(&mut self) {
        if let Some(writer) = self.current.take() {
            if let Err(e) = writer.abort() {
                tracing::warn!("failed to remove partial chunk: {}", e);
            }
        }
        for meta in self.finished.drain(..) {
            let _ = fsutil::remove_if_exists(&meta.path);
        }
    }
}
