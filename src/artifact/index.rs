//! Artifact Index
//!
//! Readers decode the index file through a cache keyed by the file's
//! modification time and length. Writers run a transaction: in-process
//! mutex, then the `<index>.afx.lck` file lock, then read, mutate, write
//! `<index>.afx~` and rename it over the index.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;

use crate::checksum::file_checksum;
use crate::error::{LogTableError, Result};
use crate::flock::FileLock;
use crate::fsutil;

use super::{ArtifactIndexSnapshot, ArtifactRef, ArtifactStatus, INDEX_EXT};

// =============================================================================
// Snapshot Cache
// =============================================================================

/// Last decoded snapshot, valid while the file's (mtime, len) is unchanged
#[derive(Default)]
struct SnapshotCache {
    entry: Mutex<Option<CacheEntry>>,
}

struct CacheEntry {
    mtime: SystemTime,
    len: u64,
    snapshot: Arc<ArtifactIndexSnapshot>,
}

impl SnapshotCache {
    fn get(&self, mtime: SystemTime, len: u64) -> Option<Arc<ArtifactIndexSnapshot>> {
        self.entry
            .lock()
            .as_ref()
            .filter(|e| e.mtime == mtime && e.len == len)
            .map(|e| Arc::clone(&e.snapshot))
    }

    /// Replace the entry unless it already describes a newer file
    fn offer(&self, mtime: SystemTime, len: u64, snapshot: Arc<ArtifactIndexSnapshot>) {
        let mut entry = self.entry.lock();
        if entry.as_ref().map_or(true, |e| mtime >= e.mtime) {
            *entry = Some(CacheEntry {
                mtime,
                len,
                snapshot,
            });
        }
    }

    fn clear(&self) {
        *self.entry.lock() = None;
    }
}

// =============================================================================
// Consistency Report
// =============================================================================

/// Outcome of `run_consistency_check`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Files whose existence (and size) was checked
    pub files_checked: usize,
    /// (artifact, filename) pairs missing on disk
    pub missing: Vec<(String, String)>,
    /// (artifact, filename, index size, disk size)
    pub size_mismatches: Vec<(String, String, u64, u64)>,
    /// (artifact, filename) pairs whose checksum differs
    pub checksum_mismatches: Vec<(String, String)>,
    /// Artifacts marked MISSING by this run
    pub repaired: Vec<String>,
}

impl ConsistencyReport {
    /// Number of discrepancies that were not repaired
    pub fn failures(&self) -> usize {
        let unrepaired_missing = self
            .missing
            .iter()
            .filter(|(artifact, _)| !self.repaired.contains(artifact))
            .count();
        unrepaired_missing + self.size_mismatches.len() + self.checksum_mismatches.len()
    }

    pub fn is_ok(&self) -> bool {
        self.failures() == 0
    }
}

// =============================================================================
// Artifact Index
// =============================================================================

/// Crash-safe catalog of artifacts for one partition
pub struct ArtifactIndex {
    db_path: PathBuf,
    index_name: String,
    readonly: bool,
    index_file: PathBuf,
    lock_file: PathBuf,
    /// Serializes writers inside this process
    write_mutex: Mutex<()>,
    cache: SnapshotCache,
    /// Set once the index file has been seen
    exists: AtomicBool,
    lock_timeout: Option<Duration>,
}

impl ArtifactIndex {
    pub fn new(db_path: impl AsRef<Path>, index_name: &str, readonly: bool) -> Self {
        let db_path = db_path.as_ref().to_path_buf();
        let index_file = db_path.join(format!("{}.{}", index_name, INDEX_EXT));
        let lock_file = db_path.join(format!("{}.{}.lck", index_name, INDEX_EXT));

        Self {
            db_path,
            index_name: index_name.to_string(),
            readonly,
            index_file,
            lock_file,
            write_mutex: Mutex::new(()),
            cache: SnapshotCache::default(),
            exists: AtomicBool::new(false),
            lock_timeout: None,
        }
    }

    /// Bound the wait for the cross-process lock
    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.db_path
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn index_file(&self) -> &Path {
        &self.index_file
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Current snapshot; an absent index file reads as empty
    pub fn snapshot(&self) -> Result<Arc<ArtifactIndexSnapshot>> {
        if !self.exists.load(Ordering::Acquire) && !self.index_file.exists() {
            return Ok(Arc::new(ArtifactIndexSnapshot::default()));
        }
        self.exists.store(true, Ordering::Release);

        let Some((mtime, len)) = fsutil::stat(&self.index_file)? else {
            self.cache.clear();
            return Ok(Arc::new(ArtifactIndexSnapshot::default()));
        };

        if let Some(snapshot) = self.cache.get(mtime, len) {
            return Ok(snapshot);
        }

        let data = std::fs::read(&self.index_file)?;
        let snapshot = Arc::new(ArtifactIndexSnapshot::decode(&data).map_err(|e| match e {
            LogTableError::CorruptFormat(msg) => LogTableError::CorruptFormat(format!(
                "{}: {}",
                self.index_file.display(),
                msg
            )),
            other => other,
        })?);

        self.cache.offer(mtime, len, Arc::clone(&snapshot));
        Ok(snapshot)
    }

    pub fn list_artifacts(&self) -> Result<Vec<ArtifactRef>> {
        Ok(self.snapshot()?.artifacts.clone())
    }

    pub fn get_artifact(&self, name: &str) -> Result<ArtifactRef> {
        self.snapshot()?
            .find(name)
            .cloned()
            .ok_or_else(|| LogTableError::NotFound(format!("artifact '{}'", name)))
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    /// Run `f` against the latest snapshot and persist the result.
    ///
    /// Nothing is written if `f` fails. Both locks are released on every
    /// exit path.
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut ArtifactIndexSnapshot) -> Result<T>,
    {
        if self.readonly {
            return Err(LogTableError::ReadOnly(self.index_file.display().to_string()));
        }

        let _guard = self.write_mutex.lock();
        let _file_lock = FileLock::acquire(&self.lock_file, self.lock_timeout)?;

        let mut snapshot = (*self.snapshot()?).clone();
        let result = f(&mut snapshot)?;
        self.write_index(snapshot)?;

        Ok(result)
    }

    pub fn add_artifact(&self, artifact: ArtifactRef) -> Result<()> {
        tracing::debug!("adding artifact: {}", artifact.name);

        self.update(|index| {
            if index.find(&artifact.name).is_some() {
                return Err(LogTableError::DuplicateName(format!(
                    "artifact '{}' already exists in index",
                    artifact.name
                )));
            }
            index.artifacts.push(artifact);
            Ok(())
        })
    }

    pub fn update_status(&self, name: &str, status: ArtifactStatus) -> Result<()> {
        tracing::debug!("artifact {}: status -> {}", name, status);

        self.update(|index| match index.find_mut(name) {
            Some(artifact) => {
                artifact.status = status;
                Ok(())
            }
            None => Err(LogTableError::NotFound(format!("artifact '{}'", name))),
        })
    }

    pub fn delete_artifact(&self, name: &str) -> Result<()> {
        tracing::debug!("deleting artifact: {}", name);

        self.update(|index| {
            let before = index.artifacts.len();
            index.artifacts.retain(|a| a.name != name);
            if index.artifacts.len() == before {
                return Err(LogTableError::NotFound(format!("artifact '{}'", name)));
            }
            Ok(())
        })
    }

    fn write_index(&self, snapshot: ArtifactIndexSnapshot) -> Result<()> {
        fsutil::atomic_write(&self.index_file, &snapshot.encode())?;
        self.exists.store(true, Ordering::Release);

        if let Some((mtime, len)) = fsutil::stat(&self.index_file)? {
            self.cache.offer(mtime, len, Arc::new(snapshot));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Consistency Check
    // -------------------------------------------------------------------------

    /// Verify that every file of every PRESENT artifact exists with the
    /// recorded size (and checksum, if asked).
    ///
    /// Every discrepancy is logged before the call fails. With `repair`,
    /// artifacts with missing files are marked MISSING instead of failing;
    /// size and checksum mismatches always fail.
    pub fn run_consistency_check(
        &self,
        check_checksums: bool,
        repair: bool,
    ) -> Result<ConsistencyReport> {
        let mut report = ConsistencyReport::default();
        let snapshot = self.snapshot()?;

        for artifact in &snapshot.artifacts {
            if artifact.status != ArtifactStatus::Present {
                continue;
            }

            for file in &artifact.files {
                if file.size == 0 {
                    continue;
                }

                report.files_checked += 1;
                let path = self.db_path.join(&file.filename);

                let Some((_, disk_size)) = fsutil::stat(&path)? else {
                    tracing::error!(
                        "consistency error: file '{}' from artifact '{}' is marked as PRESENT in index but is missing on disk",
                        file.filename,
                        artifact.name
                    );
                    report
                        .missing
                        .push((artifact.name.clone(), file.filename.clone()));

                    if repair && !report.repaired.contains(&artifact.name) {
                        tracing::error!(
                            "repairing consistency error in artifact '{}' by marking it MISSING",
                            artifact.name
                        );
                        self.update_status(&artifact.name, ArtifactStatus::Missing)?;
                        report.repaired.push(artifact.name.clone());
                    }
                    continue;
                };

                if disk_size != file.size {
                    tracing::error!(
                        "consistency error: file '{}' from artifact '{}' has the wrong size; index={} disk={}",
                        file.filename,
                        artifact.name,
                        file.size,
                        disk_size
                    );
                    report.size_mismatches.push((
                        artifact.name.clone(),
                        file.filename.clone(),
                        file.size,
                        disk_size,
                    ));
                    continue;
                }

                if !check_checksums {
                    continue;
                }

                tracing::info!("fsck: checking file: {}", file.filename);
                if file_checksum(&path)? != file.checksum {
                    tracing::error!(
                        "consistency error: checksum mismatch for file '{}' from artifact '{}'",
                        file.filename,
                        artifact.name
                    );
                    report
                        .checksum_mismatches
                        .push((artifact.name.clone(), file.filename.clone()));
                }
            }
        }

        if !report.is_ok() {
            return Err(LogTableError::Consistency(format!(
                "{} unrepaired discrepancies in {}",
                report.failures(),
                self.index_file.display()
            )));
        }

        Ok(report)
    }
}
