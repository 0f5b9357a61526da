//! Advisory file lock
//!
//! Serializes metadata writers across processes. The lock is held on a
//! companion `.lck` file and released when the guard is dropped.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::utils::Backoff;
use fs2::FileExt;

use crate::error::{LogTableError, Result};

/// Longest sleep between two lock attempts once backoff is exhausted
const MAX_RETRY_SLEEP: Duration = Duration::from_millis(5);

/// Exclusive advisory lock on a file, released on drop
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire the lock, creating the lock file if needed.
    ///
    /// `timeout = None` blocks until the lock is granted; otherwise fails with
    /// `LockTimeout` once the deadline passes.
    pub fn acquire(path: impl AsRef<Path>, timeout: Option<Duration>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;

        match timeout {
            None => file.lock_exclusive()?,
            Some(timeout) => Self::lock_with_deadline(&file, &path, timeout)?,
        }

        Ok(Self { file, path })
    }

    /// Try once without waiting
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file, path })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn lock_with_deadline(file: &File, path: &Path, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        let backoff = Backoff::new();

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {}
                Err(e) => return Err(e.into()),
            }

            let waited = started.elapsed();
            if waited >= timeout {
                return Err(LogTableError::LockTimeout {
                    path: path.to_path_buf(),
                    waited_ms: waited.as_millis() as u64,
                });
            }

            if backoff.is_completed() {
                thread::sleep(MAX_RETRY_SLEEP.min(timeout - waited));
            } else {
                backoff.snooze();
            }
        }
    }

    /// Get the path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!("failed to release lock {}: {}", self.path.display(), e);
        }
    }
}
