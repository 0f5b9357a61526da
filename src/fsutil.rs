//! Filesystem helpers
//!
//! The only way metadata files change on disk: write `<path>~`, fsync,
//! rename over `<path>`.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::Result;

/// Temporary sibling used while replacing `path`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push("~");
    PathBuf::from(name)
}

/// Write `data` to the temporary sibling of `path` and fsync it.
///
/// The temp file is removed again if writing fails.
pub fn write_temp(path: &Path, data: &[u8]) -> Result<PathBuf> {
    let tmp = temp_path(path);

    let result = (|| -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    Ok(tmp)
}

/// Atomically replace `path` with `data`
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = write_temp(path, data)?;

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }

    sync_parent_dir(path);
    Ok(())
}

/// fsync the directory holding `path` so a rename is durable.
/// Not supported everywhere, so failures are only logged.
pub fn sync_parent_dir(path: &Path) {
    let Some(dir) = path.parent() else {
        return;
    };

    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };

    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        tracing::trace!("directory fsync of {} skipped: {}", dir.display(), e);
    }
}

/// Modification time and length of a file, or None if it does not exist
pub fn stat(path: &Path) -> Result<Option<(SystemTime, u64)>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some((meta.modified()?, meta.len()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Remove a file, treating "already gone" as success
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
