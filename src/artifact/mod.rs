//! Artifact Module
//!
//! A per-partition catalog of the files that make up the table. Each artifact
//! names one or more on-disk files with their sizes and checksums, and a
//! status telling whether the files are expected to be present.
//!
//! The whole catalog is one binary file `<db>/<name>.afx`, replaced
//! atomically on every mutation (see [`ArtifactIndex`]).

mod index;
mod snapshot;

use std::fmt;

use crate::error::{LogTableError, Result};

pub use index::{ArtifactIndex, ConsistencyReport};
pub use snapshot::{ArtifactIndexSnapshot, FORMAT_VERSION};

/// Extension of artifact index files
pub const INDEX_EXT: &str = "afx";

/// Lifecycle state of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactStatus {
    /// Files are expected on disk
    Present = 0,
    /// Files were found missing and the artifact was marked as such
    Missing = 1,
}

impl ArtifactStatus {
    pub fn from_u64(value: u64) -> Result<Self> {
        match value {
            0 => Ok(Self::Present),
            1 => Ok(Self::Missing),
            other => Err(LogTableError::CorruptFormat(format!(
                "unknown artifact status {}",
                other
            ))),
        }
    }

    pub fn as_u64(self) -> u64 {
        self as u64
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => write!(f, "PRESENT"),
            Self::Missing => write!(f, "MISSING"),
        }
    }
}

/// One file belonging to an artifact, relative to the index base path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFileRef {
    pub filename: String,
    pub checksum: u64,
    pub size: u64,
}

/// Catalog entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub name: String,
    pub status: ArtifactStatus,
    /// Ordered key/value metadata
    pub attributes: Vec<(String, String)>,
    pub files: Vec<ArtifactFileRef>,
}

impl ArtifactRef {
    /// A present artifact without attributes or files
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ArtifactStatus::Present,
            attributes: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_file(mut self, filename: impl Into<String>, checksum: u64, size: u64) -> Self {
        self.files.push(ArtifactFileRef {
            filename: filename.into(),
            checksum,
            size,
        });
        self
    }

    /// First value stored under `key`
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Sum of all file sizes
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}
