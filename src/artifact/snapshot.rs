//! Artifact index snapshot
//!
//! ```text
//! byte     version            (0x01)
//! varuint  artifact_count
//! repeated {
//!   varuint  name_len; bytes name
//!   varuint  status
//!   varuint  attribute_count
//!   repeated { varuint key_len; bytes key; varuint val_len; bytes val }
//!   varuint  file_count
//!   repeated { varuint filename_len; bytes filename; u64 checksum; varuint size }
//! }
//! ```

use bytes::BufMut;

use crate::codec;
use crate::error::{LogTableError, Result};

use super::{ArtifactFileRef, ArtifactRef, ArtifactStatus};

/// Current index format version
pub const FORMAT_VERSION: u8 = 0x01;

/// Full in-memory materialization of an index file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactIndexSnapshot {
    pub artifacts: Vec<ArtifactRef>,
}

impl ArtifactIndexSnapshot {
    pub fn find(&self, name: &str) -> Option<&ArtifactRef> {
        self.artifacts.iter().find(|a| a.name == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut ArtifactRef> {
        self.artifacts.iter_mut().find(|a| a.name == name)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.put_u8(FORMAT_VERSION);
        codec::put_varuint(&mut buf, self.artifacts.len() as u64);

        for a in &self.artifacts {
            codec::put_string(&mut buf, &a.name);
            codec::put_varuint(&mut buf, a.status.as_u64());

            codec::put_varuint(&mut buf, a.attributes.len() as u64);
            for (key, value) in &a.attributes {
                codec::put_string(&mut buf, key);
                codec::put_string(&mut buf, value);
            }

            codec::put_varuint(&mut buf, a.files.len() as u64);
            for f in &a.files {
                codec::put_string(&mut buf, &f.filename);
                buf.put_u64_le(f.checksum);
                codec::put_varuint(&mut buf, f.size);
            }
        }

        buf
    }

    pub fn decode(mut data: &[u8]) -> Result<Self> {
        let buf = &mut data;

        let version = codec::get_u8(buf)?;
        if version != FORMAT_VERSION {
            return Err(LogTableError::CorruptFormat(format!(
                "unsupported artifact index version {}",
                version
            )));
        }

        let num_artifacts = codec::get_varuint(buf)?;
        let mut artifacts = Vec::new();

        for _ in 0..num_artifacts {
            let name = codec::get_string(buf)?;
            let status = ArtifactStatus::from_u64(codec::get_varuint(buf)?)?;

            let num_attrs = codec::get_varuint(buf)?;
            let mut attributes = Vec::new();
            for _ in 0..num_attrs {
                let key = codec::get_string(buf)?;
                let value = codec::get_string(buf)?;
                attributes.push((key, value));
            }

            let num_files = codec::get_varuint(buf)?;
            let mut files = Vec::new();
            for _ in 0..num_files {
                files.push(ArtifactFileRef {
                    filename: codec::get_string(buf)?,
                    checksum: codec::get_u64_le(buf)?,
                    size: codec::get_varuint(buf)?,
                });
            }

            artifacts.push(ArtifactRef {
                name,
                status,
                attributes,
                files,
            });
        }

        Ok(Self { artifacts })
    }
}
