//! FNV-1a hashing
//!
//! 32-bit FNV-1a protects chunk header userdata; 64-bit FNV-1a is the
//! whole-file checksum recorded in the artifact index.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::Result;

const FNV32_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;

const FNV64_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV64_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a 32-bit hash of a byte slice
pub fn fnv32(data: &[u8]) -> u32 {
    let mut h = FNV32_OFFSET_BASIS;
    for &b in data {
        h ^= b as u32;
        h = h.wrapping_mul(FNV32_PRIME);
    }
    h
}

/// Incremental FNV-1a 64-bit hasher
#[derive(Debug, Clone, Copy)]
pub struct Fnv64 {
    state: u64,
}

impl Fnv64 {
    pub fn new() -> Self {
        Self {
            state: FNV64_OFFSET_BASIS,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        for &b in data {
            self.state ^= b as u64;
            self.state = self.state.wrapping_mul(FNV64_PRIME);
        }
    }

    pub fn finish(&self) -> u64 {
        self.state
    }
}

impl Default for Fnv64 {
    fn default() -> Self {
        Self::new()
    }
}

/// FNV-1a 64-bit hash of a byte slice
pub fn fnv64(data: &[u8]) -> u64 {
    let mut hasher = Fnv64::new();
    hasher.update(data);
    hasher.finish()
}

/// Stream a file through FNV-1a 64
pub fn file_checksum(path: &Path) -> Result<u64> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Fnv64::new();
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finish())
}
