//! Tests for chunk files
//!
//! These tests verify:
//! - Building and reading chunks
//! - Header finalization and the userdata tag
//! - Legacy (version 1) headers
//! - Unfinished and corrupt chunks are rejected
//! - Body trailer verification

use std::path::{Path, PathBuf};

use logtable::checksum::{file_checksum, fnv32};
use logtable::chunk::{
    encoded_record_len, ChunkReader, ChunkTag, ChunkWriter, FileHeader, FLAG_FINALIZED,
    VERSION_LEGACY,
};
use logtable::codec::put_varuint;
use logtable::LogTableError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("t.r.1-0.sst");
    (temp_dir, path)
}

fn build_chunk(path: &Path, count: u64) {
    let mut writer = ChunkWriter::create(path, "r", "1-0", 100).unwrap();
    for i in 0..count {
        writer.add(i, format!("record-{}", i).as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

fn legacy_tag() -> ChunkTag {
    ChunkTag {
        replica_id: "old".to_string(),
        chunk_id: "7".to_string(),
        start_sequence: 0,
        num_records: 1,
    }
}

fn write_legacy_chunk(path: &Path, body: &[u8]) {
    let userdata = legacy_tag().encode();
    let header = FileHeader {
        version: VERSION_LEGACY,
        flags: 0,
        body_size: body.len() as u64,
        userdata_checksum: fnv32(&userdata),
        userdata,
    };

    let mut bytes = header.encode();
    bytes.extend_from_slice(body);
    std::fs::write(path, bytes).unwrap();
}

// =============================================================================
// Build / Read Tests
// =============================================================================

#[test]
fn test_build_and_iterate() {
    let (_temp, path) = setup();
    build_chunk(&path, 50);

    let mut reader = ChunkReader::open_finalized(&path).unwrap();
    let records: Vec<_> = reader.iter().unwrap().map(|r| r.unwrap()).collect();

    assert_eq!(records.len(), 50);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.id, i as u64);
        assert_eq!(record.payload, format!("record-{}", i).into_bytes());
    }
}

#[test]
fn test_finish_returns_meta() {
    let (_temp, path) = setup();

    let mut writer = ChunkWriter::create(&path, "r", "1-0", 100).unwrap();
    writer.add(1, &[0u8; 10]).unwrap();
    writer.add(2, &[0u8; 10]).unwrap();
    let meta = writer.finish().unwrap();

    assert_eq!(meta.num_records(), 2);
    assert_eq!(meta.body_size, 2 * encoded_record_len(10));
    assert_eq!(meta.file_size, std::fs::metadata(&path).unwrap().len());
    assert_eq!(meta.checksum, file_checksum(&path).unwrap());
    assert_eq!(meta.tag.start_sequence, 100);
}

#[test]
fn test_tag_in_header() {
    let (_temp, path) = setup();
    build_chunk(&path, 3);

    let reader = ChunkReader::open(&path).unwrap();
    let tag = reader.tag().unwrap();

    assert!(reader.verify());
    assert!(reader.is_finalized());
    assert_eq!(tag.replica_id, "r");
    assert_eq!(tag.chunk_id, "1-0");
    assert_eq!(tag.start_sequence, 100);
    assert_eq!(tag.num_records, 3);
}

#[test]
fn test_iterate_twice() {
    let (_temp, path) = setup();
    build_chunk(&path, 5);

    let mut reader = ChunkReader::open_finalized(&path).unwrap();
    assert_eq!(reader.iter().unwrap().count(), 5);
    assert_eq!(reader.iter().unwrap().count(), 5);
}

#[test]
fn test_would_overflow() {
    let (_temp, path) = setup();
    let per_record = encoded_record_len(10);

    let mut writer = ChunkWriter::create(&path, "r", "1-0", 0).unwrap();
    // an empty chunk always accepts one record
    assert!(!writer.would_overflow(10, 1));

    writer.add(1, &[0u8; 10]).unwrap();
    writer.add(2, &[0u8; 10]).unwrap();
    assert!(!writer.would_overflow(10, 3 * per_record));

    writer.add(3, &[0u8; 10]).unwrap();
    assert!(writer.would_overflow(10, 3 * per_record));
    writer.abort().unwrap();
    assert!(!path.exists());
}

// =============================================================================
// Trailer Tests
// =============================================================================

#[test]
fn test_verify_body() {
    let (_temp, path) = setup();
    build_chunk(&path, 20);

    let mut reader = ChunkReader::open(&path).unwrap();
    assert!(reader.verify_body().unwrap());
}

#[test]
fn test_verify_body_detects_flipped_byte() {
    let (_temp, path) = setup();
    build_chunk(&path, 20);

    let mut bytes = std::fs::read(&path).unwrap();
    let reader = ChunkReader::open(&path).unwrap();
    let body_start = reader.header().header_size() as usize;
    drop(reader);
    bytes[body_start + 12] ^= 0x01;
    std::fs::write(&path, &bytes).unwrap();

    let mut reader = ChunkReader::open(&path).unwrap();
    assert!(reader.verify());
    assert!(!reader.verify_body().unwrap());
}

// =============================================================================
// Legacy Header Tests
// =============================================================================

#[test]
fn test_legacy_header_with_body_is_finalized() {
    let (_temp, path) = setup();

    let mut body = Vec::new();
    body.extend_from_slice(&77u64.to_le_bytes());
    body.push(3);
    body.extend_from_slice(b"abc");
    write_legacy_chunk(&path, &body);

    let mut reader = ChunkReader::open_finalized(&path).unwrap();
    assert_eq!(reader.header().version, VERSION_LEGACY);
    assert!(reader.header().has_flag(FLAG_FINALIZED));
    assert_eq!(reader.tag().unwrap(), legacy_tag());
    // legacy chunks carry no trailer
    assert!(reader.verify_body().unwrap());

    let records: Vec<_> = reader.iter().unwrap().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, 77);
    assert_eq!(records[0].payload, b"abc".to_vec());
}

#[test]
fn test_legacy_header_without_body_is_unfinished() {
    let (_temp, path) = setup();
    write_legacy_chunk(&path, &[]);

    let result = ChunkReader::open_finalized(&path);
    assert!(matches!(result, Err(LogTableError::UnfinishedChunk(_))));
}

// =============================================================================
// Rejection Tests
// =============================================================================

#[test]
fn test_unfinished_chunk_rejected() {
    let (_temp, path) = setup();

    {
        let mut writer = ChunkWriter::create(&path, "r", "1-0", 0).unwrap();
        writer.add(1, b"never finished").unwrap();
        // dropped without finish()
    }

    let reader = ChunkReader::open(&path).unwrap();
    assert!(!reader.is_finalized());

    let result = ChunkReader::open_finalized(&path);
    assert!(matches!(result, Err(LogTableError::UnfinishedChunk(_))));
}

#[test]
fn test_tampered_userdata_rejected() {
    let (_temp, path) = setup();
    build_chunk(&path, 2);

    // first userdata byte sits right after the v2 fixed header
    let mut bytes = std::fs::read(&path).unwrap();
    let offset = FileHeader::fixed_size(2) as usize + 1;
    bytes[offset] ^= 0x20;
    std::fs::write(&path, &bytes).unwrap();

    let reader = ChunkReader::open(&path).unwrap();
    assert!(!reader.verify());

    let result = ChunkReader::open_finalized(&path);
    assert!(matches!(result, Err(LogTableError::CorruptFormat(_))));
}

#[test]
fn test_bad_magic_rejected() {
    let (_temp, path) = setup();
    std::fs::write(&path, b"definitely not a chunk file at all").unwrap();

    let result = ChunkReader::open(&path);
    assert!(matches!(result, Err(LogTableError::CorruptFormat(_))));
}

#[test]
fn test_truncated_header_rejected() {
    let (_temp, path) = setup();
    build_chunk(&path, 2);

    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..10]).unwrap();

    let result = ChunkReader::open(&path);
    assert!(matches!(result, Err(LogTableError::CorruptFormat(_))));
}

#[test]
fn test_body_size_beyond_file_rejected() {
    let (_temp, path) = setup();

    let header = FileHeader::new(FLAG_FINALIZED, u64::MAX, legacy_tag().encode());
    let mut bytes = header.encode();
    bytes.extend_from_slice(&9u64.to_le_bytes());
    put_varuint(&mut bytes, 1 << 50);
    std::fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        ChunkReader::open(&path),
        Err(LogTableError::CorruptFormat(_))
    ));
    assert!(matches!(
        ChunkReader::open_finalized(&path),
        Err(LogTableError::CorruptFormat(_))
    ));
}

#[test]
fn test_missing_trailer_rejected() {
    let (_temp, path) = setup();
    build_chunk(&path, 3);

    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();

    let result = ChunkReader::open(&path);
    assert!(matches!(result, Err(LogTableError::CorruptFormat(_))));
}
