//! Tests for WAL Writer
//!
//! These tests verify:
//! - Writing entries to a commit log
//! - LSN generation and sequencing
//! - Sync strategies (EveryWrite, EveryNEntries)
//! - Reopening continues after the last LSN
//! - Integration with reader

use std::path::PathBuf;

use logtable::config::WalSyncStrategy;
use logtable::wal::{WalReader, WalWriter};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("t.r.1.log");
    (temp_dir, wal_path)
}

// =============================================================================
// Basic Writing Tests
// =============================================================================

#[test]
fn test_write_single_entry() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    let lsn = writer.append(1, b"value1").unwrap();

    assert_eq!(lsn, 1);
    assert_eq!(writer.current_lsn(), 2);
    assert!(writer.size() > 0);
}

#[test]
fn test_lsn_sequential() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();

    let lsns: Vec<u64> = (0..100)
        .map(|i| writer.append(i, format!("val{}", i).as_bytes()).unwrap())
        .collect();

    for (i, lsn) in lsns.iter().enumerate() {
        assert_eq!(*lsn, (i + 1) as u64);
    }
}

#[test]
fn test_size_matches_file_length() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    writer.append(1, b"aaa").unwrap();
    writer.append(2, b"bbbbbb").unwrap();

    assert_eq!(writer.size(), std::fs::metadata(&wal_path).unwrap().len());
}

// =============================================================================
// Sync Strategy Tests
// =============================================================================

#[test]
fn test_every_write_leaves_nothing_uncommitted() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    writer.append(1, b"a").unwrap();

    assert_eq!(writer.uncommitted_count(), 0);
}

#[test]
fn test_every_n_entries_batches_syncs() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer =
        WalWriter::open(&wal_path, WalSyncStrategy::EveryNEntries { count: 3 }).unwrap();

    writer.append(1, b"a").unwrap();
    writer.append(2, b"b").unwrap();
    assert_eq!(writer.uncommitted_count(), 2);

    writer.append(3, b"c").unwrap();
    assert_eq!(writer.uncommitted_count(), 0);

    writer.append(4, b"d").unwrap();
    writer.sync().unwrap();
    assert_eq!(writer.uncommitted_count(), 0);
}

// =============================================================================
// Reopen Tests
// =============================================================================

#[test]
fn test_reopen_continues_lsn() {
    let (_temp, wal_path) = setup_temp_wal();

    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer.append(1, b"a").unwrap();
        writer.append(2, b"b").unwrap();
    }

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    assert_eq!(writer.current_lsn(), 3);
    assert_eq!(writer.append(3, b"c").unwrap(), 3);

    let ids: Vec<u64> = WalReader::open(&wal_path)
        .unwrap()
        .entries()
        .map(|e| e.unwrap().record_id)
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn test_reopen_after_torn_tail_overwrites_garbage() {
    let (_temp, wal_path) = setup_temp_wal();

    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer.append(1, b"a").unwrap();
    }

    // half-written frame header
    let mut bytes = std::fs::read(&wal_path).unwrap();
    bytes.extend_from_slice(&[0x02, 0, 0, 0, 0, 0]);
    std::fs::write(&wal_path, &bytes).unwrap();

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    writer.append(2, b"b").unwrap();

    let entries: Vec<_> = WalReader::open(&wal_path)
        .unwrap()
        .entries()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].lsn, 2);
}
