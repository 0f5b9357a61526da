//! Tests for the RecordSet compaction engine
//!
//! These tests verify:
//! - Dedup in the pending log and across rolled logs
//! - Roll and compaction bookkeeping
//! - Size-bounded chunk splitting with contiguous offsets
//! - Recovery from captured state and from leftover commit logs
//! - Failed compaction leaves the previous state intact
//! - Publication to generation files and the artifact index

use std::path::Path;

use logtable::config::WalSyncStrategy;
use logtable::flock::FileLock;
use logtable::recordset::commitlog_file_name;
use logtable::{
    ArtifactIndex, Config, LogTableError, RecordSet, RecordSetState, TableReader,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const TABLE: &str = "events";
const REPLICA: &str = "r1";

fn config(dir: &Path) -> Config {
    Config::builder()
        .data_dir(dir)
        .table_name(TABLE)
        .replica_id(REPLICA)
        .wal_sync_strategy(WalSyncStrategy::EveryNEntries { count: 1000 })
        .build()
}

fn setup() -> (TempDir, RecordSet) {
    let temp_dir = TempDir::new().unwrap();
    let recordset = RecordSet::open(config(temp_dir.path())).unwrap();
    (temp_dir, recordset)
}

fn payload_of(recordset: &RecordSet, id: u64) -> Option<Vec<u8>> {
    let mut found = None;
    recordset
        .fetch_records(0, None, |r| {
            if r.id == id {
                found = Some(r.payload.clone());
            }
        })
        .unwrap();
    found
}

fn catalog_config(dir: &Path) -> Config {
    Config::builder()
        .data_dir(dir)
        .table_name(TABLE)
        .replica_id(REPLICA)
        .artifact_index("catalog")
        .lock_timeout_ms(50)
        .build()
}

fn catalog_names(dir: &Path) -> Vec<String> {
    ArtifactIndex::new(dir, "catalog", true)
        .list_artifacts()
        .unwrap()
        .into_iter()
        .map(|a| a.name)
        .collect()
}

/// Compact one record into generation 1, then compact a second one into
/// generation 2 while another writer holds the catalog lock
fn compact_with_catalog_locked(dir: &Path) -> RecordSet {
    let mut rs = RecordSet::open(catalog_config(dir)).unwrap();
    rs.add_record(1, b"a").unwrap();
    rs.roll_commitlog().unwrap();
    rs.compact().unwrap();
    assert_eq!(catalog_names(dir), vec!["events.r1.1-0".to_string()]);

    let _held = FileLock::acquire(dir.join("catalog.afx.lck"), None).unwrap();
    rs.add_record(2, b"b").unwrap();
    rs.roll_commitlog().unwrap();

    let summary = rs.compact().unwrap();
    assert_eq!(summary.generation, 2);
    assert!(rs.catalog_is_stale());
    assert_eq!(rs.old_commitlogs(), 0);
    assert_eq!(catalog_names(dir), vec!["events.r1.1-0".to_string()]);
    rs
}

fn log_path(dir: &Path, seq: u64) -> std::path::PathBuf {
    dir.join(commitlog_file_name(TABLE, REPLICA, seq))
}

// =============================================================================
// Pending Log Tests
// =============================================================================

#[test]
fn test_dedup_in_pending_log() {
    let (_temp, mut rs) = setup();

    rs.add_record(0x42, b"first").unwrap();
    rs.add_record(0x42, b"second").unwrap();

    assert_eq!(rs.commitlog_size(), 1);
    assert_eq!(rs.pending_len(), 1);
}

#[test]
fn test_roll_preserves_count() {
    let (_temp, mut rs) = setup();
    for id in [1, 2, 3, 2, 4] {
        rs.add_record(id, b"x").unwrap();
    }
    let before = rs.commitlog_size();
    assert_eq!(before, 4);

    rs.roll_commitlog().unwrap();

    assert_eq!(rs.commitlog_size(), before);
    assert_eq!(rs.pending_len(), 0);
    assert_eq!(rs.old_commitlogs(), 1);
}

#[test]
fn test_roll_empty_log_is_noop() {
    let (_temp, mut rs) = setup();
    rs.roll_commitlog().unwrap();
    assert_eq!(rs.old_commitlogs(), 0);

    rs.add_record(1, b"x").unwrap();
    rs.roll_commitlog().unwrap();
    rs.roll_commitlog().unwrap();
    assert_eq!(rs.old_commitlogs(), 1);
}

#[test]
fn test_ids_shared_between_pending_and_backlog_count_once() {
    let (_temp, mut rs) = setup();
    rs.add_record(1, b"a").unwrap();
    rs.add_record(2, b"a").unwrap();
    rs.roll_commitlog().unwrap();

    rs.add_record(2, b"b").unwrap();
    rs.add_record(3, b"b").unwrap();

    assert_eq!(rs.commitlog_size(), 3);
}

// =============================================================================
// Compaction Tests
// =============================================================================

#[test]
fn test_compaction_clears_backlog() {
    let (temp, mut rs) = setup();
    for id in 0..100 {
        rs.add_record(id, &id.to_be_bytes()).unwrap();
    }
    rs.roll_commitlog().unwrap();

    let summary = rs.compact().unwrap();

    assert_eq!(rs.commitlog_size(), 0);
    assert_eq!(rs.old_commitlogs(), 0);
    assert!(!rs.datafiles().is_empty());
    assert_eq!(summary.generation, 1);
    assert_eq!(summary.records_compacted, 100);
    assert_eq!(summary.logs_compacted, 1);
    assert!(summary.obsolete_files.is_empty());
    assert!(!log_path(temp.path(), 1).exists());
    assert_eq!(rs.list_records().unwrap().len(), 100);
}

#[test]
fn test_compact_without_rolled_logs_is_noop() {
    let (_temp, mut rs) = setup();
    rs.add_record(1, b"x").unwrap();

    let summary = rs.compact().unwrap();

    assert!(summary.is_noop());
    assert_eq!(rs.generation(), 0);
    assert_eq!(rs.commitlog_size(), 1);
    assert!(rs.datafiles().is_empty());
}

#[test]
fn test_pending_records_survive_compaction() {
    let (_temp, mut rs) = setup();
    rs.add_record(1, b"x").unwrap();
    rs.roll_commitlog().unwrap();
    rs.add_record(2, b"y").unwrap();

    rs.compact().unwrap();

    assert_eq!(rs.commitlog_size(), 1);
    assert_eq!(rs.list_records().unwrap().into_iter().collect::<Vec<_>>(), vec![1]);
}

#[test]
fn test_cross_generation_dedup() {
    let (_temp, mut rs) = setup();
    let x = 0xdead_beef;

    rs.add_record(x, b"old").unwrap();
    rs.roll_commitlog().unwrap();
    rs.add_record(x, b"new").unwrap();
    rs.roll_commitlog().unwrap();
    assert_eq!(rs.commitlog_size(), 1);

    rs.compact().unwrap();

    let records = rs.list_records().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records.contains(&x));
    assert_eq!(payload_of(&rs, x), Some(b"new".to_vec()));
}

#[test]
fn test_overwrite_of_compacted_record_keeps_position() {
    let (_temp, mut rs) = setup();
    for id in 1..=3 {
        rs.add_record(id, b"v1").unwrap();
    }
    rs.roll_commitlog().unwrap();
    rs.compact().unwrap();

    rs.add_record(2, b"v2").unwrap();
    rs.add_record(4, b"v1").unwrap();
    rs.roll_commitlog().unwrap();
    rs.compact().unwrap();

    let mut order = Vec::new();
    rs.fetch_records(0, None, |r| order.push((r.id, r.payload.clone())))
        .unwrap();

    assert_eq!(
        order,
        vec![
            (1, b"v1".to_vec()),
            (2, b"v2".to_vec()),
            (3, b"v1".to_vec()),
            (4, b"v1".to_vec()),
        ]
    );
}

#[test]
fn test_chunk_splitting() {
    let (_temp, mut rs) = setup();
    // 8-byte id + 1-byte length + 10-byte payload per record
    rs.set_max_datafile_size(3000 * 19);

    let payload = [7u8; 10];
    for cycle in 0..10u64 {
        for i in 0..1000u64 {
            rs.add_record(cycle * 1000 + i, &payload).unwrap();
        }
        rs.roll_commitlog().unwrap();
        rs.compact().unwrap();
    }

    let counts: Vec<u64> = rs.datafiles().iter().map(|c| c.num_records).collect();
    let offsets: Vec<u64> = rs.datafiles().iter().map(|c| c.start_sequence).collect();

    assert_eq!(counts, vec![3000, 3000, 3000, 1000]);
    assert_eq!(offsets, vec![0, 3000, 6000, 9000]);
    assert_eq!(rs.list_records().unwrap().len(), 10_000);
}

#[test]
fn test_scale_single_compaction() {
    let (_temp, mut rs) = setup();

    let mut id: u64 = 0x9e37_79b9_7f4a_7c15;
    for _ in 0..10 {
        for _ in 0..1000 {
            id = id.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            rs.add_record(id, b"payload").unwrap();
        }
        rs.roll_commitlog().unwrap();
    }
    assert_eq!(rs.old_commitlogs(), 10);

    rs.compact().unwrap();

    let total: u64 = rs.datafiles().iter().map(|c| c.num_records).sum();
    assert_eq!(rs.datafiles().len(), 1);
    assert_eq!(total, 10_000);
    assert_eq!(rs.list_records().unwrap().len(), 10_000);
}

#[test]
fn test_fetch_records_across_chunks() {
    let (_temp, mut rs) = setup();
    rs.set_max_datafile_size(10 * 19);

    for id in 0..25u64 {
        rs.add_record(id, &[1u8; 10]).unwrap();
    }
    rs.roll_commitlog().unwrap();
    rs.compact().unwrap();
    assert_eq!(rs.datafiles().len(), 3);

    let mut ids = Vec::new();
    let n = rs.fetch_records(8, Some(5), |r| ids.push(r.id)).unwrap();

    assert_eq!(n, 5);
    assert_eq!(ids, vec![8, 9, 10, 11, 12]);
}

#[test]
fn test_failed_compaction_keeps_state() {
    let (temp, mut rs) = setup();
    rs.add_record(1, b"a").unwrap();
    rs.roll_commitlog().unwrap();
    rs.compact().unwrap();

    rs.add_record(2, b"b").unwrap();
    rs.roll_commitlog().unwrap();

    // hide the chunk that has to be rewritten
    let chunk = rs.chunk_path(&rs.datafiles()[0]);
    let hidden = temp.path().join("hidden");
    std::fs::rename(&chunk, &hidden).unwrap();

    let result = rs.compact();
    assert!(matches!(result, Err(LogTableError::Io(_))));

    assert_eq!(rs.generation(), 1);
    assert_eq!(rs.old_commitlogs(), 1);
    assert_eq!(rs.commitlog_size(), 1);
    assert!(log_path(temp.path(), 2).exists());
    assert!(!temp.path().join("events.r1.2.idx").exists());
    assert!(!temp.path().join("events.r1.2-0.sst").exists());

    std::fs::rename(&hidden, &chunk).unwrap();
    let summary = rs.compact().unwrap();

    assert_eq!(summary.generation, 2);
    assert_eq!(rs.commitlog_size(), 0);
    assert_eq!(rs.list_records().unwrap().len(), 2);
}

#[test]
fn test_obsolete_files_reported_not_deleted() {
    let (temp, mut rs) = setup();
    rs.add_record(1, b"a").unwrap();
    rs.roll_commitlog().unwrap();
    rs.compact().unwrap();
    let first_chunk = rs.chunk_path(&rs.datafiles()[0]);

    rs.add_record(2, b"b").unwrap();
    rs.roll_commitlog().unwrap();
    let summary = rs.compact().unwrap();

    let first_gen = temp.path().join("events.r1.1.idx");
    assert_eq!(summary.obsolete_files, vec![first_chunk.clone(), first_gen.clone()]);
    assert!(first_chunk.exists());
    assert!(first_gen.exists());

    assert_eq!(rs.remove_files(&summary.obsolete_files).unwrap(), 2);
    assert!(!first_chunk.exists());

    // readers resolve the new generation and never need the old files
    let reader = TableReader::open(temp.path(), TABLE, REPLICA).unwrap();
    let snapshot = reader.get_snapshot().unwrap();
    assert_eq!(snapshot.generation, 2);
    assert_eq!(snapshot.num_records(), 2);
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_recovery_from_state() {
    let temp = TempDir::new().unwrap();
    let state;
    let size;
    {
        let mut rs = RecordSet::open(config(temp.path())).unwrap();
        for id in 0..10 {
            rs.add_record(id, b"a").unwrap();
        }
        rs.roll_commitlog().unwrap();
        for id in 8..15 {
            rs.add_record(id, b"b").unwrap();
        }

        size = rs.commitlog_size();
        state = rs.get_state();
        assert_eq!(state.old_commitlogs.len(), 1);
        assert!(state.commitlog.is_some());
        assert!(state.commitlog_bytes > 0);
    }
    assert_eq!(size, 15);

    let encoded = state.encode().unwrap();
    let decoded = RecordSetState::decode(&encoded).unwrap();
    assert_eq!(decoded, state);

    let mut rs = RecordSet::reopen(config(temp.path()), &decoded).unwrap();

    assert_eq!(rs.commitlog_size(), size);
    assert_eq!(rs.old_commitlogs(), 0);

    // replayed values keep last-writer-wins order
    rs.roll_commitlog().unwrap();
    rs.compact().unwrap();
    assert_eq!(rs.list_records().unwrap().len(), 15);
    assert_eq!(payload_of(&rs, 9), Some(b"b".to_vec()));
    assert_eq!(payload_of(&rs, 0), Some(b"a".to_vec()));
}

#[test]
fn test_open_replays_leftover_logs() {
    let temp = TempDir::new().unwrap();
    {
        let mut rs = RecordSet::open(config(temp.path())).unwrap();
        for id in 0..3 {
            rs.add_record(id, b"x").unwrap();
        }
        rs.sync().unwrap();
    }

    // torn frame at the end of the log
    let path = log_path(temp.path(), 1);
    let mut bytes = std::fs::read(&path).unwrap();
    bytes.extend_from_slice(&[9, 0, 0, 0]);
    std::fs::write(&path, &bytes).unwrap();

    let rs = RecordSet::open(config(temp.path())).unwrap();

    assert_eq!(rs.commitlog_size(), 3);
    assert!(!log_path(temp.path(), 1).exists());
    assert!(log_path(temp.path(), 2).exists());
    assert_eq!(rs.get_state().commitlog, Some("events.r1.2.log".to_string()));
}

#[test]
fn test_compacted_logs_are_not_replayed() {
    let temp = TempDir::new().unwrap();
    let backup = temp.path().join("backup.log");
    {
        let mut rs = RecordSet::open(config(temp.path())).unwrap();
        rs.add_record(1, b"x").unwrap();
        rs.add_record(2, b"x").unwrap();
        rs.roll_commitlog().unwrap();
        std::fs::copy(log_path(temp.path(), 1), &backup).unwrap();
        rs.compact().unwrap();
    }

    // crash between publishing the generation and deleting the log
    std::fs::rename(&backup, log_path(temp.path(), 1)).unwrap();

    let rs = RecordSet::open(config(temp.path())).unwrap();

    assert_eq!(rs.commitlog_size(), 0);
    assert_eq!(rs.generation(), 1);
    assert_eq!(rs.list_records().unwrap().len(), 2);
    assert!(!log_path(temp.path(), 1).exists());
}

#[test]
fn test_reopen_continues_after_compaction() {
    let temp = TempDir::new().unwrap();
    {
        let mut rs = RecordSet::open(config(temp.path())).unwrap();
        rs.add_record(1, b"x").unwrap();
        rs.roll_commitlog().unwrap();
        rs.compact().unwrap();
    }

    let mut rs = RecordSet::open(config(temp.path())).unwrap();
    assert_eq!(rs.datafiles().len(), 1);

    rs.add_record(1, b"y").unwrap();
    rs.add_record(2, b"y").unwrap();
    rs.roll_commitlog().unwrap();
    rs.compact().unwrap();

    assert_eq!(rs.generation(), 2);
    assert_eq!(rs.list_records().unwrap().len(), 2);
    assert_eq!(payload_of(&rs, 1), Some(b"y".to_vec()));
}

#[test]
fn test_invalid_config_rejected() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .table_name("bad.name")
        .build();

    assert!(matches!(
        RecordSet::open(config),
        Err(LogTableError::Config(_))
    ));
}

// =============================================================================
// Artifact Index Tests
// =============================================================================

#[test]
fn test_compaction_mirrors_artifact_index() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .table_name(TABLE)
        .replica_id(REPLICA)
        .artifact_index("catalog")
        .lock_timeout_ms(1000)
        .build();
    let mut rs = RecordSet::open(config).unwrap();

    rs.add_record(1, b"a").unwrap();
    rs.roll_commitlog().unwrap();
    rs.compact().unwrap();

    let index = ArtifactIndex::new(temp.path(), "catalog", true);
    let artifacts = index.list_artifacts().unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].name, "events.r1.1-0");
    assert_eq!(artifacts[0].attribute("num_records"), Some("1"));
    assert_eq!(artifacts[0].files[0].filename, "events.r1.1-0.sst");

    rs.add_record(2, b"b").unwrap();
    rs.roll_commitlog().unwrap();
    rs.compact().unwrap();

    let names: Vec<String> = index
        .list_artifacts()
        .unwrap()
        .into_iter()
        .map(|a| a.name)
        .collect();
    assert_eq!(names, vec!["events.r1.2-0".to_string()]);

    let report = index.run_consistency_check(true, false).unwrap();
    assert_eq!(report.files_checked, 1);
}

#[test]
fn test_locked_catalog_does_not_fail_published_compaction() {
    let temp = TempDir::new().unwrap();
    let mut rs = compact_with_catalog_locked(temp.path());

    let reader = TableReader::open(temp.path(), TABLE, REPLICA).unwrap();
    assert_eq!(reader.get_snapshot().unwrap().generation, 2);

    // lock released: the next compaction catches the catalog up
    let summary = rs.compact().unwrap();
    assert!(summary.is_noop());
    assert!(!rs.catalog_is_stale());
    assert_eq!(catalog_names(temp.path()), vec!["events.r1.2-0".to_string()]);
}

#[test]
fn test_open_repairs_stale_catalog() {
    let temp = TempDir::new().unwrap();
    drop(compact_with_catalog_locked(temp.path()));

    let rs = RecordSet::open(catalog_config(temp.path())).unwrap();

    assert!(!rs.catalog_is_stale());
    assert_eq!(rs.generation(), 2);
    assert_eq!(catalog_names(temp.path()), vec!["events.r1.2-0".to_string()]);
}
