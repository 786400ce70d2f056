//! Tests for WAL Recovery
//!
//! These tests verify:
//! - Recovery from clean WAL
//! - Recovery with torn tails (partial header / partial payload)
//! - Recovery with CRC corruption
//! - Verify leaves the file untouched

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use symboldb::config::WalSyncStrategy;
use symboldb::wal::{Operation, RecoveryResult, WalRecovery, WalWriter, HEADER_SIZE};
use symboldb::Record;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

fn write_batches(path: &PathBuf, count: usize) -> u64 {
    let mut writer = WalWriter::open(path, WalSyncStrategy::EveryWrite).unwrap();
    for i in 0..count {
        writer
            .append(vec![Operation::Put {
                collection: "watchlist".to_string(),
                record: Record::new().with("symbol", format!("sym{}", i)),
            }])
            .unwrap();
    }
    writer.size_bytes()
}

fn append_raw(path: &PathBuf, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
    file.sync_all().unwrap();
}

// =============================================================================
// Clean Recovery
// =============================================================================

#[test]
fn test_recover_missing_file() {
    let (_temp, wal_path) = setup_temp_wal();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert!(entries.is_empty());
    assert_eq!(result, RecoveryResult::default());
    assert!(!wal_path.exists());
}

#[test]
fn test_recover_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert!(entries.is_empty());
    assert_eq!(result.entries_recovered, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_clean_wal() {
    let (_temp, wal_path) = setup_temp_wal();
    let size = write_batches(&wal_path, 10);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 10);
    assert_eq!(result.entries_recovered, 10);
    assert_eq!(result.entries_corrupted, 0);
    assert_eq!(result.last_lsn, 10);
    assert!(!result.was_truncated);
    assert_eq!(result.bytes_discarded, 0);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), size);
}

// =============================================================================
// Torn Tail Recovery
// =============================================================================

#[test]
fn test_recover_partial_header() {
    let (_temp, wal_path) = setup_temp_wal();
    let size = write_batches(&wal_path, 3);
    append_raw(&wal_path, &[0xAB; HEADER_SIZE - 3]);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 3);
    assert_eq!(result.last_lsn, 3);
    assert_eq!(result.entries_corrupted, 1);
    assert!(result.was_truncated);
    assert_eq!(result.bytes_discarded, (HEADER_SIZE - 3) as u64);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), size);
}

#[test]
fn test_recover_partial_payload() {
    let (_temp, wal_path) = setup_temp_wal();
    let size = write_batches(&wal_path, 2);

    // A header announcing 100 bytes followed by only 10 of them
    let mut torn = Vec::new();
    torn.extend_from_slice(&3u64.to_le_bytes());
    torn.extend_from_slice(&0u32.to_le_bytes());
    torn.extend_from_slice(&100u32.to_le_bytes());
    torn.extend_from_slice(&[0u8; 10]);
    append_raw(&wal_path, &torn);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 2);
    assert!(result.was_truncated);
    assert_eq!(result.bytes_discarded, torn.len() as u64);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), size);
}

#[test]
fn test_recover_stops_at_crc_mismatch() {
    let (_temp, wal_path) = setup_temp_wal();
    write_batches(&wal_path, 5);

    // Flip a payload byte of the last entry
    let mut bytes = fs::read(&wal_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&wal_path, &bytes).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 4);
    assert_eq!(result.last_lsn, 4);
    assert_eq!(result.entries_corrupted, 1);
    assert!(result.was_truncated);
}

#[test]
fn test_recovered_wal_accepts_new_entries() {
    let (_temp, wal_path) = setup_temp_wal();
    write_batches(&wal_path, 3);
    append_raw(&wal_path, &[1, 2, 3]);

    let (_, result) = WalRecovery::recover(&wal_path).unwrap();
    assert!(result.was_truncated);

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    assert_eq!(writer.append(Vec::new()).unwrap(), 4);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(entries.len(), 4);
    assert!(!result.was_truncated);
}

// =============================================================================
// Verify
// =============================================================================

#[test]
fn test_verify_does_not_modify() {
    let (_temp, wal_path) = setup_temp_wal();
    let size = write_batches(&wal_path, 4);
    append_raw(&wal_path, &[0xFF; 5]);

    let result = WalRecovery::verify(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 4);
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(result.bytes_discarded, 5);
    assert!(!result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), size + 5);
}
