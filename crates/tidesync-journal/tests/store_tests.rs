//! Integration tests for SqliteJournalStore
//!
//! These tests verify all JournalStore methods using an in-memory SQLite
//! database. Each test function creates a fresh database to ensure test
//! isolation.

use chrono::{Duration, TimeZone, Utc};

use tidesync_core::domain::journal_record::{
    EntryKind, JournalRecord, LocalFingerprint, Permissions, PinState, UploadInfo,
};
use tidesync_core::domain::newtypes::{Checksum, Etag, RemoteId, SyncPath};
use tidesync_core::ports::JournalStore;
use tidesync_journal::{JournalPool, SqliteJournalStore};

// ============================================================================
// Test helpers
// ============================================================================

/// Create a fresh in-memory journal for each test
async fn setup() -> SqliteJournalStore {
    let pool = JournalPool::in_memory()
        .await
        .expect("Failed to create in-memory journal");
    SqliteJournalStore::new(pool.pool().clone())
}

fn record(path: &str, remote_id: &str) -> JournalRecord {
    record_of_kind(path, remote_id, EntryKind::File)
}

fn record_of_kind(path: &str, remote_id: &str, kind: EntryKind) -> JournalRecord {
    JournalRecord::new(
        SyncPath::new(path).unwrap(),
        kind,
        RemoteId::new(remote_id).unwrap(),
        Etag::new("v1").unwrap(),
        Some(Checksum::sha256(path.as_bytes())),
        1024,
        Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap(),
        Permissions::all(),
        LocalFingerprint {
            inode: 7,
            mtime: 1_756_000_000,
            size: 1024,
            mode: 0o644,
        },
    )
}

// ============================================================================
// Basic CRUD
// ============================================================================

#[tokio::test]
async fn test_upsert_and_get_roundtrip() {
    let store = setup().await;
    let rec = record("docs/report.txt", "id-1");

    store.upsert(&rec).await.unwrap();
    let loaded = store.get(rec.path()).await.unwrap().unwrap();
    assert_eq!(loaded, rec);
}

#[tokio::test]
async fn test_get_missing_returns_none() {
    let store = setup().await;
    let loaded = store.get(&SyncPath::new("nope.txt").unwrap()).await.unwrap();
    assert!(loaded.is_none());
}

#[tokio::test]
async fn test_upsert_replaces_existing() {
    let store = setup().await;
    let mut rec = record("a.txt", "id-1");
    store.upsert(&rec).await.unwrap();

    rec.record_success(
        Etag::new("v2").unwrap(),
        None,
        2048,
        Utc::now(),
        LocalFingerprint {
            inode: 7,
            mtime: 1_756_000_100,
            size: 2048,
            mode: 0o600,
        },
    );
    store.upsert(&rec).await.unwrap();

    let loaded = store.get(rec.path()).await.unwrap().unwrap();
    assert_eq!(loaded.etag().as_str(), "v2");
    assert_eq!(loaded.size(), 2048);
    assert!(loaded.checksum().is_none());
}

#[tokio::test]
async fn test_file_backed_journal_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("state/journal.db");

    {
        let pool = JournalPool::new(&db_path).await.unwrap();
        let store = SqliteJournalStore::new(pool.pool().clone());
        store.upsert(&record("kept.txt", "id-1")).await.unwrap();
    }

    // A second open applies the schema again (a no-op) and sees the row.
    let pool = JournalPool::new(&db_path).await.unwrap();
    let store = SqliteJournalStore::new(pool.pool().clone());
    let loaded = store
        .get(&SyncPath::new("kept.txt").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.remote_id().as_str(), "id-1");
}

#[tokio::test]
async fn test_delete_removes_record() {
    let store = setup().await;
    let rec = record("a.txt", "id-1");
    store.upsert(&rec).await.unwrap();

    store.delete(rec.path()).await.unwrap();
    assert!(store.get(rec.path()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_blacklist_counters_survive_storage() {
    let store = setup().await;
    let mut rec = record("flaky.bin", "id-9");
    let now = Utc.with_ymd_and_hms(2026, 8, 20, 9, 0, 0).unwrap();
    for _ in 0..3 {
        rec.record_failure(now, 3, Duration::hours(1));
    }
    store.upsert(&rec).await.unwrap();

    let loaded = store.get(rec.path()).await.unwrap().unwrap();
    assert_eq!(loaded.consecutive_failures(), 3);
    assert!(loaded.is_blacklisted(now));
    assert!(!loaded.is_blacklisted(now + Duration::hours(2)));
}

// ============================================================================
// Prefix operations
// ============================================================================

#[tokio::test]
async fn test_scan_prefix_returns_descendants_in_order() {
    let store = setup().await;
    for (path, id) in [
        ("docs", "d-1"),
        ("docs/b.txt", "f-2"),
        ("docs/a.txt", "f-1"),
        ("docs/sub/c.txt", "f-3"),
        ("docson.txt", "f-4"), // shares the string prefix but not the directory
        ("other.txt", "f-5"),
    ] {
        let kind = if path == "docs" {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        store.upsert(&record_of_kind(path, id, kind)).await.unwrap();
    }

    let records = store
        .scan_prefix(&SyncPath::new("docs").unwrap())
        .await
        .unwrap();
    let paths: Vec<&str> = records.iter().map(|r| r.path().as_str()).collect();
    assert_eq!(paths, vec!["docs/a.txt", "docs/b.txt", "docs/sub/c.txt"]);
}

#[tokio::test]
async fn test_scan_prefix_of_root_returns_everything() {
    let store = setup().await;
    store.upsert(&record("b.txt", "f-2")).await.unwrap();
    store.upsert(&record("a.txt", "f-1")).await.unwrap();

    let records = store.scan_prefix(&SyncPath::root()).await.unwrap();
    let paths: Vec<&str> = records.iter().map(|r| r.path().as_str()).collect();
    assert_eq!(paths, vec!["a.txt", "b.txt"]);
}

#[tokio::test]
async fn test_rename_prefix_cascades() {
    let store = setup().await;
    store
        .upsert(&record_of_kind("old", "d-1", EntryKind::Directory))
        .await
        .unwrap();
    store.upsert(&record("old/a.txt", "f-1")).await.unwrap();
    store.upsert(&record("old/sub/b.txt", "f-2")).await.unwrap();
    store.upsert(&record("older.txt", "f-3")).await.unwrap();

    store
        .rename_prefix(
            &SyncPath::new("old").unwrap(),
            &SyncPath::new("new").unwrap(),
        )
        .await
        .unwrap();

    let all = store.all().await.unwrap();
    let paths: Vec<&str> = all.iter().map(|r| r.path().as_str()).collect();
    assert_eq!(paths, vec!["new", "new/a.txt", "new/sub/b.txt", "older.txt"]);

    // Remote ids ride along unchanged
    let moved = store
        .get(&SyncPath::new("new/a.txt").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(moved.remote_id().as_str(), "f-1");
}

#[tokio::test]
async fn test_delete_prefix_removes_subtree_only() {
    let store = setup().await;
    store
        .upsert(&record_of_kind("gone", "d-1", EntryKind::Directory))
        .await
        .unwrap();
    store.upsert(&record("gone/a.txt", "f-1")).await.unwrap();
    store.upsert(&record("gonefish.txt", "f-2")).await.unwrap();

    store
        .delete_prefix(&SyncPath::new("gone").unwrap())
        .await
        .unwrap();

    let all = store.all().await.unwrap();
    let paths: Vec<&str> = all.iter().map(|r| r.path().as_str()).collect();
    assert_eq!(paths, vec!["gonefish.txt"]);
}

// ============================================================================
// Pin state
// ============================================================================

#[tokio::test]
async fn test_set_pin_state() {
    let store = setup().await;
    let rec = record("media/movie.mkv", "f-1");
    store.upsert(&rec).await.unwrap();

    store
        .set_pin_state(rec.path(), PinState::OnlineOnly)
        .await
        .unwrap();
    let loaded = store.get(rec.path()).await.unwrap().unwrap();
    assert_eq!(loaded.pin_state(), PinState::OnlineOnly);
}

#[tokio::test]
async fn test_set_pin_state_on_missing_path_fails() {
    let store = setup().await;
    let result = store
        .set_pin_state(&SyncPath::new("missing").unwrap(), PinState::AlwaysLocal)
        .await;
    assert!(result.is_err());
}

// ============================================================================
// Upload info
// ============================================================================

#[tokio::test]
async fn test_upload_info_roundtrip_and_clear() {
    let store = setup().await;
    let path = SyncPath::new("big.iso").unwrap();
    let info = UploadInfo {
        transfer_id: "t-123".to_string(),
        next_chunk: 4,
        chunk_count: 20,
        mtime: 1_756_000_000,
        size: 100 << 20,
        checksum: Some(Checksum::sha256(b"big")),
    };

    assert!(store.upload_info(&path).await.unwrap().is_none());

    store.set_upload_info(&path, &info).await.unwrap();
    assert_eq!(store.upload_info(&path).await.unwrap().unwrap(), info);

    // Progress update overwrites in place
    let advanced = UploadInfo {
        next_chunk: 5,
        ..info.clone()
    };
    store.set_upload_info(&path, &advanced).await.unwrap();
    assert_eq!(
        store.upload_info(&path).await.unwrap().unwrap().next_chunk,
        5
    );

    store.clear_upload_info(&path).await.unwrap();
    assert!(store.upload_info(&path).await.unwrap().is_none());
}

#[tokio::test]
async fn test_rename_prefix_moves_upload_info() {
    let store = setup().await;
    let from = SyncPath::new("dir/big.iso").unwrap();
    let info = UploadInfo {
        transfer_id: "t-1".to_string(),
        next_chunk: 1,
        chunk_count: 2,
        mtime: 0,
        size: 10,
        checksum: None,
    };
    store
        .upsert(&record_of_kind("dir", "d-1", EntryKind::Directory))
        .await
        .unwrap();
    store.upsert(&record("dir/big.iso", "f-1")).await.unwrap();
    store.set_upload_info(&from, &info).await.unwrap();

    store
        .rename_prefix(
            &SyncPath::new("dir").unwrap(),
            &SyncPath::new("moved").unwrap(),
        )
        .await
        .unwrap();

    // Upload info rides along with the rename.
    assert!(store.upload_info(&from).await.unwrap().is_none());
    let moved = SyncPath::new("moved/big.iso").unwrap();
    assert_eq!(store.upload_info(&moved).await.unwrap().unwrap(), info);
    assert!(store.get(&moved).await.unwrap().is_some());
}
