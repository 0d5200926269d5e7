//! End-to-end passes through the full pipeline: scan, reconcile, propagate,
//! summarize. Runs against a real temp directory, an in-memory journal and
//! the in-memory remote from `common`.

mod common;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use common::MemoryRemote;
use tidesync_core::config::{Config, RetryConfig};
use tidesync_core::domain::events::{RunStatus, SkipReason, SyncEvent};
use tidesync_core::domain::newtypes::SyncPath;
use tidesync_core::ports::journal_store::JournalStore;
use tidesync_engine::{EngineState, SyncEngine};
use tidesync_journal::{JournalPool, SqliteJournalStore};

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    journal: Arc<SqliteJournalStore>,
    remote: Arc<MemoryRemote>,
    engine: SyncEngine,
}

async fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();

    let pool = JournalPool::in_memory().await.unwrap();
    let journal = Arc::new(SqliteJournalStore::new(pool.pool().clone()));
    let remote = Arc::new(MemoryRemote::new());

    let mut config = Config::default();
    config.sync.root = root.clone();
    config.retry = RetryConfig {
        max_attempts: 2,
        base_delay_ms: 1,
    };
    config.transfers.delta_threshold_mb = 1024;

    let engine = SyncEngine::new(config, journal.clone(), remote.clone());
    Fixture {
        _dir: dir,
        root,
        journal,
        remote,
        engine,
    }
}

fn path(s: &str) -> SyncPath {
    SyncPath::new(s).unwrap()
}

#[tokio::test]
async fn test_fresh_local_tree_uploads_everything() {
    let fx = fixture().await;
    fs::write(fx.root.join("a.txt"), b"alpha").unwrap();
    fs::create_dir(fx.root.join("docs")).unwrap();
    fs::write(fx.root.join("docs/b.txt"), b"bravo").unwrap();

    let summary = fx.engine.run_once(CancellationToken::new()).await.unwrap();

    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.items_synced, 3);
    assert_eq!(fx.remote.content_at("a.txt").unwrap(), b"alpha");
    assert_eq!(fx.remote.content_at("docs/b.txt").unwrap(), b"bravo");
    assert!(fx.remote.has_path("docs"));

    for p in ["a.txt", "docs", "docs/b.txt"] {
        assert!(
            fx.journal.get(&path(p)).await.unwrap().is_some(),
            "missing journal row for {p}"
        );
    }
    assert_eq!(fx.engine.state(), EngineState::Idle);
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let fx = fixture().await;
    fs::write(fx.root.join("a.txt"), b"alpha").unwrap();
    fs::write(fx.root.join("b.txt"), b"bravo").unwrap();

    let first = fx.engine.run_once(CancellationToken::new()).await.unwrap();
    assert_eq!(first.items_synced, 2);

    let second = fx.engine.run_once(CancellationToken::new()).await.unwrap();
    assert_eq!(second.status, RunStatus::Success);
    assert_eq!(second.items_synced, 0);
    assert_eq!(second.bytes_uploaded, 0);
    assert_eq!(second.bytes_downloaded, 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_unscannable_subtree_marks_run_partial() {
    use std::os::unix::fs::PermissionsExt;

    let fx = fixture().await;
    fs::write(fx.root.join("ok.txt"), b"fine").unwrap();
    fs::create_dir(fx.root.join("vault")).unwrap();
    fs::write(fx.root.join("vault/secret.txt"), b"x").unwrap();
    fs::set_permissions(fx.root.join("vault"), fs::Permissions::from_mode(0o000)).unwrap();

    let result = fx.engine.run_once(CancellationToken::new()).await;

    fs::set_permissions(fx.root.join("vault"), fs::Permissions::from_mode(0o755)).unwrap();

    // The rest of the tree still synced, but the run must not read clean.
    let summary = result.unwrap();
    assert_eq!(summary.status, RunStatus::Partial);
    assert!(summary
        .failed
        .iter()
        .any(|(p, reason)| p.as_str() == "vault" && reason.contains("scan failed")));
    assert_eq!(fx.remote.content_at("ok.txt").unwrap(), b"fine");
}

#[tokio::test]
async fn test_remote_only_change_downloads() {
    let fx = fixture().await;
    fx.engine.run_once(CancellationToken::new()).await.unwrap();

    fx.remote.seed_file("notes.txt", b"from another client");

    let summary = fx.engine.run_once(CancellationToken::new()).await.unwrap();
    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.bytes_downloaded, 19);
    assert_eq!(
        fs::read(fx.root.join("notes.txt")).unwrap(),
        b"from another client"
    );
    assert!(fx.journal.get(&path("notes.txt")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_two_sided_edit_surfaces_conflict_then_converges() {
    let fx = fixture().await;
    fs::write(fx.root.join("shared.txt"), b"base").unwrap();
    fx.engine.run_once(CancellationToken::new()).await.unwrap();

    // Both sides edit; sizes differ so the local change is always detected.
    fs::write(fx.root.join("shared.txt"), b"local edit v2").unwrap();
    fx.remote.update_file("shared.txt", b"remote edit");

    let summary = fx.engine.run_once(CancellationToken::new()).await.unwrap();
    assert_eq!(summary.status, RunStatus::Partial);
    assert_eq!(summary.conflicts.len(), 1);
    let (conflicted, copy) = &summary.conflicts[0];
    assert_eq!(*conflicted, path("shared.txt"));

    // The remote version wins the original path; the local bytes survive
    // under the conflict-marked sibling.
    assert_eq!(fs::read(fx.root.join("shared.txt")).unwrap(), b"remote edit");
    assert_eq!(
        fs::read(fx.root.join(copy.as_str())).unwrap(),
        b"local edit v2"
    );

    // Next pass uploads the conflict copy like any new file.
    let next = fx.engine.run_once(CancellationToken::new()).await.unwrap();
    assert_eq!(next.status, RunStatus::Success);
    assert_eq!(fx.remote.content_at(copy.as_str()).unwrap(), b"local edit v2");
}

#[tokio::test]
async fn test_local_deletion_propagates() {
    let fx = fixture().await;
    fs::write(fx.root.join("gone.txt"), b"short lived").unwrap();
    fx.engine.run_once(CancellationToken::new()).await.unwrap();
    assert!(fx.remote.has_path("gone.txt"));

    fs::remove_file(fx.root.join("gone.txt")).unwrap();

    let summary = fx.engine.run_once(CancellationToken::new()).await.unwrap();
    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.items_synced, 1);
    assert!(!fx.remote.has_path("gone.txt"));
    assert!(fx.journal.get(&path("gone.txt")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_cancelled_run_reports_aborted() {
    let fx = fixture().await;
    fs::write(fx.root.join("pending.txt"), b"not yet").unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let summary = fx.engine.run_once(cancel).await.unwrap();

    assert_eq!(summary.status, RunStatus::Aborted);
    assert_eq!(summary.items_synced, 0);
    assert!(!fx.remote.has_path("pending.txt"));
    assert!(summary
        .skipped
        .iter()
        .any(|(p, r)| *p == path("pending.txt") && *r == SkipReason::Cancelled));
}

#[tokio::test]
async fn test_force_resync_restores_dropped_state() {
    let fx = fixture().await;
    fx.remote.seed_file("data.txt", b"authoritative");
    fx.engine.run_once(CancellationToken::new()).await.unwrap();
    assert_eq!(fs::read(fx.root.join("data.txt")).unwrap(), b"authoritative");

    // Losing the local copy normally propagates as a deletion; a forced
    // resync forgets the pairing instead, so the file is re-downloaded.
    fs::remove_file(fx.root.join("data.txt")).unwrap();
    fx.engine.force_resync(&path("data.txt")).await.unwrap();
    assert!(fx.journal.get(&path("data.txt")).await.unwrap().is_none());

    let summary = fx.engine.run_once(CancellationToken::new()).await.unwrap();
    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(fs::read(fx.root.join("data.txt")).unwrap(), b"authoritative");
    assert!(fx.remote.has_path("data.txt"));
}

#[tokio::test]
async fn test_run_emits_lifecycle_events() {
    let fx = fixture().await;
    fs::write(fx.root.join("evt.txt"), b"watch me").unwrap();

    let mut rx = fx.engine.subscribe();
    let summary = fx.engine.run_once(CancellationToken::new()).await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(matches!(
        events.first(),
        Some(SyncEvent::RunStarted { run_id }) if *run_id == summary.run_id
    ));
    assert!(events.iter().any(
        |e| matches!(e, SyncEvent::ItemResult { path: p, .. } if *p == path("evt.txt"))
    ));
    assert!(matches!(events.last(), Some(SyncEvent::RunFinished { .. })));
}
