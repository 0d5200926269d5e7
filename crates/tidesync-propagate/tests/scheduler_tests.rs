//! Scheduler integration tests: dependency gating, retry ladder,
//! cancellation and blacklist bookkeeping.

mod common;

use std::sync::Arc;

use chrono::Utc;
use common::FakeRemote;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use tidesync_core::config::{BlacklistConfig, RetryConfig, TransfersConfig};
use tidesync_core::domain::errors::ErrorClass;
use tidesync_core::domain::events::{ItemOutcome, SkipReason};
use tidesync_core::domain::instruction::{SourceSide, SyncAction, SyncInstruction};
use tidesync_core::domain::journal_record::{
    EntryKind, JournalRecord, LocalFingerprint, Permissions,
};
use tidesync_core::domain::newtypes::{Etag, RemoteId, SyncPath};
use tidesync_core::ports::journal_store::JournalStore;
use tidesync_journal::{JournalPool, SqliteJournalStore};
use tidesync_propagate::{JobExecutor, PropagationScheduler};

struct Fixture {
    _dir: TempDir,
    root: std::path::PathBuf,
    journal: Arc<SqliteJournalStore>,
    remote: Arc<FakeRemote>,
    scheduler: PropagationScheduler,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let pool = JournalPool::in_memory().await.unwrap();
    let journal = Arc::new(SqliteJournalStore::new(pool.pool().clone()));
    let remote = Arc::new(FakeRemote::new());
    let executor = Arc::new(JobExecutor::new(
        root.clone(),
        journal.clone(),
        remote.clone(),
        TransfersConfig {
            max_concurrent: 4,
            chunked_upload_threshold_mb: 1024,
            chunk_size_mb: 1,
            delta_threshold_mb: 1024,
        },
    ));
    let scheduler = PropagationScheduler::new(
        executor,
        journal.clone(),
        &RetryConfig {
            max_attempts: 4,
            base_delay_ms: 1,
        },
        BlacklistConfig {
            failure_threshold: 3,
            cooldown_secs: 3600,
        },
        4,
    );
    Fixture {
        _dir: dir,
        root,
        journal,
        remote,
        scheduler,
    }
}

fn path(s: &str) -> SyncPath {
    SyncPath::new(s).unwrap()
}

fn outcome_of<'a>(
    report: &'a tidesync_propagate::PropagationReport,
    p: &str,
) -> &'a ItemOutcome {
    report
        .results
        .iter()
        .find(|(rp, _)| rp.as_str() == p)
        .map(|(_, outcome)| outcome)
        .unwrap_or_else(|| panic!("no result for {p}"))
}

#[tokio::test]
async fn test_failed_parent_skips_dependent_children() {
    let fx = fixture().await;
    std::fs::create_dir(fx.root.join("broken")).unwrap();
    std::fs::write(fx.root.join("broken/a.txt"), b"x").unwrap();
    fx.remote.forbid_mkdir("broken");

    let instructions = vec![
        SyncInstruction::new(
            path("broken"),
            EntryKind::Directory,
            SyncAction::MkdirRemote,
            SourceSide::Local,
        ),
        SyncInstruction::new(
            path("broken/a.txt"),
            EntryKind::File,
            SyncAction::Upload,
            SourceSide::Local,
        ),
    ];

    let report = fx
        .scheduler
        .run(instructions, CancellationToken::new())
        .await;

    assert!(matches!(
        outcome_of(&report, "broken"),
        ItemOutcome::Failed {
            class: ErrorClass::Policy,
            ..
        }
    ));
    assert_eq!(
        outcome_of(&report, "broken/a.txt"),
        &ItemOutcome::Skipped(SkipReason::DependencyFailed(path("broken")))
    );
}

#[tokio::test]
async fn test_transient_failures_retried_to_success() {
    let fx = fixture().await;
    std::fs::write(fx.root.join("a.txt"), b"payload").unwrap();
    fx.remote.fail_next_puts(2);

    let instructions = vec![SyncInstruction::new(
        path("a.txt"),
        EntryKind::File,
        SyncAction::Upload,
        SourceSide::Local,
    )];

    let report = fx
        .scheduler
        .run(instructions, CancellationToken::new())
        .await;

    assert_eq!(outcome_of(&report, "a.txt"), &ItemOutcome::Synced);
    assert_eq!(report.bytes_uploaded, 7);
    assert_eq!(fx.remote.content_at("a.txt").unwrap(), b"payload");
}

#[tokio::test]
async fn test_integrity_error_falls_back_to_full_transfer() {
    let fx = fixture().await;
    let content = b"good content".to_vec();
    let (id, etag) = fx.remote.seed_file("d.bin", &content);
    // Garbage manifest forces the delta attempt to fail with an integrity
    // error; the fallback full download succeeds.
    fx.remote.set_manifest(&id, b"not json".to_vec());
    std::fs::write(fx.root.join("d.bin"), b"stale base").unwrap();

    let executor = Arc::new(JobExecutor::new(
        fx.root.clone(),
        fx.journal.clone(),
        fx.remote.clone(),
        TransfersConfig {
            max_concurrent: 4,
            chunked_upload_threshold_mb: 1024,
            chunk_size_mb: 1,
            delta_threshold_mb: 0, // always try delta first
        },
    ));
    let scheduler = PropagationScheduler::new(
        executor,
        fx.journal.clone(),
        &RetryConfig {
            max_attempts: 2,
            base_delay_ms: 1,
        },
        BlacklistConfig {
            failure_threshold: 3,
            cooldown_secs: 3600,
        },
        2,
    );

    let instructions = vec![SyncInstruction::new(
        path("d.bin"),
        EntryKind::File,
        SyncAction::Download,
        SourceSide::Remote,
    )
    .with_remote_id(id)
    .with_expected_etag(etag)
    .with_expected_checksum(tidesync_codec::compute_checksum(&content))
    .with_expected_size(content.len() as u64)];

    let report = scheduler.run(instructions, CancellationToken::new()).await;

    assert_eq!(outcome_of(&report, "d.bin"), &ItemOutcome::Synced);
    assert_eq!(std::fs::read(fx.root.join("d.bin")).unwrap(), content);
    assert_eq!(fx.remote.get_count(), 1);
}

#[tokio::test]
async fn test_cancelled_token_skips_everything() {
    let fx = fixture().await;
    std::fs::write(fx.root.join("a.txt"), b"x").unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let instructions = vec![SyncInstruction::new(
        path("a.txt"),
        EntryKind::File,
        SyncAction::Upload,
        SourceSide::Local,
    )];
    let report = fx.scheduler.run(instructions, cancel).await;

    assert_eq!(
        outcome_of(&report, "a.txt"),
        &ItemOutcome::Skipped(SkipReason::Cancelled)
    );
    assert!(!fx.remote.has_path("a.txt"));
}

#[tokio::test]
async fn test_cancelled_ancestor_cascades_as_cancelled_not_failed() {
    let fx = fixture().await;
    std::fs::create_dir(fx.root.join("photos")).unwrap();
    std::fs::write(fx.root.join("photos/p.jpg"), b"x").unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let instructions = vec![
        SyncInstruction::new(
            path("photos"),
            EntryKind::Directory,
            SyncAction::MkdirRemote,
            SourceSide::Local,
        ),
        SyncInstruction::new(
            path("photos/p.jpg"),
            EntryKind::File,
            SyncAction::Upload,
            SourceSide::Local,
        ),
    ];
    let report = fx.scheduler.run(instructions, cancel).await;

    assert_eq!(
        outcome_of(&report, "photos"),
        &ItemOutcome::Skipped(SkipReason::Cancelled)
    );
    // The dependent was never blocked by a failure, only by the
    // cancellation, and must say so.
    assert_eq!(
        outcome_of(&report, "photos/p.jpg"),
        &ItemOutcome::Skipped(SkipReason::Cancelled)
    );
}

#[tokio::test]
async fn test_subtree_deletion_runs_child_first() {
    let fx = fixture().await;
    std::fs::create_dir(fx.root.join("old")).unwrap();
    std::fs::write(fx.root.join("old/f.txt"), b"x").unwrap();

    // Ordered as discovery emits them: children first.
    let instructions = vec![
        SyncInstruction::new(
            path("old/f.txt"),
            EntryKind::File,
            SyncAction::DeleteLocal,
            SourceSide::Remote,
        ),
        SyncInstruction::new(
            path("old"),
            EntryKind::Directory,
            SyncAction::DeleteLocal,
            SourceSide::Remote,
        ),
    ];

    let report = fx
        .scheduler
        .run(instructions, CancellationToken::new())
        .await;

    assert_eq!(outcome_of(&report, "old/f.txt"), &ItemOutcome::Synced);
    assert_eq!(outcome_of(&report, "old"), &ItemOutcome::Synced);
    assert!(!fx.root.join("old").exists());
}

#[tokio::test]
async fn test_exhausted_retries_bump_blacklist_counter() {
    let fx = fixture().await;
    std::fs::write(fx.root.join("flaky.txt"), b"x").unwrap();
    // More failures than the retry budget allows.
    fx.remote.fail_next_puts(10);

    // The path synced before, so a journal row exists to count on.
    fx.journal
        .upsert(&JournalRecord::new(
            path("flaky.txt"),
            EntryKind::File,
            RemoteId::new("fid-1").unwrap(),
            Etag::new("v1").unwrap(),
            None,
            1,
            Utc::now(),
            Permissions::all(),
            LocalFingerprint::default(),
        ))
        .await
        .unwrap();

    let instructions = vec![SyncInstruction::new(
        path("flaky.txt"),
        EntryKind::File,
        SyncAction::Upload,
        SourceSide::Local,
    )
    .with_remote_id(RemoteId::new("fid-1").unwrap())
    .with_expected_etag(Etag::new("v1").unwrap())];

    let report = fx
        .scheduler
        .run(instructions, CancellationToken::new())
        .await;

    assert!(matches!(
        outcome_of(&report, "flaky.txt"),
        ItemOutcome::Failed {
            class: ErrorClass::Transient,
            ..
        }
    ));
    let record = fx.journal.get(&path("flaky.txt")).await.unwrap().unwrap();
    assert_eq!(record.consecutive_failures(), 1);
}

#[tokio::test]
async fn test_independent_items_all_complete() {
    let fx = fixture().await;
    for name in ["a.txt", "b.txt", "c.txt"] {
        std::fs::write(fx.root.join(name), name.as_bytes()).unwrap();
    }

    let instructions = ["a.txt", "b.txt", "c.txt"]
        .iter()
        .map(|p| {
            SyncInstruction::new(path(p), EntryKind::File, SyncAction::Upload, SourceSide::Local)
        })
        .collect();

    let report = fx
        .scheduler
        .run(instructions, CancellationToken::new())
        .await;

    assert_eq!(report.synced_count(), 3);
    assert_eq!(report.bytes_uploaded, 15);
}
