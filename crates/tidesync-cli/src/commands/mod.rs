//! Command implementations and shared wiring.

pub mod pin;
pub mod resync;
pub mod status;
pub mod sync;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use tidesync_core::config::Config;
use tidesync_core::domain::events::{RunStatus, RunSummary};
use tidesync_engine::SyncEngine;
use tidesync_journal::{JournalPool, SqliteJournalStore};
use tidesync_remote::HttpRemoteStore;

/// Where the journal database lives, typically
/// `$XDG_DATA_HOME/tidesync/journal.db`.
fn journal_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tidesync")
        .join("journal.db")
}

pub(crate) async fn open_journal() -> Result<Arc<SqliteJournalStore>> {
    let pool = JournalPool::new(&journal_path())
        .await
        .context("opening journal database")?;
    Ok(Arc::new(SqliteJournalStore::new(pool.pool().clone())))
}

/// Bearer credential for the remote store, supplied via the environment.
fn bearer_token() -> Result<String> {
    std::env::var("TIDESYNC_TOKEN")
        .context("TIDESYNC_TOKEN is not set; export the remote access token first")
}

/// Wire the full engine: journal, HTTP remote, controller.
pub(crate) async fn build_engine(config: Config) -> Result<Arc<SyncEngine>> {
    let journal = open_journal().await?;
    let remote = Arc::new(HttpRemoteStore::new(&config.remote, bearer_token()?)?);
    Ok(Arc::new(SyncEngine::new(config, journal, remote)))
}

/// Cancellation token that fires on Ctrl-C.
pub(crate) fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupted, finishing in-flight work...");
            trigger.cancel();
        }
    });
    cancel
}

pub(crate) fn print_summary(summary: &RunSummary) {
    let duration = if summary.duration_ms >= 1000 {
        format!("{:.1}s", summary.duration_ms as f64 / 1000.0)
    } else {
        format!("{}ms", summary.duration_ms)
    };

    match summary.status {
        RunStatus::Success if summary.items_synced == 0 => {
            println!("Already up to date ({duration})");
        }
        RunStatus::Success => println!("Sync completed in {duration}"),
        RunStatus::Partial => println!("Sync completed with issues in {duration}"),
        RunStatus::Aborted => println!("Sync cancelled after {duration}; progress kept"),
        RunStatus::Error => println!("Sync aborted after {duration}"),
    }

    if summary.items_synced > 0 {
        println!("  synced:     {}", summary.items_synced);
    }
    if summary.bytes_uploaded > 0 {
        println!("  uploaded:   {} bytes", summary.bytes_uploaded);
    }
    if summary.bytes_downloaded > 0 {
        println!("  downloaded: {} bytes", summary.bytes_downloaded);
    }
    if !summary.skipped.is_empty() {
        println!("  skipped:    {}", summary.skipped.len());
    }
    for (path, copy) in &summary.conflicts {
        println!("  conflict: {path} (local copy kept as {copy})");
    }
    for (path, error) in &summary.failed {
        println!("  failed: {path}: {error}");
    }
}
