//! Single-pass run controller
//!
//! One pass: parallel local/remote scans, reconciliation into instructions,
//! dependency-aware propagation, then the run summary. The engine owns the
//! broadcast event channel; scheduler item events and the run lifecycle
//! events share it.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use tidesync_core::config::Config;
use tidesync_core::domain::events::{ItemOutcome, RunStatus, RunSummary, SyncEvent};
use tidesync_core::domain::journal_record::PinState;
use tidesync_core::domain::newtypes::{RunId, SyncPath};
use tidesync_core::ports::journal_store::JournalStore;
use tidesync_core::ports::remote_store::RemoteStore;
use tidesync_discovery::DiscoveryCoordinator;
use tidesync_propagate::{JobExecutor, PropagationScheduler};
use tidesync_scan::{IgnoreMatcher, LocalScanner, RemoteScanner};

/// Broadcast buffer; a slow subscriber misses old events rather than
/// blocking the run.
const EVENT_CAPACITY: usize = 256;

/// Where the engine currently is in its pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Discovering,
    Propagating,
}

/// The sync run controller.
pub struct SyncEngine {
    config: Config,
    journal: Arc<dyn JournalStore>,
    remote: Arc<dyn RemoteStore>,
    events: broadcast::Sender<SyncEvent>,
    state: Mutex<EngineState>,
}

impl SyncEngine {
    pub fn new(
        config: Config,
        journal: Arc<dyn JournalStore>,
        remote: Arc<dyn RemoteStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            journal,
            remote,
            events,
            state: Mutex::new(EngineState::Idle),
        }
    }

    /// Subscribe to run and item events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Current position in the pass.
    #[must_use]
    pub fn state(&self) -> EngineState {
        self.state.lock().map(|s| *s).unwrap_or(EngineState::Idle)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn set_state(&self, state: EngineState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state;
        }
    }

    /// Execute one full pass. The token cancels cooperatively: running jobs
    /// finish and keep their commits, everything else is skipped.
    #[instrument(skip_all, fields(run_id))]
    pub async fn run_once(&self, cancel: CancellationToken) -> Result<RunSummary> {
        let run_id = RunId::new();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let result = self.run_inner(run_id, cancel).await;
        self.set_state(EngineState::Idle);
        result
    }

    async fn run_inner(&self, run_id: RunId, cancel: CancellationToken) -> Result<RunSummary> {
        let started = Instant::now();
        self.set_state(EngineState::Discovering);
        let _ = self.events.send(SyncEvent::RunStarted { run_id });

        let ignore = Arc::new(
            IgnoreMatcher::new(&self.config.ignore.patterns).context("compiling ignore patterns")?,
        );
        let local_scanner = LocalScanner::new(
            self.config.sync.root.clone(),
            self.journal.clone(),
            ignore.clone(),
        );
        let remote_scanner =
            RemoteScanner::new(self.remote.clone(), self.journal.clone(), ignore);

        let (local, remote) = tokio::try_join!(local_scanner.scan(), remote_scanner.scan())
            .context("scanning for changes")?;
        for (path, reason) in local.excluded().iter().chain(remote.excluded().iter()) {
            tracing::debug!(%path, reason, "excluded from run");
        }
        // Unscannable subtrees count as failures; the pass went on without
        // them but the run must not read as clean.
        let mut scan_failures: Vec<(SyncPath, String)> = Vec::new();
        for (path, error) in local.scan_errors().iter().chain(remote.scan_errors().iter()) {
            warn!(%path, error, "subtree scan failed");
            scan_failures.push((path.clone(), format!("scan failed: {error}")));
        }

        let discovery = DiscoveryCoordinator::new(self.journal.clone());
        let outcome = discovery
            .reconcile(&local, &remote)
            .await
            .context("reconciling change sets")?;

        self.set_state(EngineState::Propagating);
        let executor = Arc::new(
            JobExecutor::new(
                self.config.sync.root.clone(),
                self.journal.clone(),
                self.remote.clone(),
                self.config.transfers.clone(),
            )
            .with_events(self.events.clone()),
        );
        let scheduler = PropagationScheduler::new(
            executor,
            self.journal.clone(),
            &self.config.retry,
            self.config.blacklist.clone(),
            self.config.transfers.max_concurrent,
        )
        .with_events(self.events.clone());

        let report = scheduler.run(outcome.instructions, cancel.clone()).await;

        let mut summary = RunSummary {
            run_id,
            status: RunStatus::Success,
            items_synced: report.synced_count(),
            skipped: outcome.skipped,
            failed: scan_failures,
            conflicts: report.conflicts.clone(),
            bytes_uploaded: report.bytes_uploaded,
            bytes_downloaded: report.bytes_downloaded,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        for (path, item) in &report.results {
            match item {
                ItemOutcome::Skipped(reason) => summary.skipped.push((path.clone(), reason.clone())),
                ItemOutcome::Failed { error, .. } => {
                    summary.failed.push((path.clone(), error.clone()));
                }
                ItemOutcome::Synced | ItemOutcome::Conflict { .. } => {}
            }
        }
        summary.status = if let Some(error) = &report.journal_failure {
            warn!(error, "run aborted: journal unavailable");
            RunStatus::Error
        } else if cancel.is_cancelled() {
            RunStatus::Aborted
        } else {
            summary.derive_status()
        };

        info!(
            run_id = %run_id,
            status = ?summary.status,
            synced = summary.items_synced,
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            conflicts = summary.conflicts.len(),
            duration_ms = summary.duration_ms,
            "run finished"
        );
        let _ = self.events.send(SyncEvent::RunFinished {
            summary: summary.clone(),
        });
        Ok(summary)
    }

    /// Set the pin policy for a path; takes effect on the next pass.
    pub async fn set_pin_state(&self, path: &SyncPath, state: PinState) -> Result<()> {
        self.journal
            .set_pin_state(path, state)
            .await
            .with_context(|| format!("setting pin state for {path}"))
    }

    /// Drop every journal row under `path` (and the row itself) so the next
    /// pass re-observes the subtree from scratch and re-converges it.
    pub async fn force_resync(&self, path: &SyncPath) -> Result<()> {
        info!(%path, "forcing resync of subtree");
        self.journal
            .delete_prefix(path)
            .await
            .with_context(|| format!("dropping journal subtree {path}"))?;
        self.journal
            .delete(path)
            .await
            .with_context(|| format!("dropping journal row {path}"))
    }
}
