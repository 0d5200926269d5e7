//! Propagation scheduler - dependency-aware concurrent dispatch
//!
//! Instructions arrive already ordered (parents before children for
//! creation, children before parents for deletion, deletions last). The
//! scheduler turns that order into explicit dependencies so independent
//! subtrees still run concurrently under the semaphore:
//!
//! - a non-deletion waits for the nearest ancestor instruction in the batch;
//! - a deletion waits for every deletion below it;
//! - a failed or skipped dependency cancels its dependents, recorded as
//!   skipped with the blocking path.
//!
//! Per-path single flight falls out of discovery's one-instruction-per-path
//! guarantee. Cancellation is cooperative: jobs not yet started when the
//! token fires are skipped; running jobs finish and their commits are kept.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, watch, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tidesync_core::config::{BlacklistConfig, RetryConfig};
use tidesync_core::domain::errors::{ErrorClass, SyncError};
use tidesync_core::domain::events::{ItemOutcome, SkipReason, SyncEvent};
use tidesync_core::domain::instruction::SyncInstruction;
use tidesync_core::domain::newtypes::SyncPath;
use tidesync_core::ports::journal_store::JournalStore;

use crate::jobs::{JobExecutor, JobOutcome};
use crate::retry::RetryPolicy;

/// Aggregated result of one propagation pass.
#[derive(Debug, Default)]
pub struct PropagationReport {
    /// Terminal outcome per path, in completion order
    pub results: Vec<(SyncPath, ItemOutcome)>,
    pub bytes_uploaded: u64,
    pub bytes_downloaded: u64,
    /// Conflicts surfaced this pass: (path, conflict copy)
    pub conflicts: Vec<(SyncPath, SyncPath)>,
    /// Set when a journal failure aborted the pass
    pub journal_failure: Option<String>,
}

impl PropagationReport {
    #[must_use]
    pub fn synced_count(&self) -> u64 {
        self.results
            .iter()
            .filter(|(_, outcome)| matches!(outcome, ItemOutcome::Synced))
            .count() as u64
    }
}

/// Terminal state a dependency settles into, as seen by its dependents.
/// Cancellation is kept distinct from failure so a dependent under a
/// cancelled ancestor reports the run's cancellation, not a phantom error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DepState {
    Done,
    Failed,
    Cancelled,
}

/// Signal a dependent waits on: `None` while pending, then the state.
type DepSignal = watch::Receiver<Option<DepState>>;

pub struct PropagationScheduler {
    executor: Arc<JobExecutor>,
    journal: Arc<dyn JournalStore>,
    retry: RetryPolicy,
    blacklist: BlacklistConfig,
    max_concurrent: usize,
    events: Option<broadcast::Sender<SyncEvent>>,
}

impl PropagationScheduler {
    pub fn new(
        executor: Arc<JobExecutor>,
        journal: Arc<dyn JournalStore>,
        retry: &RetryConfig,
        blacklist: BlacklistConfig,
        max_concurrent: usize,
    ) -> Self {
        Self {
            executor,
            journal,
            retry: RetryPolicy::new(retry),
            blacklist,
            max_concurrent: max_concurrent.max(1),
            events: None,
        }
    }

    /// Attach an event channel; item progress and results are broadcast on it.
    #[must_use]
    pub fn with_events(mut self, events: broadcast::Sender<SyncEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Run every instruction to a terminal outcome.
    pub async fn run(
        &self,
        instructions: Vec<SyncInstruction>,
        cancel: CancellationToken,
    ) -> PropagationReport {
        let mut report = PropagationReport::default();
        if instructions.is_empty() {
            return report;
        }

        // One completion signal per path, registered up front so dependents
        // can subscribe before anything is spawned.
        let mut senders: HashMap<SyncPath, watch::Sender<Option<DepState>>> = HashMap::new();
        let mut receivers: HashMap<SyncPath, DepSignal> = HashMap::new();
        for instruction in &instructions {
            let (tx, rx) = watch::channel(None);
            senders.insert(instruction.path.clone(), tx);
            receivers.insert(instruction.path.clone(), rx);
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut set: JoinSet<(SyncPath, ItemOutcome, u64, u64, Option<SyncPath>)> = JoinSet::new();

        for instruction in instructions.iter() {
            let deps = dependencies_of(instruction, &instructions, &receivers);
            let Some(done) = senders.remove(&instruction.path) else {
                continue;
            };
            let instruction = instruction.clone();
            let executor = self.executor.clone();
            let journal = self.journal.clone();
            let retry = self.retry;
            let blacklist = self.blacklist.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let events = self.events.clone();

            set.spawn(async move {
                // Wait for structural dependencies first.
                for (dep_path, mut signal) in deps {
                    let state = signal
                        .wait_for(|state| state.is_some())
                        .await
                        .ok()
                        .and_then(|state| *state)
                        .unwrap_or(DepState::Failed);
                    match state {
                        DepState::Done => {}
                        // A cancelled ancestor cascades as cancellation.
                        DepState::Cancelled => {
                            let _ = done.send(Some(DepState::Cancelled));
                            return (
                                instruction.path.clone(),
                                ItemOutcome::Skipped(SkipReason::Cancelled),
                                0,
                                0,
                                None,
                            );
                        }
                        DepState::Failed => {
                            let _ = done.send(Some(DepState::Failed));
                            return (
                                instruction.path.clone(),
                                ItemOutcome::Skipped(SkipReason::DependencyFailed(dep_path)),
                                0,
                                0,
                                None,
                            );
                        }
                    }
                }

                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        let _ = done.send(Some(DepState::Cancelled));
                        return (
                            instruction.path.clone(),
                            ItemOutcome::Skipped(SkipReason::Cancelled),
                            0,
                            0,
                            None,
                        );
                    }
                };

                if cancel.is_cancelled() {
                    let _ = done.send(Some(DepState::Cancelled));
                    return (
                        instruction.path.clone(),
                        ItemOutcome::Skipped(SkipReason::Cancelled),
                        0,
                        0,
                        None,
                    );
                }

                if let Some(events) = &events {
                    let _ = events.send(SyncEvent::ItemStarted {
                        path: instruction.path.clone(),
                        action: instruction.action.name().to_string(),
                    });
                }

                let result = attempt(&executor, &instruction, retry, &cancel).await;

                let (outcome, up, down, conflict) = match result {
                    Ok(JobOutcome::Committed {
                        bytes_uploaded,
                        bytes_downloaded,
                    }) => {
                        let _ = done.send(Some(DepState::Done));
                        (ItemOutcome::Synced, bytes_uploaded, bytes_downloaded, None)
                    }
                    Ok(JobOutcome::ConflictResolved {
                        conflict_copy,
                        bytes_downloaded,
                    }) => {
                        let _ = done.send(Some(DepState::Done));
                        if let Some(events) = &events {
                            let _ = events.send(SyncEvent::ConflictDetected {
                                path: instruction.path.clone(),
                                conflict_copy: conflict_copy.clone(),
                            });
                        }
                        (
                            ItemOutcome::Conflict {
                                conflict_copy: conflict_copy.clone(),
                            },
                            0,
                            bytes_downloaded,
                            Some(conflict_copy),
                        )
                    }
                    Ok(JobOutcome::Skipped(reason)) => {
                        let state = if reason == SkipReason::Cancelled {
                            DepState::Cancelled
                        } else {
                            DepState::Failed
                        };
                        let _ = done.send(Some(state));
                        (ItemOutcome::Skipped(reason), 0, 0, None)
                    }
                    Err(err) => {
                        let class = err.class();
                        warn!(path = %instruction.path, %err, %class, "job failed");
                        record_failure(&journal, &instruction.path, &blacklist).await;
                        let _ = done.send(Some(DepState::Failed));
                        (
                            ItemOutcome::Failed {
                                error: err.to_string(),
                                class,
                            },
                            0,
                            0,
                            None,
                        )
                    }
                };

                if let Some(events) = &events {
                    let _ = events.send(SyncEvent::ItemResult {
                        path: instruction.path.clone(),
                        outcome: outcome.clone(),
                    });
                }
                (instruction.path.clone(), outcome, up, down, conflict)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((path, outcome, up, down, conflict)) => {
                    report.bytes_uploaded += up;
                    report.bytes_downloaded += down;
                    if let Some(copy) = conflict {
                        report.conflicts.push((path.clone(), copy));
                    }
                    if let ItemOutcome::Failed { error, class } = &outcome {
                        if *class == ErrorClass::JournalUnavailable {
                            report.journal_failure = Some(error.clone());
                        }
                    }
                    report.results.push((path, outcome));
                }
                Err(err) => error!(%err, "propagation task panicked"),
            }
        }

        info!(
            synced = report.synced_count(),
            total = report.results.len(),
            uploaded = report.bytes_uploaded,
            downloaded = report.bytes_downloaded,
            "propagation pass finished"
        );
        report
    }
}

/// Run one instruction through the retry ladder: transient errors back off
/// and retry within the attempt budget; the first integrity error earns a
/// single full-transfer fallback; everything else is terminal.
async fn attempt(
    executor: &JobExecutor,
    instruction: &SyncInstruction,
    retry: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<JobOutcome, SyncError> {
    let mut attempt_no: u32 = 0;
    let mut force_full = false;

    loop {
        attempt_no += 1;
        match executor.execute(instruction, force_full).await {
            Ok(outcome) => return Ok(outcome),
            Err(err) => match err.class() {
                ErrorClass::Transient if retry.allows_retry(attempt_no) => {
                    let delay = retry.delay_for(attempt_no);
                    debug!(
                        path = %instruction.path,
                        attempt = attempt_no,
                        delay_ms = delay.as_millis() as u64,
                        %err,
                        "transient failure, backing off"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = cancel.cancelled() => return Err(err),
                    }
                }
                ErrorClass::Integrity if !force_full => {
                    warn!(path = %instruction.path, %err, "integrity failure, falling back to full transfer");
                    force_full = true;
                }
                _ => return Err(err),
            },
        }
    }
}

/// Bump the journal's consecutive-failure counter; past the threshold the
/// path sleeps for the cooldown instead of failing every run.
async fn record_failure(
    journal: &Arc<dyn JournalStore>,
    path: &SyncPath,
    blacklist: &BlacklistConfig,
) {
    let record = match journal.get(path).await {
        Ok(Some(record)) => record,
        // Never-synced paths have no row to count failures on.
        Ok(None) => return,
        Err(err) => {
            warn!(path = %path, %err, "could not load record for failure bookkeeping");
            return;
        }
    };
    let mut record = record;
    record.record_failure(
        Utc::now(),
        blacklist.failure_threshold,
        chrono::Duration::seconds(blacklist.cooldown_secs as i64),
    );
    if let Err(err) = journal.upsert(&record).await {
        warn!(path = %path, %err, "could not persist failure counter");
    }
}

/// Structural dependencies of one instruction within the batch.
fn dependencies_of(
    instruction: &SyncInstruction,
    all: &[SyncInstruction],
    receivers: &HashMap<SyncPath, DepSignal>,
) -> Vec<(SyncPath, DepSignal)> {
    let mut deps = Vec::new();
    if instruction.action.is_deletion() {
        // Children go before their parent.
        for other in all {
            if other.action.is_deletion() && other.path.is_descendant_of(&instruction.path) {
                if let Some(rx) = receivers.get(&other.path) {
                    deps.push((other.path.clone(), rx.clone()));
                }
            }
        }
    } else {
        // Nearest ancestor with a non-deletion instruction must exist first.
        let mut cursor = instruction.path.parent();
        while let Some(ancestor) = cursor {
            if ancestor.is_root() {
                break;
            }
            let creates_ancestor = all
                .iter()
                .any(|other| other.path == ancestor && !other.action.is_deletion());
            if creates_ancestor {
                if let Some(rx) = receivers.get(&ancestor) {
                    deps.push((ancestor.clone(), rx.clone()));
                }
                break;
            }
            cursor = ancestor.parent();
        }
    }
    deps
}
