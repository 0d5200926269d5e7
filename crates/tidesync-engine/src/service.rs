//! Continuous sync service
//!
//! Owns the trigger loop around [`SyncEngine`]: watcher events feed the
//! debounce queue, a periodic poll catches remote-side changes the watcher
//! cannot see, and a command channel drives the service from the outside.
//! At most one run is in flight; triggers arriving during a run coalesce
//! into a single follow-up pass.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use tidesync_core::domain::events::RunSummary;
use tidesync_core::domain::journal_record::PinState;
use tidesync_core::domain::newtypes::SyncPath;

use crate::controller::SyncEngine;
use crate::watcher::{ChangeQueue, FileWatcher};

/// How often the debounce queue is checked for settled changes.
const QUEUE_POLL: Duration = Duration::from_millis(500);

/// Commands accepted by the running service.
#[derive(Debug)]
pub enum EngineCommand {
    /// Trigger a pass now.
    StartRun,
    /// Stop triggering new passes; a pass already in flight continues.
    Pause,
    /// Resume triggering.
    Resume,
    /// Cancel the pass in flight, keeping its partial progress.
    CancelRun,
    /// Change the pin policy for a path.
    SetPinState { path: SyncPath, state: PinState },
    /// Drop journal state under a path so the next pass re-converges it.
    ForceResync(SyncPath),
    /// Stop the service after the current pass.
    Shutdown,
}

/// Continuous-mode driver around a [`SyncEngine`].
pub struct SyncService {
    engine: Arc<SyncEngine>,
    commands: mpsc::Receiver<EngineCommand>,
    paused: bool,
}

impl SyncService {
    /// Build the service and the sender half of its command channel.
    pub fn new(engine: Arc<SyncEngine>) -> (Self, mpsc::Sender<EngineCommand>) {
        let (tx, rx) = mpsc::channel(64);
        (
            Self {
                engine,
                commands: rx,
                paused: false,
            },
            tx,
        )
    }

    /// Run until `cancel` fires or a `Shutdown` command arrives.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        let config = self.engine.config().clone();

        let (mut watcher, mut fs_events) = FileWatcher::new()?;
        if let Err(err) = watcher.watch(&config.sync.root) {
            // Polling still converges, just with more latency.
            warn!(%err, "local watcher unavailable, relying on polling only");
        }

        let mut queue = ChangeQueue::new(Duration::from_secs(config.sync.debounce_delay));
        let mut poll = tokio::time::interval(Duration::from_secs(config.sync.poll_interval.max(1)));
        let mut queue_tick = tokio::time::interval(QUEUE_POLL);

        let mut run_pending = true; // converge once at startup
        let mut current: Option<(CancellationToken, JoinHandle<Result<RunSummary>>)> = None;
        let mut shutdown = false;

        loop {
            if run_pending && !self.paused && current.is_none() && !shutdown {
                run_pending = false;
                let run_cancel = cancel.child_token();
                let engine = self.engine.clone();
                let token = run_cancel.clone();
                let handle = tokio::spawn(async move { engine.run_once(token).await });
                current = Some((run_cancel, handle));
            }
            if shutdown && current.is_none() {
                info!("sync service stopped");
                return Ok(());
            }

            let run_done = async {
                match current.as_mut() {
                    Some((_, handle)) => handle.await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                () = cancel.cancelled() => {
                    if let Some((token, handle)) = current.take() {
                        token.cancel();
                        let _ = handle.await;
                    }
                    info!("sync service cancelled");
                    return Ok(());
                }

                joined = run_done => {
                    current = None;
                    match joined {
                        Ok(Ok(_summary)) => {}
                        Ok(Err(err)) => error!(%err, "sync pass failed"),
                        Err(err) => error!(%err, "sync pass panicked"),
                    }
                }

                command = self.commands.recv() => {
                    match command {
                        Some(EngineCommand::StartRun) => run_pending = true,
                        Some(EngineCommand::Pause) => {
                            info!("sync paused");
                            self.paused = true;
                        }
                        Some(EngineCommand::Resume) => {
                            info!("sync resumed");
                            self.paused = false;
                        }
                        Some(EngineCommand::CancelRun) => {
                            if let Some((token, _)) = &current {
                                token.cancel();
                            }
                        }
                        Some(EngineCommand::SetPinState { path, state }) => {
                            if let Err(err) = self.engine.set_pin_state(&path, state).await {
                                error!(%path, %err, "pin state change failed");
                            } else {
                                run_pending = true;
                            }
                        }
                        Some(EngineCommand::ForceResync(path)) => {
                            if let Err(err) = self.engine.force_resync(&path).await {
                                error!(%path, %err, "force resync failed");
                            } else {
                                run_pending = true;
                            }
                        }
                        Some(EngineCommand::Shutdown) | None => shutdown = true,
                    }
                }

                changed = fs_events.recv() => {
                    if let Some(path) = changed {
                        queue.push(path);
                    }
                }

                _ = queue_tick.tick() => {
                    if !queue.drain_settled().is_empty() {
                        run_pending = true;
                    }
                }

                _ = poll.tick() => run_pending = true,
            }
        }
    }
}
