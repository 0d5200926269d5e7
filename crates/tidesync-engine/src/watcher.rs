//! File watching and debounced run triggering
//!
//! [`FileWatcher`] wraps the `notify` crate and forwards the paths of
//! relevant filesystem events through an mpsc channel. [`ChangeQueue`]
//! debounces them: a path must stay quiet for the configured delay before it
//! counts as settled, so an editor writing a file in bursts triggers one run
//! instead of ten.
//!
//! ```text
//! inotify ──→ FileWatcher ──→ mpsc ──→ ChangeQueue ──→ SyncService
//! ```
//!
//! The watcher is only a trigger source. Which paths changed and how is
//! re-established by the scanners; a lost or coalesced event costs at most
//! one poll interval of latency.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

// ============================================================================
// FileWatcher
// ============================================================================

/// Recursive filesystem watcher emitting changed paths.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Create the watcher and the channel its events arrive on.
    pub fn new() -> Result<(Self, mpsc::Receiver<PathBuf>)> {
        let (tx, rx) = mpsc::channel::<PathBuf>(1024);

        let watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if !is_relevant(&event.kind) {
                        return;
                    }
                    for path in event.paths {
                        if let Err(e) = tx.blocking_send(path) {
                            warn!(error = %e, "watcher receiver dropped");
                            return;
                        }
                    }
                }
                Err(err) => error!(error = %err, "filesystem watcher error"),
            },
            notify::Config::default(),
        )
        .context("creating filesystem watcher")?;

        Ok((Self { watcher }, rx))
    }

    /// Watch `root` recursively.
    pub fn watch(&mut self, root: &Path) -> Result<()> {
        info!(path = %root.display(), "watching local mirror");
        self.watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("watching {}", root.display()))
    }

    /// Stop watching `root`.
    pub fn unwatch(&mut self, root: &Path) -> Result<()> {
        self.watcher
            .unwatch(root)
            .with_context(|| format!("unwatching {}", root.display()))
    }
}

/// Creates, removals, renames and content/metadata modifications matter;
/// access events do not.
fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

// ============================================================================
// ChangeQueue
// ============================================================================

/// Debounce queue over changed paths.
///
/// Each push records or refreshes the path's timestamp; a path settles once
/// it has been quiet for the full delay. Rapid rewrites of the same path
/// keep extending its window.
pub struct ChangeQueue {
    pending: HashMap<PathBuf, Instant>,
    debounce_delay: Duration,
}

impl ChangeQueue {
    #[must_use]
    pub fn new(debounce_delay: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            debounce_delay,
        }
    }

    /// Record a change for `path`, resetting its quiet timer.
    pub fn push(&mut self, path: PathBuf) {
        debug!(path = %path.display(), "change queued");
        self.pending.insert(path, Instant::now());
    }

    /// Remove and return every path that has been quiet long enough.
    pub fn drain_settled(&mut self) -> Vec<PathBuf> {
        let now = Instant::now();
        let settled: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, stamp)| now.duration_since(**stamp) >= self.debounce_delay)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &settled {
            self.pending.remove(path);
        }
        if !settled.is_empty() {
            debug!(count = settled.len(), "changes settled");
        }
        settled
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
