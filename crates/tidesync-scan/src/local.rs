//! Local tree scanner
//!
//! Walks the local mirror and diffs every entry against the journal using
//! the cheap inode/mtime/size fingerprint. Content is read only for entries
//! the fingerprint already flagged, to hash them for convergence detection.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use tracing::{debug, warn};

use tidesync_core::domain::change::{ChangeKind, ChangeRecord, ChangeSet, ObservedMeta, Side};
use tidesync_core::domain::journal_record::{EntryKind, LocalFingerprint};
use tidesync_core::domain::newtypes::SyncPath;
use tidesync_core::ports::JournalStore;
use tidesync_codec::compute_checksum;

use crate::ignore::IgnoreMatcher;
use crate::names::invalid_name_reason;

/// Scans the local mirror for changes relative to the journal.
pub struct LocalScanner {
    root: PathBuf,
    journal: Arc<dyn JournalStore>,
    ignore: Arc<IgnoreMatcher>,
}

impl LocalScanner {
    pub fn new(root: PathBuf, journal: Arc<dyn JournalStore>, ignore: Arc<IgnoreMatcher>) -> Self {
        Self {
            root,
            journal,
            ignore,
        }
    }

    /// One full scan pass: walk the tree, then sweep the journal for
    /// entries that disappeared locally.
    pub async fn scan(&self) -> anyhow::Result<ChangeSet> {
        let mut set = ChangeSet::new();
        let mut seen: HashSet<SyncPath> = HashSet::new();
        let mut failed_subtrees: Vec<SyncPath> = Vec::new();

        self.walk(
            &self.root.clone(),
            &SyncPath::root(),
            &mut set,
            &mut seen,
            &mut failed_subtrees,
        )
        .await?;

        // Journaled entries never encountered in the walk are gone locally,
        // unless they live under a subtree the walk could not read.
        let records = self.journal.scan_prefix(&SyncPath::root()).await?;
        for record in records {
            if seen.contains(record.path()) {
                continue;
            }
            if failed_subtrees
                .iter()
                .any(|p| record.path() == p || record.path().is_descendant_of(p))
            {
                continue;
            }
            debug!(path = %record.path(), "local entry removed");
            set.push(ChangeRecord::new(
                record.path().clone(),
                Side::Local,
                ChangeKind::Removed,
                ObservedMeta {
                    kind: Some(record.kind()),
                    ..ObservedMeta::default()
                },
            ));
        }

        Ok(set)
    }

    fn walk<'a>(
        &'a self,
        dir: &'a Path,
        rel: &'a SyncPath,
        set: &'a mut ChangeSet,
        seen: &'a mut HashSet<SyncPath>,
        failed_subtrees: &'a mut Vec<SyncPath>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut entries = match tokio::fs::read_dir(dir).await {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(path = %dir.display(), %err, "unreadable directory, skipping subtree");
                    set.record_scan_error(rel.clone(), err.to_string());
                    failed_subtrees.push(rel.clone());
                    return Ok(());
                }
            };

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(err) => {
                        set.record_scan_error(rel.clone(), err.to_string());
                        failed_subtrees.push(rel.clone());
                        return Ok(());
                    }
                };

                let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                    // Non-UTF-8 names cannot be represented remotely.
                    warn!(path = ?entry.path(), "entry name is not valid UTF-8");
                    set.record_excluded(rel.clone(), "entry name is not valid UTF-8".to_string());
                    continue;
                };

                let child = match rel.join(&name) {
                    Ok(p) => p,
                    Err(err) => {
                        set.record_excluded(rel.clone(), err.to_string());
                        continue;
                    }
                };

                if let Some(reason) = invalid_name_reason(&name) {
                    set.record_excluded(child, reason);
                    continue;
                }
                if let Some(hit) = self.ignore.matched(child.as_str(), &name) {
                    set.record_excluded(child, format!("ignore pattern '{}'", hit.pattern));
                    continue;
                }

                // An entry can vanish between the directory read and the
                // stat; that loses this entry, not the run.
                let file_type = match entry.file_type().await {
                    Ok(file_type) => file_type,
                    Err(err) => {
                        warn!(path = %child, %err, "cannot stat entry, skipping");
                        set.record_scan_error(child.clone(), err.to_string());
                        failed_subtrees.push(child);
                        continue;
                    }
                };
                if file_type.is_symlink() {
                    set.record_excluded(child, "symbolic link".to_string());
                    continue;
                }

                let metadata = match entry.metadata().await {
                    Ok(metadata) => metadata,
                    Err(err) => {
                        warn!(path = %child, %err, "cannot stat entry, skipping");
                        set.record_scan_error(child.clone(), err.to_string());
                        failed_subtrees.push(child);
                        continue;
                    }
                };
                seen.insert(child.clone());

                if file_type.is_dir() {
                    if self.journal.get(&child).await?.is_none() {
                        set.push(ChangeRecord::new(
                            child.clone(),
                            Side::Local,
                            ChangeKind::Added,
                            ObservedMeta {
                                kind: Some(EntryKind::Directory),
                                ..ObservedMeta::default()
                            },
                        ));
                    }
                    self.walk(&entry.path(), &child, set, seen, failed_subtrees)
                        .await?;
                } else {
                    let fingerprint = fingerprint_of(&metadata);
                    let kind = match self.journal.get(&child).await? {
                        None => ChangeKind::Added,
                        Some(record) if !record.fingerprint().same_content(&fingerprint) => {
                            debug!(path = %child, "local fingerprint changed");
                            ChangeKind::Modified
                        }
                        Some(record) if record.fingerprint().mode_differs(&fingerprint) => {
                            // Same bytes, different permission bits: a
                            // metadata-only change, no content to hash.
                            debug!(path = %child, "local permission bits changed");
                            set.push(ChangeRecord::new(
                                child,
                                Side::Local,
                                ChangeKind::PermissionsChanged,
                                ObservedMeta {
                                    kind: Some(EntryKind::File),
                                    size: Some(fingerprint.size),
                                    inode: Some(fingerprint.inode),
                                    mtime: Some(fingerprint.mtime),
                                    ..ObservedMeta::default()
                                },
                            ));
                            continue;
                        }
                        Some(_) => continue,
                    };

                    // Content hash for changed files only: discovery needs it
                    // to recognize convergent two-sided edits.
                    let checksum = match tokio::fs::read(entry.path()).await {
                        Ok(bytes) => compute_checksum(&bytes),
                        Err(err) => {
                            set.record_scan_error(child.clone(), err.to_string());
                            failed_subtrees.push(child);
                            continue;
                        }
                    };

                    set.push(ChangeRecord::new(
                        child,
                        Side::Local,
                        kind,
                        ObservedMeta {
                            kind: Some(EntryKind::File),
                            size: Some(fingerprint.size),
                            inode: Some(fingerprint.inode),
                            mtime: Some(fingerprint.mtime),
                            checksum: Some(checksum),
                            ..ObservedMeta::default()
                        },
                    ));
                }
            }

            Ok(())
        })
    }
}

/// Extract the change-detection fingerprint from file metadata.
fn fingerprint_of(metadata: &std::fs::Metadata) -> LocalFingerprint {
    #[cfg(unix)]
    let (inode, mode) = (
        std::os::unix::fs::MetadataExt::ino(metadata),
        std::os::unix::fs::MetadataExt::mode(metadata) & 0o7777,
    );
    #[cfg(not(unix))]
    let (inode, mode) = (0, 0);

    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs() as i64);

    LocalFingerprint {
        inode,
        mtime,
        size: metadata.len(),
        mode,
    }
}
