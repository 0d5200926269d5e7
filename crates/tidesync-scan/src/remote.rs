//! Remote tree scanner
//!
//! Lists remote directories through the remote port and diffs each listing
//! against the journal. Two properties keep the traffic proportional to the
//! change volume rather than the tree size:
//!
//! - an unchanged directory etag short-circuits descent into that subtree;
//! - entries are identified by their stable remote id, so a known id at a
//!   new path becomes `Renamed{from}` instead of an add/remove pair.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, warn};

use tidesync_core::domain::change::{ChangeKind, ChangeRecord, ChangeSet, ObservedMeta, Side};
use tidesync_core::domain::journal_record::EntryKind;
use tidesync_core::domain::newtypes::SyncPath;
use tidesync_core::ports::{JournalStore, RemoteEntry, RemoteStore};

use crate::ignore::IgnoreMatcher;
use crate::names::invalid_name_reason;

/// Scans the remote tree for changes relative to the journal.
pub struct RemoteScanner {
    remote: Arc<dyn RemoteStore>,
    journal: Arc<dyn JournalStore>,
    ignore: Arc<IgnoreMatcher>,
}

impl RemoteScanner {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        journal: Arc<dyn JournalStore>,
        ignore: Arc<IgnoreMatcher>,
    ) -> Self {
        Self {
            remote,
            journal,
            ignore,
        }
    }

    /// One full scan pass: breadth-first listing with etag short-circuit,
    /// then a journal sweep for entries gone from the remote.
    pub async fn scan(&self) -> anyhow::Result<ChangeSet> {
        let mut set = ChangeSet::new();
        let mut seen: HashSet<SyncPath> = HashSet::new();
        // Subtrees whose journal entries must not be swept as removed:
        // unchanged (short-circuited), unlistable, or rename sources.
        let mut pruned: Vec<SyncPath> = Vec::new();

        let records = self.journal.all().await?;
        let by_path: HashMap<SyncPath, _> = records
            .iter()
            .map(|r| (r.path().clone(), r.clone()))
            .collect();
        let by_id: HashMap<String, SyncPath> = records
            .iter()
            .map(|r| (r.remote_id().as_str().to_string(), r.path().clone()))
            .collect();

        let mut queue: VecDeque<SyncPath> = VecDeque::new();
        queue.push_back(SyncPath::root());

        while let Some(dir) = queue.pop_front() {
            let entries = match self.remote.list(&dir).await {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(path = %dir, %err, "remote listing failed, skipping subtree");
                    set.record_scan_error(dir.clone(), err.to_string());
                    pruned.push(dir);
                    continue;
                }
            };

            for entry in entries {
                let Some(name) = entry.path.file_name().map(str::to_owned) else {
                    continue;
                };
                if let Some(reason) = invalid_name_reason(&name) {
                    set.record_excluded(entry.path.clone(), reason);
                    if entry.kind == EntryKind::Directory {
                        pruned.push(entry.path.clone());
                    }
                    continue;
                }
                if let Some(hit) = self.ignore.matched(entry.path.as_str(), &name) {
                    set.record_excluded(
                        entry.path.clone(),
                        format!("ignore pattern '{}'", hit.pattern),
                    );
                    if entry.kind == EntryKind::Directory {
                        pruned.push(entry.path.clone());
                    }
                    continue;
                }

                seen.insert(entry.path.clone());

                match by_path.get(&entry.path) {
                    Some(record) if record.etag() == &entry.etag => {
                        // Unchanged. For directories this prunes the whole
                        // subtree from both descent and the removal sweep.
                        if entry.kind == EntryKind::Directory {
                            debug!(path = %entry.path, "directory etag unchanged, skipping subtree");
                            pruned.push(entry.path.clone());
                        }
                    }
                    Some(record) => {
                        let kind = classify_changed(record, &entry);
                        set.push(ChangeRecord::new(
                            entry.path.clone(),
                            Side::Remote,
                            kind,
                            observed_of(&entry),
                        ));
                        if entry.kind == EntryKind::Directory {
                            queue.push_back(entry.path.clone());
                        }
                    }
                    None => {
                        let kind = match by_id.get(entry.id.as_str()) {
                            Some(old_path) if old_path != &entry.path => {
                                debug!(path = %entry.path, from = %old_path, "remote rename detected");
                                // The old location is accounted for by the
                                // rename; keep the sweep away from it.
                                seen.insert(old_path.clone());
                                if entry.kind == EntryKind::Directory {
                                    pruned.push(old_path.clone());
                                }
                                ChangeKind::Renamed {
                                    from: old_path.clone(),
                                }
                            }
                            _ => ChangeKind::Added,
                        };
                        set.push(ChangeRecord::new(
                            entry.path.clone(),
                            Side::Remote,
                            kind,
                            observed_of(&entry),
                        ));
                        if entry.kind == EntryKind::Directory {
                            queue.push_back(entry.path.clone());
                        }
                    }
                }
            }
        }

        // Journaled entries never listed are gone remotely, unless they sit
        // under a pruned subtree.
        for record in &records {
            if seen.contains(record.path()) {
                continue;
            }
            if pruned
                .iter()
                .any(|p| record.path() == p || record.path().is_descendant_of(p))
            {
                continue;
            }
            debug!(path = %record.path(), "remote entry removed");
            set.push(ChangeRecord::new(
                record.path().clone(),
                Side::Remote,
                ChangeKind::Removed,
                ObservedMeta {
                    kind: Some(record.kind()),
                    ..ObservedMeta::default()
                },
            ));
        }

        Ok(set)
    }
}

/// Decide what kind of change a differing etag represents.
fn classify_changed(
    record: &tidesync_core::domain::journal_record::JournalRecord,
    entry: &RemoteEntry,
) -> ChangeKind {
    let content_unchanged = record.size() == entry.size
        && match (record.checksum(), entry.checksum.as_ref()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
    if content_unchanged && record.permissions() != entry.permissions {
        ChangeKind::PermissionsChanged
    } else {
        ChangeKind::Modified
    }
}

fn observed_of(entry: &RemoteEntry) -> ObservedMeta {
    ObservedMeta {
        kind: Some(entry.kind),
        size: Some(entry.size),
        modified: Some(entry.modified),
        checksum: entry.checksum.clone(),
        etag: Some(entry.etag.clone()),
        remote_id: Some(entry.id.clone()),
        permissions: Some(entry.permissions),
        ..ObservedMeta::default()
    }
}
