//! Discovery coordinator - folds two change sets into one instruction list
//!
//! Runs the bookkeeping around the pure per-path tie-break: local rename
//! matching (an add and a remove that share a fingerprint become one move),
//! remote rename cascade filtering, the failure blacklist gate and pin-state
//! inheritance. Output is ordered for safe execution: parents before
//! children on creation, children before parents on deletion, deletions
//! last.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info};

use tidesync_core::domain::change::{ChangeKind, ChangeRecord, ChangeSet};
use tidesync_core::domain::events::SkipReason;
use tidesync_core::domain::instruction::{order_instructions, SyncInstruction};
use tidesync_core::domain::journal_record::{EntryKind, JournalRecord, PinState};
use tidesync_core::domain::newtypes::SyncPath;
use tidesync_core::ports::journal_store::JournalStore;

use crate::decision::{decide, PathContext};

/// Instructions plus the paths discovery decided not to touch.
#[derive(Debug, Default)]
pub struct DiscoveryOutcome {
    /// Ordered instructions for the propagation stage
    pub instructions: Vec<SyncInstruction>,
    /// Paths skipped before propagation, with the reason
    pub skipped: Vec<(SyncPath, SkipReason)>,
}

pub struct DiscoveryCoordinator {
    journal: Arc<dyn JournalStore>,
}

impl DiscoveryCoordinator {
    pub fn new(journal: Arc<dyn JournalStore>) -> Self {
        Self { journal }
    }

    /// Reconcile one run's local and remote change sets against the journal.
    pub async fn reconcile(
        &self,
        local: &ChangeSet,
        remote: &ChangeSet,
    ) -> Result<DiscoveryOutcome> {
        let records: BTreeMap<SyncPath, JournalRecord> = self
            .journal
            .all()
            .await
            .context("loading journal for reconciliation")?
            .into_iter()
            .map(|r| (r.path().clone(), r))
            .collect();

        let local_changes = match_local_renames(local, &records);
        let (mut remote_changes, rename_sources) = collapse_remote_renames(remote);

        // A remote rename whose origin also carries a local edit cannot be
        // replayed as a local rename: the edited file must stay behind as a
        // conflict copy. The new path gets the content by download instead.
        for (from, to) in &rename_sources {
            let locally_edited = local_changes.get(from).is_some_and(|c| {
                matches!(c.kind, ChangeKind::Added | ChangeKind::Modified)
            });
            if locally_edited {
                if let Some(change) = remote_changes.get_mut(to) {
                    debug!(from = %from, to = %to, "rename origin edited locally, downloading instead");
                    change.kind = ChangeKind::Added;
                }
            }
        }

        let mut paths: BTreeSet<SyncPath> = BTreeSet::new();
        paths.extend(local_changes.keys().cloned());
        paths.extend(remote_changes.keys().cloned());

        let now = Utc::now();
        let mut outcome = DiscoveryOutcome::default();

        for path in &paths {
            let local_change = local_changes.get(path);
            let remote_change = remote_changes.get(path);

            // For a matched local rename the relevant journal row is the one
            // at the origin path; the target path has never synced.
            let record = match local_change.map(|c| &c.kind) {
                Some(ChangeKind::Renamed { from }) => records.get(from),
                _ => records.get(path),
            };

            if let Some(record) = record {
                if record.is_blacklisted(now) {
                    debug!(path = %path, until = ?record.retry_after(), "skipping blacklisted path");
                    outcome.skipped.push((path.clone(), SkipReason::Blacklisted));
                    continue;
                }
            }

            let ctx = PathContext {
                record: record.cloned(),
                parent: path.parent().and_then(|p| records.get(&p)).cloned(),
                pin: effective_pin(path, &records),
                renamed_away_to: rename_sources.get(path).cloned(),
            };

            if let Some(instruction) = decide(path, local_change, remote_change, &ctx) {
                debug!(
                    path = %path,
                    action = instruction.action.name(),
                    source = ?instruction.source,
                    "resolved"
                );
                outcome.instructions.push(instruction);
            }
        }

        order_instructions(&mut outcome.instructions);
        info!(
            instructions = outcome.instructions.len(),
            skipped = outcome.skipped.len(),
            "reconciliation complete"
        );
        Ok(outcome)
    }
}

// ============================================================================
// Local rename matching
// ============================================================================

/// Pair local add/remove changes whose journaled fingerprint (inode + size)
/// matches the added file into a single rename change at the new path.
///
/// Inode reuse makes the fingerprint a heuristic; it is only trusted when
/// both inode and size agree, and only across a remove/add pair within the
/// same pass.
fn match_local_renames(
    local: &ChangeSet,
    records: &BTreeMap<SyncPath, JournalRecord>,
) -> BTreeMap<SyncPath, ChangeRecord> {
    // Fingerprints of files that vanished this pass, keyed by (inode, size).
    let mut vanished: HashMap<(u64, u64), SyncPath> = HashMap::new();
    for change in local.iter() {
        if change.kind != ChangeKind::Removed {
            continue;
        }
        if let Some(record) = records.get(&change.path) {
            if record.kind() == EntryKind::File && record.fingerprint().inode != 0 {
                vanished.insert(
                    (record.fingerprint().inode, record.fingerprint().size),
                    change.path.clone(),
                );
            }
        }
    }

    let mut consumed: BTreeSet<SyncPath> = BTreeSet::new();
    let mut out: BTreeMap<SyncPath, ChangeRecord> = BTreeMap::new();

    for change in local.iter() {
        if change.kind == ChangeKind::Added && change.observed.kind == Some(EntryKind::File) {
            let key = (
                change.observed.inode.unwrap_or(0),
                change.observed.size.unwrap_or(0),
            );
            if key.0 != 0 {
                if let Some(from) = vanished.get(&key) {
                    if !consumed.contains(from) {
                        debug!(from = %from, to = %change.path, "matched local rename");
                        consumed.insert(from.clone());
                        let mut renamed = change.clone();
                        renamed.kind = ChangeKind::Renamed { from: from.clone() };
                        out.insert(change.path.clone(), renamed);
                        continue;
                    }
                }
            }
        }
        out.insert(change.path.clone(), change.clone());
    }

    for from in consumed {
        out.remove(&from);
    }
    out
}

// ============================================================================
// Remote rename cascades
// ============================================================================

/// Drop remote renames that are implied by a renamed ancestor directory:
/// moving `a` to `b` already carries `a/f.txt` to `b/f.txt`, so the child's
/// rename record is redundant (and would race the parent's).
///
/// Returns the filtered change map plus an origin-to-target index of the
/// surviving renames, used to detect edits under a renamed-away path.
fn collapse_remote_renames(
    remote: &ChangeSet,
) -> (BTreeMap<SyncPath, ChangeRecord>, HashMap<SyncPath, SyncPath>) {
    let renames: Vec<(SyncPath, SyncPath)> = remote
        .iter()
        .filter_map(|c| match &c.kind {
            ChangeKind::Renamed { from } => Some((from.clone(), c.path.clone())),
            _ => None,
        })
        .collect();

    let implied = |from: &SyncPath, to: &SyncPath| -> bool {
        renames.iter().any(|(anc_from, anc_to)| {
            from.is_descendant_of(anc_from)
                && from
                    .rebase(anc_from, anc_to)
                    .is_ok_and(|rebased| &rebased == to)
        })
    };

    let mut out: BTreeMap<SyncPath, ChangeRecord> = BTreeMap::new();
    let mut sources: HashMap<SyncPath, SyncPath> = HashMap::new();

    for change in remote.iter() {
        if let ChangeKind::Renamed { from } = &change.kind {
            if implied(from, &change.path) {
                debug!(from = %from, to = %change.path, "rename implied by ancestor, dropped");
                continue;
            }
            sources.insert(from.clone(), change.path.clone());
        }
        out.insert(change.path.clone(), change.clone());
    }
    (out, sources)
}

// ============================================================================
// Pin inheritance
// ============================================================================

/// Effective pin state: the path's own journaled pin if explicit, otherwise
/// the nearest explicitly pinned ancestor's.
fn effective_pin(path: &SyncPath, records: &BTreeMap<SyncPath, JournalRecord>) -> PinState {
    let mut cursor = Some(path.clone());
    while let Some(p) = cursor {
        if let Some(record) = records.get(&p) {
            if record.pin_state() != PinState::Unspecified {
                return record.pin_state();
            }
        }
        cursor = p.parent();
    }
    PinState::Unspecified
}
