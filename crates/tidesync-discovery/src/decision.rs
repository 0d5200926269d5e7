//! The per-path tie-break
//!
//! [`decide`] is a pure function from (local change, remote change, journal
//! context) to at most one instruction. All I/O stays in the coordinator,
//! which keeps every row of the decision table unit-testable in isolation.
//!
//! Resolution rules, in table form:
//!
//! | Local     | Remote                      | Instruction                  |
//! |-----------|-----------------------------|------------------------------|
//! | unchanged | unchanged                   | none                         |
//! | changed   | unchanged                   | upload / mkdir remote        |
//! | unchanged | changed                     | download / mkdir local       |
//! | changed   | changed, same checksum      | metadata reconcile           |
//! | changed   | changed, different checksum | conflict (remote wins)       |
//! | removed   | unchanged                   | delete remote (policy-gated) |
//! | unchanged | removed                     | delete local                 |
//! | removed   | removed                     | journal cleanup              |
//! | changed   | removed                     | re-upload (local wins)       |
//! | removed   | changed                     | re-download (remote wins)    |
//!
//! Permission gating downgrades a remote mutation the server would refuse
//! into a `PolicyRestore` instruction instead of attempting it.

use tidesync_core::domain::change::{ChangeKind, ChangeRecord};
use tidesync_core::domain::instruction::{SourceSide, SyncAction, SyncInstruction};
use tidesync_core::domain::journal_record::{EntryKind, JournalRecord, Permissions, PinState};
use tidesync_core::domain::newtypes::SyncPath;

/// Journal-derived context for one path's decision.
pub struct PathContext {
    /// Journal record at this path, if the entry ever synced
    pub record: Option<JournalRecord>,
    /// Journal record of the parent directory (capability source for
    /// creations)
    pub parent: Option<JournalRecord>,
    /// Effective pin state (own record's, or inherited from the nearest
    /// pinned ancestor)
    pub pin: PinState,
    /// Set when the remote entry that lived here was renamed away this run;
    /// a simultaneous local edit then becomes a conflict
    pub renamed_away_to: Option<SyncPath>,
}

impl PathContext {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            record: None,
            parent: None,
            pin: PinState::Unspecified,
            renamed_away_to: None,
        }
    }
}

/// Resolve one path. Returns `None` when nothing needs doing.
#[must_use]
pub fn decide(
    path: &SyncPath,
    local: Option<&ChangeRecord>,
    remote: Option<&ChangeRecord>,
    ctx: &PathContext,
) -> Option<SyncInstruction> {
    match (local, remote) {
        (None, None) => None,
        (Some(local), None) => {
            if ctx.renamed_away_to.is_some() && is_content_change(local) {
                // The remote entry moved elsewhere while the local copy was
                // edited in place: rename + modify across sides.
                return Some(conflict_without_remote(path, local, ctx));
            }
            decide_local_only(path, local, ctx)
        }
        (None, Some(remote)) => decide_remote_only(path, remote, ctx),
        (Some(local), Some(remote)) => decide_both(path, local, remote, ctx),
    }
}

fn is_content_change(change: &ChangeRecord) -> bool {
    matches!(change.kind, ChangeKind::Added | ChangeKind::Modified)
}

fn kind_of(change: &ChangeRecord, ctx: &PathContext) -> EntryKind {
    change
        .observed
        .kind
        .or_else(|| ctx.record.as_ref().map(JournalRecord::kind))
        .unwrap_or(EntryKind::File)
}

// ============================================================================
// Single-sided changes
// ============================================================================

fn decide_local_only(
    path: &SyncPath,
    local: &ChangeRecord,
    ctx: &PathContext,
) -> Option<SyncInstruction> {
    match &local.kind {
        ChangeKind::Added | ChangeKind::Modified => {
            let kind = kind_of(local, ctx);
            if kind == EntryKind::Directory {
                return Some(gate_parent(
                    Permissions::ADD_DIR,
                    "create directory",
                    ctx,
                    SyncInstruction::new(
                        path.clone(),
                        kind,
                        SyncAction::MkdirRemote,
                        SourceSide::Local,
                    ),
                ));
            }

            let mut instruction =
                SyncInstruction::new(path.clone(), kind, SyncAction::Upload, SourceSide::Local)
                    .with_expected_size(local.observed.size.unwrap_or(0));
            if let Some(checksum) = &local.observed.checksum {
                instruction = instruction.with_expected_checksum(checksum.clone());
            }
            match &ctx.record {
                Some(record) => {
                    // Overwrite of a synced entry: needs the update
                    // capability and an etag precondition.
                    instruction = instruction
                        .with_remote_id(record.remote_id().clone())
                        .with_expected_etag(record.etag().clone());
                    Some(gate_record(
                        Permissions::UPDATE,
                        "update content",
                        ctx,
                        instruction,
                    ))
                }
                None => Some(gate_parent(
                    Permissions::ADD_FILE,
                    "add file",
                    ctx,
                    instruction,
                )),
            }
        }
        ChangeKind::Removed => {
            let record = ctx.record.as_ref()?;
            let instruction = SyncInstruction::new(
                path.clone(),
                record.kind(),
                SyncAction::DeleteRemote,
                SourceSide::Local,
            )
            .with_remote_id(record.remote_id().clone())
            .with_expected_etag(record.etag().clone());
            Some(gate_record(
                Permissions::DELETE,
                "delete",
                ctx,
                instruction,
            ))
        }
        ChangeKind::Renamed { from } => {
            // Local rename matched by the coordinator; ctx.record is the
            // journal record at the old path.
            let record = ctx.record.as_ref()?;
            let required = if path.parent() == from.parent() {
                Permissions::RENAME
            } else {
                Permissions::MOVE
            };
            let instruction = SyncInstruction::new(
                path.clone(),
                record.kind(),
                SyncAction::MoveRemote { from: from.clone() },
                SourceSide::Local,
            )
            .with_remote_id(record.remote_id().clone())
            .with_expected_etag(record.etag().clone());
            Some(gate_record(required, "rename/move", ctx, instruction))
        }
        ChangeKind::PermissionsChanged => {
            // Content is unchanged; refresh the stored fingerprint so the
            // chmod stops resurfacing every pass.
            let record = ctx.record.as_ref()?;
            Some(
                SyncInstruction::new(
                    path.clone(),
                    record.kind(),
                    SyncAction::UpdateMetadata,
                    SourceSide::Neither,
                )
                .with_remote_id(record.remote_id().clone())
                .with_expected_etag(record.etag().clone()),
            )
        }
    }
}

fn decide_remote_only(
    path: &SyncPath,
    remote: &ChangeRecord,
    ctx: &PathContext,
) -> Option<SyncInstruction> {
    match &remote.kind {
        ChangeKind::Added | ChangeKind::Modified => {
            let kind = kind_of(remote, ctx);
            let action = match (kind, &remote.kind) {
                (EntryKind::Directory, ChangeKind::Added) => SyncAction::MkdirLocal,
                // A directory's etag moves when children change; the row
                // itself only needs its metadata refreshed.
                (EntryKind::Directory, _) => SyncAction::UpdateMetadata,
                (EntryKind::File, _) => SyncAction::Download,
            };
            let source = if action == SyncAction::UpdateMetadata {
                SourceSide::Neither
            } else {
                SourceSide::Remote
            };
            Some(
                with_remote_meta(
                    SyncInstruction::new(path.clone(), kind, action, source),
                    remote,
                )
                .with_pin_state(ctx.pin),
            )
        }
        ChangeKind::Removed => {
            let kind = kind_of(remote, ctx);
            Some(SyncInstruction::new(
                path.clone(),
                kind,
                SyncAction::DeleteLocal,
                SourceSide::Remote,
            ))
        }
        ChangeKind::Renamed { from } => {
            let kind = kind_of(remote, ctx);
            Some(with_remote_meta(
                SyncInstruction::new(
                    path.clone(),
                    kind,
                    SyncAction::RenameLocal { from: from.clone() },
                    SourceSide::Remote,
                ),
                remote,
            ))
        }
        ChangeKind::PermissionsChanged => Some(
            with_remote_meta(
                SyncInstruction::new(
                    path.clone(),
                    kind_of(remote, ctx),
                    SyncAction::UpdateMetadata,
                    SourceSide::Neither,
                ),
                remote,
            ),
        ),
    }
}

// ============================================================================
// Two-sided changes
// ============================================================================

fn decide_both(
    path: &SyncPath,
    local: &ChangeRecord,
    remote: &ChangeRecord,
    ctx: &PathContext,
) -> Option<SyncInstruction> {
    match (&local.kind, &remote.kind) {
        (ChangeKind::Removed, ChangeKind::Removed) => {
            ctx.record.as_ref()?;
            Some(SyncInstruction::new(
                path.clone(),
                kind_of(remote, ctx),
                SyncAction::JournalCleanup,
                SourceSide::Neither,
            ))
        }
        // Delete versus edit: the surviving content wins.
        (ChangeKind::Removed, _) => decide_remote_only(path, remote, ctx),
        (_, ChangeKind::Removed) => {
            // The remote entry is gone, so this is a fresh upload: no etag
            // precondition, capability comes from the parent.
            let kind = kind_of(local, ctx);
            if kind == EntryKind::Directory {
                return Some(gate_parent(
                    Permissions::ADD_DIR,
                    "create directory",
                    ctx,
                    SyncInstruction::new(
                        path.clone(),
                        kind,
                        SyncAction::MkdirRemote,
                        SourceSide::Local,
                    ),
                ));
            }
            let mut instruction =
                SyncInstruction::new(path.clone(), kind, SyncAction::Upload, SourceSide::Local)
                    .with_expected_size(local.observed.size.unwrap_or(0));
            if let Some(checksum) = &local.observed.checksum {
                instruction = instruction.with_expected_checksum(checksum.clone());
            }
            Some(gate_parent(
                Permissions::ADD_FILE,
                "add file",
                ctx,
                instruction,
            ))
        }
        (local_kind, _) if is_content_change(local) || matches!(local_kind, ChangeKind::Renamed { .. }) => {
            // Both sides carry content-relevant changes.
            let convergent = match (&local.observed.checksum, &remote.observed.checksum) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            };
            let renames_involved = matches!(local.kind, ChangeKind::Renamed { .. })
                || matches!(remote.kind, ChangeKind::Renamed { .. });
            if convergent && !renames_involved {
                // Same bytes on both sides: nothing to transfer, commit the
                // remote identity to the journal.
                return Some(with_remote_meta(
                    SyncInstruction::new(
                        path.clone(),
                        kind_of(remote, ctx),
                        SyncAction::UpdateMetadata,
                        SourceSide::Neither,
                    ),
                    remote,
                ));
            }
            if matches!(remote.kind, ChangeKind::PermissionsChanged) {
                // Remote content did not change; the local edit may proceed.
                return decide_local_only(path, local, ctx);
            }
            Some(
                with_remote_meta(
                    SyncInstruction::new(
                        path.clone(),
                        kind_of(remote, ctx),
                        SyncAction::Conflict,
                        SourceSide::Remote,
                    ),
                    remote,
                )
                .with_pin_state(ctx.pin),
            )
        }
        _ => decide_remote_only(path, remote, ctx),
    }
}

/// Conflict where the remote half moved away: the local bytes are preserved
/// under a conflict-marked name, with nothing to download here.
fn conflict_without_remote(
    path: &SyncPath,
    local: &ChangeRecord,
    ctx: &PathContext,
) -> SyncInstruction {
    SyncInstruction::new(
        path.clone(),
        kind_of(local, ctx),
        SyncAction::Conflict,
        SourceSide::Remote,
    )
}

// ============================================================================
// Helpers
// ============================================================================

fn with_remote_meta(mut instruction: SyncInstruction, remote: &ChangeRecord) -> SyncInstruction {
    if let Some(id) = &remote.observed.remote_id {
        instruction = instruction.with_remote_id(id.clone());
    }
    if let Some(etag) = &remote.observed.etag {
        instruction = instruction.with_expected_etag(etag.clone());
    }
    if let Some(checksum) = &remote.observed.checksum {
        instruction = instruction.with_expected_checksum(checksum.clone());
    }
    instruction.with_expected_size(remote.observed.size.unwrap_or(0))
}

/// Downgrade to `PolicyRestore` when the entry's own record lacks a
/// capability.
fn gate_record(
    required: Permissions,
    denied: &str,
    ctx: &PathContext,
    instruction: SyncInstruction,
) -> SyncInstruction {
    match &ctx.record {
        Some(record) if !record.permissions().contains(required) => {
            policy_restore(instruction, denied)
        }
        _ => instruction,
    }
}

/// Downgrade to `PolicyRestore` when the parent directory's record lacks a
/// capability. A missing parent record (parent is new too) passes; the
/// server is the final authority.
fn gate_parent(
    required: Permissions,
    denied: &str,
    ctx: &PathContext,
    instruction: SyncInstruction,
) -> SyncInstruction {
    match &ctx.parent {
        Some(parent) if !parent.permissions().contains(required) => {
            policy_restore(instruction, denied)
        }
        _ => instruction,
    }
}

fn policy_restore(instruction: SyncInstruction, denied: &str) -> SyncInstruction {
    SyncInstruction::new(
        instruction.path,
        instruction.kind,
        SyncAction::PolicyRestore {
            denied: denied.to_string(),
        },
        SourceSide::Neither,
    )
}
