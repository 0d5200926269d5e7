//! Propagation jobs - one executor for every instruction kind
//!
//! A single `match` over [`SyncAction`] performs each job; there is no
//! per-job type hierarchy. Every arm follows the same protocol: perform the
//! side effect, confirm it (status, etag, id), then commit the journal.
//! Downloads verify the declared checksum before anything touches the
//! target path; reconstruction writes land in a temp file that is renamed
//! into place.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use tidesync_codec::{
    apply_delta, compute_checksum, plan_delta, verify_checksum, BlockManifest, ChecksumStatus,
    CodecError, LiteralChunk,
};
use tidesync_core::config::TransfersConfig;
use tidesync_core::domain::errors::SyncError;
use tidesync_core::domain::events::{SkipReason, SyncEvent};
use tidesync_core::domain::instruction::{SyncAction, SyncInstruction};
use tidesync_core::domain::journal_record::{
    EntryKind, JournalRecord, LocalFingerprint, Permissions, PinState, UploadInfo,
};
use tidesync_core::domain::newtypes::{Checksum, Etag, RemoteId, SyncPath};
use tidesync_core::ports::journal_store::JournalStore;
use tidesync_core::ports::remote_store::{PutResult, RemoteError, RemoteStore};

const MIB: u64 = 1024 * 1024;

/// Terminal result of one executed job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Side effect performed and journal committed
    Committed {
        bytes_uploaded: u64,
        bytes_downloaded: u64,
    },
    /// Not attempted; the reason is recorded
    Skipped(SkipReason),
    /// Conflict resolved: local bytes preserved, remote content (if any)
    /// materialized at the path
    ConflictResolved {
        conflict_copy: SyncPath,
        bytes_downloaded: u64,
    },
}

impl JobOutcome {
    fn committed_down(bytes: u64) -> Self {
        Self::Committed {
            bytes_uploaded: 0,
            bytes_downloaded: bytes,
        }
    }

    fn committed_up(bytes: u64) -> Self {
        Self::Committed {
            bytes_uploaded: bytes,
            bytes_downloaded: 0,
        }
    }

    fn bookkeeping() -> Self {
        Self::Committed {
            bytes_uploaded: 0,
            bytes_downloaded: 0,
        }
    }
}

/// Executes instructions against the local tree, the remote store and the
/// journal.
pub struct JobExecutor {
    root: PathBuf,
    journal: Arc<dyn JournalStore>,
    remote: Arc<dyn RemoteStore>,
    transfers: TransfersConfig,
    events: Option<broadcast::Sender<SyncEvent>>,
}

impl JobExecutor {
    pub fn new(
        root: PathBuf,
        journal: Arc<dyn JournalStore>,
        remote: Arc<dyn RemoteStore>,
        transfers: TransfersConfig,
    ) -> Self {
        Self {
            root,
            journal,
            remote,
            transfers,
            events: None,
        }
    }

    /// Attach the broadcast channel for transfer progress events.
    #[must_use]
    pub fn with_events(mut self, events: broadcast::Sender<SyncEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit_progress(&self, path: &SyncPath, bytes_transferred: u64, bytes_total: u64) {
        if let Some(events) = &self.events {
            let _ = events.send(SyncEvent::ItemProgress {
                path: path.clone(),
                bytes_transferred,
                bytes_total,
            });
        }
    }

    /// Execute one instruction. `force_full` disables delta/resume paths
    /// (the integrity-fallback retry).
    pub async fn execute(
        &self,
        instruction: &SyncInstruction,
        force_full: bool,
    ) -> Result<JobOutcome, SyncError> {
        debug!(path = %instruction.path, action = instruction.action.name(), "executing job");
        match &instruction.action {
            SyncAction::Upload => self.upload(instruction, force_full).await,
            SyncAction::Download => self.download(instruction, force_full).await,
            SyncAction::MkdirRemote => self.mkdir_remote(instruction).await,
            SyncAction::MkdirLocal => self.mkdir_local(instruction).await,
            SyncAction::DeleteRemote => self.delete_remote(instruction).await,
            SyncAction::DeleteLocal => self.delete_local(instruction).await,
            SyncAction::MoveRemote { from } => self.move_remote(instruction, from).await,
            SyncAction::RenameLocal { from } => self.rename_local(instruction, from).await,
            SyncAction::Conflict => self.conflict(instruction).await,
            SyncAction::UpdateMetadata => self.update_metadata(instruction).await,
            SyncAction::JournalCleanup => self.journal_cleanup(instruction).await,
            SyncAction::PolicyRestore { denied } => Ok(JobOutcome::Skipped(
                SkipReason::PolicyViolation(denied.clone()),
            )),
        }
    }

    // ========================================================================
    // Upload
    // ========================================================================

    async fn upload(
        &self,
        instruction: &SyncInstruction,
        force_full: bool,
    ) -> Result<JobOutcome, SyncError> {
        let local_path = instruction.path.to_local(&self.root);
        let bytes = tokio::fs::read(&local_path)
            .await
            .map_err(|e| SyncError::LocalIo(format!("{}: {e}", local_path.display())))?;
        let metadata = tokio::fs::metadata(&local_path)
            .await
            .map_err(|e| SyncError::LocalIo(e.to_string()))?;
        let fingerprint = fingerprint_of(&metadata);
        let checksum = compute_checksum(&bytes);

        // Creates must not collide case-insensitively with an existing
        // sibling; servers backed by case-preserving stores reject or, worse,
        // overwrite.
        if instruction.remote_id.is_none() {
            self.check_case_clash(&instruction.path).await?;
        }

        let size = bytes.len() as u64;
        let result = if size >= self.transfers.chunked_upload_threshold_mb * MIB {
            self.upload_chunked(instruction, &bytes, &fingerprint, &checksum, force_full)
                .await?
        } else {
            self.remote
                .put(
                    &instruction.path,
                    &bytes,
                    instruction.expected_etag.as_ref(),
                )
                .await?
        };

        self.commit_file(
            instruction,
            result,
            Some(checksum),
            size,
            fingerprint,
        )
        .await?;
        info!(path = %instruction.path, size, "uploaded");
        Ok(JobOutcome::committed_up(size))
    }

    async fn upload_chunked(
        &self,
        instruction: &SyncInstruction,
        bytes: &[u8],
        fingerprint: &LocalFingerprint,
        checksum: &Checksum,
        force_full: bool,
    ) -> Result<PutResult, SyncError> {
        let chunk_size = (self.transfers.chunk_size_mb * MIB) as usize;
        let chunk_count = bytes.len().div_ceil(chunk_size) as u32;

        let resume = if force_full {
            None
        } else {
            self.journal
                .upload_info(&instruction.path)
                .await
                .map_err(journal_err)?
                .filter(|info| {
                    info.chunk_count == chunk_count
                        && info.matches(fingerprint.mtime, fingerprint.size, Some(checksum))
                })
        };

        let (transfer_id, start_chunk) = match resume {
            Some(info) => {
                info!(path = %instruction.path, chunk = info.next_chunk, "resuming chunked upload");
                (info.transfer_id, info.next_chunk)
            }
            None => (uuid::Uuid::new_v4().to_string(), 0),
        };

        for index in start_chunk..chunk_count {
            let start = index as usize * chunk_size;
            let end = (start + chunk_size).min(bytes.len());
            self.remote
                .put_chunk(&transfer_id, index, chunk_count, &bytes[start..end])
                .await?;
            self.emit_progress(&instruction.path, end as u64, bytes.len() as u64);
            // Persist progress so an interrupted transfer resumes here.
            self.journal
                .set_upload_info(
                    &instruction.path,
                    &UploadInfo {
                        transfer_id: transfer_id.clone(),
                        next_chunk: index + 1,
                        chunk_count,
                        mtime: fingerprint.mtime,
                        size: fingerprint.size,
                        checksum: Some(checksum.clone()),
                    },
                )
                .await
                .map_err(journal_err)?;
        }

        let result = self
            .remote
            .finish_transfer(
                &transfer_id,
                &instruction.path,
                instruction.expected_etag.as_ref(),
            )
            .await?;
        self.journal
            .clear_upload_info(&instruction.path)
            .await
            .map_err(journal_err)?;
        Ok(result)
    }

    async fn check_case_clash(&self, path: &SyncPath) -> Result<(), SyncError> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        let Some(name) = path.file_name() else {
            return Ok(());
        };
        let siblings = match self.remote.list(&parent).await {
            Ok(siblings) => siblings,
            // A missing parent means nothing can collide yet.
            Err(RemoteError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for sibling in siblings {
            if let Some(other) = sibling.path.file_name() {
                if other != name && other.eq_ignore_ascii_case(name) {
                    return Err(SyncError::CaseClash(format!("{name} vs {other}")));
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Download
    // ========================================================================

    async fn download(
        &self,
        instruction: &SyncInstruction,
        force_full: bool,
    ) -> Result<JobOutcome, SyncError> {
        if instruction.pin_state == PinState::OnlineOnly {
            return self.materialize_placeholder(instruction).await;
        }

        let id = require_remote_id(instruction)?;
        let local_path = instruction.path.to_local(&self.root);

        let (bytes, fetched) = self
            .fetch_content(instruction, id, &local_path, force_full)
            .await?;
        self.emit_progress(&instruction.path, bytes.len() as u64, bytes.len() as u64);

        if let Some(expected) = &instruction.expected_checksum {
            match verify_checksum(expected, &bytes) {
                ChecksumStatus::Match => {}
                ChecksumStatus::Mismatch | ChecksumStatus::AlgorithmMismatch => {
                    return Err(SyncError::ChecksumMismatch {
                        expected: expected.as_str().to_string(),
                        actual: compute_checksum(&bytes).as_str().to_string(),
                    });
                }
            }
        }

        write_atomic(&local_path, &bytes).await?;
        let metadata = tokio::fs::metadata(&local_path)
            .await
            .map_err(|e| SyncError::LocalIo(e.to_string()))?;

        let size = bytes.len() as u64;
        let checksum = instruction
            .expected_checksum
            .clone()
            .unwrap_or_else(|| compute_checksum(&bytes));
        let result = PutResult {
            id: id.clone(),
            etag: self.etag_for(instruction).await?,
        };
        self.commit_file(
            instruction,
            result,
            Some(checksum),
            size,
            fingerprint_of(&metadata),
        )
        .await?;
        info!(path = %instruction.path, size, fetched, "downloaded");
        Ok(JobOutcome::committed_down(fetched))
    }

    /// Fetch remote content, delta-first when a manifest and a usable local
    /// base exist. Returns the full content plus the bytes actually fetched.
    async fn fetch_content(
        &self,
        instruction: &SyncInstruction,
        id: &RemoteId,
        local_path: &std::path::Path,
        force_full: bool,
    ) -> Result<(Vec<u8>, u64), SyncError> {
        let delta_eligible = !force_full
            && instruction.expected_checksum.is_some()
            && instruction.expected_size >= self.transfers.delta_threshold_mb * MIB;

        if delta_eligible {
            if let Ok(base) = tokio::fs::read(local_path).await {
                if let Some(manifest_bytes) = self.remote.get_manifest(id).await? {
                    let manifest =
                        BlockManifest::parse(&manifest_bytes).map_err(codec_err)?;
                    let plan = plan_delta(&manifest, &base);
                    debug!(
                        path = %instruction.path,
                        literal = plan.literal_bytes(),
                        reused = plan.reused_bytes(),
                        "delta plan"
                    );

                    let mut literals = Vec::new();
                    for (offset, len) in plan.literal_ranges() {
                        let data = self.remote.get_range(id, offset, len).await?;
                        literals.push(LiteralChunk { offset, data });
                    }
                    let expected = instruction
                        .expected_checksum
                        .as_ref()
                        .ok_or_else(|| SyncError::MalformedManifest(
                            "delta transfer requires a declared checksum".to_string(),
                        ))?;
                    let fetched = plan.literal_bytes();
                    let bytes =
                        apply_delta(&base, &plan, &literals, expected).map_err(codec_err)?;
                    return Ok((bytes, fetched));
                }
            }
        }

        let bytes = self.remote.get(id).await?;
        let fetched = bytes.len() as u64;
        Ok((bytes, fetched))
    }

    /// Materialize an online-only placeholder: a zero-length file whose
    /// journal row records the true remote size and the pin.
    async fn materialize_placeholder(
        &self,
        instruction: &SyncInstruction,
    ) -> Result<JobOutcome, SyncError> {
        let id = require_remote_id(instruction)?;
        let local_path = instruction.path.to_local(&self.root);
        write_atomic(&local_path, &[]).await?;
        let metadata = tokio::fs::metadata(&local_path)
            .await
            .map_err(|e| SyncError::LocalIo(e.to_string()))?;

        let mut record = JournalRecord::new(
            instruction.path.clone(),
            EntryKind::File,
            id.clone(),
            self.etag_for(instruction).await?,
            instruction.expected_checksum.clone(),
            instruction.expected_size,
            Utc::now(),
            Permissions::all(),
            fingerprint_of(&metadata),
        );
        record.set_pin_state(PinState::OnlineOnly);
        self.journal.upsert(&record).await.map_err(journal_err)?;
        info!(path = %instruction.path, "placeholder materialized");
        Ok(JobOutcome::bookkeeping())
    }

    // ========================================================================
    // Directories, deletions, moves
    // ========================================================================

    async fn mkdir_remote(&self, instruction: &SyncInstruction) -> Result<JobOutcome, SyncError> {
        let result = self.remote.mkdir(&instruction.path).await?;
        let fingerprint = tokio::fs::metadata(instruction.path.to_local(&self.root))
            .await
            .map(|m| fingerprint_of(&m))
            .unwrap_or_default();
        self.commit_dir(instruction, result, fingerprint).await?;
        Ok(JobOutcome::bookkeeping())
    }

    async fn mkdir_local(&self, instruction: &SyncInstruction) -> Result<JobOutcome, SyncError> {
        let local_path = instruction.path.to_local(&self.root);
        tokio::fs::create_dir_all(&local_path)
            .await
            .map_err(|e| SyncError::LocalIo(format!("{}: {e}", local_path.display())))?;
        let metadata = tokio::fs::metadata(&local_path)
            .await
            .map_err(|e| SyncError::LocalIo(e.to_string()))?;
        let result = PutResult {
            id: require_remote_id(instruction)?.clone(),
            etag: self.etag_for(instruction).await?,
        };
        self.commit_dir(instruction, result, fingerprint_of(&metadata))
            .await?;
        Ok(JobOutcome::bookkeeping())
    }

    async fn delete_remote(&self, instruction: &SyncInstruction) -> Result<JobOutcome, SyncError> {
        let id = require_remote_id(instruction)?;
        match self
            .remote
            .delete(id, instruction.expected_etag.as_ref())
            .await
        {
            // Already gone remotely: the intent is satisfied.
            Ok(()) | Err(RemoteError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.remove_journal_subtree(instruction).await?;
        info!(path = %instruction.path, "remote entry deleted");
        Ok(JobOutcome::bookkeeping())
    }

    async fn delete_local(&self, instruction: &SyncInstruction) -> Result<JobOutcome, SyncError> {
        let local_path = instruction.path.to_local(&self.root);
        let result = if instruction.kind == EntryKind::Directory {
            tokio::fs::remove_dir_all(&local_path).await
        } else {
            tokio::fs::remove_file(&local_path).await
        };
        match result {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(SyncError::LocalIo(format!("{}: {e}", local_path.display())))
            }
        }
        self.remove_journal_subtree(instruction).await?;
        info!(path = %instruction.path, "local entry deleted");
        Ok(JobOutcome::bookkeeping())
    }

    async fn move_remote(
        &self,
        instruction: &SyncInstruction,
        from: &SyncPath,
    ) -> Result<JobOutcome, SyncError> {
        let id = require_remote_id(instruction)?;
        let result = self
            .remote
            .move_entry(id, &instruction.path, instruction.expected_etag.as_ref())
            .await?;
        self.journal
            .rename_prefix(from, &instruction.path)
            .await
            .map_err(journal_err)?;
        self.refresh_etag(&instruction.path, result.etag).await?;
        info!(from = %from, to = %instruction.path, "remote entry moved");
        Ok(JobOutcome::bookkeeping())
    }

    async fn rename_local(
        &self,
        instruction: &SyncInstruction,
        from: &SyncPath,
    ) -> Result<JobOutcome, SyncError> {
        let old = from.to_local(&self.root);
        let new = instruction.path.to_local(&self.root);
        tokio::fs::rename(&old, &new)
            .await
            .map_err(|e| SyncError::LocalIo(format!("{} -> {}: {e}", old.display(), new.display())))?;
        self.journal
            .rename_prefix(from, &instruction.path)
            .await
            .map_err(journal_err)?;
        if let Some(etag) = instruction.expected_etag.clone() {
            self.refresh_etag(&instruction.path, etag).await?;
        }
        info!(from = %from, to = %instruction.path, "local entry renamed");
        Ok(JobOutcome::bookkeeping())
    }

    // ========================================================================
    // Conflict, metadata, cleanup
    // ========================================================================

    /// Preserve the losing local bytes under a conflict-marked name, then
    /// materialize the winning remote content (when the remote half still
    /// exists at this path).
    async fn conflict(&self, instruction: &SyncInstruction) -> Result<JobOutcome, SyncError> {
        let conflict_copy = conflict_name(&instruction.path)?;
        let local_path = instruction.path.to_local(&self.root);
        let copy_path = conflict_copy.to_local(&self.root);

        match tokio::fs::rename(&local_path, &copy_path).await {
            Ok(()) => {}
            // Nothing local to preserve (already gone): the download alone
            // resolves the conflict.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(SyncError::LocalIo(e.to_string())),
        }
        warn!(path = %instruction.path, copy = %conflict_copy, "conflict: local copy preserved");

        if instruction.remote_id.is_some() {
            let outcome = self.download(instruction, true).await?;
            let bytes_downloaded = match outcome {
                JobOutcome::Committed {
                    bytes_downloaded, ..
                } => bytes_downloaded,
                _ => 0,
            };
            Ok(JobOutcome::ConflictResolved {
                conflict_copy,
                bytes_downloaded,
            })
        } else {
            // The remote entry moved away; only the journal row remains.
            self.journal
                .delete(&instruction.path)
                .await
                .map_err(journal_err)?;
            Ok(JobOutcome::ConflictResolved {
                conflict_copy,
                bytes_downloaded: 0,
            })
        }
    }

    /// Content already converged; refresh the journal row with the current
    /// remote identity and local fingerprint.
    async fn update_metadata(&self, instruction: &SyncInstruction) -> Result<JobOutcome, SyncError> {
        let existing = self
            .journal
            .get(&instruction.path)
            .await
            .map_err(journal_err)?;

        let fingerprint = tokio::fs::metadata(instruction.path.to_local(&self.root))
            .await
            .map(|m| fingerprint_of(&m))
            .ok();

        let record = match existing {
            Some(mut record) => {
                let etag = instruction
                    .expected_etag
                    .clone()
                    .unwrap_or_else(|| record.etag().clone());
                let checksum = instruction
                    .expected_checksum
                    .clone()
                    .or_else(|| record.checksum().cloned());
                let size = if instruction.expected_size > 0 {
                    instruction.expected_size
                } else {
                    record.size()
                };
                let fingerprint = fingerprint.unwrap_or_else(|| record.fingerprint());
                record.record_success(etag, checksum, size, Utc::now(), fingerprint);
                if let Some(id) = instruction.remote_id.clone() {
                    record.set_remote_id(id);
                }
                record
            }
            None => JournalRecord::new(
                instruction.path.clone(),
                instruction.kind,
                require_remote_id(instruction)?.clone(),
                self.etag_for(instruction).await?,
                instruction.expected_checksum.clone(),
                instruction.expected_size,
                Utc::now(),
                Permissions::all(),
                fingerprint.unwrap_or_default(),
            ),
        };
        self.journal.upsert(&record).await.map_err(journal_err)?;
        Ok(JobOutcome::bookkeeping())
    }

    async fn journal_cleanup(&self, instruction: &SyncInstruction) -> Result<JobOutcome, SyncError> {
        self.remove_journal_subtree(instruction).await?;
        Ok(JobOutcome::bookkeeping())
    }

    // ========================================================================
    // Journal commit helpers
    // ========================================================================

    async fn commit_file(
        &self,
        instruction: &SyncInstruction,
        result: PutResult,
        checksum: Option<Checksum>,
        size: u64,
        fingerprint: LocalFingerprint,
    ) -> Result<(), SyncError> {
        let existing = self
            .journal
            .get(&instruction.path)
            .await
            .map_err(journal_err)?;
        let record = match existing {
            Some(mut record) => {
                record.record_success(result.etag, checksum, size, Utc::now(), fingerprint);
                record.set_remote_id(result.id);
                record
            }
            None => {
                let mut record = JournalRecord::new(
                    instruction.path.clone(),
                    EntryKind::File,
                    result.id,
                    result.etag,
                    checksum,
                    size,
                    Utc::now(),
                    Permissions::all(),
                    fingerprint,
                );
                if instruction.pin_state != PinState::Unspecified {
                    record.set_pin_state(instruction.pin_state);
                }
                record
            }
        };
        self.journal.upsert(&record).await.map_err(journal_err)
    }

    async fn commit_dir(
        &self,
        instruction: &SyncInstruction,
        result: PutResult,
        fingerprint: LocalFingerprint,
    ) -> Result<(), SyncError> {
        let record = JournalRecord::new(
            instruction.path.clone(),
            EntryKind::Directory,
            result.id,
            result.etag,
            None,
            0,
            Utc::now(),
            Permissions::all(),
            fingerprint,
        );
        self.journal.upsert(&record).await.map_err(journal_err)
    }

    async fn remove_journal_subtree(&self, instruction: &SyncInstruction) -> Result<(), SyncError> {
        if instruction.kind == EntryKind::Directory {
            self.journal
                .delete_prefix(&instruction.path)
                .await
                .map_err(journal_err)?;
        }
        self.journal
            .delete(&instruction.path)
            .await
            .map_err(journal_err)
    }

    /// Re-stamp the etag of a record that was just renamed into place.
    async fn refresh_etag(&self, path: &SyncPath, etag: Etag) -> Result<(), SyncError> {
        if let Some(mut record) = self.journal.get(path).await.map_err(journal_err)? {
            record.record_success(
                etag,
                record.checksum().cloned(),
                record.size(),
                Utc::now(),
                record.fingerprint(),
            );
            self.journal.upsert(&record).await.map_err(journal_err)?;
        }
        Ok(())
    }

    /// Etag to commit for a download-side job: the instruction's observed
    /// etag, or a fresh stat when discovery had none.
    async fn etag_for(&self, instruction: &SyncInstruction) -> Result<Etag, SyncError> {
        if let Some(etag) = instruction.expected_etag.clone() {
            return Ok(etag);
        }
        match self.remote.stat(&instruction.path).await? {
            Some(entry) => Ok(entry.etag),
            None => Err(SyncError::Network(format!(
                "remote entry vanished during commit: {}",
                instruction.path
            ))),
        }
    }
}

// ============================================================================
// Free helpers
// ============================================================================

fn require_remote_id(instruction: &SyncInstruction) -> Result<&RemoteId, SyncError> {
    instruction.remote_id.as_ref().ok_or_else(|| {
        SyncError::Network(format!(
            "instruction for {} carries no remote id",
            instruction.path
        ))
    })
}

fn journal_err(e: anyhow::Error) -> SyncError {
    SyncError::JournalUnavailable(e.to_string())
}

fn codec_err(e: CodecError) -> SyncError {
    match e {
        CodecError::ChecksumMismatch { expected, actual } => SyncError::ChecksumMismatch {
            expected: expected.as_str().to_string(),
            actual: actual.as_str().to_string(),
        },
        other => SyncError::MalformedManifest(other.to_string()),
    }
}

/// Write `bytes` to `path` atomically: temp file in the same directory,
/// then rename into place.
async fn write_atomic(path: &std::path::Path, bytes: &[u8]) -> Result<(), SyncError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("download");
    let tmp = path.with_file_name(format!(".{file_name}.tidesync-tmp"));
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| SyncError::LocalIo(format!("{}: {e}", tmp.display())))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| SyncError::LocalIo(format!("{}: {e}", path.display())))
}

/// Conflict-marked sibling name: `report (conflicted copy 2026-08-26 140302).txt`.
fn conflict_name(path: &SyncPath) -> Result<SyncPath, SyncError> {
    let name = path.file_name().unwrap_or("conflict");
    let stamp = Utc::now().format("%Y-%m-%d %H%M%S");
    let marked = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            format!("{stem} (conflicted copy {stamp}).{ext}")
        }
        _ => format!("{name} (conflicted copy {stamp})"),
    };
    let renamed = match path.parent() {
        Some(parent) if !parent.is_root() => parent.join(&marked),
        _ => SyncPath::new(&marked),
    };
    renamed.map_err(|e| SyncError::LocalIo(e.to_string()))
}

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_name_keeps_extension() {
        let name = conflict_name(&SyncPath::new("docs/report.txt").unwrap()).unwrap();
        let name = name.as_str();
        assert!(name.starts_with("docs/report (conflicted copy "));
        assert!(name.ends_with(".txt"));
    }

    #[test]
    fn test_conflict_name_without_extension() {
        let name = conflict_name(&SyncPath::new("Makefile").unwrap()).unwrap();
        assert!(name.as_str().starts_with("Makefile (conflicted copy "));
    }

    #[test]
    fn test_codec_error_mapping() {
        let err = codec_err(CodecError::ChecksumMismatch {
            expected: Checksum::sha256(b"a"),
            actual: Checksum::sha256(b"b"),
        });
        assert!(matches!(err, SyncError::ChecksumMismatch { .. }));

        let err = codec_err(CodecError::MalformedManifest("bad".to_string()));
        assert!(matches!(err, SyncError::MalformedManifest(_)));
    }
}
