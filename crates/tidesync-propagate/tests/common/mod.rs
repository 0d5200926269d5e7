//! In-memory remote store fake shared by the propagation tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use tidesync_codec::compute_checksum;
use tidesync_core::domain::journal_record::{EntryKind, Permissions};
use tidesync_core::domain::newtypes::{Etag, RemoteId, SyncPath};
use tidesync_core::ports::remote_store::{PutResult, RemoteEntry, RemoteError, RemoteStore};

#[derive(Default)]
struct Inner {
    /// Content by remote id
    files: HashMap<String, Vec<u8>>,
    /// Listing entries by path
    entries: HashMap<String, RemoteEntry>,
    /// Block manifests by remote id
    manifests: HashMap<String, Vec<u8>>,
    /// Chunks by transfer id
    chunks: HashMap<String, Vec<(u32, Vec<u8>)>>,
    next_id: u64,
    next_version: u64,
    /// Next N puts/finishes fail with 503
    fail_puts: u32,
    /// Paths whose mkdir fails with 403
    forbidden_mkdirs: Vec<String>,
    /// Log of put_chunk indices, in call order
    pub chunk_log: Vec<u32>,
    /// Count of full-content get calls
    pub get_count: u32,
}

/// Hash-map remote store with failure injection.
#[derive(Default)]
pub struct FakeRemote {
    inner: Mutex<Inner>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file entry with content; returns its id and etag.
    pub fn seed_file(&self, path: &str, content: &[u8]) -> (RemoteId, Etag) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        inner.next_version += 1;
        let id = format!("fid-{}", inner.next_id);
        let etag = format!("v{}", inner.next_version);
        let entry = RemoteEntry {
            path: SyncPath::new(path).unwrap(),
            id: RemoteId::new(&id).unwrap(),
            kind: EntryKind::File,
            etag: Etag::new(&etag).unwrap(),
            size: content.len() as u64,
            modified: Utc::now(),
            checksum: Some(compute_checksum(content)),
            permissions: Permissions::all(),
        };
        inner.files.insert(id.clone(), content.to_vec());
        inner.entries.insert(path.to_string(), entry);
        (RemoteId::new(&id).unwrap(), Etag::new(&etag).unwrap())
    }

    pub fn set_manifest(&self, id: &RemoteId, bytes: Vec<u8>) {
        self.inner
            .lock()
            .unwrap()
            .manifests
            .insert(id.as_str().to_string(), bytes);
    }

    pub fn fail_next_puts(&self, count: u32) {
        self.inner.lock().unwrap().fail_puts = count;
    }

    pub fn forbid_mkdir(&self, path: &str) {
        self.inner
            .lock()
            .unwrap()
            .forbidden_mkdirs
            .push(path.to_string());
    }

    pub fn chunk_log(&self) -> Vec<u32> {
        self.inner.lock().unwrap().chunk_log.clone()
    }

    pub fn get_count(&self) -> u32 {
        self.inner.lock().unwrap().get_count
    }

    pub fn content_at(&self, path: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        let entry = inner.entries.get(path)?;
        inner.files.get(entry.id.as_str()).cloned()
    }

    pub fn has_path(&self, path: &str) -> bool {
        self.inner.lock().unwrap().entries.contains_key(path)
    }

    fn store(&self, path: &SyncPath, content: &[u8]) -> Result<PutResult, RemoteError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_puts > 0 {
            inner.fail_puts -= 1;
            return Err(RemoteError::Server {
                status: 503,
                message: "injected".to_string(),
            });
        }
        let id = match inner.entries.get(path.as_str()) {
            Some(entry) => entry.id.as_str().to_string(),
            None => {
                inner.next_id += 1;
                format!("fid-{}", inner.next_id)
            }
        };
        inner.next_version += 1;
        let etag = format!("v{}", inner.next_version);
        let entry = RemoteEntry {
            path: path.clone(),
            id: RemoteId::new(&id).unwrap(),
            kind: EntryKind::File,
            etag: Etag::new(&etag).unwrap(),
            size: content.len() as u64,
            modified: Utc::now(),
            checksum: Some(compute_checksum(content)),
            permissions: Permissions::all(),
        };
        inner.files.insert(id.clone(), content.to_vec());
        inner.entries.insert(path.as_str().to_string(), entry);
        Ok(PutResult {
            id: RemoteId::new(&id).unwrap(),
            etag: Etag::new(&etag).unwrap(),
        })
    }
}

#[async_trait::async_trait]
impl RemoteStore for FakeRemote {
    async fn list(&self, path: &SyncPath) -> Result<Vec<RemoteEntry>, RemoteError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .entries
            .values()
            .filter(|e| e.path.parent().as_ref() == Some(path))
            .cloned()
            .collect())
    }

    async fn stat(&self, path: &SyncPath) -> Result<Option<RemoteEntry>, RemoteError> {
        Ok(self.inner.lock().unwrap().entries.get(path.as_str()).cloned())
    }

    async fn get(&self, id: &RemoteId) -> Result<Vec<u8>, RemoteError> {
        let mut inner = self.inner.lock().unwrap();
        inner.get_count += 1;
        inner
            .files
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(id.as_str().to_string()))
    }

    async fn get_range(
        &self,
        id: &RemoteId,
        offset: u64,
        len: u64,
    ) -> Result<Vec<u8>, RemoteError> {
        let inner = self.inner.lock().unwrap();
        let content = inner
            .files
            .get(id.as_str())
            .ok_or_else(|| RemoteError::NotFound(id.as_str().to_string()))?;
        let start = offset as usize;
        let end = (start + len as usize).min(content.len());
        if start > content.len() {
            return Err(RemoteError::InvalidResponse("range out of bounds".to_string()));
        }
        Ok(content[start..end].to_vec())
    }

    async fn get_manifest(&self, id: &RemoteId) -> Result<Option<Vec<u8>>, RemoteError> {
        Ok(self.inner.lock().unwrap().manifests.get(id.as_str()).cloned())
    }

    async fn put(
        &self,
        path: &SyncPath,
        content: &[u8],
        _if_match: Option<&Etag>,
    ) -> Result<PutResult, RemoteError> {
        self.store(path, content)
    }

    async fn put_chunk(
        &self,
        transfer_id: &str,
        index: u32,
        _total: u32,
        content: &[u8],
    ) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock().unwrap();
        inner.chunk_log.push(index);
        inner
            .chunks
            .entry(transfer_id.to_string())
            .or_default()
            .push((index, content.to_vec()));
        Ok(())
    }

    async fn finish_transfer(
        &self,
        transfer_id: &str,
        path: &SyncPath,
        _if_match: Option<&Etag>,
    ) -> Result<PutResult, RemoteError> {
        let assembled = {
            let mut inner = self.inner.lock().unwrap();
            let mut chunks = inner.chunks.remove(transfer_id).unwrap_or_default();
            chunks.sort_by_key(|(index, _)| *index);
            chunks.into_iter().flat_map(|(_, data)| data).collect::<Vec<u8>>()
        };
        self.store(path, &assembled)
    }

    async fn mkdir(&self, path: &SyncPath) -> Result<PutResult, RemoteError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.forbidden_mkdirs.iter().any(|p| p == path.as_str()) {
            return Err(RemoteError::Forbidden(path.as_str().to_string()));
        }
        inner.next_id += 1;
        inner.next_version += 1;
        let id = format!("fid-{}", inner.next_id);
        let etag = format!("v{}", inner.next_version);
        let entry = RemoteEntry {
            path: path.clone(),
            id: RemoteId::new(&id).unwrap(),
            kind: EntryKind::Directory,
            etag: Etag::new(&etag).unwrap(),
            size: 0,
            modified: Utc::now(),
            checksum: None,
            permissions: Permissions::all(),
        };
        inner.entries.insert(path.as_str().to_string(), entry);
        Ok(PutResult {
            id: RemoteId::new(&id).unwrap(),
            etag: Etag::new(&etag).unwrap(),
        })
    }

    async fn delete(&self, id: &RemoteId, _if_match: Option<&Etag>) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(path) = inner
            .entries
            .iter()
            .find(|(_, e)| e.id == *id)
            .map(|(p, _)| p.clone())
        else {
            return Err(RemoteError::NotFound(id.as_str().to_string()));
        };
        inner.entries.remove(&path);
        inner.files.remove(id.as_str());
        Ok(())
    }

    async fn move_entry(
        &self,
        id: &RemoteId,
        to: &SyncPath,
        _if_match: Option<&Etag>,
    ) -> Result<PutResult, RemoteError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(old_path) = inner
            .entries
            .iter()
            .find(|(_, e)| e.id == *id)
            .map(|(p, _)| p.clone())
        else {
            return Err(RemoteError::NotFound(id.as_str().to_string()));
        };
        let mut entry = inner.entries.remove(&old_path).unwrap();
        inner.next_version += 1;
        let etag = format!("v{}", inner.next_version);
        entry.path = to.clone();
        entry.etag = Etag::new(&etag).unwrap();
        inner.entries.insert(to.as_str().to_string(), entry);
        Ok(PutResult {
            id: id.clone(),
            etag: Etag::new(&etag).unwrap(),
        })
    }
}
