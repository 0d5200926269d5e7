//! In-memory remote store for end-to-end engine tests.
//!
//! Behaves like a small etag-versioned object server: every mutation bumps
//! the entry's etag and cascades a bump to ancestor directories, which is
//! what lets the remote scanner short-circuit unchanged subtrees.
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
    /// Entries by path
    entries: HashMap<String, RemoteEntry>,
    next_id: u64,
    next_version: u64,
}

impl Inner {
    fn fresh_id(&mut self) -> String {
        self.next_id += 1;
        format!("fid-{}", self.next_id)
    }

    fn fresh_etag(&mut self) -> Etag {
        self.next_version += 1;
        Etag::new(format!("v{}", self.next_version)).unwrap()
    }

    /// Bump the etag of every ancestor directory of `path`.
    fn cascade(&mut self, path: &SyncPath) {
        let mut cursor = path.parent();
        while let Some(ancestor) = cursor {
            if ancestor.is_root() {
                break;
            }
            let etag = self.fresh_etag();
            if let Some(entry) = self.entries.get_mut(ancestor.as_str()) {
                entry.etag = etag;
            }
            cursor = ancestor.parent();
        }
    }

    fn ensure_dirs(&mut self, path: &SyncPath) {
        let mut missing = Vec::new();
        let mut cursor = path.parent();
        while let Some(ancestor) = cursor {
            if ancestor.is_root() || self.entries.contains_key(ancestor.as_str()) {
                break;
            }
            missing.push(ancestor.clone());
            cursor = ancestor.parent();
        }
        for dir in missing.into_iter().rev() {
            let id = self.fresh_id();
            let etag = self.fresh_etag();
            self.entries.insert(
                dir.as_str().to_string(),
                RemoteEntry {
                    path: dir,
                    id: RemoteId::new(&id).unwrap(),
                    kind: EntryKind::Directory,
                    etag,
                    size: 0,
                    modified: Utc::now(),
                    checksum: None,
                    permissions: Permissions::all(),
                },
            );
        }
    }

    fn store(&mut self, path: &SyncPath, content: &[u8]) -> PutResult {
        let id = match self.entries.get(path.as_str()) {
            Some(entry) => entry.id.as_str().to_string(),
            None => self.fresh_id(),
        };
        let etag = self.fresh_etag();
        self.entries.insert(
            path.as_str().to_string(),
            RemoteEntry {
                path: path.clone(),
                id: RemoteId::new(&id).unwrap(),
                kind: EntryKind::File,
                etag: etag.clone(),
                size: content.len() as u64,
                modified: Utc::now(),
                checksum: Some(compute_checksum(content)),
                permissions: Permissions::all(),
            },
        );
        self.files.insert(id.clone(), content.to_vec());
        self.cascade(path);
        PutResult {
            id: RemoteId::new(&id).unwrap(),
            etag,
        }
    }
}

/// In-memory remote object store.
#[derive(Default)]
pub struct MemoryRemote {
    inner: Mutex<Inner>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file (creating parent directories) outside any sync run,
    /// simulating a change made by another client.
    pub fn seed_file(&self, path: &str, content: &[u8]) {
        let path = SyncPath::new(path).unwrap();
        let mut inner = self.inner.lock().unwrap();
        inner.ensure_dirs(&path);
        inner.store(&path, content);
    }

    /// Overwrite a file's content, bumping its etag and its ancestors'.
    pub fn update_file(&self, path: &str, content: &[u8]) {
        let path = SyncPath::new(path).unwrap();
        let mut inner = self.inner.lock().unwrap();
        assert!(
            inner.entries.contains_key(path.as_str()),
            "update_file on unknown path {path}"
        );
        inner.store(&path, content);
    }

    pub fn content_at(&self, path: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        let entry = inner.entries.get(path)?;
        inner.files.get(entry.id.as_str()).cloned()
    }

    pub fn has_path(&self, path: &str) -> bool {
        self.inner.lock().unwrap().entries.contains_key(path)
    }

    pub fn entry_count(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }
}

#[async_trait::async_trait]
impl RemoteStore for MemoryRemote {
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
        self.inner
            .lock()
            .unwrap()
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
        if start > content.len() {
            return Err(RemoteError::InvalidResponse("range out of bounds".to_string()));
        }
        let end = (start + len as usize).min(content.len());
        Ok(content[start..end].to_vec())
    }

    async fn get_manifest(&self, _id: &RemoteId) -> Result<Option<Vec<u8>>, RemoteError> {
        Ok(None)
    }

    async fn put(
        &self,
        path: &SyncPath,
        content: &[u8],
        _if_match: Option<&Etag>,
    ) -> Result<PutResult, RemoteError> {
        Ok(self.inner.lock().unwrap().store(path, content))
    }

    async fn put_chunk(
        &self,
        _transfer_id: &str,
        _index: u32,
        _total: u32,
        _content: &[u8],
    ) -> Result<(), RemoteError> {
        unimplemented!("engine tests stay below the chunking threshold")
    }

    async fn finish_transfer(
        &self,
        _transfer_id: &str,
        _path: &SyncPath,
        _if_match: Option<&Etag>,
    ) -> Result<PutResult, RemoteError> {
        unimplemented!("engine tests stay below the chunking threshold")
    }

    async fn mkdir(&self, path: &SyncPath) -> Result<PutResult, RemoteError> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.fresh_id();
        let etag = inner.fresh_etag();
        inner.entries.insert(
            path.as_str().to_string(),
            RemoteEntry {
                path: path.clone(),
                id: RemoteId::new(&id).unwrap(),
                kind: EntryKind::Directory,
                etag: etag.clone(),
                size: 0,
                modified: Utc::now(),
                checksum: None,
                permissions: Permissions::all(),
            },
        );
        inner.cascade(path);
        Ok(PutResult {
            id: RemoteId::new(&id).unwrap(),
            etag,
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
        let removed = inner.entries.remove(&path);
        inner.files.remove(id.as_str());
        if let Some(entry) = removed {
            inner.cascade(&entry.path);
        }
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
        let Some(mut entry) = inner.entries.remove(&old_path) else {
            return Err(RemoteError::NotFound(id.as_str().to_string()));
        };
        let from = entry.path.clone();
        let etag = inner.fresh_etag();
        entry.path = to.clone();
        entry.etag = etag.clone();
        inner.entries.insert(to.as_str().to_string(), entry);
        inner.cascade(&from);
        inner.cascade(to);
        Ok(PutResult {
            id: id.clone(),
            etag,
        })
    }
}
