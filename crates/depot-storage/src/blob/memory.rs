use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::{PoisonError, RwLock};

use bytes::Bytes;

use crate::error::{StorageError, StorageResult};

use super::BlobService;

/// Base URL used by [`InMemoryBlobService::default`].
pub const DEFAULT_BASE_URL: &str = "memory://blobs";

/// In-memory blob service.
///
/// Intended for tests and ephemeral deployments. Blobs are held behind a
/// `RwLock` and cloned cheaply as [`Bytes`].
pub struct InMemoryBlobService {
    base_url: String,
    blobs: RwLock<BTreeMap<String, Bytes>>,
}

impl InMemoryBlobService {
    /// Create an empty service whose URLs start with `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            blobs: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.read_blobs().len()
    }

    /// Returns `true` if no blob is stored.
    pub fn is_empty(&self) -> bool {
        self.read_blobs().is_empty()
    }

    /// All blob names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.read_blobs().keys().cloned().collect()
    }

    /// Content of `name`, if present.
    pub fn get(&self, name: &str) -> Option<Bytes> {
        self.read_blobs().get(name).cloned()
    }

    /// Store `data` under `name` directly.
    pub fn insert(&self, name: impl Into<String>, data: impl Into<Bytes>) {
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), data.into());
    }

    fn read_blobs(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Bytes>> {
        self.blobs.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryBlobService {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl BlobService for InMemoryBlobService {
    fn upload(&self, name: &str, reader: &mut dyn Read) -> StorageResult<u64> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        let size = data.len() as u64;
        self.insert(name, data);
        Ok(size)
    }

    fn copy(&self, dest: &str, source: &str) -> StorageResult<()> {
        let data = self
            .get(source)
            .ok_or_else(|| StorageError::Backend(format!("copy source not found: {source}")))?;
        self.insert(dest, data);
        Ok(())
    }

    fn delete(&self, name: &str) -> StorageResult<bool> {
        Ok(self
            .blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some())
    }

    fn size(&self, name: &str) -> StorageResult<Option<u64>> {
        Ok(self.read_blobs().get(name).map(|data| data.len() as u64))
    }

    fn download(&self, name: &str, sink: &mut dyn Write) -> StorageResult<u64> {
        let data = self
            .get(name)
            .ok_or_else(|| StorageError::Backend(format!("blob not found: {name}")))?;
        sink.write_all(&data)?;
        Ok(data.len() as u64)
    }

    fn url(&self, name: &str) -> String {
        format!("{}/{name}", self.base_url)
    }
}

impl std::fmt::Debug for InMemoryBlobService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlobService")
            .field("base_url", &self.base_url)
            .field("blobs", &self.len())
            .finish()
    }
}
