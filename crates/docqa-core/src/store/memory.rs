//! In-memory [`BlobStore`] implementation for tests.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. Saves swap the whole value
//! under the write lock, which makes them atomic.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::BlobStore;

/// In-memory blob store.
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        let blobs = self.blobs.read().map_err(|_| anyhow!("blob store lock poisoned"))?;
        Ok(blobs.contains_key(key))
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let blobs = self.blobs.read().map_err(|_| anyhow!("blob store lock poisoned"))?;
        Ok(blobs.get(key).cloned())
    }

    async fn save(&self, key: &str, blob: &[u8]) -> Result<()> {
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| anyhow!("blob store lock poisoned"))?;
        blobs.insert(key.to_string(), blob.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_then_load() {
        let store = InMemoryBlobStore::new();
        assert!(!store.exists("doc").await.unwrap());
        assert_eq!(store.load("doc").await.unwrap(), None);

        store.save("doc", b"payload").await.unwrap();
        assert!(store.exists("doc").await.unwrap());
        assert_eq!(store.load("doc").await.unwrap(), Some(b"payload".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_save_replaces_whole_blob() {
        let store = InMemoryBlobStore::new();
        store.save("doc", b"first version").await.unwrap();
        store.save("doc", b"v2").await.unwrap();
        assert_eq!(store.load("doc").await.unwrap(), Some(b"v2".to_vec()));
    }
}
