//! Blob storage behind the cache: a namespaced key-value store of raw bytes.

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::CacheKey;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no blob stored for {0}")]
    NotFound(CacheKey),

    #[error("key {0} does not form a valid storage path")]
    InvalidKey(String),

    #[error("blob store I/O failed")]
    Io(#[from] std::io::Error),
}

/// Storage backend for cached resources.
///
/// `exists` is a live query every time; callers never trust an earlier
/// answer, because the store can be cleared externally between calls.
#[allow(async_fn_in_trait)]
pub trait BlobStore {
    async fn exists(&self, key: &CacheKey) -> Result<bool, StoreError>;
    async fn read(&self, key: &CacheKey) -> Result<Vec<u8>, StoreError>;
    async fn write(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), StoreError>;
    /// Removing an absent blob is not an error.
    async fn remove(&self, key: &CacheKey) -> Result<(), StoreError>;
}

/// In-memory backend, for tests and simulations.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RefCell<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    async fn exists(&self, key: &CacheKey) -> Result<bool, StoreError> {
        Ok(self.blobs.borrow().contains_key(&key.storage_path()))
    }

    async fn read(&self, key: &CacheKey) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .borrow()
            .get(&key.storage_path())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    async fn write(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), StoreError> {
        self.blobs
            .borrow_mut()
            .insert(key.storage_path(), bytes.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), StoreError> {
        self.blobs.borrow_mut().remove(&key.storage_path());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_blob() {
        let store = MemoryBlobStore::new();
        let key = CacheKey::new("notes", "math/chapter1.md");

        assert!(!store.exists(&key).await.unwrap());
        store.write(&key, b"# Chapter 1").await.unwrap();
        assert!(store.exists(&key).await.unwrap());
        assert_eq!(store.read(&key).await.unwrap(), b"# Chapter 1");

        store.remove(&key).await.unwrap();
        assert!(!store.exists(&key).await.unwrap());
        assert!(matches!(
            store.read(&key).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn removing_an_absent_blob_is_fine() {
        let store = MemoryBlobStore::new();
        let key = CacheKey::new("notes", "missing.md");
        store.remove(&key).await.unwrap();
    }

    #[tokio::test]
    async fn namespaces_do_not_collide() {
        let store = MemoryBlobStore::new();
        let a = CacheKey::new("notes", "x");
        let b = CacheKey::new("games", "x");
        store.write(&a, b"note").await.unwrap();
        store.write(&b, b"game").await.unwrap();
        assert_eq!(store.read(&a).await.unwrap(), b"note");
        assert_eq!(store.read(&b).await.unwrap(), b"game");
    }
}
