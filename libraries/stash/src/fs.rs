//! Filesystem-backed blob store: one directory per namespace under a root.

use std::io;
use std::path::{Component, Path, PathBuf};

use crate::CacheKey;
use crate::store::{BlobStore, StoreError};

#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a key inside this store. The id may contain `/`
    /// separators; anything that would escape the root is rejected.
    pub fn path_for(&self, key: &CacheKey) -> Result<PathBuf, StoreError> {
        let relative = Path::new(&key.namespace).join(&key.id);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl BlobStore for FsBlobStore {
    async fn exists(&self, key: &CacheKey) -> Result<bool, StoreError> {
        Ok(tokio::fs::try_exists(self.path_for(key)?).await?)
    }

    async fn read(&self, key: &CacheKey) -> Result<Vec<u8>, StoreError> {
        match tokio::fs::read(self.path_for(key)?).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let key = CacheKey::new("notes", "python/loops.md");

        assert!(!store.exists(&key).await.unwrap());
        store.write(&key, b"while True:").await.unwrap();
        assert!(store.exists(&key).await.unwrap());
        assert_eq!(store.read(&key).await.unwrap(), b"while True:");

        // nested id segments become real directories
        assert!(dir.path().join("notes/python/loops.md").is_file());

        store.remove(&key).await.unwrap();
        assert!(!store.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn rejects_keys_that_escape_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let key = CacheKey::new("notes", "../../etc/passwd");
        assert!(matches!(
            store.read(&key).await,
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(
            store.write(&key, b"x").await,
            Err(StoreError::InvalidKey(_))
        ));
    }
}
