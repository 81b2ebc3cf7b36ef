//! Small string key-value facade over a blob store, covering what the app
//! keeps in secure storage: credentials, per-question scores, view and
//! completion flags, and serialized JSON blobs.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::CacheKey;
use crate::store::{BlobStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The stored bytes are not what this key is supposed to hold. Callers
    /// treat this as corruption and overwrite with a default.
    #[error("corrupt value stored under {name}: {detail}")]
    Corrupt { name: String, detail: String },
}

pub struct KeyValue<'a, S: BlobStore> {
    store: &'a S,
    namespace: &'a str,
}

impl<'a, S: BlobStore> KeyValue<'a, S> {
    pub fn new(store: &'a S, namespace: &'a str) -> Self {
        Self { store, namespace }
    }

    fn key(&self, name: &str) -> CacheKey {
        CacheKey::new(self.namespace, name)
    }

    pub async fn get(&self, name: &str) -> Result<Option<String>, KvError> {
        let key = self.key(name);
        if !self.store.exists(&key).await? {
            return Ok(None);
        }
        let bytes = self.store.read(&key).await?;
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| KvError::Corrupt {
                name: name.to_string(),
                detail: e.to_string(),
            })
    }

    pub async fn set(&self, name: &str, value: &str) -> Result<(), StoreError> {
        self.store.write(&self.key(name), value.as_bytes()).await
    }

    pub async fn remove(&self, name: &str) -> Result<(), StoreError> {
        self.store.remove(&self.key(name)).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, KvError> {
        match self.get(name).await? {
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| KvError::Corrupt {
                    name: name.to_string(),
                    detail: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        let text = serde_json::to_string(value).unwrap();
        self.set(name, &text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBlobStore;

    #[tokio::test]
    async fn string_values_round_trip() {
        let store = MemoryBlobStore::new();
        let kv = KeyValue::new(&store, "secure");

        assert_eq!(kv.get("token").await.unwrap(), None);
        kv.set("token", "abc123").await.unwrap();
        assert_eq!(kv.get("token").await.unwrap().as_deref(), Some("abc123"));

        kv.remove("token").await.unwrap();
        assert_eq!(kv.get("token").await.unwrap(), None);
    }

    #[tokio::test]
    async fn json_values_round_trip() {
        let store = MemoryBlobStore::new();
        let kv = KeyValue::new(&store, "secure");

        kv.set_json("scores", &vec![3u32, 1, 4]).await.unwrap();
        assert_eq!(
            kv.get_json::<Vec<u32>>("scores").await.unwrap(),
            Some(vec![3, 1, 4])
        );
    }

    #[tokio::test]
    async fn unparseable_json_reads_as_corrupt() {
        let store = MemoryBlobStore::new();
        let kv = KeyValue::new(&store, "secure");

        kv.set("scores", "not json").await.unwrap();
        assert!(matches!(
            kv.get_json::<Vec<u32>>("scores").await,
            Err(KvError::Corrupt { .. })
        ));
    }
}
