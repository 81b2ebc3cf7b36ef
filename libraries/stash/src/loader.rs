//! Single-document loading: local cache, then remote fetch, then a generated
//! placeholder, persisting whatever was loaded.

use serde::{Deserialize, Serialize};

use crate::CacheKey;
use crate::fetch::{Fetcher, ProgressSlot};
use crate::kv::{KeyValue, KvError};
use crate::store::{BlobStore, StoreError};

/// Namespace of the provenance sidecar entries, keyed by the document key's
/// storage path.
pub const PROVENANCE_NAMESPACE: &str = "provenance";

/// Where a document's content came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentSource {
    LocalEdit,
    RemoteDefault,
    Channel,
    GeneratedPlaceholder,
}

impl DocumentSource {
    pub fn as_tag(self) -> &'static str {
        match self {
            DocumentSource::LocalEdit => "local-edit",
            DocumentSource::RemoteDefault => "remote-default",
            DocumentSource::Channel => "channel",
            DocumentSource::GeneratedPlaceholder => "generated-placeholder",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "local-edit" => Some(DocumentSource::LocalEdit),
            "remote-default" => Some(DocumentSource::RemoteDefault),
            "channel" => Some(DocumentSource::Channel),
            "generated-placeholder" => Some(DocumentSource::GeneratedPlaceholder),
            _ => None,
        }
    }
}

/// One logical document: a note, a quiz dataset, a game dataset. Exactly one
/// is active per screen instance; switching variants replaces it wholesale.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub path: String,
    pub content: String,
    pub source: DocumentSource,
}

pub struct ContentLoader<'a, S: BlobStore> {
    store: &'a S,
    fetcher: &'a Fetcher,
}

impl<'a, S: BlobStore> ContentLoader<'a, S> {
    pub fn new(store: &'a S, fetcher: &'a Fetcher) -> Self {
        Self { store, fetcher }
    }

    /// Records where a persisted document came from. Call after writing a
    /// document outside the loader (a local edit, a selected channel).
    pub async fn record_provenance(
        &self,
        key: &CacheKey,
        source: DocumentSource,
    ) -> Result<(), StoreError> {
        KeyValue::new(self.store, PROVENANCE_NAMESPACE)
            .set(&key.storage_path(), source.as_tag())
            .await
    }

    /// Recorded provenance for a cached document. A missing or stale sidecar
    /// entry reads as `None`.
    pub async fn provenance(&self, key: &CacheKey) -> Result<Option<DocumentSource>, StoreError> {
        let kv = KeyValue::new(self.store, PROVENANCE_NAMESPACE);
        match kv.get(&key.storage_path()).await {
            Ok(tag) => Ok(tag.and_then(|t| DocumentSource::from_tag(&t))),
            Err(KvError::Corrupt { .. }) => Ok(None),
            Err(KvError::Store(e)) => Err(e),
        }
    }

    /// Loads one document:
    ///
    /// 1. the local cache, if the key is present;
    /// 2. else a single remote fetch attempt, persisted on success;
    /// 3. else the generated placeholder, also persisted.
    ///
    /// A failed fetch in step 2 means "fetch unavailable", not an error; it
    /// is logged and the placeholder takes over. Only store failures
    /// propagate.
    pub async fn load(
        &self,
        key: &CacheKey,
        remote_url: &str,
        placeholder: impl FnOnce(&CacheKey) -> String,
        progress: Option<&ProgressSlot<'_>>,
    ) -> Result<Document, StoreError> {
        if self.store.exists(key).await? {
            match String::from_utf8(self.store.read(key).await?) {
                Ok(content) => {
                    let source = self
                        .provenance(key)
                        .await?
                        .unwrap_or(DocumentSource::RemoteDefault);
                    if let Some(slot) = progress {
                        slot.set(1.0);
                    }
                    return Ok(Document {
                        path: key.id.clone(),
                        content,
                        source,
                    });
                }
                Err(e) => {
                    log::warn!("cached content for {key} is not valid UTF-8 ({e}), refetching");
                    self.store.remove(key).await?;
                }
            }
        }

        match self.fetcher.fetch(remote_url, self.store, key, progress).await {
            Ok(_) => match String::from_utf8(self.store.read(key).await?) {
                Ok(content) => {
                    self.record_provenance(key, DocumentSource::RemoteDefault)
                        .await?;
                    return Ok(Document {
                        path: key.id.clone(),
                        content,
                        source: DocumentSource::RemoteDefault,
                    });
                }
                Err(e) => {
                    log::warn!("fetched content for {key} is not valid UTF-8 ({e})");
                    self.store.remove(key).await?;
                }
            },
            Err(e) => {
                log::info!("fetch for {key} unavailable ({e}), falling back to a placeholder");
            }
        }

        let content = placeholder(key);
        self.store.write(key, content.as_bytes()).await?;
        self.record_provenance(key, DocumentSource::GeneratedPlaceholder)
            .await?;
        if let Some(slot) = progress {
            slot.set(1.0);
        }
        Ok(Document {
            path: key.id.clone(),
            content,
            source: DocumentSource::GeneratedPlaceholder,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBlobStore;

    fn loader<'a>(store: &'a MemoryBlobStore, fetcher: &'a Fetcher) -> ContentLoader<'a, MemoryBlobStore> {
        ContentLoader::new(store, fetcher)
    }

    #[tokio::test]
    async fn cache_hit_returns_recorded_provenance() {
        let store = MemoryBlobStore::new();
        let fetcher = Fetcher::new(reqwest::Client::new());
        let key = CacheKey::new("notes", "math/limits.md");

        store.write(&key, "# Limits".as_bytes()).await.unwrap();
        loader(&store, &fetcher)
            .record_provenance(&key, DocumentSource::LocalEdit)
            .await
            .unwrap();

        let document = loader(&store, &fetcher)
            .load(&key, "http://127.0.0.1:1/unused", |_| unreachable!(), None)
            .await
            .unwrap();
        assert_eq!(document.content, "# Limits");
        assert_eq!(document.source, DocumentSource::LocalEdit);
    }

    #[tokio::test]
    async fn cache_hit_without_provenance_reads_as_remote_default() {
        let store = MemoryBlobStore::new();
        let fetcher = Fetcher::new(reqwest::Client::new());
        let key = CacheKey::new("notes", "math/limits.md");
        store.write(&key, "# Limits".as_bytes()).await.unwrap();

        let document = loader(&store, &fetcher)
            .load(&key, "http://127.0.0.1:1/unused", |_| unreachable!(), None)
            .await
            .unwrap();
        assert_eq!(document.source, DocumentSource::RemoteDefault);
    }

    #[tokio::test]
    async fn unavailable_fetch_falls_back_to_the_placeholder() {
        let store = MemoryBlobStore::new();
        let fetcher = Fetcher::new(reqwest::Client::new());
        let key = CacheKey::new("notes", "math/limits.md");

        let document = loader(&store, &fetcher)
            .load(
                &key,
                // nothing listens here; the fetch error is swallowed
                "http://127.0.0.1:1/limits.md",
                |key| format!("# {}\n", key.id),
                None,
            )
            .await
            .unwrap();
        assert_eq!(document.source, DocumentSource::GeneratedPlaceholder);
        assert_eq!(document.content, "# math/limits.md\n");

        // the placeholder was persisted along with its provenance
        assert_eq!(store.read(&key).await.unwrap(), document.content.as_bytes());
        assert_eq!(
            loader(&store, &fetcher).provenance(&key).await.unwrap(),
            Some(DocumentSource::GeneratedPlaceholder)
        );
    }

    #[tokio::test]
    async fn corrupt_cached_bytes_fall_through_to_the_placeholder() {
        let store = MemoryBlobStore::new();
        let fetcher = Fetcher::new(reqwest::Client::new());
        let key = CacheKey::new("notes", "broken.md");
        store.write(&key, &[0xff, 0xfe, 0x00]).await.unwrap();

        let document = loader(&store, &fetcher)
            .load(&key, "http://127.0.0.1:1/broken.md", |_| "fresh".to_string(), None)
            .await
            .unwrap();
        assert_eq!(document.source, DocumentSource::GeneratedPlaceholder);
        assert_eq!(document.content, "fresh");
    }
}
