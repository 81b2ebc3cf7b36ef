//! Content cache and sync engine. Created for the Satchel learning
//! companion, so it doesn't include much that was not needed for that
//! project.
//!
//! Caching strategy:
//! 1. Every logical resource gets a [`CacheKey`] (namespace + id) that doubles as its local storage path and, where applicable, its remote lookup key.
//! 2. Presence is always a live store query. Local storage can be cleared out from under the app, and the engine tolerates a resource returning to absent.
//! 3. Downloads are idempotent by presence: if the destination already exists, the network is never touched. That means a corrupted local blob is indistinguishable from a valid cached one at this layer.
//! 4. Loading a document tries the local cache, then the remote URL, then a generated placeholder, and persists whatever it ended up with.
//! 5. Remote writes go through a persisted outbox with retry and backoff instead of being fired and forgotten.

pub mod kv;
pub mod store;

#[cfg(feature = "fs")]
pub mod fs;

#[cfg(feature = "remote")]
pub mod deps;
#[cfg(feature = "remote")]
pub mod fetch;
#[cfg(feature = "remote")]
pub mod loader;
#[cfg(feature = "remote")]
pub mod outbox;
#[cfg(feature = "remote")]
pub mod remote;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Semantic identifier for one logical resource: a note, a dependency file,
/// a dataset. Unique within its namespace.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub namespace: String,
    pub id: String,
}

impl CacheKey {
    pub fn new(namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
        }
    }

    /// Relative path of this resource inside a local store. The id may
    /// contain `/` separators of its own.
    pub fn storage_path(&self) -> String {
        format!("{}/{}", self.namespace, self.id)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.id)
    }
}
