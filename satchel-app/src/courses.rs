//! Course catalog and per-module gamification flags.
//!
//! View counts and completion flags are purely local state; only routine and
//! progress blobs get a remote mirror.

use serde::{Deserialize, Serialize};

use stash::CacheKey;
use stash::kv::{KeyValue, KvError};
use stash::loader::ContentLoader;
use stash::remote::RemoteError;
use stash::store::{BlobStore as _, StoreError};
use study_utils::keys::sanitize_store_key;

use crate::Satchel;

pub const CATALOG_NAMESPACE: &str = "catalog";
const FLAGS_NAMESPACE: &str = "module-flags";
const SYLLABI_NAMESPACE: &str = "syllabi";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    Notes,
    Quiz,
    Game,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub path: String,
    pub title: String,
    pub kind: ModuleKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CourseEntry {
    pub name: String,
    pub title: String,
    pub modules: Vec<ModuleEntry>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseCatalog {
    pub courses: Vec<CourseEntry>,
}

fn empty_catalog_json() -> String {
    serde_json::to_string_pretty(&CourseCatalog::default()).unwrap()
}

pub struct Courses<'a> {
    pub(crate) app: &'a Satchel,
}

impl Courses<'_> {
    /// Fetches the course manifest through the content cache. A manifest
    /// that fails to parse is corruption and resets to an empty catalog.
    pub async fn catalog(&self) -> Result<CourseCatalog, StoreError> {
        let key = CacheKey::new(CATALOG_NAMESPACE, "courses.json");
        let url = format!(
            "{}/courses.json",
            self.app.config.content_base_url.trim_end_matches('/')
        );
        let loader = ContentLoader::new(&self.app.store, &self.app.fetcher);
        let document = loader
            .load(&key, &url, |_| empty_catalog_json(), None)
            .await?;

        match serde_json::from_str(&document.content) {
            Ok(catalog) => Ok(catalog),
            Err(e) => {
                log::warn!("course catalog is corrupt ({e}), resetting");
                self.app
                    .store
                    .write(&key, empty_catalog_json().as_bytes())
                    .await?;
                Ok(CourseCatalog::default())
            }
        }
    }

    /// Bumps the module's local view count and returns the new value.
    pub async fn mark_viewed(&self, module_path: &str) -> Result<u32, StoreError> {
        let count = self.view_count(module_path).await? + 1;
        KeyValue::new(&self.app.store, FLAGS_NAMESPACE)
            .set(&format!("viewed/{module_path}"), &count.to_string())
            .await?;
        Ok(count)
    }

    pub async fn view_count(&self, module_path: &str) -> Result<u32, StoreError> {
        let kv = KeyValue::new(&self.app.store, FLAGS_NAMESPACE);
        match kv.get(&format!("viewed/{module_path}")).await {
            Ok(stored) => Ok(stored.and_then(|v| v.parse().ok()).unwrap_or(0)),
            Err(KvError::Corrupt { .. }) => Ok(0),
            Err(KvError::Store(e)) => Err(e),
        }
    }

    pub async fn mark_completed(&self, module_path: &str) -> Result<(), StoreError> {
        KeyValue::new(&self.app.store, FLAGS_NAMESPACE)
            .set(&format!("completed/{module_path}"), "true")
            .await
    }

    pub async fn is_completed(&self, module_path: &str) -> Result<bool, StoreError> {
        let kv = KeyValue::new(&self.app.store, FLAGS_NAMESPACE);
        match kv.get(&format!("completed/{module_path}")).await {
            Ok(stored) => Ok(stored.as_deref() == Some("true")),
            Err(KvError::Corrupt { .. }) => Ok(false),
            Err(KvError::Store(e)) => Err(e),
        }
    }

    /// Saves a user-authored syllabus locally and queues its remote mirror
    /// under `syllabi/{userId}/{name}`.
    pub async fn save_syllabus(
        &self,
        user_id: &str,
        name: &str,
        outline: &str,
    ) -> Result<(), StoreError> {
        KeyValue::new(&self.app.store, SYLLABI_NAMESPACE)
            .set(name, outline)
            .await?;
        self.app
            .queue_write(
                format!("syllabi/{user_id}/{}", sanitize_store_key(name)),
                serde_json::Value::String(outline.to_string()),
            )
            .await
    }

    /// Local copy of a saved syllabus. A corrupt entry reads as absent.
    pub async fn syllabus(&self, name: &str) -> Result<Option<String>, StoreError> {
        match KeyValue::new(&self.app.store, SYLLABI_NAMESPACE).get(name).await {
            Ok(outline) => Ok(outline),
            Err(KvError::Corrupt { .. }) => Ok(None),
            Err(KvError::Store(e)) => Err(e),
        }
    }

    /// Remote list backing the store tab. Stored either as an array or as a
    /// keyed tree node; both list the same way.
    pub async fn store_items(&self) -> Result<Vec<serde_json::Value>, RemoteError> {
        self.remote_items("store").await
    }

    /// Remote list backing the learn tab.
    pub async fn learn_items(&self) -> Result<Vec<serde_json::Value>, RemoteError> {
        self.remote_items("learn").await
    }

    async fn remote_items(&self, path: &str) -> Result<Vec<serde_json::Value>, RemoteError> {
        match self.app.remote.get(path).await? {
            Some(serde_json::Value::Array(items)) => Ok(items),
            Some(serde_json::Value::Object(map)) => Ok(map.into_values().collect()),
            Some(other) => Ok(vec![other]),
            None => Ok(Vec::new()),
        }
    }
}
