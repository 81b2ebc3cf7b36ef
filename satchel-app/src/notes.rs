//! Markdown notes: render dependencies, channel resolution, and the local
//! save path.

use std::sync::LazyLock;

use stash::CacheKey;
use stash::deps::{self, DEPENDENCY_NAMESPACE, Manifest};
use stash::fetch::{FetchError, ProgressSlots};
use stash::fs::FsBlobStore;
use stash::loader::{ContentLoader, Document, DocumentSource};
use stash::remote::RemoteError;
use stash::store::{BlobStore as _, StoreError};
use study_utils::keys::sanitize_store_key;
use study_utils::{Channel, Credentials, Visibility};

use crate::render::RenderPage;
use crate::Satchel;

pub const NOTES_NAMESPACE: &str = "notes";

/// The eight fixed rendering dependencies every note page needs: the
/// markdown converter, the math renderer and its auto-render hook, the
/// syntax highlighter, and their stylesheets. The KaTeX stylesheet is the
/// one whose `url(...)` references pull in font files.
pub static NOTE_DEPENDENCIES: LazyLock<Manifest> = LazyLock::new(|| {
    Manifest::new()
        .with_entry(
            "marked.min.js",
            "https://cdn.jsdelivr.net/npm/marked@12.0.2/marked.min.js",
        )
        .with_entry(
            "katex.min.js",
            "https://cdn.jsdelivr.net/npm/katex@0.16.10/dist/katex.min.js",
        )
        .with_entry(
            "katex.min.css",
            "https://cdn.jsdelivr.net/npm/katex@0.16.10/dist/katex.min.css",
        )
        .with_entry(
            "auto-render.min.js",
            "https://cdn.jsdelivr.net/npm/katex@0.16.10/dist/contrib/auto-render.min.js",
        )
        .with_entry(
            "highlight.min.js",
            "https://cdn.jsdelivr.net/gh/highlightjs/cdn-release@11.9.0/build/highlight.min.js",
        )
        .with_entry(
            "highlight-github.min.css",
            "https://cdn.jsdelivr.net/gh/highlightjs/cdn-release@11.9.0/build/styles/github.min.css",
        )
        .with_entry(
            "notes.css",
            "https://satchel-content.pages.dev/assets/notes.css",
        )
        .with_entry(
            "notes-dark.css",
            "https://satchel-content.pages.dev/assets/notes-dark.css",
        )
        .with_font_source("katex.min.css")
});

/// Title for a placeholder note: the last path segment, `.md` stripped.
pub fn infer_title(path: &str) -> &str {
    let segment = path.rsplit('/').next().unwrap_or(path);
    segment.strip_suffix(".md").unwrap_or(segment)
}

/// Starter document used when a note exists neither locally nor upstream.
pub fn note_placeholder(path: &str) -> String {
    let title = infer_title(path);
    format!("# {title}\n\nStart taking notes for *{title}* here.\n")
}

/// Which variant of a note to load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelSelector {
    /// The canonical upstream document. Selecting it discards any local edit
    /// and re-fetches; this is the deliberate reset-to-upstream operation.
    Default,
    Channel(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("these credentials do not own this channel")]
    Auth,

    #[error("a channel for this note already exists under this name with a different secret")]
    Conflict,

    #[error("channel entry {id} is malformed: {detail}")]
    Malformed { id: String, detail: String },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn channels_root(path: &str) -> String {
    format!("notes/{}", sanitize_store_key(path))
}

fn channel_path(path: &str, id: &str) -> String {
    format!("{}/{id}", channels_root(path))
}

/// Pre-upload check against the channel already stored under the viewer's
/// sub-key. A key collision means the owner name already matches; the secret
/// decides between overwrite and conflict.
pub fn check_upload(existing: Option<&Channel>, creds: &Credentials) -> Result<(), ChannelError> {
    match existing {
        Some(channel) if channel.owner_secret != creds.secret => Err(ChannelError::Conflict),
        _ => Ok(()),
    }
}

fn parse_channel(id: &str, value: serde_json::Value) -> Result<Channel, ChannelError> {
    let mut channel: Channel =
        serde_json::from_value(value).map_err(|e| ChannelError::Malformed {
            id: id.to_string(),
            detail: e.to_string(),
        })?;
    channel.id = id.to_string();
    Ok(channel)
}

pub struct Notes<'a> {
    pub(crate) app: &'a Satchel,
}

impl Notes<'_> {
    fn loader(&self) -> ContentLoader<'_, FsBlobStore> {
        ContentLoader::new(&self.app.store, &self.app.fetcher)
    }

    fn key(&self, path: &str) -> CacheKey {
        CacheKey::new(NOTES_NAMESPACE, path)
    }

    fn canonical_url(&self, path: &str) -> String {
        format!(
            "{}/{path}",
            self.app.config.content_base_url.trim_end_matches('/')
        )
    }

    /// Makes every render dependency (plus the fonts its stylesheet
    /// references) available locally. Call before presenting any note.
    pub async fn ensure_dependencies(
        &self,
        progress: Option<&ProgressSlots>,
    ) -> Result<(), FetchError> {
        deps::resolve(&NOTE_DEPENDENCIES, &self.app.store, &self.app.fetcher, progress).await
    }

    pub async fn load(&self, path: &str) -> Result<Document, StoreError> {
        self.loader()
            .load(
                &self.key(path),
                &self.canonical_url(path),
                |_| note_placeholder(path),
                None,
            )
            .await
    }

    /// Persists an edit locally and records its provenance. Publishing to a
    /// channel is a separate, explicit operation.
    pub async fn save(&self, path: &str, content: &str) -> Result<(), StoreError> {
        let key = self.key(path);
        self.app.store.write(&key, content.as_bytes()).await?;
        self.loader()
            .record_provenance(&key, DocumentSource::LocalEdit)
            .await
    }

    /// Channels published for this note that the viewer is allowed to see.
    /// Malformed entries are skipped with a log line, never surfaced.
    pub async fn list_channels(
        &self,
        path: &str,
        viewer: Option<&Credentials>,
    ) -> Result<Vec<Channel>, ChannelError> {
        let entries = self.app.remote.list(&channels_root(path)).await?;
        let mut channels = Vec::new();
        for (id, value) in entries {
            match parse_channel(&id, value) {
                Ok(channel) => {
                    if channel.visible_to(viewer) {
                        channels.push(channel);
                    }
                }
                Err(e) => log::warn!("skipping channel under {path}: {e}"),
            }
        }
        Ok(channels)
    }

    /// Loads the selected variant and makes it the active document. The
    /// replacement is wholesale; nothing is merged.
    pub async fn select_channel(
        &self,
        path: &str,
        selector: &ChannelSelector,
    ) -> Result<Document, ChannelError> {
        match selector {
            ChannelSelector::Default => {
                let key = self.key(path);
                self.app.store.remove(&key).await.map_err(ChannelError::Store)?;
                self.load(path).await.map_err(ChannelError::Store)
            }
            ChannelSelector::Channel(id) => {
                let value = self
                    .app
                    .remote
                    .get(&channel_path(path, id))
                    .await?
                    .ok_or_else(|| ChannelError::Malformed {
                        id: id.clone(),
                        detail: "channel no longer exists".to_string(),
                    })?;
                let channel = parse_channel(id, value)?;
                let key = self.key(path);
                self.app
                    .store
                    .write(&key, channel.content.as_bytes())
                    .await
                    .map_err(ChannelError::Store)?;
                self.loader()
                    .record_provenance(&key, DocumentSource::Channel)
                    .await
                    .map_err(ChannelError::Store)?;
                Ok(Document {
                    path: path.to_string(),
                    content: channel.content,
                    source: DocumentSource::Channel,
                })
            }
        }
    }

    /// Publishes the viewer's variant of a note. Re-uploading with the
    /// stored secret overwrites; a different secret is a conflict and the
    /// stored channel is left unchanged.
    pub async fn upload(
        &self,
        path: &str,
        creds: &Credentials,
        content: String,
        visibility: Visibility,
    ) -> Result<String, ChannelError> {
        let id = sanitize_store_key(&creds.name);
        let remote_path = channel_path(path, &id);

        let existing = match self.app.remote.get(&remote_path).await? {
            Some(value) => Some(parse_channel(&id, value)?),
            None => None,
        };
        check_upload(existing.as_ref(), creds)?;

        let channel = Channel {
            id: id.clone(),
            owner_name: creds.name.clone(),
            owner_secret: creds.secret.clone(),
            visibility,
            content,
        };
        self.app.remote.put(&remote_path, &channel).await?;
        Ok(id)
    }

    /// Deletes the viewer's channel. Both the owner name and the secret must
    /// match; a mismatch never self-heals, it surfaces.
    pub async fn delete_channel(
        &self,
        path: &str,
        channel_id: &str,
        creds: &Credentials,
    ) -> Result<(), ChannelError> {
        let remote_path = channel_path(path, channel_id);
        let value = self
            .app
            .remote
            .get(&remote_path)
            .await?
            .ok_or_else(|| ChannelError::Malformed {
                id: channel_id.to_string(),
                detail: "channel no longer exists".to_string(),
            })?;
        let channel = parse_channel(channel_id, value)?;
        if !channel.deletable_by(creds) {
            return Err(ChannelError::Auth);
        }
        self.app.remote.delete(&remote_path).await?;
        Ok(())
    }

    /// Builds the self-contained render page for a loaded note. Every
    /// manifest dependency must already be local (see
    /// [`Notes::ensure_dependencies`]).
    pub fn render_page(&self, document: &Document) -> Result<String, StoreError> {
        let mut dependencies = Vec::new();
        for name in NOTE_DEPENDENCIES.names() {
            let key = CacheKey::new(DEPENDENCY_NAMESPACE, name);
            dependencies.push((name.to_string(), self.app.store.path_for(&key)?));
        }
        Ok(RenderPage::build(&document.content, &dependencies))
    }
}
