//! Manifest-driven dependency resolution, including the font files the math
//! stylesheet references without listing them in any manifest.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use crate::CacheKey;
use crate::fetch::{FetchError, Fetcher, ProgressSlots};
use crate::store::BlobStore;

/// Namespace shared by all downloaded rendering dependencies.
pub const DEPENDENCY_NAMESPACE: &str = "dependency";

/// Relative prefix that marks a `url(...)` target as a font shipped next to
/// the stylesheet.
pub const FONT_PREFIX: &str = "fonts/";

/// Ordered `name -> remote URL` mapping, fixed at compile time for a given
/// document type. Every entry must resolve to exactly one local file before
/// rendering starts.
#[derive(Clone, Debug, Default)]
pub struct Manifest {
    entries: IndexMap<String, String>,
    /// Entry whose stylesheet text is scanned for font references.
    font_source: Option<String>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, name: &str, url: &str) -> Self {
        self.entries.insert(name.to_string(), url.to_string());
        self
    }

    pub fn with_font_source(mut self, name: &str) -> Self {
        self.font_source = Some(name.to_string());
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn url_for(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn font_source(&self) -> Option<&str> {
        self.font_source.as_deref()
    }
}

static CSS_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"url\(\s*['"]?([^'")\s]+)['"]?\s*\)"#).unwrap());

/// Extracts the deduplicated set of font references from stylesheet text.
///
/// Deliberately regex-based: the upstream math library ships no font
/// manifest, so the stylesheet is the only place the file names exist.
pub fn discover_font_refs(css: &str) -> BTreeSet<String> {
    CSS_URL
        .captures_iter(css)
        .map(|captures| captures[1].to_string())
        .filter(|target| target.starts_with(FONT_PREFIX))
        .collect()
}

/// Joins a reference found in a stylesheet against the stylesheet's own URL.
fn resolve_against(stylesheet_url: &str, reference: &str) -> String {
    match stylesheet_url.rfind('/') {
        Some(idx) => format!("{}/{}", &stylesheet_url[..idx], reference),
        None => reference.to_string(),
    }
}

/// Ensures every manifest entry, and every font its stylesheet references,
/// exists locally, downloading the missing ones one at a time. Sequential
/// downloads bound peak sockets at the cost of slower cold starts.
///
/// Progress convention: the caller allocates one slot per manifest entry
/// (plus any slots of its own); font slots are appended here once the
/// stylesheet has been scanned.
pub async fn resolve<S: BlobStore>(
    manifest: &Manifest,
    store: &S,
    fetcher: &Fetcher,
    progress: Option<&ProgressSlots>,
) -> Result<(), FetchError> {
    for (index, (name, url)) in manifest.iter().enumerate() {
        let key = CacheKey::new(DEPENDENCY_NAMESPACE, name);
        let slot = progress.map(|slots| slots.slot(index));
        fetcher.fetch(url, store, &key, slot.as_ref()).await?;
    }

    let Some(source) = manifest.font_source() else {
        return Ok(());
    };
    let Some(stylesheet_url) = manifest.url_for(source) else {
        log::warn!("font source {source} is not a manifest entry, skipping font discovery");
        return Ok(());
    };

    let css_key = CacheKey::new(DEPENDENCY_NAMESPACE, source);
    let css = String::from_utf8_lossy(&store.read(&css_key).await?).into_owned();
    let refs = discover_font_refs(&css);
    if refs.is_empty() {
        return Ok(());
    }

    let first_font_slot = progress.map(|slots| {
        let start = slots.len();
        slots.extend(refs.len());
        start
    });
    for (offset, reference) in refs.iter().enumerate() {
        let key = CacheKey::new(DEPENDENCY_NAMESPACE, reference);
        let url = resolve_against(stylesheet_url, reference);
        let slot = match (progress, first_font_slot) {
            (Some(slots), Some(start)) => Some(slots.slot(start + offset)),
            _ => None,
        };
        fetcher.fetch(&url, store, &key, slot.as_ref()).await?;
    }
    Ok(())
}
