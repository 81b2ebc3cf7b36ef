pub mod courses;
pub mod games;
pub mod notes;
pub mod reachability;
pub mod render;
pub mod tracker;

use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::LazyLock;

use stash::fetch::Fetcher;
use stash::fs::FsBlobStore;
use stash::kv::{KeyValue, KvError};
use stash::outbox::{BackoffPolicy, Outbox};
use stash::remote::{RemoteConfig, RemoteStore};
use stash::store::StoreError;
use study_utils::Credentials;

const SECURE_NAMESPACE: &str = "secure";
const CREDENTIALS_KEY: &str = "credentials";

// going through LOGGER keeps the logger from being initialized twice when two
// clients are constructed in one process
static LOGGER: LazyLock<()> = LazyLock::new(|| {
    let _ = env_logger::Builder::from_default_env().try_init();
    log::info!("Logging initialized");
});

#[derive(Clone, Debug)]
pub struct SatchelConfig {
    /// Root directory for all locally cached content and key-value state.
    pub data_dir: PathBuf,
    /// Base URL of the static content host (notes, datasets, the course
    /// manifest).
    pub content_base_url: String,
    /// Base URL of the AI grading backend.
    pub grading_base_url: String,
    pub remote: RemoteConfig,
}

/// The application client. Constructed once at process start and passed by
/// reference into whichever screen needs it; every handle it owns is an
/// explicit field, never module-level state.
pub struct Satchel {
    pub(crate) config: SatchelConfig,
    pub(crate) store: FsBlobStore,
    pub(crate) remote: RemoteStore,
    pub(crate) fetcher: Fetcher,
    pub(crate) http: reqwest::Client,
    // btw, we should never hold this borrow across an .await; snapshots are
    // taken first and persisted after the borrow is dropped
    outbox: RefCell<Outbox>,
    backoff: BackoffPolicy,
}

impl Satchel {
    pub async fn new(config: SatchelConfig) -> Result<Self, StoreError> {
        LazyLock::force(&LOGGER);

        let store = FsBlobStore::new(&config.data_dir);
        let http = reqwest::Client::new();
        let outbox = Outbox::load(&store).await?;
        if outbox.dirty() {
            log::info!("{} queued write(s) survive from a previous run", outbox.pending());
        }

        Ok(Self {
            remote: RemoteStore::new(config.remote.clone(), http.clone()),
            fetcher: Fetcher::new(http.clone()),
            store,
            http,
            config,
            outbox: RefCell::new(outbox),
            backoff: BackoffPolicy::default(),
        })
    }

    pub fn config(&self) -> &SatchelConfig {
        &self.config
    }

    pub fn store(&self) -> &FsBlobStore {
        &self.store
    }

    pub fn remote(&self) -> &RemoteStore {
        &self.remote
    }

    pub fn notes(&self) -> notes::Notes<'_> {
        notes::Notes { app: self }
    }

    pub fn games(&self) -> games::Games<'_> {
        games::Games { app: self }
    }

    pub fn tracker(&self) -> tracker::Tracker<'_> {
        tracker::Tracker { app: self }
    }

    pub fn courses(&self) -> courses::Courses<'_> {
        courses::Courses { app: self }
    }

    /// Stored viewer credentials, if the user has signed in on this device.
    /// Corrupt stored credentials are cleared and read as signed-out.
    pub async fn credentials(&self) -> Result<Option<Credentials>, StoreError> {
        let kv = KeyValue::new(&self.store, SECURE_NAMESPACE);
        match kv.get_json(CREDENTIALS_KEY).await {
            Ok(credentials) => Ok(credentials),
            Err(KvError::Corrupt { detail, .. }) => {
                log::warn!("stored credentials are corrupt ({detail}), clearing");
                kv.remove(CREDENTIALS_KEY).await?;
                Ok(None)
            }
            Err(KvError::Store(e)) => Err(e),
        }
    }

    pub async fn set_credentials(&self, credentials: &Credentials) -> Result<(), StoreError> {
        KeyValue::new(&self.store, SECURE_NAMESPACE)
            .set_json(CREDENTIALS_KEY, credentials)
            .await
    }

    /// True while queued remote writes are waiting to land.
    pub fn dirty(&self) -> bool {
        self.outbox.borrow().dirty()
    }

    /// Enqueues a remote mirror write and persists the queue. The optimistic
    /// local update has already happened by the time this is called.
    pub(crate) async fn queue_write(
        &self,
        path: String,
        value: serde_json::Value,
    ) -> Result<(), StoreError> {
        let snapshot = {
            let mut outbox = self.outbox.borrow_mut();
            outbox.enqueue(path, value);
            outbox.snapshot()
        };
        Outbox::persist(&snapshot, &self.store).await
    }

    /// Flushes queued remote writes with the configured backoff. Entries that
    /// keep failing stay queued; `dirty()` keeps reporting true for them.
    /// Returns how many writes landed.
    pub async fn sync(&self) -> Result<usize, StoreError> {
        let mut flushing = std::mem::take(&mut *self.outbox.borrow_mut());
        let flushed = flushing.flush(&self.remote, &self.backoff).await;

        let snapshot = {
            let mut outbox = self.outbox.borrow_mut();
            // anything enqueued while we were flushing goes behind the
            // survivors, replacing same-path entries as usual
            for write in outbox.snapshot() {
                flushing.enqueue(write.path, write.value);
            }
            *outbox = flushing;
            outbox.snapshot()
        };
        Outbox::persist(&snapshot, &self.store).await?;
        Ok(flushed)
    }
}
