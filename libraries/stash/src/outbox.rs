//! Queued remote writes with retry and backoff. Optimistic UI updates
//! enqueue here instead of firing and forgetting; the queue itself is
//! persisted through the blob store, so a crash loses at most what never
//! reached it.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::kv::{KeyValue, KvError};
use crate::remote::{RemoteError, RemoteStore};
use crate::store::{BlobStore, StoreError};

pub const OUTBOX_NAMESPACE: &str = "outbox";
const PENDING_KEY: &str = "pending";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingWrite {
    pub path: String,
    pub value: Value,
    pub attempts: u32,
}

#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (zero-based), doubling each time.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.initial_delay * 2u32.saturating_pow(attempt)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_attempts: 4,
        }
    }
}

#[derive(Debug, Default)]
pub struct Outbox {
    pending: VecDeque<PendingWrite>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// A later write to the same path replaces the queued one. Remote writes
    /// are full-value overwrites, so only the last value matters.
    pub fn enqueue(&mut self, path: impl Into<String>, value: Value) {
        let path = path.into();
        if let Some(existing) = self.pending.iter_mut().find(|w| w.path == path) {
            existing.value = value;
            existing.attempts = 0;
        } else {
            self.pending.push_back(PendingWrite {
                path,
                value,
                attempts: 0,
            });
        }
    }

    /// True while anything is queued; screens surface this as a "changes not
    /// yet synced" indicator.
    pub fn dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn snapshot(&self) -> VecDeque<PendingWrite> {
        self.pending.clone()
    }

    pub async fn load<S: BlobStore>(store: &S) -> Result<Self, StoreError> {
        let kv = KeyValue::new(store, OUTBOX_NAMESPACE);
        match kv.get_json::<VecDeque<PendingWrite>>(PENDING_KEY).await {
            Ok(pending) => Ok(Self {
                pending: pending.unwrap_or_default(),
            }),
            Err(KvError::Corrupt { detail, .. }) => {
                log::warn!("persisted outbox queue is corrupt ({detail}), starting empty");
                Ok(Self::new())
            }
            Err(KvError::Store(e)) => Err(e),
        }
    }

    pub async fn save<S: BlobStore>(&self, store: &S) -> Result<(), StoreError> {
        Self::persist(&self.pending, store).await
    }

    /// Persists a queue snapshot taken earlier, so callers can drop any
    /// borrow of the live outbox before awaiting.
    pub async fn persist<S: BlobStore>(
        pending: &VecDeque<PendingWrite>,
        store: &S,
    ) -> Result<(), StoreError> {
        KeyValue::new(store, OUTBOX_NAMESPACE)
            .set_json(PENDING_KEY, pending)
            .await
    }

    /// Flushes the queue in order against the remote store. Stops at the
    /// first entry that exhausts its retries; that entry stays queued and
    /// `dirty()` keeps reporting true. Returns how many writes landed.
    pub async fn flush(&mut self, remote: &RemoteStore, policy: &BackoffPolicy) -> usize {
        self.flush_with(policy, |path, value| async move {
            remote.put(&path, &value).await
        })
        .await
    }

    pub async fn flush_with<F, Fut>(&mut self, policy: &BackoffPolicy, mut write: F) -> usize
    where
        F: FnMut(String, Value) -> Fut,
        Fut: Future<Output = Result<(), RemoteError>>,
    {
        let mut flushed = 0;
        while let Some(mut entry) = self.pending.pop_front() {
            loop {
                match write(entry.path.clone(), entry.value.clone()).await {
                    Ok(()) => {
                        flushed += 1;
                        break;
                    }
                    Err(e) => {
                        entry.attempts += 1;
                        if entry.attempts >= policy.max_attempts {
                            log::error!(
                                "write to {} failed after {} attempts: {e}",
                                entry.path,
                                entry.attempts
                            );
                            self.pending.push_front(entry);
                            return flushed;
                        }
                        let delay = policy.delay_for(entry.attempts - 1);
                        log::warn!("write to {} failed ({e}), retrying in {delay:?}", entry.path);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        flushed
    }
}
