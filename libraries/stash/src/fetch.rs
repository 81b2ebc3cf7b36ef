//! Idempotent remote fetcher with slot-based progress aggregation.

use std::cell::RefCell;

use crate::CacheKey;
use crate::store::{BlobStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request for {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("GET {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The destination already existed; the network was never touched.
    AlreadyPresent,
    Downloaded,
}

/// Per-file progress fractions, one slot per expected download (dependencies,
/// fonts, and the document itself). Overall progress is the mean of all slots
/// and is reported through the callback on every change.
pub struct ProgressSlots {
    fractions: RefCell<Vec<f64>>,
    on_change: Box<dyn Fn(f64)>,
}

impl ProgressSlots {
    pub fn new(expected: usize, on_change: impl Fn(f64) + 'static) -> Self {
        Self {
            fractions: RefCell::new(vec![0.0; expected]),
            on_change: Box::new(on_change),
        }
    }

    /// Adds slots for files discovered after the fact (fonts found by CSS
    /// scanning).
    pub fn extend(&self, additional: usize) {
        self.fractions
            .borrow_mut()
            .extend(std::iter::repeat_n(0.0, additional));
        (self.on_change)(self.overall());
    }

    pub fn len(&self) -> usize {
        self.fractions.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fractions.borrow().is_empty()
    }

    pub fn slot(&self, index: usize) -> ProgressSlot<'_> {
        ProgressSlot { slots: self, index }
    }

    pub fn overall(&self) -> f64 {
        let fractions = self.fractions.borrow();
        if fractions.is_empty() {
            return 0.0;
        }
        fractions.iter().sum::<f64>() / fractions.len() as f64
    }

    fn set(&self, index: usize, fraction: f64) {
        {
            let mut fractions = self.fractions.borrow_mut();
            if let Some(slot) = fractions.get_mut(index) {
                *slot = fraction.clamp(0.0, 1.0);
            }
        }
        (self.on_change)(self.overall());
    }
}

/// Handle for the progress of one expected file.
pub struct ProgressSlot<'a> {
    slots: &'a ProgressSlots,
    index: usize,
}

impl ProgressSlot<'_> {
    pub fn set(&self, fraction: f64) {
        self.slots.set(self.index, fraction);
    }
}

pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Downloads `url` into `key` unless the destination already exists.
    ///
    /// Idempotent by presence, not by content: a partial or corrupted local
    /// blob is indistinguishable from a valid cached one here. Any non-2xx
    /// status or transport error surfaces as [`FetchError`] with no retry;
    /// the caller decides between a placeholder fallback and an error state.
    pub async fn fetch<S: BlobStore>(
        &self,
        url: &str,
        store: &S,
        key: &CacheKey,
        progress: Option<&ProgressSlot<'_>>,
    ) -> Result<FetchOutcome, FetchError> {
        if store.exists(key).await? {
            if let Some(slot) = progress {
                slot.set(1.0);
            }
            return Ok(FetchOutcome::AlreadyPresent);
        }

        let transport = |source| FetchError::Transport {
            url: url.to_string(),
            source,
        };

        let mut response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // fractional progress only when the server supplies a length
        let total = response.content_length().filter(|&len| len > 0);
        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(transport)? {
            body.extend_from_slice(&chunk);
            if let (Some(slot), Some(total)) = (progress, total) {
                slot.set(body.len() as f64 / total as f64);
            }
        }

        store.write(key, &body).await?;
        if let Some(slot) = progress {
            slot.set(1.0);
        }
        log::info!("downloaded {url} into {key}");
        Ok(FetchOutcome::Downloaded)
    }
}
