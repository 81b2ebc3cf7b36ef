//! Personal routine and topic-progress tracking, stored locally and mirrored
//! to the remote store through the write outbox.

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use stash::kv::{KeyValue, KvError};
use stash::store::StoreError;
use study_utils::progress::{ContentCompletion, blend_progress};

use crate::Satchel;

const TRACKER_NAMESPACE: &str = "tracker";
const ROUTINE_KEY: &str = "routine";
const PROGRESS_KEY: &str = "progress";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutineItem {
    pub name: String,
    pub days: Vec<Weekday>,
    /// Minutes after midnight, local time.
    pub start_minute: u32,
    pub duration_minutes: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutineSchedule {
    pub items: Vec<RoutineItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskEntry {
    pub key: String,
    /// Elapsed-time completion, 0..=1.
    pub elapsed_fraction: f64,
    pub content: ContentCompletion,
}

impl TaskEntry {
    /// Combined "total" progress: elapsed time and content, 50/50.
    pub fn total_progress(&self) -> f64 {
        blend_progress(self.elapsed_fraction, &self.content)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressTree {
    pub tasks: Vec<TaskEntry>,
}

pub struct Tracker<'a> {
    pub(crate) app: &'a Satchel,
}

impl Tracker<'_> {
    /// Reads a local JSON blob, healing corruption by overwriting it with the
    /// default and carrying on. The reset is logged, never surfaced.
    async fn load_or_default<T>(&self, name: &str) -> Result<T, StoreError>
    where
        T: DeserializeOwned + Serialize + Default,
    {
        let kv = KeyValue::new(&self.app.store, TRACKER_NAMESPACE);
        match kv.get_json(name).await {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Ok(T::default()),
            Err(KvError::Corrupt { detail, .. }) => {
                log::warn!("stored {name} is corrupt ({detail}), resetting to default");
                let value = T::default();
                kv.set_json(name, &value).await?;
                Ok(value)
            }
            Err(KvError::Store(e)) => Err(e),
        }
    }

    pub async fn routine(&self) -> Result<RoutineSchedule, StoreError> {
        self.load_or_default(ROUTINE_KEY).await
    }

    /// Persists locally first, then queues the remote mirror write under
    /// `routine-{username}`.
    pub async fn save_routine(
        &self,
        username: &str,
        schedule: &RoutineSchedule,
    ) -> Result<(), StoreError> {
        KeyValue::new(&self.app.store, TRACKER_NAMESPACE)
            .set_json(ROUTINE_KEY, schedule)
            .await?;
        self.app
            .queue_write(
                format!("routine-{username}"),
                serde_json::to_value(schedule).unwrap(),
            )
            .await
    }

    pub async fn progress(&self) -> Result<ProgressTree, StoreError> {
        self.load_or_default(PROGRESS_KEY).await
    }

    /// Persists locally first, then queues the remote mirror write under
    /// `progress-{userId}`.
    pub async fn save_progress(&self, user_id: &str, tree: &ProgressTree) -> Result<(), StoreError> {
        KeyValue::new(&self.app.store, TRACKER_NAMESPACE)
            .set_json(PROGRESS_KEY, tree)
            .await?;
        self.app
            .queue_write(
                format!("progress-{user_id}"),
                serde_json::to_value(tree).unwrap(),
            )
            .await
    }
}
