//! Quiz and flashcard mini-games: dataset loading, AI grading, and score
//! persistence.

use serde::{Deserialize, Serialize};

use stash::CacheKey;
use stash::kv::{KeyValue, KvError};
use stash::loader::{ContentLoader, DocumentSource};
use stash::store::{BlobStore as _, StoreError};
use study_utils::grading::{
    GradeAnswerRequest, GradeAnswerResponse, RevealAnswerRequest, RevealAnswerResponse,
};
use study_utils::keys::sanitize_store_key;
use study_utils::progress::ProgressRecord;
use study_utils::quiz::QuizSession;

use crate::Satchel;

pub const GAMES_NAMESPACE: &str = "games";
const SCORES_NAMESPACE: &str = "scores";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QuizDataset {
    pub title: String,
    /// Correct answers needed to win a run of this quiz.
    pub target_correct: u32,
    pub questions: Vec<QuizQuestion>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub prompt: String,
    pub choices: Vec<String>,
    pub answer_index: usize,
}

/// Empty dataset written over a corrupt one, and served when the remote host
/// has no dataset for a name.
fn default_dataset_json(name: &str) -> String {
    serde_json::to_string_pretty(&QuizDataset {
        title: name.to_string(),
        target_correct: 10,
        questions: Vec::new(),
    })
    .unwrap()
}

#[derive(Debug, thiserror::Error)]
pub enum GradingError {
    #[error("request to the grading service failed")]
    Transport(#[source] reqwest::Error),

    #[error("grading service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to parse grading response: {detail}\nbody: {body}")]
    Parse { body: String, detail: String },
}

pub struct Games<'a> {
    pub(crate) app: &'a Satchel,
}

impl Games<'_> {
    fn dataset_url(&self, name: &str) -> String {
        format!(
            "{}/games/{name}.json",
            self.app.config.content_base_url.trim_end_matches('/')
        )
    }

    /// Loads a quiz dataset through the content cache. A dataset that no
    /// longer parses is corruption: it is overwritten with the empty default
    /// and loading proceeds.
    pub async fn load_dataset(&self, name: &str) -> Result<QuizDataset, StoreError> {
        let key = CacheKey::new(GAMES_NAMESPACE, format!("{name}.json"));
        let loader = ContentLoader::new(&self.app.store, &self.app.fetcher);
        let document = loader
            .load(&key, &self.dataset_url(name), |_| default_dataset_json(name), None)
            .await?;

        match serde_json::from_str(&document.content) {
            Ok(dataset) => Ok(dataset),
            Err(e) => {
                log::warn!("quiz dataset {name} is corrupt ({e}), resetting to default");
                let fallback = default_dataset_json(name);
                self.app.store.write(&key, fallback.as_bytes()).await?;
                loader
                    .record_provenance(&key, DocumentSource::GeneratedPlaceholder)
                    .await?;
                Ok(serde_json::from_str(&fallback).unwrap())
            }
        }
    }

    async fn hit_grading_server<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        request: &impl Serialize,
        access_token: Option<&str>,
    ) -> Result<T, GradingError> {
        let url = format!(
            "{}{path}",
            self.app.config.grading_base_url.trim_end_matches('/')
        );
        // always include an Authorization header; "anonymous" stands in when
        // the user is not signed in
        let token = access_token.unwrap_or("anonymous");
        let response = self
            .app
            .http
            .post(&url)
            .json(request)
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .map_err(GradingError::Transport)?;

        let status = response.status();
        let body = response.text().await.map_err(GradingError::Transport)?;
        if !status.is_success() {
            return Err(GradingError::Status {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| GradingError::Parse {
            body,
            detail: e.to_string(),
        })
    }

    pub async fn grade_answer(
        &self,
        request: &GradeAnswerRequest,
        access_token: Option<&str>,
    ) -> Result<GradeAnswerResponse, GradingError> {
        self.hit_grading_server("/grade-answer", request, access_token)
            .await
    }

    pub async fn reveal_answer(
        &self,
        request: &RevealAnswerRequest,
        access_token: Option<&str>,
    ) -> Result<RevealAnswerResponse, GradingError> {
        self.hit_grading_server("/reveal-answer", request, access_token)
            .await
    }

    /// Stored best-score record for one quiz. A corrupt record is cleared
    /// and reads as absent.
    pub async fn best_score(&self, quiz_key: &str) -> Result<Option<ProgressRecord>, StoreError> {
        let kv = KeyValue::new(&self.app.store, SCORES_NAMESPACE);
        match kv.get_json(quiz_key).await {
            Ok(record) => Ok(record),
            Err(KvError::Corrupt { detail, .. }) => {
                log::warn!("stored score for {quiz_key} is corrupt ({detail}), resetting");
                kv.remove(quiz_key).await?;
                Ok(None)
            }
            Err(KvError::Store(e)) => Err(e),
        }
    }

    /// Records a finished run: ratchets the stored best score, persists it
    /// immediately, and queues the remote mirror write. Returns whether the
    /// stored best improved.
    pub async fn record_result(
        &self,
        user_id: &str,
        quiz_key: &str,
        session: &QuizSession,
    ) -> Result<bool, StoreError> {
        let mut record = self
            .best_score(quiz_key)
            .await?
            .unwrap_or_else(|| ProgressRecord::new(quiz_key));
        let improved = record.apply_attempt(session.score());

        KeyValue::new(&self.app.store, SCORES_NAMESPACE)
            .set_json(quiz_key, &record)
            .await?;
        self.app
            .queue_write(
                format!("progress-{user_id}/{}", sanitize_store_key(quiz_key)),
                serde_json::to_value(&record).unwrap(),
            )
            .await?;
        Ok(improved)
    }
}
