//! Progress records and task-progress blending.

use serde::{Deserialize, Serialize};

/// Best-score record for one subject. The stored score is a monotonic
/// ratchet: it only moves when an attempt beats it strictly.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub subject_key: String,
    pub score: u32,
    pub accumulated_points: u32,
}

impl ProgressRecord {
    pub fn new(subject_key: impl Into<String>) -> Self {
        Self {
            subject_key: subject_key.into(),
            score: 0,
            accumulated_points: 0,
        }
    }

    /// Applies one finished attempt. Points always accumulate; the stored
    /// best moves only for a strictly greater score. Returns whether the
    /// best improved.
    pub fn apply_attempt(&mut self, score: u32) -> bool {
        self.accumulated_points += score;
        if score > self.score {
            self.score = score;
            true
        } else {
            false
        }
    }
}

/// Content-side completion of a task: a manual slider fraction, or the ratio
/// of a subtask checklist.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCompletion {
    Manual { fraction: f64 },
    Checklist { done: u32, total: u32 },
}

impl ContentCompletion {
    pub fn fraction(&self) -> f64 {
        match *self {
            ContentCompletion::Manual { fraction } => fraction.clamp(0.0, 1.0),
            ContentCompletion::Checklist { done, total } => {
                if total == 0 {
                    0.0
                } else {
                    (f64::from(done) / f64::from(total)).clamp(0.0, 1.0)
                }
            }
        }
    }
}

/// Elapsed-time completion and content completion, blended 50/50 into the
/// task's combined "total" progress.
pub fn blend_progress(elapsed_fraction: f64, content: &ContentCompletion) -> f64 {
    (elapsed_fraction.clamp(0.0, 1.0) + content.fraction()) / 2.0
}
