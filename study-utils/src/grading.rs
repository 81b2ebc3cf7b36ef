//! Request and response types for the AI grading service, shared between the
//! app and `satchel-ai-backend`. Response types derive `JsonSchema` so the
//! backend can request them as structured outputs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// An image inlined into a grading request (a photo of handwritten work).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InlineImage {
    /// Base64-encoded image bytes.
    pub data: String,
    pub mime_type: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GradeAnswerRequest {
    pub subject: String,
    pub question: String,
    pub expected_answer: Option<String>,
    pub user_answer: String,
    pub image: Option<InlineImage>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct GradeAnswerResponse {
    /// 0-10 grade for the submitted answer.
    pub score: u32,
    /// Written as if speaking directly to the learner.
    pub explanation: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RevealAnswerRequest {
    pub subject: String,
    pub question: String,
    pub choices: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct RevealAnswerResponse {
    pub correct_answer: String,
    pub explanation: Option<String>,
}

/// Strips an optional markdown code-fence wrapper from a model reply, so
/// that ```json ... ``` parses as plain JSON.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_json_passes_through() {
        assert_eq!(strip_code_fence(r#"{"score": 7}"#), r#"{"score": 7}"#);
    }

    #[test]
    fn json_fence_is_removed() {
        let reply = "```json\n{\"score\": 7, \"explanation\": \"ok\"}\n```";
        assert_eq!(
            strip_code_fence(reply),
            "{\"score\": 7, \"explanation\": \"ok\"}"
        );
    }

    #[test]
    fn anonymous_fence_is_removed() {
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert_eq!(strip_code_fence("  \n{\"a\": 1}\n "), "{\"a\": 1}");
    }
}
