use axum::{
    Router,
    extract::Json,
    http::StatusCode,
    routing::{get, post},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use base64::Engine;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use study_utils::grading::{
    GradeAnswerRequest, GradeAnswerResponse, InlineImage, RevealAnswerRequest,
    RevealAnswerResponse, strip_code_fence,
};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tysm::chat_completions::ChatClient;

static CLIENT: LazyLock<ChatClient> = LazyLock::new(|| {
    let model = std::env::var("GRADING_MODEL").unwrap_or_else(|_| "o3".to_string());
    ChatClient::from_env(model.as_str()).unwrap()
});

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: uuid::Uuid, // subject (user id)
    exp: usize,      // expiry
}

#[allow(dead_code)]
async fn verify_jwt(token: &str) -> Result<Claims, StatusCode> {
    let jwt_secret =
        std::env::var("SATCHEL_JWT_SECRET").map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&["authenticated"]);

    let decoding_key = DecodingKey::from_secret(jwt_secret.as_ref());

    match decode::<Claims>(token, &decoding_key, &validation) {
        Ok(token_data) => Ok(token_data.claims),
        Err(_) => Err(StatusCode::UNAUTHORIZED),
    }
}

async fn grade_answer(
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<GradeAnswerRequest>,
) -> Result<Json<GradeAnswerResponse>, StatusCode> {
    // grading stays open to signed-out users; the token is parsed so
    // enforcement is a one-line change
    let _claims = verify_jwt(auth.token()).await;

    if let Some(image) = &request.image {
        return grade_with_image(&request, image).await.map(Json);
    }

    let system_prompt = format!(
        r#"The user is studying {subject}. They answered a practice question and you are grading their answer. Assign a score from 0 (no understanding shown) to 10 (fully correct), and write a short explanation addressed directly to the user. Do not punish wording differences when the meaning is fully preserved. If an expected answer is provided, grade against it; otherwise grade against your own knowledge of the subject.

Respond with JSON: {{"score": <0-10>, "explanation": "..."}}

Keep the explanation concise. Markdown formatting is allowed."#,
        subject = request.subject,
    );

    let user_prompt = match &request.expected_answer {
        Some(expected) => format!(
            "Question: {}\nExpected answer: {}\nUser's answer: {}",
            request.question, expected, request.user_answer
        ),
        None => format!(
            "Question: {}\nUser's answer: {}",
            request.question, request.user_answer
        ),
    };

    let response: GradeAnswerResponse = CLIENT
        .chat_with_system_prompt(system_prompt, &user_prompt)
        .await
        .inspect_err(|e| log::error!("grading chat failed: {e:?}"))
        .map_err(|_e| StatusCode::INTERNAL_SERVER_ERROR)?;
    log::info!("graded a {} answer: {}/10", request.subject, response.score);

    Ok(Json(response))
}

/// Grading for answers submitted as a photo (handwritten work). The typed
/// chat client has no image path, so this goes straight at the generative
/// API's REST surface, and the JSON reply text is parsed by hand.
async fn grade_with_image(
    request: &GradeAnswerRequest,
    image: &InlineImage,
) -> Result<GradeAnswerResponse, StatusCode> {
    // reject payloads that are not actually base64 before they reach the API
    base64::engine::general_purpose::STANDARD
        .decode(&image.data)
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let api_key =
        std::env::var("GEMINI_API_KEY").map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let model =
        std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".to_string());
    let url = format!(
        "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent?key={api_key}"
    );

    let prompt = format!(
        r#"The user is studying {subject}. The attached image shows their worked answer to the question below. Grade the work in the image from 0 (no understanding shown) to 10 (fully correct) and write a short explanation addressed directly to the user.

Question: {question}
{expected}
Respond ONLY with JSON of the form {{"score": <0-10>, "explanation": "..."}}."#,
        subject = request.subject,
        question = request.question,
        expected = match &request.expected_answer {
            Some(expected) => format!("Expected answer: {expected}\n"),
            None => String::new(),
        },
    );

    let body = serde_json::json!({
        "contents": [{
            "parts": [
                { "text": prompt },
                { "inline_data": { "mime_type": image.mime_type, "data": image.data } },
            ]
        }]
    });

    let client = reqwest::Client::new();
    let response = client
        .post(&url)
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| {
            log::error!("image grading request failed: {e:?}");
            StatusCode::BAD_GATEWAY
        })?;

    if !response.status().is_success() {
        log::error!("image grading returned {}", response.status());
        return Err(StatusCode::BAD_GATEWAY);
    }

    let reply: serde_json::Value = response
        .json()
        .await
        .map_err(|_| StatusCode::BAD_GATEWAY)?;
    let text = reply["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .ok_or(StatusCode::BAD_GATEWAY)?;

    // the model wraps its JSON in a code fence more often than not
    serde_json::from_str(strip_code_fence(text)).map_err(|e| {
        log::error!("unparseable image grading reply: {e}\n{text}");
        StatusCode::BAD_GATEWAY
    })
}

async fn reveal_answer(
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<RevealAnswerRequest>,
) -> Result<Json<RevealAnswerResponse>, StatusCode> {
    let _claims = verify_jwt(auth.token()).await;

    let system_prompt = format!(
        r#"The user is studying {subject} and gave up on a practice question. Identify the correct answer. When choices are listed, the correct answer must be one of them, quoted exactly. Add a short explanation addressed directly to the user when it would help them; omit it for self-evident answers.

Respond with JSON: {{"correct_answer": "...", "explanation": "..." or null}}"#,
        subject = request.subject,
    );

    let choices = request
        .choices
        .iter()
        .enumerate()
        .map(|(i, choice)| format!("{}. {choice}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");
    let user_prompt = if request.choices.is_empty() {
        format!("Question: {}", request.question)
    } else {
        format!("Question: {}\nChoices:\n{choices}", request.question)
    };

    let response: RevealAnswerResponse = CLIENT
        .chat_with_system_prompt(system_prompt, &user_prompt)
        .await
        .inspect_err(|e| log::error!("reveal chat failed: {e:?}"))
        .map_err(|_e| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(response))
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/grade-answer", post(grade_answer))
        .route("/reveal-answer", post(reveal_answer))
        .layer(CompressionLayer::new())
        .layer(cors);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
    log::info!("Listening on port 8080");
    axum::serve(listener, app).await.unwrap();
}
