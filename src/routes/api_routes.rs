use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::errors::AppError;
use crate::models::{ChatMessage, ChatRequest};
use crate::routes::RelayState;

const APP_TITLE: &str = "Bot Council";
const ONLINE_SUFFIX: &str = ":online";
const MISSING_FIELDS: &str = "Model and messages are required";

/// Body forwarded to the upstream provider.
#[derive(Serialize)]
struct UpstreamRequest<'a> {
    model: String,
    messages: &'a [ChatMessage],
    stream: bool,
}

/// Model id sent upstream; web search is requested through the `:online`
/// model variant.
pub fn upstream_model(model: &str, web_search: bool) -> String {
    if web_search && !model.ends_with(ONLINE_SUFFIX) {
        format!("{model}{ONLINE_SUFFIX}")
    } else {
        model.to_string()
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET `/api/health`
pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET `/api/models` — the model catalog as JSON
pub async fn list_models_handler(State(state): State<RelayState>) -> impl IntoResponse {
    Json(state.catalog.models().to_vec())
}

/// POST `/api/chat` — forwards one streaming completion and pipes the
/// provider's SSE body back unmodified. Dropping the client connection drops
/// the upstream body stream, which closes the upstream request.
pub async fn chat_handler(
    State(state): State<RelayState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return rejection_response(rejection),
    };
    if request.model.trim().is_empty() || request.messages.is_empty() {
        return error_json(StatusCode::BAD_REQUEST, MISSING_FIELDS);
    }
    let Some(api_key) = state.config.api_key.as_deref() else {
        return error_response(&AppError::MissingApiKey);
    };

    let model = upstream_model(&request.model, request.web_search);
    info!(model = %model, messages = request.messages.len(), "Relaying chat completion");

    let upstream = state
        .client
        .post(&state.config.upstream_url)
        .bearer_auth(api_key)
        .header("HTTP-Referer", &state.config.app_url)
        .header("X-Title", APP_TITLE)
        .json(&UpstreamRequest { model, messages: &request.messages, stream: true })
        .send()
        .await;

    let upstream = match upstream {
        Ok(resp) => resp,
        Err(e) => {
            error!("Upstream request failed: {e}");
            return error_response(&AppError::from(e));
        }
    };

    let status = upstream.status();
    if !status.is_success() {
        let text = upstream.text().await.unwrap_or_else(|e| {
            warn!("Could not read upstream error body: {e}");
            String::new()
        });
        error!("Upstream returned {status}: {text}");
        return error_response(&AppError::UpstreamStatus { status: status.as_u16(), body: text });
    }

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(upstream.bytes_stream()),
    )
        .into_response()
}

// ── Helper ────────────────────────────────────────────────────────────────────

fn error_json(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Body that is not a well-formed chat request. Wrong-typed fields such as
/// `"messages": null` read as missing ones.
fn rejection_response(rejection: JsonRejection) -> Response {
    let message = match rejection {
        JsonRejection::JsonDataError(_) => MISSING_FIELDS.to_string(),
        other => other.body_text(),
    };
    error_json(StatusCode::BAD_REQUEST, &message)
}

fn error_response(err: &AppError) -> Response {
    match err {
        AppError::UpstreamStatus { status, body } => {
            let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY);
            error_json(status, &format!("OpenRouter API error: {} - {body}", status.as_u16()))
        }
        e if e.is_validation() => error_json(StatusCode::BAD_REQUEST, &e.to_string()),
        e => error_json(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}
