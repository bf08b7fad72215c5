//! End-to-end: in-process mock provider ← relay router ← `RelayTransport`.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use bot_council::catalog::ModelCatalog;
use bot_council::config::RelayConfig;
use bot_council::models::{ChatMessage, ChatRequest, PanelId, StreamStatus};
use bot_council::routes::{router, RelayState};
use bot_council::service::{FanOutOrchestrator, PanelBoard};
use bot_council::stream::{stream_response, RelayTransport, StreamEvent, StreamOutcome};

#[derive(Clone, Default)]
struct Upstream {
    seen: Arc<Mutex<Vec<(HeaderMap, Value)>>>,
    /// Signalled when a response body stream is dropped.
    body_dropped: Arc<Notify>,
}

impl Upstream {
    fn header(&self, index: usize, name: &str) -> Option<String> {
        self.seen.lock().unwrap()[index]
            .0
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

struct DropSignal(Arc<Notify>);

impl Drop for DropSignal {
    fn drop(&mut self) {
        self.0.notify_one();
    }
}

fn frame(content: &str) -> String {
    let chunk = serde_json::json!({ "choices": [{ "delta": { "content": content } }] });
    format!("data: {chunk}\n\n")
}

async fn completions(
    State(upstream): State<Upstream>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    upstream.seen.lock().unwrap().push((headers, body.clone()));

    let model = body["model"].as_str().unwrap_or_default().to_string();
    if model == "broken" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response();
    }
    if model == "endless" {
        // One fragment, then the body never ends; the guard lives as long as the stream.
        let guard = DropSignal(Arc::clone(&upstream.body_dropped));
        let body = futures_util::stream::iter([Ok::<_, Infallible>(Bytes::from(frame("tick")))])
            .chain(futures_util::stream::pending())
            .map(move |chunk| {
                let _alive = &guard;
                chunk
            });
        return (
            [(header::CONTENT_TYPE, "text/event-stream")],
            Body::from_stream(body),
        )
            .into_response();
    }

    // Split the body into small uneven chunks so frames straddle reads.
    let text = format!(
        ": OPENROUTER PROCESSING\n\n{}{}data: not-json\n\n{}data: [DONE]\n\n",
        frame(&format!("{model} ")),
        frame("says "),
        frame("hi ✓")
    );
    let chunks: Vec<Result<Bytes, Infallible>> = text
        .into_bytes()
        .chunks(7)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(futures_util::stream::iter(chunks)),
    )
        .into_response()
}

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Starts the mock provider and a relay in front of it; returns the relay's
/// chat URL.
async fn start_stack(api_key: Option<&str>) -> (String, Upstream) {
    let upstream = Upstream::default();
    let upstream_addr = serve(
        Router::new()
            .route("/v1/chat/completions", post(completions))
            .with_state(upstream.clone()),
    )
    .await;

    let config = RelayConfig {
        api_key: api_key.map(str::to_string),
        port: 0,
        app_url: "http://localhost:5174".to_string(),
        upstream_url: format!("http://{upstream_addr}/v1/chat/completions"),
        models_file: PathBuf::from("models.txt"),
    };
    let catalog = ModelCatalog::parse("acme/alpha, Alpha\nacme/beta, Beta");
    let relay_addr = serve(router(RelayState::new(config, catalog))).await;
    (format!("http://{relay_addr}/api/chat"), upstream)
}

#[tokio::test]
async fn relay_streams_fragments_end_to_end() {
    let (url, upstream) = start_stack(Some("sk-test")).await;
    let transport = RelayTransport::new(url);

    let mut deltas = Vec::new();
    let request = ChatRequest::new("acme/alpha", vec![ChatMessage::user("hello")]);
    let outcome = stream_response(&transport, request, &CancellationToken::new(), |e| {
        if let StreamEvent::Delta(d) = e {
            deltas.push(d);
        }
    })
    .await;

    assert_eq!(outcome, StreamOutcome::Completed("acme/alpha says hi ✓".into()));
    assert_eq!(deltas, ["acme/alpha ", "says ", "hi ✓"]);

    assert_eq!(upstream.header(0, "authorization").as_deref(), Some("Bearer sk-test"));
    assert_eq!(upstream.header(0, "http-referer").as_deref(), Some("http://localhost:5174"));
    assert_eq!(upstream.header(0, "x-title").as_deref(), Some("Bot Council"));

    let seen = upstream.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let body = &seen[0].1;
    assert_eq!(body["stream"], true);
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["messages"][0]["content"], "hello");
}

#[tokio::test]
async fn web_search_requests_online_variant() {
    let (url, upstream) = start_stack(Some("sk-test")).await;
    let transport = RelayTransport::new(url);

    let request =
        ChatRequest::new("acme/beta", vec![ChatMessage::user("news?")]).with_web_search(true);
    let outcome = stream_response(&transport, request, &CancellationToken::new(), |_| {}).await;

    assert_eq!(outcome, StreamOutcome::Completed("acme/beta:online says hi ✓".into()));
    assert_eq!(upstream.seen.lock().unwrap()[0].1["model"], "acme/beta:online");
}

#[tokio::test]
async fn upstream_failure_reaches_the_caller_as_error_text() {
    let (url, _upstream) = start_stack(Some("sk-test")).await;
    let transport = RelayTransport::new(url);

    let request = ChatRequest::new("broken", vec![ChatMessage::user("hi")]);
    let outcome = stream_response(&transport, request, &CancellationToken::new(), |_| {}).await;

    let StreamOutcome::Failed(message) = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(message.starts_with("API error: 500 - "), "{message}");
    assert!(message.contains("OpenRouter API error: 500 - upstream exploded"), "{message}");
}

#[tokio::test]
async fn missing_api_key_is_reported_without_calling_upstream() {
    let (url, upstream) = start_stack(None).await;
    let transport = RelayTransport::new(url);

    let request = ChatRequest::new("acme/alpha", vec![ChatMessage::user("hi")]);
    let outcome = stream_response(&transport, request, &CancellationToken::new(), |_| {}).await;

    let StreamOutcome::Failed(message) = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(message.contains("API key not configured on server"), "{message}");
    assert!(upstream.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn relay_rejects_empty_requests() {
    let (url, upstream) = start_stack(Some("sk-test")).await;

    let resp = reqwest::Client::new()
        .post(&url)
        .json(&serde_json::json!({ "model": "acme/alpha", "messages": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Model and messages are required");
    assert!(upstream.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn relay_rejects_malformed_bodies_with_json_errors() {
    let (url, upstream) = start_stack(Some("sk-test")).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(&url)
        .json(&serde_json::json!({ "model": "acme/alpha", "messages": null }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Model and messages are required");

    let resp = client
        .post(&url)
        .header(header::CONTENT_TYPE, "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));

    assert!(upstream.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn relay_response_is_an_uncached_event_stream() {
    let (url, _upstream) = start_stack(Some("sk-test")).await;

    let resp = reqwest::Client::new()
        .post(&url)
        .json(&ChatRequest::new("acme/alpha", vec![ChatMessage::user("hi")]))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-cache");
    let text = resp.text().await.unwrap();
    assert!(text.contains("data: [DONE]"));
}

#[tokio::test]
async fn client_disconnect_closes_the_upstream_stream() {
    let (url, upstream) = start_stack(Some("sk-test")).await;
    let transport = RelayTransport::new(url);
    let cancel = CancellationToken::new();

    let request = ChatRequest::new("endless", vec![ChatMessage::user("go on")]);
    let outcome = stream_response(&transport, request, &cancel, |e| {
        if let StreamEvent::Delta(_) = e {
            cancel.cancel();
        }
    })
    .await;
    assert_eq!(outcome, StreamOutcome::Cancelled);

    tokio::time::timeout(Duration::from_secs(10), upstream.body_dropped.notified())
        .await
        .expect("upstream body should be dropped after the client goes away");
}

#[tokio::test]
async fn health_and_models_endpoints() {
    let (url, _upstream) = start_stack(Some("sk-test")).await;
    let base = url.trim_end_matches("/api/chat");
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{base}/api/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let models: Value = client
        .get(format!("{base}/api/models"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(models[1]["id"], "acme/beta");
    assert_eq!(models[1]["displayName"], "Beta");
}

#[tokio::test]
async fn fan_out_through_the_relay_isolates_failures() {
    let (url, _upstream) = start_stack(Some("sk-test")).await;
    let transport = Arc::new(RelayTransport::new(url));
    let mut fanout = FanOutOrchestrator::new(transport, PanelBoard::numbered(3));

    let selections = vec![
        (PanelId(1), "acme/alpha".to_string()),
        (PanelId(2), "broken".to_string()),
        (PanelId(3), "acme/beta".to_string()),
    ];
    assert_eq!(fanout.send("compare", &selections, false).unwrap(), 3);
    let board = fanout.settle().await;

    assert_eq!(board.state(PanelId(1)).unwrap().accumulated_text, "acme/alpha says hi ✓");
    assert_eq!(board.state(PanelId(2)).unwrap().status, StreamStatus::Error);
    assert_eq!(board.state(PanelId(3)).unwrap().accumulated_text, "acme/beta says hi ✓");
}
