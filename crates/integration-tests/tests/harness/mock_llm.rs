//! Mock upstream LLM server for integration tests
//!
//! Speaks both upstream protocols with canned echo responses: an
//! OpenAI-compatible `/v1/chat/completions` and an Anthropic-compatible
//! `/v1/messages`, each in buffered and streaming mode. Can be told to
//! fail the first N requests with a chosen status.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use tokio_util::sync::CancellationToken;

/// Mock upstream that echoes the last user message
pub struct MockLlm {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

struct MockState {
    request_count: AtomicU32,
    fail_count: AtomicU32,
    fail_status: u16,
}

impl MockLlm {
    /// Start a mock that always succeeds
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_inner(0, 500).await
    }

    /// Start a mock that fails the first `n` requests with `status`
    pub async fn start_failing(n: u32, status: u16) -> anyhow::Result<Self> {
        Self::start_inner(n, status).await
    }

    async fn start_inner(fail_count: u32, fail_status: u16) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            request_count: AtomicU32::new(0),
            fail_count: AtomicU32::new(fail_count),
            fail_status,
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
            .route("/v1/messages", routing::post(handle_messages))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL including `/v1`, ready for provider configuration
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Number of requests received, including failed ones
    pub fn request_count(&self) -> u32 {
        self.state.request_count.load(Ordering::Relaxed)
    }
}

impl Drop for MockLlm {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Pull the last user message text out of a loosely-typed request body
fn last_user_text(body: &serde_json::Value) -> String {
    let empty = Vec::new();
    let messages = body["messages"].as_array().unwrap_or(&empty);
    messages
        .iter()
        .rev()
        .find(|m| m["role"] == "user")
        .map(|m| match &m["content"] {
            serde_json::Value::String(text) => text.clone(),
            serde_json::Value::Array(parts) => parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .join(""),
            _ => String::new(),
        })
        .unwrap_or_default()
}

fn take_failure(state: &MockState) -> Option<u16> {
    let remaining = state.fail_count.load(Ordering::SeqCst);
    if remaining > 0 {
        state.fail_count.fetch_sub(1, Ordering::SeqCst);
        Some(state.fail_status)
    } else {
        None
    }
}

fn sse_response(body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

// -- OpenAI-compatible endpoint --

async fn handle_chat_completions(
    State(state): State<Arc<MockState>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    state.request_count.fetch_add(1, Ordering::SeqCst);

    if let Some(status) = take_failure(&state) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (
            status,
            Json(serde_json::json!({"error": {"message": "mock upstream failure", "type": "server_error"}})),
        )
            .into_response();
    }

    let model = body["model"].as_str().unwrap_or("mock-model").to_owned();
    let echo = format!("Echo: {}", last_user_text(&body));
    let streaming = body["stream"].as_bool().unwrap_or(false);

    if streaming {
        let chunk = |delta: serde_json::Value, finish: serde_json::Value| {
            serde_json::json!({
                "id": "chatcmpl-mock",
                "object": "chat.completion.chunk",
                "created": 1_700_000_000,
                "model": model,
                "choices": [{"index": 0, "delta": delta, "finish_reason": finish}]
            })
        };

        let (head, tail) = echo.split_at(echo.len() / 2);
        let mut body = String::new();
        for data in [
            chunk(serde_json::json!({"role": "assistant"}), serde_json::Value::Null),
            chunk(serde_json::json!({"content": head}), serde_json::Value::Null),
            chunk(serde_json::json!({"content": tail}), serde_json::Value::Null),
            chunk(serde_json::json!({}), serde_json::json!("stop")),
            serde_json::json!({
                "id": "chatcmpl-mock",
                "object": "chat.completion.chunk",
                "created": 1_700_000_000,
                "model": model,
                "choices": [],
                "usage": {"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7}
            }),
        ] {
            body.push_str(&format!("data: {data}\n\n"));
        }
        body.push_str("data: [DONE]\n\n");

        return sse_response(body);
    }

    Json(serde_json::json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": echo},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7}
    }))
    .into_response()
}

// -- Anthropic-compatible endpoint --

async fn handle_messages(
    State(state): State<Arc<MockState>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    state.request_count.fetch_add(1, Ordering::SeqCst);

    if let Some(status) = take_failure(&state) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (
            status,
            Json(serde_json::json!({
                "type": "error",
                "error": {"type": "api_error", "message": "mock upstream failure"}
            })),
        )
            .into_response();
    }

    let model = body["model"].as_str().unwrap_or("mock-model").to_owned();
    let echo = format!("Echo: {}", last_user_text(&body));
    let streaming = body["stream"].as_bool().unwrap_or(false);

    if streaming {
        let (head, tail) = echo.split_at(echo.len() / 2);
        let events = [
            (
                "message_start",
                serde_json::json!({
                    "type": "message_start",
                    "message": {
                        "id": "msg_mock", "type": "message", "role": "assistant",
                        "model": model, "content": [],
                        "usage": {"input_tokens": 3, "output_tokens": 0}
                    }
                }),
            ),
            (
                "content_block_start",
                serde_json::json!({
                    "type": "content_block_start", "index": 0,
                    "content_block": {"type": "text", "text": ""}
                }),
            ),
            (
                "content_block_delta",
                serde_json::json!({
                    "type": "content_block_delta", "index": 0,
                    "delta": {"type": "text_delta", "text": head}
                }),
            ),
            (
                "content_block_delta",
                serde_json::json!({
                    "type": "content_block_delta", "index": 0,
                    "delta": {"type": "text_delta", "text": tail}
                }),
            ),
            (
                "content_block_stop",
                serde_json::json!({"type": "content_block_stop", "index": 0}),
            ),
            (
                "message_delta",
                serde_json::json!({
                    "type": "message_delta",
                    "delta": {"stop_reason": "end_turn", "stop_sequence": null},
                    "usage": {"input_tokens": 0, "output_tokens": 4}
                }),
            ),
            ("message_stop", serde_json::json!({"type": "message_stop"})),
        ];

        let mut body = String::new();
        for (event, data) in events {
            body.push_str(&format!("event: {event}\ndata: {data}\n\n"));
        }

        return sse_response(body);
    }

    Json(serde_json::json!({
        "id": "msg_mock",
        "type": "message",
        "role": "assistant",
        "content": [{"type": "text", "text": echo}],
        "model": model,
        "stop_reason": "end_turn",
        "stop_sequence": null,
        "usage": {"input_tokens": 3, "output_tokens": 4}
    }))
    .into_response()
}
