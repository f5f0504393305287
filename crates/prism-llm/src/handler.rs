//! Axum route handlers for the OpenAI-compatible and Anthropic-compatible
//! endpoints

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use prism_client::SseFrame;
use prism_core::{HttpError, RequestContext};

use crate::error::GatewayError;
use crate::gateway::{Gateway, GatewayReply, InboundCall};
use crate::format::WireStream;

/// Shared state for chat route handlers
#[derive(Clone)]
pub struct GatewayState {
    /// The gateway core
    pub gateway: Arc<Gateway>,
}

/// Build the chat router with both wire-format endpoints
pub fn chat_router(state: GatewayState) -> Router {
    Router::new()
        .route("/v1/chat/completions", routing::post(openai_chat_completions))
        .route("/v1/messages", routing::post(anthropic_messages))
        .with_state(state)
}

/// Handle `POST /v1/chat/completions`
async fn openai_chat_completions(
    State(state): State<GatewayState>,
    axum::Extension(context): axum::Extension<RequestContext>,
    body: Bytes,
) -> Response {
    match dispatch(&state, &context, "openai", body).await {
        Ok(response) => response,
        Err(error) => openai_error_response(&error),
    }
}

/// Handle `POST /v1/messages`
async fn anthropic_messages(
    State(state): State<GatewayState>,
    axum::Extension(context): axum::Extension<RequestContext>,
    body: Bytes,
) -> Response {
    match dispatch(&state, &context, "anthropic", body).await {
        Ok(response) => response,
        Err(error) => anthropic_error_response(&error),
    }
}

/// Run a call through the gateway and shape the HTTP response
async fn dispatch(
    state: &GatewayState,
    context: &RequestContext,
    format: &str,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let content_type = context
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned);

    let call = InboundCall {
        format: Some(format.to_owned()),
        content_type,
        body,
    };

    match state.gateway.handle(call, context).await? {
        GatewayReply::Completion(body) => {
            Ok(([(CONTENT_TYPE, "application/json")], body).into_response())
        }
        GatewayReply::Stream(stream) => Ok(sse_response(stream).into_response()),
    }
}

/// Turn a wire frame stream into an SSE response
fn sse_response(stream: WireStream) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = stream.map(|frame| Ok(frame_to_event(frame)));
    Sse::new(events).keep_alive(KeepAlive::default())
}

fn frame_to_event(frame: SseFrame) -> Event {
    let event = Event::default();
    let event = match frame.event {
        Some(kind) => event.event(kind),
        None => event,
    };
    event.data(frame.data)
}

/// Shape an error as an OpenAI-style JSON error response
fn openai_error_response(error: &GatewayError) -> Response {
    let status = error.status_code();
    let body = serde_json::json!({
        "error": {
            "message": error.client_message(),
            "type": error.error_type(),
            "code": serde_json::Value::Null,
        }
    });
    (status, Json(body)).into_response()
}

/// Shape an error as an Anthropic-style JSON error response
fn anthropic_error_response(error: &GatewayError) -> Response {
    let status = error.status_code();
    let body = serde_json::json!({
        "type": "error",
        "error": {
            "type": error.error_type(),
            "message": error.client_message(),
        }
    });
    (status, Json(body)).into_response()
}
