//! Request orchestrator
//!
//! Single entry point per call: resolve the wire format, decode to the
//! canonical request, route to a provider, execute buffered or streaming,
//! and re-encode for the caller. Record-keeping is attached along the way
//! but never decides the call's outcome.

use std::sync::Arc;

use bytes::Bytes;
use prism_config::{LlmConfig, ProviderType};
use prism_core::RequestContext;
use prism_storage::{ExecutionRecord, RecordStore, RequestRecord};
use uuid::Uuid;

use crate::error::GatewayError;
use crate::format::{EncodedStream, FormatRegistry, WireFormat, WireStream};
use crate::provider::{AnthropicProvider, OpenAiProvider, Provider};
use crate::recording::RecordedStream;
use crate::registry::ProviderRegistry;

/// Raw inbound call as the edge layer sees it
#[derive(Debug, Clone)]
pub struct InboundCall {
    /// Explicit wire format name; detected from the content type when absent
    pub format: Option<String>,
    /// `content-type` header value
    pub content_type: Option<String>,
    /// Raw body bytes
    pub body: Bytes,
}

/// What the orchestrator hands back to the edge layer
pub enum GatewayReply {
    /// Encoded single response body
    Completion(Vec<u8>),
    /// Stream of wire-format events
    Stream(WireStream),
}

impl std::fmt::Debug for GatewayReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayReply::Completion(body) => {
                f.debug_tuple("Completion").field(body).finish()
            }
            GatewayReply::Stream(_) => f.debug_tuple("Stream").finish(),
        }
    }
}

/// The gateway core: formats, providers, and bookkeeping
pub struct Gateway {
    formats: FormatRegistry,
    registry: Arc<ProviderRegistry>,
    store: Arc<dyn RecordStore>,
}

impl Gateway {
    /// Gateway over an existing registry and store
    pub fn new(registry: Arc<ProviderRegistry>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            formats: FormatRegistry::with_defaults(),
            registry,
            store,
        }
    }

    /// Build providers from configuration and assemble the gateway
    ///
    /// # Errors
    ///
    /// Returns an error when a provider fails to initialize or a route
    /// references an unknown provider.
    pub fn from_config(config: &LlmConfig, store: Arc<dyn RecordStore>) -> Result<Self, GatewayError> {
        let registry = Arc::new(ProviderRegistry::new());

        for (name, provider_config) in &config.providers {
            let provider: Arc<dyn Provider> = match provider_config.provider_type {
                ProviderType::Openai => Arc::new(OpenAiProvider::new(name.clone(), provider_config)?),
                ProviderType::Anthropic => Arc::new(AnthropicProvider::new(name.clone(), provider_config)?),
            };
            registry.register(provider);
        }

        for (model, target) in &config.routes {
            registry.map_model(model.clone(), target)?;
        }

        Ok(Self::new(registry, store))
    }

    /// The provider registry, for runtime registration and routing changes
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Resolve the wire format for a call
    ///
    /// # Errors
    ///
    /// `GatewayError::UnknownFormat` for an unregistered explicit name,
    /// `GatewayError::UnsupportedContentType` when detection fails or the
    /// content type is missing or not accepted
    pub fn resolve_format(&self, call: &InboundCall) -> Result<Arc<dyn WireFormat>, GatewayError> {
        let content_type = call
            .content_type
            .as_deref()
            .ok_or_else(|| GatewayError::UnsupportedContentType("missing content type".to_owned()))?;

        match &call.format {
            Some(name) => {
                let format = self
                    .formats
                    .get(name)
                    .ok_or_else(|| GatewayError::UnknownFormat(name.clone()))?;
                if !format.supports_content_type(content_type) {
                    return Err(GatewayError::UnsupportedContentType(content_type.to_owned()));
                }
                Ok(format)
            }
            None => self.formats.detect(content_type),
        }
    }

    /// Handle one inbound call end to end
    ///
    /// # Errors
    ///
    /// Any stage error short-circuits and is surfaced unmodified; the
    /// edge layer decides HTTP presentation.
    pub async fn handle(&self, call: InboundCall, context: &RequestContext) -> Result<GatewayReply, GatewayError> {
        let format = self.resolve_format(&call)?;
        let request = format.decode_request(&call.body)?;
        request.validate()?;

        let provider = self.registry.provider_for_model(&request.model)?;

        let request_record = RequestRecord::new(&request.model, call.body.to_vec());
        let request_id = request_record.id;
        if let Err(e) = self.store.create_request(request_record).await {
            tracing::warn!(error = %e, "failed to create request record");
        }

        let execution_record = ExecutionRecord::new(request_id, provider.name());
        let execution_id = execution_record.id;
        if let Err(e) = self.store.create_execution(execution_record).await {
            tracing::warn!(error = %e, "failed to create execution record");
        }

        tracing::debug!(
            provider = provider.name(),
            model = %request.model,
            stream = request.stream,
            format = format.name(),
            "dispatching chat completion"
        );

        if request.stream {
            let stream = match provider.chat_stream(&request, context).await {
                Ok(stream) => stream,
                Err(error) => {
                    self.mark_failed(request_id, execution_id, &error).await;
                    return Err(error);
                }
            };

            let recorded = RecordedStream::new(stream, Arc::clone(&self.store), request_id, execution_id);
            let response_id = format!("resp_{}", Uuid::new_v4().simple());
            let encoder = format.stream_encoder(response_id, request.model.clone());
            let wire: WireStream = Box::pin(EncodedStream::new(Box::pin(recorded), encoder));

            Ok(GatewayReply::Stream(wire))
        } else {
            match provider.chat(&request, context).await {
                Ok(response) => {
                    let body = format.encode_response(&response)?;
                    if let Err(e) = self.store.complete_execution(execution_id, body.clone()).await {
                        tracing::warn!(error = %e, "failed to mark execution completed");
                    }
                    if let Err(e) = self.store.complete_request(request_id, body.clone()).await {
                        tracing::warn!(error = %e, "failed to mark request completed");
                    }
                    Ok(GatewayReply::Completion(body))
                }
                Err(error) => {
                    self.mark_failed(request_id, execution_id, &error).await;
                    Err(error)
                }
            }
        }
    }

    async fn mark_failed(&self, request_id: prism_storage::RecordId, execution_id: prism_storage::RecordId, error: &GatewayError) {
        let text = error.to_string();
        if let Err(e) = self.store.fail_execution(execution_id, text.clone()).await {
            tracing::warn!(error = %e, "failed to mark execution failed");
        }
        if let Err(e) = self.store.fail_request(request_id, text).await {
            tracing::warn!(error = %e, "failed to mark request failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use prism_storage::MemoryRecordStore;

    use super::*;
    use crate::provider::ProviderSettings;
    use crate::types::{
        AssistantMessage, ChatChoice, ChatRequest, ChatResponse, ChunkStream, FinishReason, MessageDelta,
    };

    /// Provider that echoes the last user message
    struct EchoProvider;

    #[async_trait]
    impl Provider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        fn supports_model(&self, _model: &str) -> bool {
            true
        }

        fn settings(&self) -> ProviderSettings {
            unimplemented!("not needed for orchestration tests")
        }

        fn update_settings(&self, _settings: ProviderSettings) {}

        async fn chat(&self, request: &ChatRequest, _: &RequestContext) -> Result<ChatResponse, GatewayError> {
            let text = request
                .messages
                .last()
                .map(|m| m.content.flatten_text())
                .unwrap_or_default();
            Ok(ChatResponse::completion(
                "echo-1",
                request.model.clone(),
                vec![ChatChoice::of_message(
                    0,
                    AssistantMessage::text(format!("Echo: {text}")),
                    Some(FinishReason::Stop),
                )],
                None,
            ))
        }

        async fn chat_stream(&self, request: &ChatRequest, _: &RequestContext) -> Result<ChunkStream, GatewayError> {
            let text = request
                .messages
                .last()
                .map(|m| m.content.flatten_text())
                .unwrap_or_default();
            let chunks = vec![
                Ok(ChatResponse::chunk(
                    "echo-1",
                    request.model.clone(),
                    vec![ChatChoice::of_delta(
                        0,
                        MessageDelta {
                            content: Some(format!("Echo: {text}")),
                            ..MessageDelta::default()
                        },
                        None,
                    )],
                )),
                Ok(ChatResponse::chunk(
                    "echo-1",
                    request.model.clone(),
                    vec![ChatChoice::of_delta(0, MessageDelta::default(), Some(FinishReason::Stop))],
                )),
            ];
            Ok(Box::pin(futures_util::stream::iter(chunks)))
        }
    }

    fn echo_gateway() -> Gateway {
        let registry = Arc::new(ProviderRegistry::new());
        registry.register(Arc::new(EchoProvider));
        Gateway::new(registry, Arc::new(MemoryRecordStore::new()))
    }

    fn openai_call(body: &str) -> InboundCall {
        InboundCall {
            format: Some("openai".to_owned()),
            content_type: Some("application/json".to_owned()),
            body: Bytes::copy_from_slice(body.as_bytes()),
        }
    }

    #[tokio::test]
    async fn end_to_end_echo_round_trip() {
        let gateway = echo_gateway();
        let context = RequestContext::empty();

        let reply = gateway
            .handle(
                openai_call(r#"{"model":"gpt-4","messages":[{"role":"user","content":"Hello, world!"}]}"#),
                &context,
            )
            .await
            .unwrap();

        let GatewayReply::Completion(body) = reply else {
            panic!("expected a buffered reply");
        };
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["choices"][0]["message"]["content"], "Echo: Hello, world!");
        assert_eq!(value["model"], "gpt-4");
    }

    #[tokio::test]
    async fn streaming_reply_ends_with_done() {
        let gateway = echo_gateway();
        let context = RequestContext::empty();

        let reply = gateway
            .handle(
                openai_call(r#"{"model":"gpt-4","messages":[{"role":"user","content":"hi"}],"stream":true}"#),
                &context,
            )
            .await
            .unwrap();

        let GatewayReply::Stream(stream) = reply else {
            panic!("expected a streaming reply");
        };
        let frames: Vec<_> = stream.collect().await;
        assert!(frames.len() >= 2);
        assert_eq!(frames.last().unwrap().data, "[DONE]");
    }

    #[tokio::test]
    async fn validation_failures_short_circuit_before_routing() {
        let gateway = echo_gateway();
        let context = RequestContext::empty();

        let error = gateway
            .handle(openai_call(r#"{"model":"gpt-4","messages":[]}"#), &context)
            .await
            .unwrap_err();
        assert!(matches!(error, GatewayError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn missing_content_type_is_rejected() {
        let gateway = echo_gateway();
        let context = RequestContext::empty();

        let call = InboundCall {
            format: None,
            content_type: None,
            body: Bytes::from_static(b"{}"),
        };
        let error = gateway.handle(call, &context).await.unwrap_err();
        assert!(matches!(error, GatewayError::UnsupportedContentType(_)));
    }

    #[tokio::test]
    async fn format_detection_falls_back_to_content_type() {
        let gateway = echo_gateway();
        let context = RequestContext::empty();

        let call = InboundCall {
            format: None,
            content_type: Some("application/json".to_owned()),
            body: Bytes::from_static(br#"{"model":"gpt-4","messages":[{"role":"user","content":"hi"}]}"#),
        };
        assert!(gateway.handle(call, &context).await.is_ok());
    }
}
