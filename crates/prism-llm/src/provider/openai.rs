//! OpenAI-compatible provider

use std::sync::RwLock;

use async_trait::async_trait;
use futures_util::StreamExt;
use prism_client::HttpExecutor;
use prism_config::{AuthConfig, ProviderConfig};
use prism_core::RequestContext;

use super::{build_proxy_request, Provider, ProviderSettings, BUFFERED_TIMEOUT};
use crate::convert::openai::chunk_to_chat;
use crate::error::GatewayError;
use crate::protocol::openai::{OpenAiChunk, OpenAiRequest, OpenAiResponse, OpenAiStreamOptions};
use crate::types::{ChatRequest, ChatResponse, ChunkStream};

/// Default OpenAI API base URL
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Provider speaking the OpenAI-compatible chat completions protocol
pub struct OpenAiProvider {
    name: String,
    executor: HttpExecutor,
    stream_executor: HttpExecutor,
    settings: RwLock<ProviderSettings>,
}

impl OpenAiProvider {
    /// Create from provider configuration
    ///
    /// # Errors
    ///
    /// Returns an error when the model filter fails to compile or the
    /// HTTP client cannot be built.
    pub fn new(name: String, config: &ProviderConfig) -> Result<Self, GatewayError> {
        let settings = ProviderSettings::from_config(config, DEFAULT_BASE_URL, AuthConfig::Bearer)?;

        Ok(Self {
            name,
            executor: HttpExecutor::with_timeout(BUFFERED_TIMEOUT)?,
            stream_executor: HttpExecutor::new()?,
            settings: RwLock::new(settings),
        })
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_model(&self, model: &str) -> bool {
        let settings = self.settings();
        settings.aliases.contains_key(model) || settings.model_filter.matches(model)
    }

    fn settings(&self) -> ProviderSettings {
        self.settings.read().expect("settings lock poisoned").clone()
    }

    fn update_settings(&self, settings: ProviderSettings) {
        *self.settings.write().expect("settings lock poisoned") = settings;
    }

    async fn chat(&self, request: &ChatRequest, context: &RequestContext) -> Result<ChatResponse, GatewayError> {
        request.validate()?;
        let settings = self.settings();

        let mut wire = OpenAiRequest::from(request);
        wire.model = settings.resolve_model(&request.model);
        wire.stream = None;
        wire.stream_options = None;

        let body = serde_json::to_vec(&wire).map_err(|e| GatewayError::Internal(e.into()))?;
        let url = settings.endpoint("chat/completions")?;
        let proxy = build_proxy_request(&settings, context, url, body);

        let response = self.executor.execute(proxy, &context.cancel).await.map_err(|e| {
            tracing::warn!(provider = %self.name, error = %e, "upstream request failed");
            GatewayError::from(e)
        })?;

        if response.body.is_empty() {
            return Err(GatewayError::UpstreamDecode("empty response body".to_owned()));
        }

        let wire_response: OpenAiResponse = serde_json::from_slice(&response.body)
            .map_err(|e| GatewayError::UpstreamDecode(format!("failed to parse chat completion response: {e}")))?;

        let mut chat = ChatResponse::from(wire_response);
        // Report the model name the caller asked for, not the remapped one
        chat.model.clone_from(&request.model);
        Ok(chat)
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
        context: &RequestContext,
    ) -> Result<ChunkStream, GatewayError> {
        request.validate()?;
        let settings = self.settings();

        let mut wire = OpenAiRequest::from(request);
        wire.model = settings.resolve_model(&request.model);
        wire.stream = Some(true);
        wire.stream_options = Some(OpenAiStreamOptions { include_usage: true });

        let body = serde_json::to_vec(&wire).map_err(|e| GatewayError::Internal(e.into()))?;
        let url = settings.endpoint("chat/completions")?;
        let mut proxy = build_proxy_request(&settings, context, url, body);
        // Retrying an open stream would replay delivered chunks
        proxy.retry = None;

        let frames = self.stream_executor.execute_stream(proxy, &context.cancel).await.map_err(|e| {
            tracing::warn!(provider = %self.name, error = %e, "upstream stream request failed");
            GatewayError::from(e)
        })?;

        let external_model = request.model.clone();
        let chunks = frames.filter_map(move |result| {
            let item = match result {
                Ok(frame) => {
                    let data = frame.data.trim();
                    if data.is_empty() || data == "[DONE]" {
                        None
                    } else {
                        match serde_json::from_str::<OpenAiChunk>(data) {
                            Ok(wire_chunk) => {
                                let mut chunk = chunk_to_chat(wire_chunk);
                                chunk.model.clone_from(&external_model);
                                Some(Ok(chunk))
                            }
                            Err(e) => {
                                tracing::debug!(error = %e, "skipping unparseable SSE chunk");
                                None
                            }
                        }
                    }
                }
                Err(e) => Some(Err(GatewayError::from(e))),
            };

            async move { item }
        });

        Ok(Box::pin(chunks))
    }
}
