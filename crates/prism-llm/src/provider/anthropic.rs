//! Anthropic Messages API provider

use std::sync::RwLock;

use async_trait::async_trait;
use futures_util::StreamExt;
use http::header::{HeaderName, HeaderValue};
use prism_client::HttpExecutor;
use prism_config::{AuthConfig, ProviderConfig};
use prism_core::RequestContext;

use super::{build_proxy_request, Provider, ProviderSettings, BUFFERED_TIMEOUT};
use crate::convert::anthropic::AnthropicStreamState;
use crate::error::GatewayError;
use crate::protocol::anthropic::{AnthropicRequest, AnthropicResponse, AnthropicStreamEvent};
use crate::types::{ChatRequest, ChatResponse, ChunkStream};

/// Default Anthropic API base URL
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Protocol version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Provider speaking the Anthropic Messages protocol
pub struct AnthropicProvider {
    name: String,
    executor: HttpExecutor,
    stream_executor: HttpExecutor,
    settings: RwLock<ProviderSettings>,
}

impl AnthropicProvider {
    /// Create from provider configuration
    ///
    /// # Errors
    ///
    /// Returns an error when the model filter fails to compile or the
    /// HTTP client cannot be built.
    pub fn new(name: String, config: &ProviderConfig) -> Result<Self, GatewayError> {
        let settings = ProviderSettings::from_config(
            config,
            DEFAULT_BASE_URL,
            AuthConfig::ApiKey {
                header: "x-api-key".to_owned(),
            },
        )?;

        Ok(Self {
            name,
            executor: HttpExecutor::with_timeout(BUFFERED_TIMEOUT)?,
            stream_executor: HttpExecutor::new()?,
            settings: RwLock::new(settings),
        })
    }

    fn versioned(mut proxy: prism_client::ProxyRequest) -> prism_client::ProxyRequest {
        proxy.headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        proxy
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
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

        let mut wire = AnthropicRequest::from(request);
        wire.model = settings.resolve_model(&request.model);
        wire.stream = None;

        let body = serde_json::to_vec(&wire).map_err(|e| GatewayError::Internal(e.into()))?;
        let url = settings.endpoint("messages")?;
        let proxy = Self::versioned(build_proxy_request(&settings, context, url, body));

        let response = self.executor.execute(proxy, &context.cancel).await.map_err(|e| {
            tracing::warn!(provider = %self.name, error = %e, "upstream request failed");
            GatewayError::from(e)
        })?;

        if response.body.is_empty() {
            return Err(GatewayError::UpstreamDecode("empty response body".to_owned()));
        }

        let wire_response: AnthropicResponse = serde_json::from_slice(&response.body)
            .map_err(|e| GatewayError::UpstreamDecode(format!("failed to parse messages response: {e}")))?;

        let mut chat = ChatResponse::from(wire_response);
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

        let mut wire = AnthropicRequest::from(request);
        wire.model = settings.resolve_model(&request.model);
        wire.stream = Some(true);

        let body = serde_json::to_vec(&wire).map_err(|e| GatewayError::Internal(e.into()))?;
        let url = settings.endpoint("messages")?;
        let mut proxy = Self::versioned(build_proxy_request(&settings, context, url, body));
        proxy.retry = None;

        let frames = self.stream_executor.execute_stream(proxy, &context.cancel).await.map_err(|e| {
            tracing::warn!(provider = %self.name, error = %e, "upstream stream request failed");
            GatewayError::from(e)
        })?;

        let external_model = request.model.clone();
        let mut state = AnthropicStreamState::new();

        let chunks = frames
            .map(move |result| -> Vec<Result<ChatResponse, GatewayError>> {
                match result {
                    Ok(frame) => {
                        let data = frame.data.trim();
                        if data.is_empty() {
                            return Vec::new();
                        }
                        match serde_json::from_str::<AnthropicStreamEvent>(data) {
                            Ok(event) => state
                                .convert_event(event)
                                .into_iter()
                                .map(|mut chunk| {
                                    chunk.model.clone_from(&external_model);
                                    Ok(chunk)
                                })
                                .collect(),
                            Err(e) => {
                                tracing::debug!(error = %e, "skipping unparseable messages SSE event");
                                Vec::new()
                            }
                        }
                    }
                    Err(e) => vec![Err(GatewayError::from(e))],
                }
            })
            .flat_map(futures_util::stream::iter);

        Ok(Box::pin(chunks))
    }
}
