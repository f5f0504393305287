//! Upstream provider abstraction
//!
//! A [`Provider`] hides one configured upstream behind a uniform call
//! contract. Each implementation owns the outbound transformation for its
//! wire protocol and delegates transport concerns to
//! [`prism_client::HttpExecutor`].

pub mod anthropic;
pub mod openai;

use async_trait::async_trait;
use http::header::{HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use indexmap::IndexMap;
use prism_client::{AuthScheme, ProxyRequest, RetryPolicy};
use prism_config::{AuthConfig, ProviderConfig, RetryConfig};
use prism_core::RequestContext;
use regex::Regex;
use secrecy::SecretString;
use url::Url;

use crate::error::GatewayError;
use crate::types::{ChatRequest, ChatResponse, ChunkStream};

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

/// User agent sent on every outbound call
const GATEWAY_USER_AGENT: &str = concat!("prism/", env!("CARGO_PKG_VERSION"));

/// Whole-call timeout for buffered requests
///
/// Streaming calls are bounded only by transport behavior, since
/// legitimate streams can run long.
pub(crate) const BUFFERED_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(120);

/// A configured upstream LLM backend
#[async_trait]
pub trait Provider: Send + Sync {
    /// Registry name of this provider instance
    fn name(&self) -> &str;

    /// Whether this provider serves the given model name
    fn supports_model(&self, model: &str) -> bool;

    /// Snapshot of the current runtime settings
    fn settings(&self) -> ProviderSettings;

    /// Replace the runtime settings
    fn update_settings(&self, settings: ProviderSettings);

    /// Buffered completion call
    async fn chat(&self, request: &ChatRequest, context: &RequestContext) -> Result<ChatResponse, GatewayError>;

    /// Streaming completion call
    async fn chat_stream(
        &self,
        request: &ChatRequest,
        context: &RequestContext,
    ) -> Result<ChunkStream, GatewayError>;
}

/// Compiled model-name predicate
#[derive(Debug, Clone, Default)]
pub struct ModelFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl ModelFilter {
    /// Compile from configured patterns
    ///
    /// # Errors
    ///
    /// `GatewayError::Internal` when a pattern is not valid regex; config
    /// validation normally catches this earlier
    pub fn compile(include: &[String], exclude: &[String]) -> Result<Self, GatewayError> {
        let build = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| Regex::new(p).map_err(|e| GatewayError::Internal(anyhow::anyhow!("invalid model pattern: {e}"))))
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(Self {
            include: build(include)?,
            exclude: build(exclude)?,
        })
    }

    /// Whether a model name passes the filter
    ///
    /// An empty include list matches everything not excluded.
    pub fn matches(&self, model: &str) -> bool {
        if self.exclude.iter().any(|p| p.is_match(model)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.is_match(model))
    }
}

/// Runtime settings of one provider instance
///
/// Mutable only through [`Provider::update_settings`]; callers work with
/// snapshots.
#[derive(Clone)]
pub struct ProviderSettings {
    /// Upstream base URL
    pub base_url: Url,
    /// Configured credential
    pub api_key: Option<SecretString>,
    /// Authentication scheme
    pub auth: AuthConfig,
    /// Model-name predicate
    pub model_filter: ModelFilter,
    /// External model name to provider-specific name
    pub aliases: IndexMap<String, String>,
    /// Retry policy for buffered calls
    pub retry: Option<RetryPolicy>,
    /// Prefer the caller's credential over the configured one
    pub forward_authorization: bool,
}

impl ProviderSettings {
    /// Build settings from configuration, with protocol defaults
    ///
    /// # Errors
    ///
    /// Returns an error when a model pattern fails to compile
    pub fn from_config(
        config: &ProviderConfig,
        default_base_url: &str,
        default_auth: AuthConfig,
    ) -> Result<Self, GatewayError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| Url::parse(default_base_url).expect("valid default URL"));

        Ok(Self {
            base_url,
            api_key: config.api_key.clone(),
            auth: config.auth.clone().unwrap_or(default_auth),
            model_filter: ModelFilter::compile(&config.models.include, &config.models.exclude)?,
            aliases: config.aliases.clone(),
            retry: config.retry.as_ref().map(retry_policy_from_config),
            forward_authorization: config.forward_authorization,
        })
    }

    /// Remap an external model name to the provider-specific one
    pub fn resolve_model(&self, model: &str) -> String {
        self.aliases.get(model).cloned().unwrap_or_else(|| model.to_owned())
    }

    /// Endpoint URL under the base URL
    ///
    /// # Errors
    ///
    /// `GatewayError::Internal` when the joined URL is invalid
    pub fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/{path}"))
            .map_err(|e| GatewayError::Internal(anyhow::anyhow!("invalid endpoint URL: {e}")))
    }

    /// Resolve the auth scheme for one call
    ///
    /// The caller's key wins when `forward_authorization` is set and the
    /// caller supplied one.
    pub fn auth_scheme(&self, context: &RequestContext) -> Option<AuthScheme> {
        let key = if self.forward_authorization && context.api_key.is_some() {
            context.api_key.clone()
        } else {
            self.api_key.clone()
        };

        match &self.auth {
            AuthConfig::Bearer => key.map(|token| AuthScheme::Bearer { token }),
            AuthConfig::ApiKey { header } => key.map(|key| AuthScheme::ApiKey {
                header: header.clone(),
                key,
            }),
            AuthConfig::Custom { headers } => Some(AuthScheme::Custom {
                headers: headers
                    .iter()
                    .map(|(name, value)| (name.clone(), SecretString::from(value.clone())))
                    .collect(),
            }),
        }
    }
}

/// Convert the configured retry policy to the executor's
fn retry_policy_from_config(config: &RetryConfig) -> RetryPolicy {
    RetryPolicy {
        max_retries: config.max_retries,
        initial_delay: std::time::Duration::from_millis(config.initial_delay_ms),
        max_delay: std::time::Duration::from_millis(config.max_delay_ms),
        backoff_factor: config.backoff_factor,
    }
}

/// Assemble a JSON POST with standard headers, auth, and retry policy
pub(crate) fn build_proxy_request(
    settings: &ProviderSettings,
    context: &RequestContext,
    url: Url,
    body: Vec<u8>,
) -> ProxyRequest {
    let mut request = ProxyRequest::post(url)
        .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .header(ACCEPT, HeaderValue::from_static("application/json"))
        .header(USER_AGENT, HeaderValue::from_static(GATEWAY_USER_AGENT))
        .body(body);

    if let Some(auth) = settings.auth_scheme(context) {
        request = request.auth(auth);
    }
    if let Some(retry) = settings.retry.clone() {
        request = request.retry(retry);
    }

    request
}
