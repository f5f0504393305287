use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Top-level LLM configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Provider configurations keyed by name, in registration order
    #[serde(default)]
    pub providers: IndexMap<String, ProviderConfig>,
    /// Explicit model-to-provider routes, consulted before model predicates
    #[serde(default)]
    pub routes: IndexMap<String, String>,
}

/// Configuration for a single upstream provider
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Wire protocol the provider speaks
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    /// Base URL override (protocol default used when absent)
    #[serde(default)]
    pub base_url: Option<Url>,
    /// API credential
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Authentication scheme override (protocol default used when absent)
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    /// Which model names this provider serves
    #[serde(default)]
    pub models: ModelFilterConfig,
    /// Model-name remapping, external name to provider-specific name
    #[serde(default)]
    pub aliases: IndexMap<String, String>,
    /// Retry policy for buffered calls
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Forward the caller's credential to the provider instead of the
    /// configured key
    #[serde(default)]
    pub forward_authorization: bool,
}

/// Supported upstream wire protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    /// OpenAI-compatible chat completions API
    Openai,
    /// Anthropic Messages API
    Anthropic,
}

/// Authentication scheme for outbound calls
///
/// An unrecognized `scheme` value fails configuration loading; it never
/// becomes a runtime network error.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum AuthConfig {
    /// `authorization: Bearer <api_key>`
    Bearer,
    /// API key in a named header
    ApiKey {
        /// Header that carries the key
        header: String,
    },
    /// Arbitrary static header set
    Custom {
        /// Header name/value pairs
        headers: IndexMap<String, String>,
    },
}

/// Model-name predicate for a provider
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelFilterConfig {
    /// Serve models matching any of these patterns (regex); empty means all
    #[serde(default)]
    pub include: Vec<String>,
    /// Never serve models matching any of these patterns (regex)
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Retry policy for buffered upstream calls
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Maximum retries after the initial attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry, milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Cap on any single delay, milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Multiplicative backoff factor
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_delay_ms() -> u64 {
    500
}

const fn default_max_delay_ms() -> u64 {
    10_000
}

const fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}
