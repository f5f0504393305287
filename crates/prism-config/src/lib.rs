//! Configuration for Prism
//!
//! Loaded from a TOML file with `{{ env.VAR }}` placeholder expansion, then
//! validated before any subsystem is built.

mod env;
pub mod llm;
mod loader;
pub mod server;
pub mod telemetry;

use serde::Deserialize;

pub use llm::{AuthConfig, LlmConfig, ModelFilterConfig, ProviderConfig, ProviderType, RetryConfig};
pub use server::{HealthConfig, ServerConfig};
pub use telemetry::{LogFormat, TelemetryConfig};

/// Top-level Prism configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// LLM provider configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// Logging configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}
