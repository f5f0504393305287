use std::net::SocketAddr;

use serde::Deserialize;

/// HTTP server configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind; defaults to 0.0.0.0:3000
    #[serde(default)]
    pub listen_address: Option<SocketAddr>,
    /// Health endpoint configuration
    #[serde(default)]
    pub health: HealthConfig,
}

/// Health endpoint configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthConfig {
    /// Whether to expose the endpoint
    #[serde(default = "default_health_enabled")]
    pub enabled: bool,
    /// Route path
    #[serde(default = "default_health_path")]
    pub path: String,
}

const fn default_health_enabled() -> bool {
    true
}

fn default_health_path() -> String {
    "/health".to_owned()
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: default_health_enabled(),
            path: default_health_path(),
        }
    }
}
