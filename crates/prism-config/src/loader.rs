use std::path::Path;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from a raw TOML string
    ///
    /// # Errors
    ///
    /// Returns an error on expansion, parse, or validation failure
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded = crate::env::expand_env(raw)
            .map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self =
            toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if no provider is configured, a model pattern is
    /// not valid regex, or a route points at an unknown provider
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.llm.providers.is_empty() {
            anyhow::bail!("at least one LLM provider must be configured");
        }

        for (name, provider) in &self.llm.providers {
            for pattern in provider.models.include.iter().chain(&provider.models.exclude) {
                regex::Regex::new(pattern)
                    .map_err(|e| anyhow::anyhow!("invalid model pattern for provider '{name}': {e}"))?;
            }
        }

        for (model, target) in &self.llm.routes {
            if !self.llm.providers.contains_key(target) {
                anyhow::bail!("route for model '{model}' points at unknown provider '{target}'");
            }
        }

        Ok(())
    }
}
