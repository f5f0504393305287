//! Builder for test gateway configurations

use prism_config::Config;

/// Assembles a TOML configuration for a test server
pub struct ConfigBuilder {
    sections: Vec<String>,
    routes: Vec<(String, String)>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            sections: Vec::new(),
            routes: Vec::new(),
        }
    }

    /// Add an OpenAI-protocol provider pointing at a mock base URL
    pub fn with_openai_provider(mut self, name: &str, base_url: &str) -> Self {
        self.sections.push(format!(
            r#"
            [llm.providers.{name}]
            type = "openai"
            base_url = "{base_url}"
            api_key = "sk-test"
            "#
        ));
        self
    }

    /// Add an Anthropic-protocol provider pointing at a mock base URL
    pub fn with_anthropic_provider(mut self, name: &str, base_url: &str) -> Self {
        self.sections.push(format!(
            r#"
            [llm.providers.{name}]
            type = "anthropic"
            base_url = "{base_url}"
            api_key = "sk-ant-test"
            "#
        ));
        self
    }

    /// Add an OpenAI-protocol provider with a fast retry policy
    pub fn with_retrying_openai_provider(mut self, name: &str, base_url: &str, max_retries: u32) -> Self {
        self.sections.push(format!(
            r#"
            [llm.providers.{name}]
            type = "openai"
            base_url = "{base_url}"
            api_key = "sk-test"

            [llm.providers.{name}.retry]
            max_retries = {max_retries}
            initial_delay_ms = 10
            max_delay_ms = 50
            "#
        ));
        self
    }

    /// Restrict a provider to models matching a pattern
    pub fn with_model_filter(mut self, name: &str, pattern: &str) -> Self {
        self.sections.push(format!(
            r#"
            [llm.providers.{name}.models]
            include = ["{pattern}"]
            "#
        ));
        self
    }

    /// Route a model explicitly to a named provider
    pub fn with_route(mut self, model: &str, provider: &str) -> Self {
        self.routes.push((model.to_owned(), provider.to_owned()));
        self
    }

    pub fn build(self) -> Config {
        let mut raw = String::new();
        for section in &self.sections {
            raw.push_str(section);
        }
        if !self.routes.is_empty() {
            raw.push_str("\n[llm.routes]\n");
            for (model, provider) in &self.routes {
                raw.push_str(&format!("\"{model}\" = \"{provider}\"\n"));
            }
        }

        Config::from_toml(&raw).expect("test config must be valid")
    }
}
