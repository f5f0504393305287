use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

use super::message::ChatMessage;

/// Stop condition: a single sequence or an ordered set of sequences
///
/// Mutually exclusive by construction; wire formats that only accept a
/// list get the single variant wrapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopSeq {
    /// One stop sequence
    One(String),
    /// Ordered set of stop sequences
    Many(Vec<String>),
}

impl StopSeq {
    /// View as an ordered list regardless of variant
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(stop) => vec![stop.clone()],
            Self::Many(stops) => stops.clone(),
        }
    }
}

/// Optional sampling parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Presence penalty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    /// Frequency penalty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    /// Number of choices to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    /// Opaque end-user tag for upstream abuse tracking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// A tool the model may call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

/// How the model should select among available tools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// Model decides freely
    Auto,
    /// Tools disabled for this call
    None,
    /// Model must call some tool
    Required,
    /// Model must call the named tool
    Named(String),
}

/// Canonical chat-completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model identifier as the caller named it
    pub model: String,
    /// Ordered conversation messages
    pub messages: Vec<ChatMessage>,
    /// Sampling parameters
    #[serde(default)]
    pub params: SamplingParams,
    /// Stop condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopSeq>,
    /// Tools available to the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    /// Tool selection constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Whether the caller wants a streamed response
    #[serde(default)]
    pub stream: bool,
}

impl ChatRequest {
    /// Minimal request with the given model and messages
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            params: SamplingParams::default(),
            stop: None,
            tools: None,
            tool_choice: None,
            stream: false,
        }
    }

    /// Check required-field invariants, before any network call
    ///
    /// # Errors
    ///
    /// `GatewayError::InvalidRequest` when the model is empty or no
    /// messages were supplied
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.model.trim().is_empty() {
            return Err(GatewayError::InvalidRequest("model must not be empty".to_owned()));
        }
        if self.messages.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "messages must contain at least one entry".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_empty_model() {
        let request = ChatRequest::new("  ", vec![ChatMessage::user("hi")]);
        let err = request.validate().unwrap_err();
        assert!(err.to_string().contains("model"));
    }

    #[test]
    fn validate_rejects_empty_messages() {
        let request = ChatRequest::new("gpt-4", Vec::new());
        let err = request.validate().unwrap_err();
        assert!(err.to_string().contains("messages"));
    }

    #[test]
    fn stop_union_accepts_both_shapes() {
        let one: StopSeq = serde_json::from_str("\"END\"").unwrap();
        assert_eq!(one, StopSeq::One("END".to_owned()));
        assert_eq!(one.to_vec(), vec!["END".to_owned()]);

        let many: StopSeq = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(many.to_vec(), vec!["a".to_owned(), "b".to_owned()]);
    }
}
