//! Anthropic Messages API wire format

use serde::{Deserialize, Serialize};

// -- Requests --

/// Messages API request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicRequest {
    /// Model identifier
    pub model: String,
    /// Maximum tokens to generate; required by the protocol
    pub max_tokens: u32,
    /// Top-level system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Conversation messages
    pub messages: Vec<AnthropicMessage>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Whether to stream the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Tool definitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<AnthropicTool>>,
    /// Tool choice configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<AnthropicToolChoice>,
    /// Request metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AnthropicMetadata>,
}

/// Request metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMetadata {
    /// Opaque end-user tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Message in a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMessage {
    /// "user" or "assistant"
    pub role: String,
    /// Content: shorthand string or block array
    pub content: AnthropicContent,
}

/// Content union
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnthropicContent {
    /// Plain text shorthand
    Text(String),
    /// Typed content blocks
    Blocks(Vec<AnthropicContentBlock>),
}

/// Content block in a request message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicContentBlock {
    /// Text block
    Text {
        /// The text string
        text: String,
    },
    /// Image block
    Image {
        /// Image source
        source: AnthropicImageSource,
    },
    /// Tool use requested by the assistant (conversation history)
    ToolUse {
        /// Invocation id
        id: String,
        /// Tool name
        name: String,
        /// Arguments as JSON
        input: serde_json::Value,
    },
    /// Tool result supplied by the user
    ToolResult {
        /// Invocation this result answers
        tool_use_id: String,
        /// Result content
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        /// Whether the tool errored
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

/// Image source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicImageSource {
    /// "base64" or "url"
    #[serde(rename = "type")]
    pub kind: String,
    /// Media type for base64 sources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Base64 data or URL
    pub data: String,
}

/// Tool definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicTool {
    /// Tool name
    pub name: String,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the input
    pub input_schema: serde_json::Value,
}

/// Tool choice configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicToolChoice {
    /// "auto", "any", or "tool"
    #[serde(rename = "type")]
    pub kind: String,
    /// Tool name when kind is "tool"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

// -- Responses --

/// Messages API response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicResponse {
    /// Response identifier
    pub id: String,
    /// Always "message"
    #[serde(rename = "type")]
    pub kind: String,
    /// Always "assistant"
    pub role: String,
    /// Response content blocks
    pub content: Vec<AnthropicResponseBlock>,
    /// Model used
    pub model: String,
    /// Stop reason
    #[serde(default)]
    pub stop_reason: Option<String>,
    /// Stop sequence that fired, if any
    #[serde(default)]
    pub stop_sequence: Option<String>,
    /// Token usage
    pub usage: AnthropicUsage,
}

/// Content block in a response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicResponseBlock {
    /// Text block
    Text {
        /// The text string
        text: String,
    },
    /// Tool use request
    ToolUse {
        /// Invocation id
        id: String,
        /// Tool name
        name: String,
        /// Arguments as JSON
        input: serde_json::Value,
    },
}

/// Token usage
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AnthropicUsage {
    /// Input tokens
    pub input_tokens: u32,
    /// Output tokens
    pub output_tokens: u32,
}

// -- Streaming --

/// SSE events emitted by the Messages API
///
/// The wire sequence is `message_start`, then one or more
/// `content_block_start`/`content_block_delta`/`content_block_stop`
/// triples, then `message_delta`, then `message_stop`; `ping` may appear
/// anywhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamEvent {
    /// Stream opened; carries id, model, and initial usage
    MessageStart {
        /// Partial message envelope
        message: AnthropicStreamMessage,
    },
    /// A content block opened
    ContentBlockStart {
        /// Block index
        index: u32,
        /// Initial block payload
        content_block: AnthropicStreamBlock,
    },
    /// Incremental payload for the open block
    ContentBlockDelta {
        /// Block index
        index: u32,
        /// The increment
        delta: AnthropicBlockDelta,
    },
    /// The open block closed
    ContentBlockStop {
        /// Block index
        index: u32,
    },
    /// Message-level delta: stop reason and final usage
    MessageDelta {
        /// Stop info
        delta: AnthropicStopInfo,
        /// Cumulative usage
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    /// Stream closed
    MessageStop,
    /// Keep-alive
    Ping,
}

impl AnthropicStreamEvent {
    /// SSE `event:` line value for this event
    pub const fn wire_name(&self) -> &'static str {
        match self {
            Self::MessageStart { .. } => "message_start",
            Self::ContentBlockStart { .. } => "content_block_start",
            Self::ContentBlockDelta { .. } => "content_block_delta",
            Self::ContentBlockStop { .. } => "content_block_stop",
            Self::MessageDelta { .. } => "message_delta",
            Self::MessageStop => "message_stop",
            Self::Ping => "ping",
        }
    }
}

/// Partial message in a `message_start` event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicStreamMessage {
    /// Response identifier
    pub id: String,
    /// Always "message"
    #[serde(rename = "type")]
    pub kind: String,
    /// Always "assistant"
    pub role: String,
    /// Model used
    pub model: String,
    /// Content so far; empty at start
    #[serde(default)]
    pub content: Vec<AnthropicResponseBlock>,
    /// Initial usage
    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
}

/// Initial payload of a `content_block_start` event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamBlock {
    /// Text block, usually empty at start
    Text {
        /// Initial text
        text: String,
    },
    /// Tool use block
    ToolUse {
        /// Invocation id
        id: String,
        /// Tool name
        name: String,
        /// Initial input, usually `{}`
        input: serde_json::Value,
    },
}

/// Increment in a `content_block_delta` event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicBlockDelta {
    /// Text fragment
    TextDelta {
        /// The fragment
        text: String,
    },
    /// Tool input JSON fragment
    InputJsonDelta {
        /// The fragment
        partial_json: String,
    },
}

/// Stop info in a `message_delta` event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnthropicStopInfo {
    /// Stop reason
    #[serde(default)]
    pub stop_reason: Option<String>,
    /// Stop sequence that fired
    #[serde(default)]
    pub stop_sequence: Option<String>,
}

// -- Errors --

/// Error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicErrorBody {
    /// Always "error"
    #[serde(rename = "type")]
    pub kind: String,
    /// Error details
    pub error: AnthropicErrorDetail,
}

/// Error details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicErrorDetail {
    /// Machine-readable type
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable message
    pub message: String,
}
