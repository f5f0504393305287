use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::message::ToolInvocation;

/// Object kind tag carried on every response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseKind {
    /// A complete, buffered response
    #[serde(rename = "chat.completion")]
    Completion,
    /// One streamed increment
    #[serde(rename = "chat.completion.chunk")]
    Chunk,
}

/// Reason the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of generation
    Stop,
    /// Token limit reached
    Length,
    /// Model requested tool calls
    ToolCalls,
    /// Content removed by a safety filter
    ContentFilter,
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt
    pub prompt_tokens: u32,
    /// Tokens generated in the completion
    pub completion_tokens: u32,
    /// Prompt plus completion
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Usage from prompt/completion counts
    pub const fn of(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Full assistant message on a buffered choice
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// Text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tool calls requested by the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolInvocation>>,
}

impl AssistantMessage {
    /// Plain text message
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: None,
        }
    }
}

/// Partial tool call carried by a streamed delta
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaToolCall {
    /// Position in the assembled `tool_calls` array
    pub index: u32,
    /// Invocation id, present on the first fragment only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Tool name, present on the first fragment only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Incremental JSON arguments fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// Incremental update on a streamed choice
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDelta {
    /// Author role, present on the first chunk only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Incremental text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Incremental tool call data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<DeltaToolCall>,
}

/// One generated choice
///
/// Buffered responses populate `message`; streamed chunks populate
/// `delta`; never both. The constructors are the only way other modules
/// build choices, which keeps that invariant out of reach of field
/// twiddling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChoice {
    /// Choice index
    pub index: u32,
    /// Full message (buffered responses)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<AssistantMessage>,
    /// Incremental delta (streamed chunks)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<MessageDelta>,
    /// Why generation stopped, if it did
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl ChatChoice {
    /// Buffered choice carrying a full message
    pub const fn of_message(index: u32, message: AssistantMessage, finish_reason: Option<FinishReason>) -> Self {
        Self {
            index,
            message: Some(message),
            delta: None,
            finish_reason,
        }
    }

    /// Streamed choice carrying a delta
    pub const fn of_delta(index: u32, delta: MessageDelta, finish_reason: Option<FinishReason>) -> Self {
        Self {
            index,
            message: None,
            delta: Some(delta),
            finish_reason,
        }
    }
}

/// Canonical chat-completion response or stream chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Response identifier
    pub id: String,
    /// Object kind tag
    pub kind: ResponseKind,
    /// Unix timestamp of creation
    pub created: u64,
    /// Model that generated the response
    pub model: String,
    /// Generated choices
    pub choices: Vec<ChatChoice>,
    /// Token usage, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl ChatResponse {
    /// Buffered completion response
    pub fn completion(
        id: impl Into<String>,
        model: impl Into<String>,
        choices: Vec<ChatChoice>,
        usage: Option<TokenUsage>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: ResponseKind::Completion,
            created: unix_timestamp(),
            model: model.into(),
            choices,
            usage,
        }
    }

    /// Streamed chunk
    pub fn chunk(id: impl Into<String>, model: impl Into<String>, choices: Vec<ChatChoice>) -> Self {
        Self {
            id: id.into(),
            kind: ResponseKind::Chunk,
            created: unix_timestamp(),
            model: model.into(),
            choices,
            usage: None,
        }
    }

    /// Text content of the first choice, if any
    pub fn first_text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.as_ref())
            .and_then(|message| message.content.as_deref())
    }
}

/// Current Unix timestamp in seconds
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
