use serde::{Deserialize, Serialize};

/// Role of a conversation participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// System instruction
    System,
    /// End-user message
    User,
    /// Model response
    Assistant,
    /// Tool invocation result
    Tool,
}

/// Message content, either plain text or an ordered sequence of typed parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text
    Text(String),
    /// Multimodal content blocks
    Parts(Vec<ContentBlock>),
}

impl MessageContent {
    /// Flatten to text, joining text blocks and skipping non-text ones
    pub fn flatten_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::Image { .. } => None,
                })
                .collect(),
        }
    }

    /// Whether the content carries nothing at all
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Parts(parts) => parts.is_empty(),
        }
    }
}

/// One typed part within multimodal content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text block
    Text {
        /// The text string
        text: String,
    },
    /// Image reference (URL or data URI)
    Image {
        /// Image location
        url: String,
        /// Optional detail hint ("auto", "low", "high")
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

/// A tool call requested by the assistant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Correlation id for the invocation
    pub id: String,
    /// Tool name
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}

/// Message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author role
    pub role: ChatRole,
    /// Message content
    pub content: MessageContent,
    /// Optional participant name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool calls made by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolInvocation>>,
    /// For tool-role messages, the invocation this responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    /// Plain text message with the given role
    pub fn text(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// User message shorthand
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(ChatRole::User, text)
    }

    /// System message shorthand
    pub fn system(text: impl Into<String>) -> Self {
        Self::text(ChatRole::System, text)
    }

    /// Assistant message shorthand
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(ChatRole::Assistant, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_joins_text_blocks_in_order() {
        let content = MessageContent::Parts(vec![
            ContentBlock::Text { text: "Hello, ".to_owned() },
            ContentBlock::Image {
                url: "https://img.test/cat.png".to_owned(),
                detail: None,
            },
            ContentBlock::Text { text: "world".to_owned() },
        ]);
        assert_eq!(content.flatten_text(), "Hello, world");
    }

    #[test]
    fn text_content_deserializes_from_plain_string() {
        let content: MessageContent = serde_json::from_str("\"hi\"").unwrap();
        assert_eq!(content, MessageContent::Text("hi".to_owned()));
    }

    #[test]
    fn parts_content_deserializes_from_array() {
        let content: MessageContent =
            serde_json::from_str(r#"[{"type":"text","text":"hi"}]"#).unwrap();
        assert_eq!(
            content,
            MessageContent::Parts(vec![ContentBlock::Text { text: "hi".to_owned() }])
        );
    }
}
