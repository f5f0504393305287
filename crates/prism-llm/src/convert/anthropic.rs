//! Canonical model <-> Anthropic wire format

use crate::protocol::anthropic::{
    AnthropicBlockDelta, AnthropicContent, AnthropicContentBlock, AnthropicImageSource, AnthropicMessage,
    AnthropicMetadata, AnthropicRequest, AnthropicResponse, AnthropicResponseBlock, AnthropicStreamBlock,
    AnthropicStreamEvent, AnthropicTool, AnthropicToolChoice, AnthropicUsage,
};
use crate::types::{
    AssistantMessage, ChatChoice, ChatMessage, ChatRequest, ChatResponse, ChatRole, ContentBlock, DeltaToolCall,
    FinishReason, MessageContent, MessageDelta, SamplingParams, StopSeq, TokenUsage, ToolChoice, ToolDefinition,
    ToolInvocation,
};

/// Max tokens to send when the caller did not specify one; the Messages
/// API requires the field
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Parse an Anthropic stop reason into the canonical vocabulary
pub fn parse_stop_reason(reason: &str) -> Option<FinishReason> {
    match reason {
        "end_turn" | "stop_sequence" => Some(FinishReason::Stop),
        "max_tokens" => Some(FinishReason::Length),
        "tool_use" => Some(FinishReason::ToolCalls),
        _ => None,
    }
}

/// Anthropic label for a canonical finish reason
///
/// Fixed mapping: stop -> `end_turn`, length -> `max_tokens`,
/// tool_calls -> `tool_use`. The protocol has no content-filter reason,
/// so that maps to `end_turn` as well.
pub const fn stop_reason_label(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop | FinishReason::ContentFilter => "end_turn",
        FinishReason::Length => "max_tokens",
        FinishReason::ToolCalls => "tool_use",
    }
}

// -- Inbound: wire request -> canonical --

impl From<AnthropicRequest> for ChatRequest {
    fn from(req: AnthropicRequest) -> Self {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);

        if let Some(system) = req.system {
            messages.push(ChatMessage::system(system));
        }
        for message in req.messages {
            messages.push(wire_message_to_canonical(message));
        }

        Self {
            model: req.model,
            messages,
            params: SamplingParams {
                temperature: req.temperature,
                top_p: req.top_p,
                max_tokens: Some(req.max_tokens),
                presence_penalty: None,
                frequency_penalty: None,
                n: None,
                user: req.metadata.and_then(|m| m.user_id),
            },
            stop: req.stop_sequences.map(StopSeq::Many),
            tools: req.tools.map(|tools| tools.into_iter().map(Into::into).collect()),
            tool_choice: req.tool_choice.as_ref().map(wire_tool_choice_to_canonical),
            stream: req.stream.unwrap_or(false),
        }
    }
}

fn wire_message_to_canonical(msg: AnthropicMessage) -> ChatMessage {
    let role = if msg.role == "assistant" {
        ChatRole::Assistant
    } else {
        ChatRole::User
    };

    match msg.content {
        AnthropicContent::Text(text) => ChatMessage::text(role, text),
        AnthropicContent::Blocks(blocks) => {
            let mut parts = Vec::new();
            let mut tool_calls = Vec::new();
            let mut tool_result: Option<(String, String)> = None;

            for block in blocks {
                match block {
                    AnthropicContentBlock::Text { text } => parts.push(ContentBlock::Text { text }),
                    AnthropicContentBlock::Image { source } => {
                        let url = if source.kind == "base64" {
                            let media_type = source.media_type.unwrap_or_else(|| "image/png".to_owned());
                            format!("data:{media_type};base64,{}", source.data)
                        } else {
                            source.data
                        };
                        parts.push(ContentBlock::Image { url, detail: None });
                    }
                    AnthropicContentBlock::ToolUse { id, name, input } => {
                        let arguments = serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_owned());
                        tool_calls.push(ToolInvocation { id, name, arguments });
                    }
                    AnthropicContentBlock::ToolResult {
                        tool_use_id, content, ..
                    } => {
                        tool_result = Some((tool_use_id, content.unwrap_or_default()));
                    }
                }
            }

            if let Some((tool_call_id, content)) = tool_result {
                return ChatMessage {
                    role: ChatRole::Tool,
                    content: MessageContent::Text(content),
                    name: None,
                    tool_calls: None,
                    tool_call_id: Some(tool_call_id),
                };
            }

            let content = match parts.len() {
                0 => MessageContent::Text(String::new()),
                1 if matches!(parts[0], ContentBlock::Text { .. }) => {
                    let ContentBlock::Text { text } = parts.remove(0) else {
                        unreachable!()
                    };
                    MessageContent::Text(text)
                }
                _ => MessageContent::Parts(parts),
            };

            ChatMessage {
                role,
                content,
                name: None,
                tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
                tool_call_id: None,
            }
        }
    }
}

impl From<AnthropicTool> for ToolDefinition {
    fn from(tool: AnthropicTool) -> Self {
        Self {
            name: tool.name,
            description: tool.description,
            parameters: Some(tool.input_schema),
        }
    }
}

fn wire_tool_choice_to_canonical(choice: &AnthropicToolChoice) -> ToolChoice {
    match choice.kind.as_str() {
        "any" => ToolChoice::Required,
        "tool" => choice
            .name
            .clone()
            .map_or(ToolChoice::Auto, ToolChoice::Named),
        _ => ToolChoice::Auto,
    }
}

// -- Outbound: canonical request -> wire request --

impl From<&ChatRequest> for AnthropicRequest {
    fn from(req: &ChatRequest) -> Self {
        let mut system = None;
        let mut messages = Vec::new();

        for message in &req.messages {
            if message.role == ChatRole::System {
                system = Some(message.content.flatten_text());
            } else {
                messages.push(canonical_message_to_wire(message));
            }
        }

        Self {
            model: req.model.clone(),
            max_tokens: req.params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            messages,
            temperature: req.params.temperature,
            top_p: req.params.top_p,
            stop_sequences: req.stop.as_ref().map(StopSeq::to_vec),
            stream: if req.stream { Some(true) } else { None },
            tools: req.tools.as_ref().map(|tools| {
                tools
                    .iter()
                    .map(|tool| AnthropicTool {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        input_schema: tool
                            .parameters
                            .clone()
                            .unwrap_or_else(|| serde_json::json!({"type": "object"})),
                    })
                    .collect()
            }),
            tool_choice: req.tool_choice.as_ref().map(canonical_tool_choice_to_wire),
            metadata: req.params.user.clone().map(|user_id| AnthropicMetadata {
                user_id: Some(user_id),
            }),
        }
    }
}

fn canonical_message_to_wire(msg: &ChatMessage) -> AnthropicMessage {
    // Tool results travel as user messages with a tool_result block
    if msg.role == ChatRole::Tool
        && let Some(tool_call_id) = &msg.tool_call_id
    {
        return AnthropicMessage {
            role: "user".to_owned(),
            content: AnthropicContent::Blocks(vec![AnthropicContentBlock::ToolResult {
                tool_use_id: tool_call_id.clone(),
                content: Some(msg.content.flatten_text()),
                is_error: None,
            }]),
        };
    }

    let role = if msg.role == ChatRole::Assistant { "assistant" } else { "user" };

    if let Some(tool_calls) = &msg.tool_calls {
        let mut blocks = Vec::new();

        let text = msg.content.flatten_text();
        if !text.is_empty() {
            blocks.push(AnthropicContentBlock::Text { text });
        }
        for call in tool_calls {
            let input = serde_json::from_str(&call.arguments).unwrap_or_else(|_| serde_json::json!({}));
            blocks.push(AnthropicContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input,
            });
        }

        return AnthropicMessage {
            role: role.to_owned(),
            content: AnthropicContent::Blocks(blocks),
        };
    }

    let content = match &msg.content {
        MessageContent::Text(text) => AnthropicContent::Text(text.clone()),
        MessageContent::Parts(parts) => AnthropicContent::Blocks(
            parts
                .iter()
                .map(|part| match part {
                    ContentBlock::Text { text } => AnthropicContentBlock::Text { text: text.clone() },
                    ContentBlock::Image { url, .. } => AnthropicContentBlock::Image {
                        source: image_url_to_source(url),
                    },
                })
                .collect(),
        ),
    };

    AnthropicMessage {
        role: role.to_owned(),
        content,
    }
}

fn image_url_to_source(url: &str) -> AnthropicImageSource {
    if let Some(rest) = url.strip_prefix("data:")
        && let Some((media_and_encoding, data)) = rest.split_once(',')
    {
        let media_type = media_and_encoding
            .strip_suffix(";base64")
            .unwrap_or(media_and_encoding);
        return AnthropicImageSource {
            kind: "base64".to_owned(),
            media_type: Some(media_type.to_owned()),
            data: data.to_owned(),
        };
    }

    AnthropicImageSource {
        kind: "url".to_owned(),
        media_type: None,
        data: url.to_owned(),
    }
}

fn canonical_tool_choice_to_wire(choice: &ToolChoice) -> AnthropicToolChoice {
    match choice {
        // The protocol has no "none"; auto is the closest behavior
        ToolChoice::Auto | ToolChoice::None => AnthropicToolChoice {
            kind: "auto".to_owned(),
            name: None,
        },
        ToolChoice::Required => AnthropicToolChoice {
            kind: "any".to_owned(),
            name: None,
        },
        ToolChoice::Named(name) => AnthropicToolChoice {
            kind: "tool".to_owned(),
            name: Some(name.clone()),
        },
    }
}

// -- Responses --

impl From<AnthropicResponse> for ChatResponse {
    fn from(resp: AnthropicResponse) -> Self {
        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in &resp.content {
            match block {
                AnthropicResponseBlock::Text { text: fragment } => text.push_str(fragment),
                AnthropicResponseBlock::ToolUse { id, name, input } => {
                    let arguments = serde_json::to_string(input).unwrap_or_else(|_| "{}".to_owned());
                    tool_calls.push(ToolInvocation {
                        id: id.clone(),
                        name: name.clone(),
                        arguments,
                    });
                }
            }
        }

        let finish_reason = resp.stop_reason.as_deref().and_then(parse_stop_reason);
        let message = AssistantMessage {
            content: if text.is_empty() && !tool_calls.is_empty() {
                None
            } else {
                Some(text)
            },
            tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
        };

        ChatResponse::completion(
            resp.id,
            resp.model,
            vec![ChatChoice::of_message(0, message, finish_reason)],
            Some(TokenUsage::of(resp.usage.input_tokens, resp.usage.output_tokens)),
        )
    }
}

/// Encode a canonical response as a wire response
///
/// Multi-choice responses collapse to the first choice; the Messages API
/// has no choice array.
pub fn chat_to_response(resp: &ChatResponse) -> AnthropicResponse {
    let choice = resp.choices.first();

    let mut content = Vec::new();
    if let Some(message) = choice.and_then(|c| c.message.as_ref()) {
        if let Some(text) = &message.content
            && !text.is_empty()
        {
            content.push(AnthropicResponseBlock::Text { text: text.clone() });
        }
        if let Some(tool_calls) = &message.tool_calls {
            for call in tool_calls {
                let input = serde_json::from_str(&call.arguments).unwrap_or_else(|_| serde_json::json!({}));
                content.push(AnthropicResponseBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input,
                });
            }
        }
    }

    let usage = resp.usage.unwrap_or_default();

    AnthropicResponse {
        id: resp.id.clone(),
        kind: "message".to_owned(),
        role: "assistant".to_owned(),
        content,
        model: resp.model.clone(),
        stop_reason: choice
            .and_then(|c| c.finish_reason)
            .map(|reason| stop_reason_label(reason).to_owned()),
        stop_sequence: None,
        usage: AnthropicUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        },
    }
}

// -- Streaming: wire events -> canonical chunks --

/// Stateful decoder for a Messages API event stream
///
/// Tracks the response id/model from `message_start` and assigns
/// sequential tool-call indexes. The protocol's content block index is
/// shared across block types, so it cannot be used as the tool-call
/// index directly.
#[derive(Debug, Default)]
pub struct AnthropicStreamState {
    id: String,
    model: String,
    input_tokens: u32,
    current_tool_index: u32,
    next_tool_index: u32,
}

impl AnthropicStreamState {
    /// Fresh decoder state for one stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert one wire event into zero or more canonical chunks
    pub fn convert_event(&mut self, event: AnthropicStreamEvent) -> Vec<ChatResponse> {
        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                self.id = message.id;
                self.model = message.model;
                self.input_tokens = message.usage.map_or(0, |u| u.input_tokens);
                vec![self.delta_chunk(
                    MessageDelta {
                        role: Some("assistant".to_owned()),
                        ..MessageDelta::default()
                    },
                    None,
                )]
            }

            AnthropicStreamEvent::ContentBlockStart { content_block, .. } => match content_block {
                AnthropicStreamBlock::Text { .. } => Vec::new(),
                AnthropicStreamBlock::ToolUse { id, name, .. } => {
                    self.current_tool_index = self.next_tool_index;
                    self.next_tool_index += 1;
                    vec![self.delta_chunk(
                        MessageDelta {
                            tool_call: Some(DeltaToolCall {
                                index: self.current_tool_index,
                                id: Some(id),
                                name: Some(name),
                                arguments: None,
                            }),
                            ..MessageDelta::default()
                        },
                        None,
                    )]
                }
            },

            AnthropicStreamEvent::ContentBlockDelta { delta, .. } => match delta {
                AnthropicBlockDelta::TextDelta { text } => vec![self.delta_chunk(
                    MessageDelta {
                        content: Some(text),
                        ..MessageDelta::default()
                    },
                    None,
                )],
                AnthropicBlockDelta::InputJsonDelta { partial_json } => vec![self.delta_chunk(
                    MessageDelta {
                        tool_call: Some(DeltaToolCall {
                            index: self.current_tool_index,
                            id: None,
                            name: None,
                            arguments: Some(partial_json),
                        }),
                        ..MessageDelta::default()
                    },
                    None,
                )],
            },

            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                let finish_reason = delta.stop_reason.as_deref().and_then(parse_stop_reason);
                let usage = usage.map(|u| {
                    let input = if u.input_tokens > 0 { u.input_tokens } else { self.input_tokens };
                    TokenUsage::of(input, u.output_tokens)
                });

                if finish_reason.is_none() && usage.is_none() {
                    return Vec::new();
                }

                let mut chunk = self.delta_chunk(MessageDelta::default(), finish_reason);
                chunk.usage = usage;
                vec![chunk]
            }

            AnthropicStreamEvent::ContentBlockStop { .. }
            | AnthropicStreamEvent::MessageStop
            | AnthropicStreamEvent::Ping => Vec::new(),
        }
    }

    fn delta_chunk(&self, delta: MessageDelta, finish_reason: Option<FinishReason>) -> ChatResponse {
        ChatResponse::chunk(
            self.id.clone(),
            self.model.clone(),
            vec![ChatChoice::of_delta(0, delta, finish_reason)],
        )
    }
}
