//! Canonical model <-> `OpenAI` wire format

use crate::protocol::openai::{
    OpenAiChoice, OpenAiChunk, OpenAiChunkChoice, OpenAiContent, OpenAiContentPart, OpenAiDelta, OpenAiDeltaFunction,
    OpenAiDeltaToolCall, OpenAiFunctionCall, OpenAiFunctionDef, OpenAiImageUrl, OpenAiMessage, OpenAiRequest,
    OpenAiResponse, OpenAiResponseMessage, OpenAiStop, OpenAiStreamOptions, OpenAiTool, OpenAiToolCall, OpenAiUsage,
};
use crate::types::{
    AssistantMessage, ChatChoice, ChatMessage, ChatRequest, ChatResponse, ChatRole, ContentBlock, DeltaToolCall,
    FinishReason, MessageContent, MessageDelta, ResponseKind, SamplingParams, StopSeq, TokenUsage, ToolChoice,
    ToolDefinition, ToolInvocation,
};

/// Parse a wire finish/stop reason from either vocabulary
pub fn parse_finish_reason(reason: &str) -> Option<FinishReason> {
    match reason {
        "stop" | "end_turn" => Some(FinishReason::Stop),
        "length" | "max_tokens" => Some(FinishReason::Length),
        "tool_calls" | "tool_use" => Some(FinishReason::ToolCalls),
        "content_filter" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

/// `OpenAI` label for a finish reason
pub const fn finish_reason_label(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop => "stop",
        FinishReason::Length => "length",
        FinishReason::ToolCalls => "tool_calls",
        FinishReason::ContentFilter => "content_filter",
    }
}

fn parse_role(role: &str) -> ChatRole {
    match role {
        "system" | "developer" => ChatRole::System,
        "assistant" => ChatRole::Assistant,
        "tool" => ChatRole::Tool,
        _ => ChatRole::User,
    }
}

const fn role_label(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::Tool => "tool",
    }
}

// -- Inbound: wire request -> canonical --

impl From<OpenAiRequest> for ChatRequest {
    fn from(req: OpenAiRequest) -> Self {
        let stop = req.stop.map(|stop| match stop {
            OpenAiStop::Single(sequence) => StopSeq::One(sequence),
            OpenAiStop::Multiple(sequences) => StopSeq::Many(sequences),
        });

        Self {
            model: req.model,
            messages: req.messages.into_iter().map(Into::into).collect(),
            params: SamplingParams {
                temperature: req.temperature,
                top_p: req.top_p,
                max_tokens: req.max_tokens,
                presence_penalty: req.presence_penalty,
                frequency_penalty: req.frequency_penalty,
                n: req.n,
                user: req.user,
            },
            stop,
            tools: req.tools.map(|tools| tools.into_iter().map(Into::into).collect()),
            tool_choice: req.tool_choice.as_ref().and_then(parse_tool_choice),
            stream: req.stream.unwrap_or(false),
        }
    }
}

impl From<OpenAiMessage> for ChatMessage {
    fn from(msg: OpenAiMessage) -> Self {
        let content = match msg.content {
            Some(OpenAiContent::Text(text)) => MessageContent::Text(text),
            Some(OpenAiContent::Parts(parts)) => {
                MessageContent::Parts(parts.into_iter().map(Into::into).collect())
            }
            None => MessageContent::Text(String::new()),
        };

        Self {
            role: parse_role(&msg.role),
            content,
            name: msg.name,
            tool_calls: msg
                .tool_calls
                .map(|calls| calls.into_iter().map(Into::into).collect()),
            tool_call_id: msg.tool_call_id,
        }
    }
}

impl From<OpenAiContentPart> for ContentBlock {
    fn from(part: OpenAiContentPart) -> Self {
        match part {
            OpenAiContentPart::Text { text } => Self::Text { text },
            OpenAiContentPart::ImageUrl { image_url } => Self::Image {
                url: image_url.url,
                detail: image_url.detail,
            },
        }
    }
}

impl From<OpenAiToolCall> for ToolInvocation {
    fn from(call: OpenAiToolCall) -> Self {
        Self {
            id: call.id,
            name: call.function.name,
            arguments: call.function.arguments,
        }
    }
}

impl From<OpenAiTool> for ToolDefinition {
    fn from(tool: OpenAiTool) -> Self {
        Self {
            name: tool.function.name,
            description: tool.function.description,
            parameters: tool.function.parameters,
        }
    }
}

/// Parse the flexible `tool_choice` field (string mode or object)
fn parse_tool_choice(value: &serde_json::Value) -> Option<ToolChoice> {
    match value {
        serde_json::Value::String(mode) => match mode.as_str() {
            "none" => Some(ToolChoice::None),
            "auto" => Some(ToolChoice::Auto),
            "required" => Some(ToolChoice::Required),
            _ => None,
        },
        serde_json::Value::Object(_) => value
            .pointer("/function/name")
            .and_then(serde_json::Value::as_str)
            .map(|name| ToolChoice::Named(name.to_owned())),
        _ => None,
    }
}

/// Encode a tool choice as the wire value
fn tool_choice_value(choice: &ToolChoice) -> serde_json::Value {
    match choice {
        ToolChoice::None => serde_json::Value::String("none".to_owned()),
        ToolChoice::Auto => serde_json::Value::String("auto".to_owned()),
        ToolChoice::Required => serde_json::Value::String("required".to_owned()),
        ToolChoice::Named(name) => serde_json::json!({
            "type": "function",
            "function": { "name": name }
        }),
    }
}

// -- Outbound: canonical request -> wire request --

impl From<&ChatRequest> for OpenAiRequest {
    fn from(req: &ChatRequest) -> Self {
        let stop = req.stop.as_ref().map(|stop| match stop {
            StopSeq::One(sequence) => OpenAiStop::Single(sequence.clone()),
            StopSeq::Many(sequences) => OpenAiStop::Multiple(sequences.clone()),
        });

        Self {
            model: req.model.clone(),
            messages: req.messages.iter().map(Into::into).collect(),
            temperature: req.params.temperature,
            top_p: req.params.top_p,
            max_tokens: req.params.max_tokens,
            stop,
            presence_penalty: req.params.presence_penalty,
            frequency_penalty: req.params.frequency_penalty,
            n: req.params.n,
            user: req.params.user.clone(),
            stream: if req.stream { Some(true) } else { None },
            stream_options: if req.stream {
                Some(OpenAiStreamOptions { include_usage: true })
            } else {
                None
            },
            tools: req.tools.as_ref().map(|tools| {
                tools
                    .iter()
                    .map(|tool| OpenAiTool {
                        tool_type: "function".to_owned(),
                        function: OpenAiFunctionDef {
                            name: tool.name.clone(),
                            description: tool.description.clone(),
                            parameters: tool.parameters.clone(),
                        },
                    })
                    .collect()
            }),
            tool_choice: req.tool_choice.as_ref().map(tool_choice_value),
        }
    }
}

impl From<&ChatMessage> for OpenAiMessage {
    fn from(msg: &ChatMessage) -> Self {
        let content = match &msg.content {
            MessageContent::Text(text) => Some(OpenAiContent::Text(text.clone())),
            MessageContent::Parts(parts) => Some(OpenAiContent::Parts(
                parts
                    .iter()
                    .map(|part| match part {
                        ContentBlock::Text { text } => OpenAiContentPart::Text { text: text.clone() },
                        ContentBlock::Image { url, detail } => OpenAiContentPart::ImageUrl {
                            image_url: OpenAiImageUrl {
                                url: url.clone(),
                                detail: detail.clone(),
                            },
                        },
                    })
                    .collect(),
            )),
        };

        Self {
            role: role_label(msg.role).to_owned(),
            content,
            name: msg.name.clone(),
            tool_calls: msg.tool_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .map(|call| OpenAiToolCall {
                        id: call.id.clone(),
                        call_type: "function".to_owned(),
                        function: OpenAiFunctionCall {
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        },
                    })
                    .collect()
            }),
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

// -- Responses --

impl From<OpenAiResponse> for ChatResponse {
    fn from(resp: OpenAiResponse) -> Self {
        Self {
            id: resp.id,
            kind: ResponseKind::Completion,
            created: resp.created,
            model: resp.model,
            choices: resp
                .choices
                .into_iter()
                .map(|choice| {
                    let finish_reason = choice.finish_reason.as_deref().and_then(parse_finish_reason);
                    let message = AssistantMessage {
                        content: choice.message.content,
                        tool_calls: choice
                            .message
                            .tool_calls
                            .map(|calls| calls.into_iter().map(Into::into).collect()),
                    };
                    ChatChoice::of_message(choice.index, message, finish_reason)
                })
                .collect(),
            usage: resp.usage.map(Into::into),
        }
    }
}

impl From<&ChatResponse> for OpenAiResponse {
    fn from(resp: &ChatResponse) -> Self {
        Self {
            id: resp.id.clone(),
            object: "chat.completion".to_owned(),
            created: resp.created,
            model: resp.model.clone(),
            choices: resp
                .choices
                .iter()
                .map(|choice| {
                    let message = choice.message.clone().unwrap_or_default();
                    OpenAiChoice {
                        index: choice.index,
                        message: OpenAiResponseMessage {
                            role: "assistant".to_owned(),
                            content: message.content,
                            tool_calls: message.tool_calls.map(|calls| {
                                calls
                                    .into_iter()
                                    .map(|call| OpenAiToolCall {
                                        id: call.id,
                                        call_type: "function".to_owned(),
                                        function: OpenAiFunctionCall {
                                            name: call.name,
                                            arguments: call.arguments,
                                        },
                                    })
                                    .collect()
                            }),
                        },
                        finish_reason: choice.finish_reason.map(|r| finish_reason_label(r).to_owned()),
                    }
                })
                .collect(),
            usage: resp.usage.map(Into::into),
        }
    }
}

impl From<OpenAiUsage> for TokenUsage {
    fn from(usage: OpenAiUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

impl From<TokenUsage> for OpenAiUsage {
    fn from(usage: TokenUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

// -- Streaming --

/// Decode one wire chunk into a canonical chunk
pub fn chunk_to_chat(chunk: OpenAiChunk) -> ChatResponse {
    ChatResponse {
        id: chunk.id,
        kind: ResponseKind::Chunk,
        created: chunk.created,
        model: chunk.model,
        choices: chunk
            .choices
            .into_iter()
            .map(|choice| {
                let finish_reason = choice.finish_reason.as_deref().and_then(parse_finish_reason);
                let tool_call = choice
                    .delta
                    .tool_calls
                    .and_then(|calls| calls.into_iter().next())
                    .map(|call| DeltaToolCall {
                        index: call.index,
                        id: call.id,
                        name: call.function.as_ref().and_then(|f| f.name.clone()),
                        arguments: call.function.and_then(|f| f.arguments),
                    });
                ChatChoice::of_delta(
                    choice.index,
                    MessageDelta {
                        role: choice.delta.role,
                        content: choice.delta.content,
                        tool_call,
                    },
                    finish_reason,
                )
            })
            .collect(),
        usage: chunk.usage.map(Into::into),
    }
}

/// Encode one canonical chunk as a wire chunk
///
/// `id` and `model` come from the encoder so they stay stable across the
/// whole stream regardless of what the upstream put on each chunk.
pub fn chat_to_chunk(chunk: &ChatResponse, id: &str, model: &str) -> OpenAiChunk {
    OpenAiChunk {
        id: id.to_owned(),
        object: "chat.completion.chunk".to_owned(),
        created: chunk.created,
        model: model.to_owned(),
        choices: chunk
            .choices
            .iter()
            .map(|choice| {
                let delta = choice.delta.clone().unwrap_or_default();
                OpenAiChunkChoice {
                    index: choice.index,
                    delta: OpenAiDelta {
                        role: delta.role,
                        content: delta.content,
                        tool_calls: delta.tool_call.map(|call| {
                            vec![OpenAiDeltaToolCall {
                                index: call.index,
                                call_type: call.id.as_ref().map(|_| "function".to_owned()),
                                id: call.id,
                                function: Some(OpenAiDeltaFunction {
                                    name: call.name,
                                    arguments: call.arguments,
                                }),
                            }]
                        }),
                    },
                    finish_reason: choice.finish_reason.map(|r| finish_reason_label(r).to_owned()),
                }
            })
            .collect(),
        usage: chunk.usage.map(Into::into),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    #[test]
    fn request_round_trip_preserves_model_order_and_content() {
        let canonical = ChatRequest {
            stop: Some(StopSeq::Many(vec!["a".to_owned(), "b".to_owned()])),
            ..ChatRequest::new(
                "gpt-4",
                vec![
                    ChatMessage::system("be terse"),
                    ChatMessage::user("Hello, world!"),
                    ChatMessage::assistant("Hi."),
                ],
            )
        };

        let wire = OpenAiRequest::from(&canonical);
        let back = ChatRequest::from(wire);

        assert_eq!(back.model, canonical.model);
        assert_eq!(back.messages, canonical.messages);
        assert_eq!(back.stop, canonical.stop);
    }

    #[test]
    fn single_stop_sequence_stays_single_on_the_wire() {
        let canonical = ChatRequest {
            stop: Some(StopSeq::One("END".to_owned())),
            ..ChatRequest::new("gpt-4", vec![ChatMessage::user("hi")])
        };

        let wire = serde_json::to_value(OpenAiRequest::from(&canonical)).unwrap();
        assert_eq!(wire["stop"], "END");
    }

    #[test]
    fn finish_reason_parsing_accepts_both_vocabularies() {
        assert_eq!(parse_finish_reason("stop"), Some(FinishReason::Stop));
        assert_eq!(parse_finish_reason("end_turn"), Some(FinishReason::Stop));
        assert_eq!(parse_finish_reason("max_tokens"), Some(FinishReason::Length));
        assert_eq!(parse_finish_reason("tool_use"), Some(FinishReason::ToolCalls));
        assert_eq!(parse_finish_reason("weird"), None);
    }

    #[test]
    fn chunk_decode_carries_delta_and_usage() {
        let wire: OpenAiChunk = serde_json::from_value(serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1700000000,
            "model": "gpt-4",
            "choices": [{"index": 0, "delta": {"content": "Hel"}, "finish_reason": null}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
        }))
        .unwrap();

        let chunk = chunk_to_chat(wire);
        assert_eq!(chunk.kind, ResponseKind::Chunk);
        let delta = chunk.choices[0].delta.as_ref().unwrap();
        assert_eq!(delta.content.as_deref(), Some("Hel"));
        assert_eq!(chunk.usage.unwrap().total_tokens, 4);
    }

    #[test]
    fn tool_choice_round_trips() {
        let named = ToolChoice::Named("get_weather".to_owned());
        let value = tool_choice_value(&named);
        assert_eq!(parse_tool_choice(&value), Some(named));

        let auto = serde_json::Value::String("auto".to_owned());
        assert_eq!(parse_tool_choice(&auto), Some(ToolChoice::Auto));
    }
}
