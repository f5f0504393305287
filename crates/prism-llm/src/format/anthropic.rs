//! Anthropic-compatible inbound format
//!
//! The streaming side is a state machine: canonical chunks are
//! re-sequenced into the Messages API event order: one `message_start`,
//! then complete `content_block_start`/`content_block_delta`/
//! `content_block_stop` triples, then `message_delta` with the mapped
//! stop reason and final usage, then `message_stop`.

use prism_client::SseFrame;
use prism_core::HttpError;

use crate::convert::anthropic::{chat_to_response, stop_reason_label};
use crate::error::GatewayError;
use crate::protocol::anthropic::{
    AnthropicRequest, AnthropicStopInfo, AnthropicStreamBlock, AnthropicStreamEvent, AnthropicStreamMessage,
    AnthropicUsage,
};
use crate::types::{ChatRequest, ChatResponse, FinishReason, TokenUsage};

use super::{StreamEncoder, WireFormat};

/// The Anthropic-compatible messages format
pub struct AnthropicFormat;

impl WireFormat for AnthropicFormat {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn priority(&self) -> u8 {
        5
    }

    fn supports_content_type(&self, content_type: &str) -> bool {
        content_type.starts_with("application/json")
    }

    fn decode_request(&self, body: &[u8]) -> Result<ChatRequest, GatewayError> {
        if body.is_empty() {
            return Err(GatewayError::InvalidRequest("empty request body".to_owned()));
        }
        let wire: AnthropicRequest = serde_json::from_slice(body)
            .map_err(|e| GatewayError::InvalidRequest(format!("malformed messages request: {e}")))?;
        Ok(wire.into())
    }

    fn encode_response(&self, response: &ChatResponse) -> Result<Vec<u8>, GatewayError> {
        let wire = chat_to_response(response);
        serde_json::to_vec(&wire).map_err(|e| GatewayError::Internal(e.into()))
    }

    fn stream_encoder(&self, id: String, model: String) -> Box<dyn StreamEncoder> {
        Box::new(AnthropicSseEncoder::new(id, model))
    }

    fn encode_error_body(&self, error: &GatewayError) -> Vec<u8> {
        let body = serde_json::json!({
            "type": "error",
            "error": {
                "type": error.error_type(),
                "message": error.client_message(),
            }
        });
        serde_json::to_vec(&body).unwrap_or_default()
    }
}

/// A content block the encoder currently has open on the wire
struct OpenBlock {
    index: u32,
    tool: bool,
}

/// Stateful SSE encoder for the Anthropic format
struct AnthropicSseEncoder {
    id: String,
    model: String,
    started: bool,
    open_block: Option<OpenBlock>,
    next_block_index: u32,
    finish_reason: Option<FinishReason>,
    usage: Option<TokenUsage>,
    finished: bool,
}

impl AnthropicSseEncoder {
    fn new(id: String, model: String) -> Self {
        Self {
            id,
            model,
            started: false,
            open_block: None,
            next_block_index: 0,
            finish_reason: None,
            usage: None,
            finished: false,
        }
    }

    fn frame(event: &AnthropicStreamEvent) -> SseFrame {
        SseFrame::event(
            event.wire_name(),
            serde_json::to_string(event).unwrap_or_default(),
        )
    }

    fn ensure_started(&mut self, frames: &mut Vec<SseFrame>) {
        if self.started {
            return;
        }
        self.started = true;
        frames.push(Self::frame(&AnthropicStreamEvent::MessageStart {
            message: AnthropicStreamMessage {
                id: self.id.clone(),
                kind: "message".to_owned(),
                role: "assistant".to_owned(),
                model: self.model.clone(),
                content: Vec::new(),
                usage: Some(AnthropicUsage::default()),
            },
        }));
    }

    fn close_block(&mut self, frames: &mut Vec<SseFrame>) {
        if let Some(block) = self.open_block.take() {
            frames.push(Self::frame(&AnthropicStreamEvent::ContentBlockStop { index: block.index }));
        }
    }

    fn open_text_block(&mut self, frames: &mut Vec<SseFrame>) -> u32 {
        if let Some(block) = &self.open_block {
            if !block.tool {
                return block.index;
            }
            self.close_block(frames);
        }

        let index = self.next_block_index;
        self.next_block_index += 1;
        frames.push(Self::frame(&AnthropicStreamEvent::ContentBlockStart {
            index,
            content_block: AnthropicStreamBlock::Text { text: String::new() },
        }));
        self.open_block = Some(OpenBlock { index, tool: false });
        index
    }

    fn open_tool_block(&mut self, id: String, name: String, frames: &mut Vec<SseFrame>) -> u32 {
        self.close_block(frames);

        let index = self.next_block_index;
        self.next_block_index += 1;
        frames.push(Self::frame(&AnthropicStreamEvent::ContentBlockStart {
            index,
            content_block: AnthropicStreamBlock::ToolUse {
                id,
                name,
                input: serde_json::json!({}),
            },
        }));
        self.open_block = Some(OpenBlock { index, tool: true });
        index
    }

    fn tool_block_index(&mut self, frames: &mut Vec<SseFrame>) -> u32 {
        match &self.open_block {
            Some(block) if block.tool => block.index,
            _ => self.open_tool_block(String::new(), String::new(), frames),
        }
    }
}

impl StreamEncoder for AnthropicSseEncoder {
    fn encode_chunk(&mut self, chunk: &ChatResponse) -> Result<Vec<SseFrame>, GatewayError> {
        let mut frames = Vec::new();
        self.ensure_started(&mut frames);

        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }

        // A chunk with nothing to say still yields a structurally valid event
        if chunk.choices.is_empty() {
            frames.push(Self::frame(&AnthropicStreamEvent::Ping));
            return Ok(frames);
        }

        for choice in &chunk.choices {
            if let Some(delta) = &choice.delta {
                if let Some(call) = &delta.tool_call {
                    if call.id.is_some() || call.name.is_some() {
                        self.open_tool_block(
                            call.id.clone().unwrap_or_default(),
                            call.name.clone().unwrap_or_default(),
                            &mut frames,
                        );
                    }
                    if let Some(arguments) = &call.arguments {
                        let index = self.tool_block_index(&mut frames);
                        frames.push(Self::frame(&AnthropicStreamEvent::ContentBlockDelta {
                            index,
                            delta: crate::protocol::anthropic::AnthropicBlockDelta::InputJsonDelta {
                                partial_json: arguments.clone(),
                            },
                        }));
                    }
                }

                if let Some(text) = &delta.content {
                    let index = self.open_text_block(&mut frames);
                    frames.push(Self::frame(&AnthropicStreamEvent::ContentBlockDelta {
                        index,
                        delta: crate::protocol::anthropic::AnthropicBlockDelta::TextDelta { text: text.clone() },
                    }));
                }
            }

            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
            }
        }

        Ok(frames)
    }

    fn finish(&mut self) -> Vec<SseFrame> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut frames = Vec::new();
        self.ensure_started(&mut frames);
        self.close_block(&mut frames);

        let stop_reason = self.finish_reason.map_or("end_turn", stop_reason_label);
        frames.push(Self::frame(&AnthropicStreamEvent::MessageDelta {
            delta: AnthropicStopInfo {
                stop_reason: Some(stop_reason.to_owned()),
                stop_sequence: None,
            },
            usage: self.usage.map(|usage| AnthropicUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            }),
        }));
        frames.push(Self::frame(&AnthropicStreamEvent::MessageStop));

        frames
    }

    fn encode_error(&self, error: &GatewayError) -> SseFrame {
        let body = serde_json::json!({
            "type": "error",
            "error": {
                "type": error.error_type(),
                "message": error.client_message(),
            }
        });
        SseFrame::event("error", body.to_string())
    }
}
