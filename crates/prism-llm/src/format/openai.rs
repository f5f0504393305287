//! OpenAI-compatible inbound format
//!
//! Streaming uses the plain `data:` framing: one data-only event per
//! chunk, closed by `data: [DONE]`.

use prism_client::SseFrame;
use prism_core::HttpError;

use crate::convert;
use crate::error::GatewayError;
use crate::protocol::openai::{OpenAiErrorBody, OpenAiErrorDetail, OpenAiRequest, OpenAiResponse};
use crate::types::{ChatRequest, ChatResponse};

use super::{StreamEncoder, WireFormat};

/// The OpenAI-compatible chat completions format
pub struct OpenAiFormat;

impl WireFormat for OpenAiFormat {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn priority(&self) -> u8 {
        10
    }

    fn supports_content_type(&self, content_type: &str) -> bool {
        content_type.starts_with("application/json")
    }

    fn decode_request(&self, body: &[u8]) -> Result<ChatRequest, GatewayError> {
        if body.is_empty() {
            return Err(GatewayError::InvalidRequest("empty request body".to_owned()));
        }
        let wire: OpenAiRequest = serde_json::from_slice(body)
            .map_err(|e| GatewayError::InvalidRequest(format!("malformed chat completion request: {e}")))?;
        Ok(wire.into())
    }

    fn encode_response(&self, response: &ChatResponse) -> Result<Vec<u8>, GatewayError> {
        let wire = OpenAiResponse::from(response);
        serde_json::to_vec(&wire).map_err(|e| GatewayError::Internal(e.into()))
    }

    fn stream_encoder(&self, id: String, model: String) -> Box<dyn StreamEncoder> {
        Box::new(OpenAiSseEncoder {
            id,
            model,
            finished: false,
        })
    }

    fn encode_error_body(&self, error: &GatewayError) -> Vec<u8> {
        let body = OpenAiErrorBody {
            error: OpenAiErrorDetail {
                message: error.client_message(),
                error_type: error.error_type().to_owned(),
                param: None,
                code: None,
            },
        };
        serde_json::to_vec(&body).unwrap_or_default()
    }
}

/// Data-only SSE encoder for the OpenAI format
struct OpenAiSseEncoder {
    id: String,
    model: String,
    finished: bool,
}

impl StreamEncoder for OpenAiSseEncoder {
    fn encode_chunk(&mut self, chunk: &ChatResponse) -> Result<Vec<SseFrame>, GatewayError> {
        let wire = convert::openai::chat_to_chunk(chunk, &self.id, &self.model);
        let data = serde_json::to_string(&wire).map_err(|e| GatewayError::Internal(e.into()))?;
        Ok(vec![SseFrame::data(data)])
    }

    fn finish(&mut self) -> Vec<SseFrame> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        vec![SseFrame::data("[DONE]")]
    }

    fn encode_error(&self, error: &GatewayError) -> SseFrame {
        let body = serde_json::json!({
            "error": {
                "message": error.client_message(),
                "type": error.error_type(),
            }
        });
        SseFrame::data(body.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatChoice, FinishReason, MessageDelta};

    fn delta_chunk(content: &str, finish: Option<FinishReason>) -> ChatResponse {
        ChatResponse::chunk(
            "up-1",
            "upstream-model",
            vec![ChatChoice::of_delta(
                0,
                MessageDelta {
                    content: Some(content.to_owned()),
                    ..MessageDelta::default()
                },
                finish,
            )],
        )
    }

    #[test]
    fn decode_rejects_empty_and_malformed_bodies() {
        let format = OpenAiFormat;
        assert!(matches!(
            format.decode_request(b""),
            Err(GatewayError::InvalidRequest(_))
        ));
        assert!(matches!(
            format.decode_request(b"{not json"),
            Err(GatewayError::InvalidRequest(_))
        ));
    }

    #[test]
    fn decode_accepts_minimal_request() {
        let format = OpenAiFormat;
        let request = format
            .decode_request(br#"{"model":"gpt-4","messages":[{"role":"user","content":"Hello, world!"}]}"#)
            .unwrap();
        assert_eq!(request.model, "gpt-4");
        assert_eq!(request.messages.len(), 1);
        assert!(!request.stream);
    }

    #[test]
    fn encoder_rewrites_chunk_id_and_model() {
        let format = OpenAiFormat;
        let mut encoder = format.stream_encoder("chatcmpl-x".to_owned(), "gpt-4".to_owned());

        let frames = encoder.encode_chunk(&delta_chunk("Hi", None)).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, None);

        let value: serde_json::Value = serde_json::from_str(&frames[0].data).unwrap();
        assert_eq!(value["id"], "chatcmpl-x");
        assert_eq!(value["model"], "gpt-4");
        assert_eq!(value["choices"][0]["delta"]["content"], "Hi");
    }

    #[test]
    fn finish_emits_done_exactly_once() {
        let format = OpenAiFormat;
        let mut encoder = format.stream_encoder("id".to_owned(), "m".to_owned());

        let frames = encoder.finish();
        assert_eq!(frames, vec![SseFrame::data("[DONE]")]);
        assert!(encoder.finish().is_empty());
    }

    #[test]
    fn chunk_without_choices_is_still_a_valid_event()  {
        let format = OpenAiFormat;
        let mut encoder = format.stream_encoder("id".to_owned(), "m".to_owned());

        let empty = ChatResponse::chunk("up", "m", Vec::new());
        let frames = encoder.encode_chunk(&empty).unwrap();
        assert_eq!(frames.len(), 1);
        let value: serde_json::Value = serde_json::from_str(&frames[0].data).unwrap();
        assert_eq!(value["choices"].as_array().unwrap().len(), 0);
    }
}
