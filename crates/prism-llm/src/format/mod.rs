//! Caller-facing wire formats
//!
//! A [`WireFormat`] decodes inbound requests into the canonical model and
//! encodes canonical responses back out, including the per-format SSE
//! sequencing handled by its [`StreamEncoder`]. The [`FormatRegistry`]
//! resolves formats by name, or by content type and priority when the
//! caller gives no explicit format.

pub mod anthropic;
pub mod openai;

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use prism_client::SseFrame;

use crate::error::GatewayError;
use crate::types::{ChatRequest, ChatResponse, ChunkStream};

pub use anthropic::AnthropicFormat;
pub use openai::OpenAiFormat;

/// Stream of wire-level SSE frames handed to the edge layer
///
/// Errors are folded in as in-band error events by the encoder, so the
/// item type is the frame itself.
pub type WireStream = Pin<Box<dyn Stream<Item = SseFrame> + Send>>;

/// A caller-facing wire format
pub trait WireFormat: Send + Sync {
    /// Registry name (e.g. "openai")
    fn name(&self) -> &'static str;

    /// Detection priority; higher wins when several formats accept the
    /// same content type
    fn priority(&self) -> u8;

    /// Whether this format accepts the given content type
    fn supports_content_type(&self, content_type: &str) -> bool;

    /// Decode an inbound request body
    ///
    /// # Errors
    ///
    /// `GatewayError::InvalidRequest` for an empty or malformed body,
    /// with the parse failure wrapped in context
    fn decode_request(&self, body: &[u8]) -> Result<ChatRequest, GatewayError>;

    /// Encode a canonical response for this format
    ///
    /// # Errors
    ///
    /// `GatewayError::Internal` when serialization fails
    fn encode_response(&self, response: &ChatResponse) -> Result<Vec<u8>, GatewayError>;

    /// Start a stateful SSE encoder for one streamed response
    fn stream_encoder(&self, id: String, model: String) -> Box<dyn StreamEncoder>;

    /// Encode an error body for non-streaming error responses
    fn encode_error_body(&self, error: &GatewayError) -> Vec<u8>;
}

/// Stateful re-sequencer from canonical chunks to wire events
///
/// One encoder instance serves exactly one stream and owns whatever
/// ordering state the format requires.
pub trait StreamEncoder: Send {
    /// Encode one canonical chunk into zero or more wire frames
    ///
    /// A chunk with no choices must still produce a structurally valid,
    /// content-empty event, never an error.
    ///
    /// # Errors
    ///
    /// `GatewayError::Internal` when serialization fails
    fn encode_chunk(&mut self, chunk: &ChatResponse) -> Result<Vec<SseFrame>, GatewayError>;

    /// Emit the terminal event sequence; idempotent
    fn finish(&mut self) -> Vec<SseFrame>;

    /// Encode an error as an in-band event in this format
    fn encode_error(&self, error: &GatewayError) -> SseFrame;
}

/// Name-keyed lookup of registered formats with content-type detection
pub struct FormatRegistry {
    formats: Vec<Arc<dyn WireFormat>>,
}

impl FormatRegistry {
    /// Registry with the built-in formats
    pub fn with_defaults() -> Self {
        Self {
            formats: vec![Arc::new(OpenAiFormat), Arc::new(AnthropicFormat)],
        }
    }

    /// Look up a format by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn WireFormat>> {
        self.formats.iter().find(|f| f.name() == name).cloned()
    }

    /// Pick the highest-priority format accepting the content type
    ///
    /// # Errors
    ///
    /// `GatewayError::UnsupportedContentType` when no format accepts it
    pub fn detect(&self, content_type: &str) -> Result<Arc<dyn WireFormat>, GatewayError> {
        self.formats
            .iter()
            .filter(|f| f.supports_content_type(content_type))
            .max_by_key(|f| f.priority())
            .cloned()
            .ok_or_else(|| GatewayError::UnsupportedContentType(content_type.to_owned()))
    }
}

/// Adapter that drives a canonical chunk stream through a [`StreamEncoder`]
///
/// On inner stream end the encoder's terminal events are appended; an
/// `Err` item becomes an in-band error event followed by the terminal
/// events, so the wire sequence is always well formed.
pub struct EncodedStream {
    inner: Option<ChunkStream>,
    encoder: Box<dyn StreamEncoder>,
    queue: VecDeque<SseFrame>,
}

impl EncodedStream {
    /// Wrap a canonical stream with a format encoder
    pub fn new(inner: ChunkStream, encoder: Box<dyn StreamEncoder>) -> Self {
        Self {
            inner: Some(inner),
            encoder,
            queue: VecDeque::new(),
        }
    }
}

impl Stream for EncodedStream {
    type Item = SseFrame;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(frame) = this.queue.pop_front() {
                return Poll::Ready(Some(frame));
            }

            let Some(inner) = this.inner.as_mut() else {
                return Poll::Ready(None);
            };

            match inner.as_mut().poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) => match this.encoder.encode_chunk(&chunk) {
                    Ok(frames) => this.queue.extend(frames),
                    Err(error) => {
                        tracing::warn!(error = %error, "failed to encode stream chunk");
                        this.queue.push_back(this.encoder.encode_error(&error));
                        this.queue.extend(this.encoder.finish());
                        this.inner = None;
                    }
                },
                Poll::Ready(Some(Err(error))) => {
                    this.queue.push_back(this.encoder.encode_error(&error));
                    this.queue.extend(this.encoder.finish());
                    this.inner = None;
                }
                Poll::Ready(None) => {
                    this.queue.extend(this.encoder.finish());
                    this.inner = None;
                }
            }
        }
    }
}
