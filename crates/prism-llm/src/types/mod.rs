//! Canonical, provider-agnostic request/response types
//!
//! Every wire format converts to and from these. The content and stop
//! unions are real sum types, so exactly-one-of invariants hold by
//! construction rather than by nilable-field convention.

pub mod message;
pub mod request;
pub mod response;

use std::pin::Pin;

use futures_util::Stream;

use crate::error::GatewayError;

pub use message::{ChatMessage, ChatRole, ContentBlock, MessageContent, ToolInvocation};
pub use request::{ChatRequest, SamplingParams, StopSeq, ToolChoice, ToolDefinition};
pub use response::{
    unix_timestamp, AssistantMessage, ChatChoice, ChatResponse, DeltaToolCall, FinishReason, MessageDelta,
    ResponseKind, TokenUsage,
};

/// Pull-based, single-consumer sequence of canonical response chunks
///
/// Terminated by end-of-data; any other read failure is surfaced as an
/// `Err` item.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatResponse, GatewayError>> + Send>>;
