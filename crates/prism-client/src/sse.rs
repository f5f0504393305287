use std::pin::Pin;

use futures_util::Stream;

use crate::error::ClientError;

/// One wire-level server-sent event
///
/// `event == None` means a bare `data:` event (the SSE default type).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event type from the `event:` line, if any
    pub event: Option<String>,
    /// Payload from the `data:` line(s)
    pub data: String,
}

impl SseFrame {
    /// A data-only frame
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
        }
    }

    /// A typed frame
    pub fn event(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: data.into(),
        }
    }

    /// Build from a parsed wire event, folding the SSE default type into `None`
    pub fn from_wire(event: String, data: String) -> Self {
        let event = if event.is_empty() || event == "message" {
            None
        } else {
            Some(event)
        };
        Self { event, data }
    }
}

/// Pull-based, single-consumer sequence of SSE frames from an open response
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<SseFrame, ClientError>> + Send>>;
