use thiserror::Error;

use crate::request::RetryPolicy;

/// Errors produced by the HTTP execution engine
#[derive(Debug, Error)]
pub enum ClientError {
    /// Upstream answered with a non-success status
    ///
    /// The single error shape for all upstream HTTP failures, so callers
    /// can pattern-match on status and body.
    #[error("upstream {method} {url} returned status {status}")]
    Status {
        /// Request method
        method: http::Method,
        /// Request URL
        url: String,
        /// Response status code
        status: u16,
        /// Response body, fully drained for diagnostics
        body: String,
    },

    /// Connection-level failure (DNS, TLS, timeout, reset)
    #[error("transport error: {0}")]
    Transport(String),

    /// Failure while reading an open response stream
    #[error("stream error: {0}")]
    Stream(String),

    /// Auth or header configuration that cannot be encoded
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The call's cancellation signal fired
    #[error("request cancelled")]
    Cancelled,
}

impl ClientError {
    /// Whether the buffered retry loop may try again after this error
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => RetryPolicy::is_retryable_status(*status),
            Self::Transport(_) => true,
            Self::Stream(_) | Self::InvalidHeader(_) | Self::Cancelled => false,
        }
    }
}
