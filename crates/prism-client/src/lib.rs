//! Outbound HTTP execution engine
//!
//! Providers describe an upstream call as a [`ProxyRequest`] (method, URL,
//! headers, body, auth scheme, retry policy) and hand it to the
//! [`HttpExecutor`], which owns the transport concerns: authentication
//! injection, timeouts, retry with exponential backoff, and SSE streaming.

mod error;
mod executor;
mod request;
mod sse;

pub use error::ClientError;
pub use executor::HttpExecutor;
pub use request::{AuthScheme, ProxyRequest, ProxyResponse, RetryPolicy, RETRYABLE_STATUS};
pub use sse::{FrameStream, SseFrame};
