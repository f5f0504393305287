use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

/// Runtime context for one gateway call
///
/// Built by the server's request-context middleware and handed through the
/// orchestrator to providers. Holds the caller-facing HTTP parts, any
/// credential the caller supplied for forwarding, and the call's
/// cancellation signal, which every blocking wait downstream observes.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// HTTP request parts (method, URI, headers, extensions)
    pub parts: http::request::Parts,
    /// Caller-provided API key that may override a configured key
    pub api_key: Option<SecretString>,
    /// Cancellation signal for this call
    pub cancel: CancellationToken,
}

impl RequestContext {
    /// Create a minimal context for embedded (non-HTTP) use
    pub fn empty() -> Self {
        let (parts, ()) = http::Request::builder()
            .method(http::Method::GET)
            .uri("/")
            .body(())
            .expect("valid minimal request")
            .into_parts();

        Self {
            parts,
            api_key: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Access request headers
    pub fn headers(&self) -> &http::HeaderMap {
        &self.parts.headers
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::empty()
    }
}
