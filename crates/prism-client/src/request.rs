use std::time::Duration;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::ClientError;

/// Status codes the buffered retry loop will try again on
///
/// Fixed and un-configurable: callers depend on identical retry counts for
/// identical upstream failures.
pub const RETRYABLE_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

/// How the executor authenticates against the upstream
#[derive(Debug, Clone)]
pub enum AuthScheme {
    /// `authorization: Bearer <token>`
    Bearer {
        /// The bearer token
        token: SecretString,
    },
    /// API key carried in a provider-chosen header (e.g. `x-api-key`)
    ApiKey {
        /// Header name to carry the key
        header: String,
        /// The key value
        key: SecretString,
    },
    /// Arbitrary header set for upstreams with bespoke auth
    Custom {
        /// Header name/value pairs, applied in order
        headers: Vec<(String, SecretString)>,
    },
}

/// Retry policy for buffered upstream calls
///
/// The delay before retry *n* is `initial_delay * backoff_factor^(n-1)`,
/// capped at `max_delay`. The sequence is non-decreasing for any
/// `backoff_factor >= 1`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Multiplicative backoff factor
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_factor: 1.0,
        }
    }

    /// Whether a status code is in the fixed retryable set
    pub fn is_retryable_status(status: u16) -> bool {
        RETRYABLE_STATUS.contains(&status)
    }

    /// Delay before retry `attempt` (1-based)
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let millis = self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(exponent as i32);
        Duration::from_millis(millis as u64).min(self.max_delay)
    }
}

/// Generic outbound HTTP request
///
/// Constructed per call by an outbound transformer and consumed exactly
/// once by the [`HttpExecutor`](crate::HttpExecutor).
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    /// Request method
    pub method: http::Method,
    /// Fully resolved upstream URL
    pub url: Url,
    /// Base headers (content type, accept, user agent, provider extras)
    pub headers: HeaderMap,
    /// Raw body bytes
    pub body: Vec<u8>,
    /// Authentication to inject, if any
    pub auth: Option<AuthScheme>,
    /// Retry policy for buffered execution; `None` means a single attempt
    pub retry: Option<RetryPolicy>,
}

impl ProxyRequest {
    /// Start a POST request to `url`
    pub fn post(url: Url) -> Self {
        Self {
            method: http::Method::POST,
            url,
            headers: HeaderMap::new(),
            body: Vec::new(),
            auth: None,
            retry: None,
        }
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the body bytes
    #[must_use]
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Set the authentication scheme
    #[must_use]
    pub fn auth(mut self, auth: AuthScheme) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Set the retry policy
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Base headers with the auth scheme applied
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidHeader` when a configured header name
    /// or credential cannot be encoded as an HTTP header. This is a
    /// configuration error surfaced at encode time, before any network
    /// call is attempted.
    pub fn effective_headers(&self) -> Result<HeaderMap, ClientError> {
        let mut headers = self.headers.clone();

        match &self.auth {
            None => {}
            Some(AuthScheme::Bearer { token }) => {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                    .map_err(|_| ClientError::InvalidHeader("bearer token".to_owned()))?;
                value.set_sensitive(true);
                headers.insert(http::header::AUTHORIZATION, value);
            }
            Some(AuthScheme::ApiKey { header, key }) => {
                let name = HeaderName::from_bytes(header.as_bytes())
                    .map_err(|_| ClientError::InvalidHeader(header.clone()))?;
                let mut value = HeaderValue::from_str(key.expose_secret())
                    .map_err(|_| ClientError::InvalidHeader(header.clone()))?;
                value.set_sensitive(true);
                headers.insert(name, value);
            }
            Some(AuthScheme::Custom { headers: pairs }) => {
                for (name, value) in pairs {
                    let header_name = HeaderName::from_bytes(name.as_bytes())
                        .map_err(|_| ClientError::InvalidHeader(name.clone()))?;
                    let mut header_value = HeaderValue::from_str(value.expose_secret())
                        .map_err(|_| ClientError::InvalidHeader(name.clone()))?;
                    header_value.set_sensitive(true);
                    headers.insert(header_name, header_value);
                }
            }
        }

        Ok(headers)
    }
}

/// Generic buffered upstream response
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    /// Response status
    pub status: http::StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Fully read body bytes
    pub body: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_sequence_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
        };

        let delays: Vec<u64> = (1..=5).map(|n| policy.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10]);
    }

    #[test]
    fn delay_sequence_is_non_decreasing() {
        let policy = RetryPolicy::default();
        let mut previous = Duration::ZERO;
        for attempt in 1..=10 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= previous, "delay shrank at attempt {attempt}");
            assert!(delay <= policy.max_delay);
            previous = delay;
        }
    }

    #[test]
    fn retryable_status_set_is_fixed() {
        for status in [429, 500, 502, 503, 504] {
            assert!(RetryPolicy::is_retryable_status(status));
        }
        for status in [400, 401, 403, 404, 422, 501] {
            assert!(!RetryPolicy::is_retryable_status(status));
        }
    }

    #[test]
    fn bearer_auth_sets_authorization_header() {
        let request = ProxyRequest::post(Url::parse("https://api.example.com/v1/chat").unwrap())
            .auth(AuthScheme::Bearer {
                token: "sk-test".into(),
            });

        let headers = request.effective_headers().unwrap();
        let value = headers.get(http::header::AUTHORIZATION).unwrap();
        assert_eq!(value.to_str().unwrap(), "Bearer sk-test");
        assert!(value.is_sensitive());
    }

    #[test]
    fn api_key_auth_uses_configured_header() {
        let request = ProxyRequest::post(Url::parse("https://api.example.com/v1/chat").unwrap())
            .auth(AuthScheme::ApiKey {
                header: "x-api-key".to_owned(),
                key: "key-123".into(),
            });

        let headers = request.effective_headers().unwrap();
        assert_eq!(headers.get("x-api-key").unwrap().to_str().unwrap(), "key-123");
    }

    #[test]
    fn invalid_header_name_is_rejected_before_send() {
        let request = ProxyRequest::post(Url::parse("https://api.example.com/v1/chat").unwrap())
            .auth(AuthScheme::ApiKey {
                header: "bad header\n".to_owned(),
                key: "key".into(),
            });

        assert!(matches!(
            request.effective_headers(),
            Err(ClientError::InvalidHeader(_))
        ));
    }
}
