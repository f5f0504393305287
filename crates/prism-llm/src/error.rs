use http::StatusCode;
use prism_client::ClientError;
use prism_core::HttpError;
use thiserror::Error;

/// Errors that can occur while handling a gateway call
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Client sent a malformed or invalid request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Request content type is not accepted by any registered wire format
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// Named wire format is not registered
    #[error("unknown wire format: {0}")]
    UnknownFormat(String),

    /// No registered provider serves the requested model
    #[error("no provider found for model: {model}")]
    NoProvider {
        /// The requested model name
        model: String,
    },

    /// Named provider does not exist in the registry
    #[error("provider not found: {provider}")]
    ProviderNotFound {
        /// The missing provider name
        provider: String,
    },

    /// Upstream provider answered with a non-success status
    #[error("upstream {method} {url} returned status {status}")]
    Upstream {
        /// Request method
        method: String,
        /// Request URL
        url: String,
        /// Upstream status code
        status: u16,
        /// Upstream error body, preserved for diagnostics
        body: String,
    },

    /// Upstream answered with a success status but an undecodable body
    #[error("upstream response decode failed: {0}")]
    UpstreamDecode(String),

    /// Connection-level failure reaching the upstream
    #[error("transport error: {0}")]
    Transport(String),

    /// Failure while a response stream was open
    #[error("streaming error: {0}")]
    Streaming(String),

    /// The call was cancelled before completing
    #[error("request cancelled")]
    Cancelled,

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// Whether retrying the same call could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream { status, .. } => prism_client::RetryPolicy::is_retryable_status(*status),
            Self::Transport(_) => true,
            _ => false,
        }
    }
}

impl From<ClientError> for GatewayError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::Status {
                method,
                url,
                status,
                body,
            } => Self::Upstream {
                method: method.to_string(),
                url,
                status,
                body,
            },
            ClientError::Transport(message) => Self::Transport(message),
            ClientError::Stream(message) => Self::Streaming(message),
            ClientError::InvalidHeader(header) => {
                Self::Internal(anyhow::anyhow!("provider auth configuration invalid: {header}"))
            }
            ClientError::Cancelled => Self::Cancelled,
        }
    }
}

impl HttpError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::UnknownFormat(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::NoProvider { .. } | Self::ProviderNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Upstream { .. } | Self::UpstreamDecode(_) | Self::Transport(_) => StatusCode::BAD_GATEWAY,
            Self::Streaming(_) | Self::Cancelled | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::InvalidRequest(_) | Self::UnknownFormat(_) | Self::UnsupportedContentType(_) => {
                "invalid_request_error"
            }
            Self::NoProvider { .. } | Self::ProviderNotFound { .. } => "not_found_error",
            Self::Upstream { .. } | Self::UpstreamDecode(_) | Self::Transport(_) => "upstream_error",
            Self::Streaming(_) => "streaming_error",
            Self::Cancelled => "cancelled_error",
            Self::Internal(_) => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            // Internal details may reference configuration; keep them out of responses
            Self::Internal(_) => "an internal error occurred".to_owned(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_status_error_maps_to_structured_upstream() {
        let error = GatewayError::from(ClientError::Status {
            method: http::Method::POST,
            url: "https://api.acme.test/v1/chat/completions".to_owned(),
            status: 503,
            body: "overloaded".to_owned(),
        });

        match error {
            GatewayError::Upstream {
                method,
                url,
                status,
                body,
            } => {
                assert_eq!(method, "POST");
                assert_eq!(url, "https://api.acme.test/v1/chat/completions");
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
    }

    #[test]
    fn retryability_follows_the_fixed_status_set() {
        let retryable = GatewayError::Upstream {
            method: "POST".to_owned(),
            url: String::new(),
            status: 429,
            body: String::new(),
        };
        let terminal = GatewayError::Upstream {
            method: "POST".to_owned(),
            url: String::new(),
            status: 400,
            body: String::new(),
        };

        assert!(retryable.is_retryable());
        assert!(!terminal.is_retryable());
        assert!(!GatewayError::InvalidRequest("x".to_owned()).is_retryable());
    }

    #[test]
    fn internal_errors_do_not_leak_details() {
        let error = GatewayError::Internal(anyhow::anyhow!("api key sk-secret rejected"));
        assert_eq!(error.client_message(), "an internal error occurred");
    }
}
