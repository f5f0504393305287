use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use http::header::AUTHORIZATION;
use http::HeaderMap;
use prism_core::RequestContext;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

/// Middleware that constructs a [`RequestContext`] from the incoming request
///
/// Captures the HTTP parts, lifts the caller's credential out of the
/// `authorization` or `x-api-key` header, and attaches a fresh
/// cancellation token for the call.
pub async fn request_context_middleware(request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();

    let context = RequestContext {
        api_key: extract_api_key(&parts.headers),
        parts: parts.clone(),
        cancel: CancellationToken::new(),
    };

    let mut request = Request::from_parts(parts, body);
    request.extensions_mut().insert(context);

    next.run(request).await
}

fn extract_api_key(headers: &HeaderMap) -> Option<SecretString> {
    if let Some(value) = headers.get(AUTHORIZATION)
        && let Ok(text) = value.to_str()
        && let Some(token) = text.strip_prefix("Bearer ")
    {
        return Some(SecretString::from(token.to_owned()));
    }

    headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .map(|key| SecretString::from(key.to_owned()))
}
