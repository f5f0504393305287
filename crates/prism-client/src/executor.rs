use std::time::Duration;

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use http::header::HeaderValue;
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;
use crate::request::{ProxyRequest, ProxyResponse, RetryPolicy};
use crate::sse::{FrameStream, SseFrame};

/// Executes generic outbound requests against upstream providers
///
/// Buffered execution retries per the request's [`RetryPolicy`]; streaming
/// execution makes a single attempt and keeps the body open for
/// incremental SSE consumption. Every blocking wait observes the call's
/// cancellation token.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: reqwest::Client,
}

impl HttpExecutor {
    /// Executor without a whole-call timeout (streaming-friendly)
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Transport` if the TLS backend cannot be
    /// initialized.
    pub fn new() -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    /// Executor with a whole-call timeout, for buffered-only use
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Transport` if the client cannot be built.
    pub fn with_timeout(timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    /// Execute a buffered request, retrying per policy
    ///
    /// # Errors
    ///
    /// - `ClientError::Status` once a non-retryable status is seen or
    ///   retries are exhausted
    /// - `ClientError::Transport` for connection failures past the policy
    /// - `ClientError::Cancelled` as soon as the token fires, including
    ///   during a backoff wait
    pub async fn execute(
        &self,
        request: ProxyRequest,
        cancel: &CancellationToken,
    ) -> Result<ProxyResponse, ClientError> {
        let headers = request.effective_headers()?;
        let retry = request.retry.clone().unwrap_or_else(RetryPolicy::none);
        let mut attempt: u32 = 0;

        loop {
            let send = self
                .client
                .request(request.method.clone(), request.url.clone())
                .headers(headers.clone())
                .body(request.body.clone())
                .send();

            let outcome = tokio::select! {
                () = cancel.cancelled() => return Err(ClientError::Cancelled),
                result = send => result,
            };

            let failure = match outcome {
                Ok(response) => {
                    let status = response.status();
                    if status.as_u16() < 400 {
                        let headers = response.headers().clone();
                        let body = response
                            .bytes()
                            .await
                            .map_err(|e| ClientError::Transport(e.to_string()))?;
                        return Ok(ProxyResponse {
                            status,
                            headers,
                            body: body.to_vec(),
                        });
                    }

                    let body = response.text().await.unwrap_or_default();
                    ClientError::Status {
                        method: request.method.clone(),
                        url: request.url.to_string(),
                        status: status.as_u16(),
                        body,
                    }
                }
                Err(e) => ClientError::Transport(e.to_string()),
            };

            attempt += 1;
            if attempt > retry.max_retries || !failure.is_retryable() {
                return Err(failure);
            }

            let delay = retry.delay_for(attempt);
            tracing::debug!(
                url = %request.url,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %failure,
                "retrying upstream request"
            );

            tokio::select! {
                () = cancel.cancelled() => return Err(ClientError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Execute a streaming request, returning a frame stream
    ///
    /// The request gains `accept: text/event-stream`, `cache-control:
    /// no-cache` and `connection: keep-alive`. A non-success status is
    /// surfaced as `ClientError::Status` with the error body fully
    /// drained first; retries never apply in streaming mode.
    ///
    /// # Errors
    ///
    /// `ClientError::Transport` if the connection attempt fails,
    /// `ClientError::Status` for a 4xx/5xx status,
    /// `ClientError::Cancelled` if the token fires first.
    pub async fn execute_stream(
        &self,
        request: ProxyRequest,
        cancel: &CancellationToken,
    ) -> Result<FrameStream, ClientError> {
        let mut headers = request.effective_headers()?;
        headers.insert(http::header::ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(http::header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(http::header::CONNECTION, HeaderValue::from_static("keep-alive"));

        let send = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(headers)
            .body(request.body.clone())
            .send();

        let outcome = tokio::select! {
            () = cancel.cancelled() => return Err(ClientError::Cancelled),
            result = send => result,
        };
        let response = outcome.map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                method: request.method,
                url: request.url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let events = Box::pin(response.bytes_stream().eventsource());
        let token = cancel.clone();

        let frames = futures_util::stream::unfold(
            (events, token, false),
            |(mut events, token, done)| async move {
                if done {
                    return None;
                }

                let item = tokio::select! {
                    () = token.cancelled() => Some(Err(ClientError::Cancelled)),
                    next = events.next() => match next {
                        Some(Ok(event)) => Some(Ok(SseFrame::from_wire(event.event, event.data))),
                        Some(Err(e)) => Some(Err(ClientError::Stream(e.to_string()))),
                        None => None,
                    },
                };

                let finished = !matches!(item, Some(Ok(_)));
                item.map(|frame| (frame, (events, token, finished)))
            },
        );

        Ok(Box::pin(frames))
    }
}
