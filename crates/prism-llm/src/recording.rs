//! Persistence-tracking stream decorator
//!
//! [`RecordedStream`] wraps a canonical chunk stream without changing its
//! semantics: items pass through untouched while each chunk is copied into
//! an accumulator and appended to the execution record. Persistence is
//! observational: append and finalization failures are logged, never
//! surfaced to the stream's consumer.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use prism_storage::{RecordId, RecordStore};

use crate::error::GatewayError;
use crate::types::{
    AssistantMessage, ChatChoice, ChatResponse, ChunkStream, FinishReason, ResponseKind, TokenUsage, ToolInvocation,
};

/// Transparent stream wrapper that records chunks and finalizes
/// execution bookkeeping exactly once
pub struct RecordedStream {
    inner: ChunkStream,
    store: Arc<dyn RecordStore>,
    request_id: RecordId,
    execution_id: RecordId,
    chunks: Vec<ChatResponse>,
    failure: Option<String>,
    finalized: bool,
}

impl RecordedStream {
    /// Wrap a stream, tracking against the given records
    pub fn new(
        inner: ChunkStream,
        store: Arc<dyn RecordStore>,
        request_id: RecordId,
        execution_id: RecordId,
    ) -> Self {
        Self {
            inner,
            store,
            request_id,
            execution_id,
            chunks: Vec::new(),
            failure: None,
            finalized: false,
        }
    }

    /// Copy a chunk into the accumulator and issue a best-effort append
    fn observe(&mut self, chunk: &ChatResponse) {
        self.chunks.push(chunk.clone());

        let Ok(payload) = serde_json::to_vec(chunk) else {
            tracing::warn!(execution_id = %self.execution_id, "failed to serialize stream chunk");
            return;
        };

        let store = Arc::clone(&self.store);
        let execution_id = self.execution_id;
        tokio::spawn(async move {
            if let Err(e) = store.append_execution_chunk(execution_id, payload).await {
                tracing::warn!(execution_id = %execution_id, error = %e, "failed to append stream chunk");
            }
        });
    }

    /// Run terminal bookkeeping; a second call is a no-op
    ///
    /// Failure marks execution and request failed with the error text;
    /// success aggregates the recorded chunks into one logical response
    /// and marks both completed.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;

        let store = Arc::clone(&self.store);
        let request_id = self.request_id;
        let execution_id = self.execution_id;

        match self.failure.take() {
            Some(error) => {
                tokio::spawn(async move {
                    if let Err(e) = store.fail_execution(execution_id, error.clone()).await {
                        tracing::warn!(execution_id = %execution_id, error = %e, "failed to mark execution failed");
                    }
                    if let Err(e) = store.fail_request(request_id, error).await {
                        tracing::warn!(request_id = %request_id, error = %e, "failed to mark request failed");
                    }
                });
            }
            None => {
                let aggregate = aggregate_chunks(&self.chunks);
                let payload = serde_json::to_vec(&aggregate).unwrap_or_default();
                tokio::spawn(async move {
                    if let Err(e) = store.complete_execution(execution_id, payload.clone()).await {
                        tracing::warn!(execution_id = %execution_id, error = %e, "failed to mark execution completed");
                    }
                    if let Err(e) = store.complete_request(request_id, payload).await {
                        tracing::warn!(request_id = %request_id, error = %e, "failed to mark request completed");
                    }
                });
            }
        }
    }
}

impl Stream for RecordedStream {
    type Item = Result<ChatResponse, GatewayError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        match this.inner.as_mut().poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(chunk))) => {
                this.observe(&chunk);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(error))) => {
                this.failure = Some(error.to_string());
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(None) => {
                this.finalize();
                Poll::Ready(None)
            }
        }
    }
}

impl Drop for RecordedStream {
    fn drop(&mut self) {
        // Covers consumers that abandon the stream mid-flight
        self.finalize();
    }
}

/// Fold recorded chunks into one logical completion response
///
/// Delta text concatenates per choice index; tool-call fragments assemble
/// by tool index; the last finish reason and usage win. Identity fields
/// come from the first chunk that carries them.
pub fn aggregate_chunks(chunks: &[ChatResponse]) -> ChatResponse {
    let mut id = String::new();
    let mut model = String::new();
    let mut created = 0;
    let mut usage: Option<TokenUsage> = None;

    #[derive(Default)]
    struct ChoiceAccumulator {
        text: String,
        has_text: bool,
        tools: BTreeMap<u32, ToolInvocation>,
        finish_reason: Option<FinishReason>,
    }

    let mut accumulators: BTreeMap<u32, ChoiceAccumulator> = BTreeMap::new();

    for chunk in chunks {
        if id.is_empty() && !chunk.id.is_empty() {
            id.clone_from(&chunk.id);
            created = chunk.created;
        }
        if model.is_empty() && !chunk.model.is_empty() {
            model.clone_from(&chunk.model);
        }
        if let Some(chunk_usage) = chunk.usage {
            usage = Some(chunk_usage);
        }

        for choice in &chunk.choices {
            let accumulator = accumulators.entry(choice.index).or_default();

            if let Some(delta) = &choice.delta {
                if let Some(content) = &delta.content {
                    accumulator.text.push_str(content);
                    accumulator.has_text = true;
                }
                if let Some(call) = &delta.tool_call {
                    let tool = accumulator.tools.entry(call.index).or_insert_with(|| ToolInvocation {
                        id: String::new(),
                        name: String::new(),
                        arguments: String::new(),
                    });
                    if let Some(call_id) = &call.id {
                        tool.id.clone_from(call_id);
                    }
                    if let Some(name) = &call.name {
                        tool.name.clone_from(name);
                    }
                    if let Some(arguments) = &call.arguments {
                        tool.arguments.push_str(arguments);
                    }
                }
            }
            if let Some(reason) = choice.finish_reason {
                accumulator.finish_reason = Some(reason);
            }
        }
    }

    let choices = accumulators
        .into_iter()
        .map(|(index, accumulator)| {
            let tool_calls: Vec<ToolInvocation> = accumulator.tools.into_values().collect();
            let message = AssistantMessage {
                content: accumulator.has_text.then_some(accumulator.text),
                tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
            };
            ChatChoice::of_message(index, message, accumulator.finish_reason)
        })
        .collect();

    ChatResponse {
        id,
        kind: ResponseKind::Completion,
        created,
        model,
        choices,
        usage,
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use prism_storage::{ExecutionRecord, MemoryRecordStore, RecordStatus, RequestRecord};

    use super::*;
    use crate::types::{DeltaToolCall, MessageDelta};

    fn text_chunk(content: &str, finish: Option<FinishReason>) -> ChatResponse {
        ChatResponse::chunk(
            "chunk-1",
            "gpt-4",
            vec![ChatChoice::of_delta(
                0,
                MessageDelta {
                    content: Some(content.to_owned()),
                    ..MessageDelta::default()
                },
                finish,
            )],
        )
    }

    async fn tracked_records(store: &Arc<MemoryRecordStore>) -> (RecordId, RecordId) {
        let request = RequestRecord::new("gpt-4", Vec::new());
        let execution = ExecutionRecord::new(request.id, "acme");
        let ids = (request.id, execution.id);
        store.create_request(request).await.unwrap();
        store.create_execution(execution).await.unwrap();
        ids
    }

    /// Drain spawned bookkeeping tasks
    async fn settle() {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn passes_chunks_through_unchanged() {
        let store = Arc::new(MemoryRecordStore::new());
        let (request_id, execution_id) = tracked_records(&store).await;

        let inner: ChunkStream = Box::pin(futures_util::stream::iter(vec![
            Ok(text_chunk("Hel", None)),
            Ok(text_chunk("lo", Some(FinishReason::Stop))),
        ]));

        let mut recorded = RecordedStream::new(inner, Arc::<MemoryRecordStore>::clone(&store), request_id, execution_id);

        let first = recorded.next().await.unwrap().unwrap();
        assert_eq!(
            first.choices[0].delta.as_ref().unwrap().content.as_deref(),
            Some("Hel")
        );
        assert!(recorded.next().await.unwrap().is_ok());
        assert!(recorded.next().await.is_none());
        drop(recorded);
        settle().await;

        let execution = store.execution(execution_id).unwrap();
        assert_eq!(execution.status, RecordStatus::Completed);
        assert_eq!(execution.chunks.len(), 2);
        assert_eq!(store.request(request_id).unwrap().status, RecordStatus::Completed);
    }

    #[tokio::test]
    async fn read_error_marks_both_records_failed_exactly_once() {
        let store = Arc::new(MemoryRecordStore::new());
        let (request_id, execution_id) = tracked_records(&store).await;

        let inner: ChunkStream = Box::pin(futures_util::stream::iter(vec![
            Ok(text_chunk("a", None)),
            Ok(text_chunk("b", None)),
            Ok(text_chunk("c", None)),
            Err(GatewayError::Streaming("connection reset".to_owned())),
        ]));

        let mut recorded = RecordedStream::new(inner, Arc::<MemoryRecordStore>::clone(&store), request_id, execution_id);
        let mut errors = 0;
        while let Some(item) = recorded.next().await {
            if item.is_err() {
                errors += 1;
            }
        }
        assert_eq!(errors, 1);

        // A second finalization must be a no-op
        recorded.finalize();
        recorded.finalize();
        drop(recorded);
        settle().await;

        let execution = store.execution(execution_id).unwrap();
        assert_eq!(execution.status, RecordStatus::Failed);
        assert_eq!(execution.chunks.len(), 3);
        assert!(execution.error.as_deref().unwrap().contains("connection reset"));

        let request = store.request(request_id).unwrap();
        assert_eq!(request.status, RecordStatus::Failed);
    }

    #[tokio::test]
    async fn abandoned_stream_is_finalized_on_drop() {
        let store = Arc::new(MemoryRecordStore::new());
        let (request_id, execution_id) = tracked_records(&store).await;

        let inner: ChunkStream = Box::pin(futures_util::stream::iter(vec![Ok(text_chunk("partial", None))]));
        let mut recorded = RecordedStream::new(inner, Arc::<MemoryRecordStore>::clone(&store), request_id, execution_id);

        // Consume one chunk, then walk away
        let _ = recorded.next().await;
        drop(recorded);
        settle().await;

        assert_eq!(store.execution(execution_id).unwrap().status, RecordStatus::Completed);
    }

    #[test]
    fn aggregation_concatenates_text_and_keeps_last_finish_reason() {
        let mut final_chunk = text_chunk("!", Some(FinishReason::Stop));
        final_chunk.usage = Some(TokenUsage::of(5, 3));

        let aggregate = aggregate_chunks(&[text_chunk("Hello", None), text_chunk(" world", None), final_chunk]);

        assert_eq!(aggregate.kind, ResponseKind::Completion);
        assert_eq!(aggregate.first_text(), Some("Hello world!"));
        assert_eq!(aggregate.choices[0].finish_reason, Some(FinishReason::Stop));
        assert_eq!(aggregate.usage.unwrap().total_tokens, 8);
        assert_eq!(aggregate.id, "chunk-1");
        assert_eq!(aggregate.model, "gpt-4");
    }

    #[test]
    fn aggregation_assembles_tool_call_fragments() {
        let open = ChatResponse::chunk(
            "c",
            "m",
            vec![ChatChoice::of_delta(
                0,
                MessageDelta {
                    tool_call: Some(DeltaToolCall {
                        index: 0,
                        id: Some("toolu_1".to_owned()),
                        name: Some("get_weather".to_owned()),
                        arguments: None,
                    }),
                    ..MessageDelta::default()
                },
                None,
            )],
        );
        let fragment = |args: &str| {
            ChatResponse::chunk(
                "c",
                "m",
                vec![ChatChoice::of_delta(
                    0,
                    MessageDelta {
                        tool_call: Some(DeltaToolCall {
                            index: 0,
                            id: None,
                            name: None,
                            arguments: Some(args.to_owned()),
                        }),
                        ..MessageDelta::default()
                    },
                    None,
                )],
            )
        };

        let aggregate = aggregate_chunks(&[open, fragment(r#"{"location""#), fragment(r#":"Paris"}"#)]);

        let calls = aggregate.choices[0]
            .message
            .as_ref()
            .unwrap()
            .tool_calls
            .as_ref()
            .unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "toolu_1");
        assert_eq!(calls[0].name, "get_weather");
        assert_eq!(calls[0].arguments, r#"{"location":"Paris"}"#);
    }
}
