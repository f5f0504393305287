use async_trait::async_trait;
use thiserror::Error;

use crate::record::{ExecutionRecord, RecordId, RequestRecord};

/// Errors from record store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced record does not exist
    #[error("record not found: {id}")]
    NotFound {
        /// The missing record id
        id: RecordId,
    },
}

/// Narrow persistence contract consumed by the gateway core
///
/// `append_execution_chunk` and the terminal-status operations must be
/// idempotent-safe: appending after a terminal status is a no-op, and the
/// first terminal status wins.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new request record
    async fn create_request(&self, record: RequestRecord) -> Result<(), StoreError>;

    /// Persist a new execution record
    async fn create_execution(&self, record: ExecutionRecord) -> Result<(), StoreError>;

    /// Append one observed stream chunk to an execution
    async fn append_execution_chunk(&self, id: RecordId, chunk: Vec<u8>) -> Result<(), StoreError>;

    /// Mark an execution completed with its aggregated response
    async fn complete_execution(&self, id: RecordId, response: Vec<u8>) -> Result<(), StoreError>;

    /// Mark an execution failed with an error description
    async fn fail_execution(&self, id: RecordId, error: String) -> Result<(), StoreError>;

    /// Mark a request completed with its final response
    async fn complete_request(&self, id: RecordId, response: Vec<u8>) -> Result<(), StoreError>;

    /// Mark a request failed with an error description
    async fn fail_request(&self, id: RecordId, error: String) -> Result<(), StoreError>;
}
