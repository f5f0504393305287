use uuid::Uuid;

/// Identifier for request and execution records
pub type RecordId = Uuid;

/// Lifecycle state of a record
///
/// Transitions are `Pending -> Completed` or `Pending -> Failed`, once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    /// Created, not yet finished
    Pending,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
}

/// Persisted record of one inbound gateway request
#[derive(Debug, Clone)]
pub struct RequestRecord {
    /// Record identifier
    pub id: RecordId,
    /// Requested model name as the caller sent it
    pub model: String,
    /// Raw inbound body bytes
    pub body: Vec<u8>,
    /// Lifecycle state
    pub status: RecordStatus,
    /// Final response payload, set on completion
    pub response: Option<Vec<u8>>,
    /// Error text, set on failure
    pub error: Option<String>,
}

impl RequestRecord {
    /// New pending record with a fresh id
    pub fn new(model: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            model: model.into(),
            body,
            status: RecordStatus::Pending,
            response: None,
            error: None,
        }
    }
}

/// Persisted record of one attempt to fulfill a request against one provider
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    /// Record identifier
    pub id: RecordId,
    /// Parent request record
    pub request_id: RecordId,
    /// Provider the attempt was routed to
    pub provider: String,
    /// Lifecycle state
    pub status: RecordStatus,
    /// Stream chunks observed so far, in order
    pub chunks: Vec<Vec<u8>>,
    /// Aggregated final response payload, set on completion
    pub response: Option<Vec<u8>>,
    /// Error text, set on failure
    pub error: Option<String>,
}

impl ExecutionRecord {
    /// New pending execution with a fresh id
    pub fn new(request_id: RecordId, provider: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            provider: provider.into(),
            status: RecordStatus::Pending,
            chunks: Vec::new(),
            response: None,
            error: None,
        }
    }
}
