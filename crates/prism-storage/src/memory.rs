use async_trait::async_trait;
use dashmap::DashMap;

use crate::record::{ExecutionRecord, RecordId, RecordStatus, RequestRecord};
use crate::store::{RecordStore, StoreError};

/// In-memory record store
///
/// The default store for embedded deployments and tests. Terminal status
/// transitions only apply to pending records, so a second finalization of
/// the same record is a harmless no-op.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    requests: DashMap<RecordId, RequestRecord>,
    executions: DashMap<RecordId, ExecutionRecord>,
}

impl MemoryRecordStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a request record, for inspection in tests
    pub fn request(&self, id: RecordId) -> Option<RequestRecord> {
        self.requests.get(&id).map(|r| r.clone())
    }

    /// Snapshot of an execution record, for inspection in tests
    pub fn execution(&self, id: RecordId) -> Option<ExecutionRecord> {
        self.executions.get(&id).map(|r| r.clone())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create_request(&self, record: RequestRecord) -> Result<(), StoreError> {
        self.requests.insert(record.id, record);
        Ok(())
    }

    async fn create_execution(&self, record: ExecutionRecord) -> Result<(), StoreError> {
        self.executions.insert(record.id, record);
        Ok(())
    }

    async fn append_execution_chunk(&self, id: RecordId, chunk: Vec<u8>) -> Result<(), StoreError> {
        let mut record = self.executions.get_mut(&id).ok_or(StoreError::NotFound { id })?;
        if record.status == RecordStatus::Pending {
            record.chunks.push(chunk);
        }
        Ok(())
    }

    async fn complete_execution(&self, id: RecordId, response: Vec<u8>) -> Result<(), StoreError> {
        let mut record = self.executions.get_mut(&id).ok_or(StoreError::NotFound { id })?;
        if record.status == RecordStatus::Pending {
            record.status = RecordStatus::Completed;
            record.response = Some(response);
        }
        Ok(())
    }

    async fn fail_execution(&self, id: RecordId, error: String) -> Result<(), StoreError> {
        let mut record = self.executions.get_mut(&id).ok_or(StoreError::NotFound { id })?;
        if record.status == RecordStatus::Pending {
            record.status = RecordStatus::Failed;
            record.error = Some(error);
        }
        Ok(())
    }

    async fn complete_request(&self, id: RecordId, response: Vec<u8>) -> Result<(), StoreError> {
        let mut record = self.requests.get_mut(&id).ok_or(StoreError::NotFound { id })?;
        if record.status == RecordStatus::Pending {
            record.status = RecordStatus::Completed;
            record.response = Some(response);
        }
        Ok(())
    }

    async fn fail_request(&self, id: RecordId, error: String) -> Result<(), StoreError> {
        let mut record = self.requests.get_mut(&id).ok_or(StoreError::NotFound { id })?;
        if record.status == RecordStatus::Pending {
            record.status = RecordStatus::Failed;
            record.error = Some(error);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_preserve_order() {
        let store = MemoryRecordStore::new();
        let request = RequestRecord::new("gpt-4", Vec::new());
        let execution = ExecutionRecord::new(request.id, "acme");
        let execution_id = execution.id;

        store.create_request(request).await.unwrap();
        store.create_execution(execution).await.unwrap();

        for index in 0..3u8 {
            store
                .append_execution_chunk(execution_id, vec![index])
                .await
                .unwrap();
        }

        let stored = store.execution(execution_id).unwrap();
        assert_eq!(stored.chunks, vec![vec![0], vec![1], vec![2]]);
    }

    #[tokio::test]
    async fn first_terminal_status_wins() {
        let store = MemoryRecordStore::new();
        let request = RequestRecord::new("gpt-4", Vec::new());
        let request_id = request.id;
        store.create_request(request).await.unwrap();

        store.fail_request(request_id, "boom".to_owned()).await.unwrap();
        store.complete_request(request_id, b"late".to_vec()).await.unwrap();

        let stored = store.request(request_id).unwrap();
        assert_eq!(stored.status, RecordStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("boom"));
        assert!(stored.response.is_none());
    }

    #[tokio::test]
    async fn appends_after_terminal_status_are_dropped() {
        let store = MemoryRecordStore::new();
        let execution = ExecutionRecord::new(RecordId::new_v4(), "acme");
        let execution_id = execution.id;
        store.create_execution(execution).await.unwrap();

        store.complete_execution(execution_id, Vec::new()).await.unwrap();
        store
            .append_execution_chunk(execution_id, b"tail".to_vec())
            .await
            .unwrap();

        assert!(store.execution(execution_id).unwrap().chunks.is_empty());
    }

    #[tokio::test]
    async fn missing_record_is_an_error() {
        let store = MemoryRecordStore::new();
        let id = RecordId::new_v4();
        assert!(matches!(
            store.append_execution_chunk(id, Vec::new()).await,
            Err(StoreError::NotFound { .. })
        ));
    }
}
