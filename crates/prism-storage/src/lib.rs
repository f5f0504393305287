//! Execution bookkeeping for gateway calls
//!
//! The core only needs a narrow contract: create a request/execution
//! record, append opaque chunk payloads while a stream is live, and set a
//! terminal status exactly once. The store is an observer; callers treat
//! every operation as best-effort and never fail a call on a store error.

mod memory;
mod record;
mod store;

pub use memory::MemoryRecordStore;
pub use record::{ExecutionRecord, RecordId, RecordStatus, RequestRecord};
pub use store::{RecordStore, StoreError};
