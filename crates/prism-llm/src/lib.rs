//! Prism gateway core
//!
//! The protocol-translation and streaming-execution pipeline: canonical
//! types, per-format transformers with their SSE state machines, the
//! provider abstraction and registry, the request orchestrator, and the
//! persistence-tracking stream decorator.

pub mod convert;
mod error;
pub mod format;
mod gateway;
#[cfg(feature = "http")]
mod handler;
pub mod protocol;
pub mod provider;
mod recording;
mod registry;
pub mod types;

pub use error::GatewayError;
pub use gateway::{Gateway, GatewayReply, InboundCall};
#[cfg(feature = "http")]
pub use handler::{chat_router, GatewayState};
pub use recording::{aggregate_chunks, RecordedStream};
pub use registry::ProviderRegistry;
