use crate::types::{BackendError, ReviewTask, StreamChunk};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Incremental output of one streaming chat request.
pub type ChunkStream = BoxStream<'static, Result<StreamChunk, BackendError>>;

/// Streaming text-generation backend.
///
/// A backend is a pure request/response wrapper: it forwards the task's
/// prompts and exposes the incremental token stream, performing no local
/// reasoning of its own.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Open a streaming completion for the task.
    ///
    /// Chunk order reflects backend emission order. A backend failure
    /// mid-stream surfaces as an `Err` item that ends the stream early;
    /// callers must treat it as a stage failure, never as an empty
    /// response.
    async fn stream_chat(&self, task: &ReviewTask) -> Result<ChunkStream, BackendError>;

    /// Probe the backend for availability.
    async fn health_check(&self) -> Result<bool, BackendError>;
}
