use crate::agents::collector::{LiveSink, StreamCollector};
use crate::llm::ChatBackend;
use crate::types::{BackendError, ReviewOutput, ReviewTask};
use std::sync::Arc;
use tracing::debug;

/// Stateless role runner: sends one prepared task to the chat backend and
/// drains the resulting stream through a collector. The role, prompts and
/// severity taxonomy all live in the task; the agent adds nothing of its
/// own.
pub struct ReviewAgent {
    backend: Arc<dyn ChatBackend>,
}

impl ReviewAgent {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    /// Run one task to completion, forwarding incremental output to the
    /// sink. A backend or stream failure surfaces as-is; no empty review
    /// is ever synthesized from an error.
    pub async fn run(
        &self,
        task: &ReviewTask,
        sink: &dyn LiveSink,
    ) -> Result<ReviewOutput, BackendError> {
        debug!(role = %task.role, "Dispatching review task");
        let stream = self.backend.stream_chat(task).await?;
        StreamCollector::new(task.role).drain(stream, sink).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::collector::NullSink;
    use crate::llm::prompts::ReviewPrompts;
    use crate::llm::ChunkStream;
    use crate::types::StreamChunk;
    use async_trait::async_trait;
    use futures::{stream, StreamExt};

    struct SingleChunkBackend;

    #[async_trait]
    impl ChatBackend for SingleChunkBackend {
        async fn stream_chat(&self, task: &ReviewTask) -> Result<ChunkStream, BackendError> {
            let text = format!("reviewed by {}", task.role);
            Ok(stream::iter(vec![Ok(StreamChunk::TextDelta(text))]).boxed())
        }

        async fn health_check(&self) -> Result<bool, BackendError> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn agent_returns_the_collected_output_for_its_role() {
        let agent = ReviewAgent::new(Arc::new(SingleChunkBackend));
        let task = ReviewPrompts::syntax("+let x = 1;");

        let output = agent.run(&task, &NullSink).await.unwrap();

        assert_eq!(output.role, task.role);
        assert_eq!(output.full_text, "reviewed by SyntaxReviewer");
    }
}
