use crate::llm::ChunkStream;
use crate::types::{BackendError, ReviewOutput, ReviewRole, StreamChunk};
use futures::StreamExt;
use std::io::Write;

/// Side channel for real-time display of streamed output. Forwarding is
/// best-effort: implementations swallow their own I/O failures, so the
/// sink can never fail a run.
pub trait LiveSink: Send + Sync {
    /// Called for every text fragment, in emission order.
    fn text_delta(&self, role: ReviewRole, delta: &str);

    /// Called when the backend reports an auxiliary tool invocation.
    fn tool_event(&self, role: ReviewRole, name: &str);
}

/// Streams fragments to stdout. Each write locks the handle, so fragments
/// from concurrent reviewers interleave but are never torn mid-fragment.
pub struct ConsoleSink;

impl LiveSink for ConsoleSink {
    fn text_delta(&self, _role: ReviewRole, delta: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(delta.as_bytes());
        let _ = out.flush();
    }

    fn tool_event(&self, role: ReviewRole, name: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "\n[{role} invoked tool: {name}]");
    }
}

/// Discards everything. Used in tests and quiet runs.
pub struct NullSink;

impl LiveSink for NullSink {
    fn text_delta(&self, _role: ReviewRole, _delta: &str) {}
    fn tool_event(&self, _role: ReviewRole, _name: &str) {}
}

/// Drains one agent's chunk stream: forwards every fragment to the live
/// sink as it arrives and accumulates the full text in order.
///
/// Each collector owns its own accumulator, so three instances can drain
/// three concurrent streams with no shared mutable state.
pub struct StreamCollector {
    role: ReviewRole,
}

impl StreamCollector {
    pub fn new(role: ReviewRole) -> Self {
        Self { role }
    }

    /// Consume the stream to completion. Tool events are surfaced to the
    /// sink but never enter the accumulated text. A stream failure is
    /// propagated; the partial accumulation is discarded with it.
    pub async fn drain(
        &self,
        mut stream: ChunkStream,
        sink: &dyn LiveSink,
    ) -> Result<ReviewOutput, BackendError> {
        let mut full_text = String::new();

        while let Some(chunk) = stream.next().await {
            match chunk? {
                StreamChunk::TextDelta(delta) => {
                    sink.text_delta(self.role, &delta);
                    full_text.push_str(&delta);
                }
                StreamChunk::ToolEvent(name) => {
                    sink.tool_event(self.role, &name);
                }
            }
        }

        Ok(ReviewOutput {
            role: self.role,
            full_text,
        })
    }
}
