pub mod collector;
pub mod orchestrator;
pub mod reviewer;

pub use collector::{ConsoleSink, LiveSink, NullSink, StreamCollector};
pub use orchestrator::{OrchestratorConfig, ReviewOrchestrator};
pub use reviewer::ReviewAgent;
