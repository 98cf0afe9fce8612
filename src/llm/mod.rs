pub mod interfaces;
pub mod prompts;
pub mod providers;

pub use interfaces::{ChatBackend, ChunkStream};
pub use prompts::ReviewPrompts;
pub use providers::OpenAiChatClient;
