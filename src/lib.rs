pub mod agents;
pub mod forge;
pub mod reports;
pub mod types;
pub mod config;
pub mod llm;
