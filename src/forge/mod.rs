pub mod client;

pub use client::{DiffSource, GiteeClient};
