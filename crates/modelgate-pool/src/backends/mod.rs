//! Inference backends

mod mock;
mod ollama;

pub use mock::{MockHandle, MockLoader};
pub use ollama::{OllamaHandle, OllamaLoader};
