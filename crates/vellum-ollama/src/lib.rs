//! Vellum Ollama - Remote classification and embedding calls.
//!
//! The pipeline talks to the remote service through two traits,
//! [`ClassificationBackend`] and [`EmbeddingBackend`]. [`RetryPolicy`] wraps
//! either call with bounded exponential backoff; authentication failures are
//! never retried.

mod backend;
mod classify;
mod client;
mod error;
mod retry;
mod types;

pub use backend::{ClassificationBackend, EmbeddingBackend, OllamaClassifier, OllamaEmbedder};
pub use classify::{build_classification_prompt, parse_classification};
pub use client::OllamaClient;
pub use error::{OllamaError, OllamaResult};
pub use retry::RetryPolicy;
pub use types::*;
