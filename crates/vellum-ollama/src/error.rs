//! Error types for remote classification and embedding calls.

use std::time::Duration;
use thiserror::Error;

fn describe_retry_after(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(" (retry after {} ms)", d.as_millis()))
        .unwrap_or_default()
}

/// Errors that can occur when calling the remote service.
#[derive(Error, Debug)]
pub enum OllamaError {
    /// The server rejected the credential. Never retried.
    #[error("Authentication failed (status {status}): {message}. Check [ollama] api_key or the VELLUM_API_KEY environment variable.")]
    Authentication { status: u16, message: String },

    /// Connection error - unable to reach the server.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server is not listening at all.
    #[error("Ollama server is not running at {host}. Start it with 'ollama serve'.")]
    ServerNotRunning { host: String },

    /// Request timeout. Treated like a connection failure.
    #[error("Request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// The server asked us to slow down.
    #[error("Rate limited{}", describe_retry_after(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// 5xx response.
    #[error("Server error (status {status}): {message}")]
    Server { status: u16, message: String },

    /// The requested model is not available.
    #[error("Model not found: {model}. Run 'ollama pull {model}' to download it.")]
    ModelNotFound { model: String },

    /// Any other non-success response.
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Embedding dimension mismatch.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The embedding response did not carry one vector per input.
    #[error("Embedding count mismatch: sent {expected} texts, got {actual} vectors")]
    CountMismatch { expected: usize, actual: usize },

    /// A retryable error persisted through every allowed attempt.
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<OllamaError>,
    },

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OllamaError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            OllamaError::Connection(_)
            | OllamaError::ServerNotRunning { .. }
            | OllamaError::Timeout { .. }
            | OllamaError::RateLimited { .. }
            | OllamaError::Server { .. } => true,
            OllamaError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// The error behind any retry wrapper.
    pub fn root(&self) -> &OllamaError {
        match self {
            OllamaError::RetriesExhausted { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self.root(), OllamaError::Authentication { .. })
    }

    /// Server-provided delay before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            OllamaError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Result type for remote operations.
pub type OllamaResult<T> = Result<T, OllamaError>;
