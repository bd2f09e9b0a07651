//! Error types for the ingestion pipeline.

use std::path::PathBuf;
use thiserror::Error;
use vellum_ollama::OllamaError;
use vellum_store::StoreError;

/// Result type for ingestion operations.
pub type IngestResult<T> = Result<T, IngestError>;

/// Errors that can occur while ingesting one document.
///
/// Every variant except [`IngestError::Authentication`] is isolated to the
/// document it happened on.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Unreadable or corrupt source file. Never retried.
    #[error("Extraction failed for {path}: {message}")]
    Extraction { path: PathBuf, message: String },

    /// The remote service rejected the credential.
    #[error("{0}")]
    Authentication(String),

    /// Network failure or timeout that outlived the retry policy.
    #[error("Connection failure: {0}")]
    Connection(String),

    /// Throttling that outlived the retry policy.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Server-side failure that outlived the retry policy.
    #[error("Remote server error: {0}")]
    Server(String),

    /// Any other rejected or unparseable remote response.
    #[error("Remote call failed: {0}")]
    Remote(String),

    /// Stored rows would not match what was submitted.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Another session holds the document's advisory lock.
    #[error("Document {0} is locked by another process")]
    LockContention(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Extraction produced no text to classify.
    #[error("No text extracted from {0}")]
    EmptyDocument(PathBuf),
}

impl IngestError {
    /// Stable name for the `error_kind` log field.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Extraction { .. } => "extraction",
            IngestError::Authentication(_) => "authentication",
            IngestError::Connection(_) => "connection",
            IngestError::RateLimited(_) => "rate_limited",
            IngestError::Server(_) => "server",
            IngestError::Remote(_) => "remote",
            IngestError::Validation(_) => "validation",
            IngestError::LockContention(_) => "lock_contention",
            IngestError::Store(_) => "store",
            IngestError::Config(_) => "config",
            IngestError::EmptyDocument(_) => "empty_document",
        }
    }

    /// Whether this failure points at a systemic problem that should page someone.
    pub fn is_fatal_alert(&self) -> bool {
        matches!(self, IngestError::Authentication(_))
    }

    /// Whether the same file may succeed on a later pass without changes.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            IngestError::Connection(_)
                | IngestError::RateLimited(_)
                | IngestError::Server(_)
                | IngestError::LockContention(_)
                | IngestError::Store(StoreError::Database(_))
        )
    }

    pub(crate) fn extraction(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        IngestError::Extraction {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl From<OllamaError> for IngestError {
    fn from(err: OllamaError) -> Self {
        let message = err.to_string();
        match err.root() {
            OllamaError::Authentication { .. } => IngestError::Authentication(message),
            OllamaError::Connection(_)
            | OllamaError::ServerNotRunning { .. }
            | OllamaError::Timeout { .. } => IngestError::Connection(message),
            OllamaError::Http(e) if e.is_timeout() || e.is_connect() => {
                IngestError::Connection(message)
            }
            OllamaError::RateLimited { .. } => IngestError::RateLimited(message),
            OllamaError::Server { .. } => IngestError::Server(message),
            OllamaError::DimensionMismatch { .. } | OllamaError::CountMismatch { .. } => {
                IngestError::Validation(message)
            }
            OllamaError::ModelNotFound { .. } | OllamaError::InvalidConfig(_) => {
                IngestError::Config(message)
            }
            _ => IngestError::Remote(message),
        }
    }
}
