//! Core domain types for Vellum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for documents.
pub type DocumentId = Uuid;

/// Unique identifier for chunks.
pub type ChunkId = Uuid;

/// Generate a new unique ID.
pub fn new_id() -> Uuid {
    Uuid::new_v4()
}

/// Lifecycle status of a document.
///
/// Transitions are owned by the pipeline: `pending -> processing -> completed | error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(DocumentStatus::Pending),
            "processing" => Some(DocumentStatus::Processing),
            "completed" => Some(DocumentStatus::Completed),
            "error" => Some(DocumentStatus::Error),
            _ => None,
        }
    }

    /// Whether the pipeline has finished with this document (successfully or not).
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Error)
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A source file admitted to the knowledge base, identified by its content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// SHA-256 of the file bytes (hex). Globally unique.
    pub content_hash: String,
    pub file_name: String,
    pub file_path: String,
    pub status: DocumentStatus,
    pub chunking_strategy: Option<String>,
    pub metadata: serde_json::Value,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        content_hash: impl Into<String>,
        file_name: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            content_hash: content_hash.into(),
            file_name: file_name.into(),
            file_path: file_path.into(),
            status: DocumentStatus::Pending,
            chunking_strategy: None,
            metadata: serde_json::json!({}),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Short form of the id for display.
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }
}

/// A stored chunk of a document.
///
/// `embedding` is optional only because rows written by older tooling may lack
/// one; the pipeline itself never writes a chunk without its vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub chunk_index: i32,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
    pub metadata: serde_json::Value,
}

impl Chunk {
    pub fn is_embedded(&self) -> bool {
        self.embedding.is_some()
    }
}

/// A chunk ready to be persisted: content and vector travel together.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk_index: i32,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: serde_json::Value,
}

/// Chunk counts for a single document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkCounts {
    pub total: i64,
    pub embedded: i64,
}

impl ChunkCounts {
    /// True only when there is at least one chunk and every chunk has a vector.
    pub fn fully_embedded(&self) -> bool {
        self.total > 0 && self.total == self.embedded
    }
}

/// Embedding coverage across the whole store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    pub total_chunks: i64,
    pub embedded_chunks: i64,
}

impl Coverage {
    /// Percentage of chunks that carry an embedding (100 for an empty store).
    pub fn percent(&self) -> f64 {
        if self.total_chunks == 0 {
            return 100.0;
        }
        self.embedded_chunks as f64 * 100.0 / self.total_chunks as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            DocumentStatus::Pending,
            DocumentStatus::Processing,
            DocumentStatus::Completed,
            DocumentStatus::Error,
        ] {
            assert_eq!(DocumentStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(DocumentStatus::from_str("COMPLETED"), Some(DocumentStatus::Completed));
        assert_eq!(DocumentStatus::from_str("done"), None);
        assert!(DocumentStatus::Error.is_terminal());
        assert!(!DocumentStatus::Processing.is_terminal());
    }

    #[test]
    fn test_new_document_is_pending() {
        let doc = Document::new("abc123", "paper.pdf", "/tmp/paper.pdf");
        assert_eq!(doc.status, DocumentStatus::Pending);
        assert!(doc.chunking_strategy.is_none());
        assert_eq!(doc.short_id().len(), 8);
    }

    #[test]
    fn test_chunk_counts() {
        assert!(!ChunkCounts { total: 0, embedded: 0 }.fully_embedded());
        assert!(!ChunkCounts { total: 4, embedded: 3 }.fully_embedded());
        assert!(ChunkCounts { total: 4, embedded: 4 }.fully_embedded());
    }

    #[test]
    fn test_coverage_percent() {
        assert_eq!(Coverage::default().percent(), 100.0);
        let coverage = Coverage {
            total_chunks: 8,
            embedded_chunks: 6,
        };
        assert!((coverage.percent() - 75.0).abs() < f64::EPSILON);
    }
}
