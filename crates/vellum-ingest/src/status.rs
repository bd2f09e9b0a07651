//! Job status lookups.

use crate::error::IngestResult;
use serde::Serialize;
use vellum_core::{ChunkCounts, Document, DocumentId, DocumentStatus};
use vellum_store::VectorStore;

/// Derived state shown to users. Never `Completed` unless every stored chunk
/// carries an embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Completed,
    Incomplete,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Completed => "completed",
            JobState::Incomplete => "incomplete",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub document: Document,
    pub counts: ChunkCounts,
    pub state: JobState,
}

impl StatusReport {
    pub fn new(document: Document, counts: ChunkCounts) -> Self {
        let state = if document.status == DocumentStatus::Completed && counts.fully_embedded() {
            JobState::Completed
        } else {
            JobState::Incomplete
        };
        Self {
            document,
            counts,
            state,
        }
    }
}

/// Status of one document, or `None` if it does not exist.
pub async fn status_report(
    store: &dyn VectorStore,
    id: DocumentId,
) -> IngestResult<Option<StatusReport>> {
    let Some(document) = store.get_document(id).await? else {
        return Ok(None);
    };
    let counts = store.chunk_counts(id).await?;
    Ok(Some(StatusReport::new(document, counts)))
}

/// Status of the newest revision stored for a file path.
pub async fn status_for_path(
    store: &dyn VectorStore,
    file_path: &str,
) -> IngestResult<Option<StatusReport>> {
    match store.documents_at_path(file_path).await?.pop() {
        Some(latest) => status_report(store, latest.id).await,
        None => Ok(None),
    }
}
