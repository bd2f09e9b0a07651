//! Storage traits shared by the Postgres and in-memory stores.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use vellum_core::{
    Chunk, ChunkCounts, ChunkId, Coverage, Document, DocumentId, DocumentStatus, EmbeddedChunk,
};

/// How [`VectorStore::acquire_lock`] behaves when another session holds the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Wait until the holder releases it. Used by the watcher.
    Blocking,
    /// Return `None` immediately. Used by the backfill sweep.
    NonBlocking,
}

impl LockMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockMode::Blocking => "blocking",
            LockMode::NonBlocking => "non_blocking",
        }
    }
}

/// Documents and chunks in a vector-capable store.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fixed width of every stored embedding.
    fn dimensions(&self) -> usize;

    /// Insert `document` unless a row with the same content hash exists.
    /// Returns the stored row either way.
    async fn register_document(&self, document: &Document) -> StoreResult<Document>;

    async fn get_document(&self, id: DocumentId) -> StoreResult<Option<Document>>;

    async fn find_by_hash(&self, content_hash: &str) -> StoreResult<Option<Document>>;

    /// Every revision recorded for a file path, oldest first.
    async fn documents_at_path(&self, file_path: &str) -> StoreResult<Vec<Document>>;

    /// Most recently updated documents first.
    async fn list_documents(&self, limit: i64) -> StoreResult<Vec<Document>>;

    async fn set_status(
        &self,
        id: DocumentId,
        status: DocumentStatus,
        chunking_strategy: Option<&str>,
        error: Option<&str>,
    ) -> StoreResult<()>;

    /// Documents owning at least one chunk with a null embedding.
    async fn documents_missing_embeddings(&self, limit: i64) -> StoreResult<Vec<Document>>;

    async fn chunks_for_document(&self, id: DocumentId) -> StoreResult<Vec<Chunk>>;

    async fn chunk_counts(&self, id: DocumentId) -> StoreResult<ChunkCounts>;

    async fn coverage(&self) -> StoreResult<Coverage>;

    /// Take the document's session-scoped advisory lock.
    ///
    /// Returns `None` only in [`LockMode::NonBlocking`] when another session
    /// holds it.
    async fn acquire_lock(
        &self,
        id: DocumentId,
        mode: LockMode,
    ) -> StoreResult<Option<Box<dyn LockedDocument>>>;
}

/// Write access to one document, valid while its advisory lock is held.
///
/// Call [`LockedDocument::release`] on every path. Dropping the guard without
/// releasing closes the underlying session, which also frees the lock.
#[async_trait]
pub trait LockedDocument: Send {
    fn document_id(&self) -> DocumentId;

    /// Atomically replace all chunks of the document.
    ///
    /// Returns the identifiers of the inserted rows, one per submitted chunk.
    /// On any error nothing is changed.
    async fn replace_chunks(&mut self, chunks: &[EmbeddedChunk]) -> StoreResult<Vec<ChunkId>>;

    /// Delete the document and, by cascade, its chunks.
    async fn delete_document(&mut self) -> StoreResult<()>;

    /// Release the advisory lock.
    async fn release(self: Box<Self>) -> StoreResult<()>;
}

/// Reject a batch that cannot be stored as-is.
pub(crate) fn validate_batch(chunks: &[EmbeddedChunk], dimensions: usize) -> StoreResult<()> {
    if chunks.is_empty() {
        return Err(StoreError::Validation(
            "refusing to replace chunks with an empty batch".to_string(),
        ));
    }
    for chunk in chunks {
        if chunk.embedding.len() != dimensions {
            return Err(StoreError::Validation(format!(
                "chunk {} has {} dimensions, expected {}",
                chunk.chunk_index,
                chunk.embedding.len(),
                dimensions
            )));
        }
        if chunk.embedding.iter().any(|v| !v.is_finite()) {
            return Err(StoreError::Validation(format!(
                "chunk {} has a non-finite embedding value",
                chunk.chunk_index
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: i32, embedding: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk_index: index,
            content: format!("chunk {}", index),
            embedding,
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn test_validate_batch() {
        assert!(validate_batch(&[], 3).is_err());
        assert!(validate_batch(&[chunk(0, vec![0.1, 0.2, 0.3])], 3).is_ok());
        assert!(validate_batch(&[chunk(0, vec![0.1, 0.2])], 3).is_err());
        assert!(validate_batch(&[chunk(0, vec![0.1, f32::NAN, 0.3])], 3).is_err());
    }
}
