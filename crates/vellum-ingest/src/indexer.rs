//! Embeds chunks and writes them under the document's advisory lock.

use crate::error::{IngestError, IngestResult};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};
use vellum_core::{Document, DocumentId, EmbeddedChunk};
use vellum_metrics::MetricsCollector;
use vellum_ollama::{EmbeddingBackend, RetryPolicy};
use vellum_store::{LockMode, LockedDocument, VectorStore};

/// A chunk waiting for its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    pub chunk_index: i32,
    pub content: String,
    pub metadata: Value,
}

impl ChunkDraft {
    /// Number chunk texts in order, tagging each with the strategy that produced it.
    pub fn from_texts(document: &Document, texts: &[String], strategy: &str) -> Vec<ChunkDraft> {
        texts
            .iter()
            .enumerate()
            .map(|(index, content)| ChunkDraft {
                chunk_index: index as i32,
                content: content.clone(),
                metadata: json!({
                    "document_id": document.id.to_string(),
                    "document_name": document.file_name,
                    "chunk_index": index,
                    "strategy": strategy,
                }),
            })
            .collect()
    }

    /// Merge extra keys into the metadata.
    pub fn with_extra(mut self, extra: &Value) -> Self {
        if let (Some(target), Some(source)) = (self.metadata.as_object_mut(), extra.as_object()) {
            for (key, value) in source {
                target.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        self
    }
}

/// Ensure the back-reference keys are present and correct.
fn stamp_metadata(document: &Document, draft: &ChunkDraft) -> Value {
    let mut metadata = match &draft.metadata {
        Value::Object(map) => Value::Object(map.clone()),
        _ => json!({}),
    };
    metadata["document_id"] = json!(document.id.to_string());
    metadata["document_name"] = json!(document.file_name);
    metadata["chunk_index"] = json!(draft.chunk_index);
    metadata
}

/// Writes embedded chunks with exactly-once semantics per document.
pub struct Indexer {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingBackend>,
    retry: RetryPolicy,
    metrics: Arc<MetricsCollector>,
}

impl Indexer {
    /// Fails if the embedder and the store disagree on vector width.
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingBackend>,
        retry: RetryPolicy,
        metrics: Arc<MetricsCollector>,
    ) -> IngestResult<Self> {
        if store.dimensions() != embedder.dimensions() {
            return Err(IngestError::Config(format!(
                "embedding model {} produces {} dimensions but the store holds {}",
                embedder.model_name(),
                embedder.dimensions(),
                store.dimensions()
            )));
        }
        Ok(Self {
            store,
            embedder,
            retry,
            metrics,
        })
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Take the document's advisory lock.
    ///
    /// In [`LockMode::NonBlocking`] a held lock yields
    /// [`IngestError::LockContention`].
    pub async fn lock(
        &self,
        document_id: DocumentId,
        mode: LockMode,
    ) -> IngestResult<Box<dyn LockedDocument>> {
        self.store
            .acquire_lock(document_id, mode)
            .await?
            .ok_or_else(|| IngestError::LockContention(document_id.to_string()))
    }

    /// Release a lock, logging rather than failing if the release itself errors.
    pub async fn unlock(&self, lock: Box<dyn LockedDocument>) {
        let document_id = lock.document_id();
        if let Err(e) = lock.release().await {
            warn!(document_id = %document_id, error = %e, "Advisory lock release failed; session closed instead");
        }
    }

    /// Embed and store `drafts` as the complete chunk set of `document`.
    ///
    /// Returns the number of chunks persisted, which always equals
    /// `drafts.len()`. The lock is released on every path.
    pub async fn index(
        &self,
        document: &Document,
        drafts: &[ChunkDraft],
        mode: LockMode,
    ) -> IngestResult<usize> {
        let mut lock = self.lock(document.id, mode).await?;
        let result = self.index_locked(lock.as_mut(), document, drafts).await;
        self.unlock(lock).await;
        result
    }

    /// Embed and store while the caller holds the lock.
    pub async fn index_locked(
        &self,
        lock: &mut dyn LockedDocument,
        document: &Document,
        drafts: &[ChunkDraft],
    ) -> IngestResult<usize> {
        let submitted = drafts.len();
        info!(
            event = "index.start",
            document_id = %document.id,
            submitted,
            "Indexing chunks"
        );

        let result = self.embed_and_write(lock, document, drafts).await;
        match &result {
            Ok(inserted) => {
                self.metrics.record_chunks_indexed(*inserted);
                info!(
                    event = "index.finish",
                    document_id = %document.id,
                    submitted,
                    inserted = *inserted,
                    "Indexed chunks"
                );
            }
            Err(e) => {
                self.metrics.record_index_failure();
                if e.is_fatal_alert() {
                    self.metrics.record_auth_failure();
                }
                error!(
                    event = "index.finish",
                    document_id = %document.id,
                    submitted,
                    inserted = 0,
                    error_kind = e.kind(),
                    alert = e.is_fatal_alert(),
                    error = %e,
                    "Indexing failed"
                );
            }
        }
        result
    }

    async fn embed_and_write(
        &self,
        lock: &mut dyn LockedDocument,
        document: &Document,
        drafts: &[ChunkDraft],
    ) -> IngestResult<usize> {
        if lock.document_id() != document.id {
            return Err(IngestError::Validation(format!(
                "lock is held for {} but indexing {}",
                lock.document_id(),
                document.id
            )));
        }
        if drafts.is_empty() {
            return Err(IngestError::Validation(format!(
                "no chunks submitted for document {}",
                document.id
            )));
        }

        let texts: Vec<String> = drafts.iter().map(|d| d.content.clone()).collect();
        let embedder = &self.embedder;
        let texts_ref = &texts;
        let vectors = self
            .retry
            .run("embed", || embedder.embed_batch(texts_ref))
            .await?;

        if vectors.len() != drafts.len() {
            return Err(IngestError::Validation(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                drafts.len()
            )));
        }

        let chunks: Vec<EmbeddedChunk> = drafts
            .iter()
            .zip(vectors)
            .map(|(draft, embedding)| EmbeddedChunk {
                chunk_index: draft.chunk_index,
                content: draft.content.clone(),
                embedding,
                metadata: stamp_metadata(document, draft),
            })
            .collect();

        let ids = lock.replace_chunks(&chunks).await?;
        if ids.len() != chunks.len() {
            error!(
                document_id = %document.id,
                submitted = chunks.len(),
                inserted = ids.len(),
                "Store acknowledged fewer chunks than submitted"
            );
            return Err(IngestError::Validation(format!(
                "store returned {} ids for {} submitted chunks",
                ids.len(),
                chunks.len()
            )));
        }
        Ok(ids.len())
    }

    /// Delete a document and its chunks under the document's lock.
    pub async fn delete_document(&self, document_id: DocumentId, mode: LockMode) -> IngestResult<()> {
        let mut lock = self.lock(document_id, mode).await?;
        let result = lock.delete_document().await.map_err(IngestError::from);
        self.unlock(lock).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedEmbedder, ShortChangingStore};
    use vellum_ollama::OllamaError;
    use vellum_store::MemoryVectorStore;

    const DIMS: usize = 8;

    async fn setup(
        embedder: ScriptedEmbedder,
    ) -> (Indexer, MemoryVectorStore, Document, Arc<MetricsCollector>) {
        let store = MemoryVectorStore::new(DIMS);
        let document = store
            .register_document(&Document::new("hash-1", "paper.pdf", "/docs/paper.pdf"))
            .await
            .unwrap();
        let metrics = Arc::new(MetricsCollector::new());
        let indexer = Indexer::new(
            Arc::new(store.clone()),
            Arc::new(embedder),
            RetryPolicy::default().with_jitter(0.0),
            metrics.clone(),
        )
        .unwrap();
        (indexer, store, document, metrics)
    }

    fn drafts(document: &Document, n: usize) -> Vec<ChunkDraft> {
        let texts: Vec<String> = (0..n).map(|i| format!("chunk text {}", i)).collect();
        ChunkDraft::from_texts(document, &texts, "recursive")
    }

    #[tokio::test]
    async fn test_index_persists_every_chunk_with_embedding() {
        let (indexer, store, document, metrics) = setup(ScriptedEmbedder::new(DIMS)).await;

        let inserted = indexer
            .index(&document, &drafts(&document, 5), LockMode::Blocking)
            .await
            .unwrap();
        assert_eq!(inserted, 5);

        let chunks = store.chunks_for_document(document.id).await.unwrap();
        assert_eq!(chunks.len(), 5);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.embedding.as_ref().map(Vec::len), Some(DIMS));
            assert_eq!(chunk.metadata["document_id"], document.id.to_string());
            assert_eq!(chunk.metadata["document_name"], "paper.pdf");
            assert_eq!(chunk.metadata["chunk_index"], i);
            assert_eq!(chunk.metadata["strategy"], "recursive");
        }
        assert!(!store.is_locked(document.id));
        assert_eq!(metrics.snapshot().chunks_indexed, 5);
    }

    #[tokio::test]
    async fn test_reindex_replaces_rather_than_duplicates() {
        let (indexer, store, document, _) = setup(ScriptedEmbedder::new(DIMS)).await;

        indexer.index(&document, &drafts(&document, 4), LockMode::Blocking).await.unwrap();
        indexer.index(&document, &drafts(&document, 3), LockMode::Blocking).await.unwrap();

        assert_eq!(store.chunk_counts(document.id).await.unwrap().total, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_persists_nothing_and_does_not_retry() {
        let embedder = ScriptedEmbedder::new(DIMS).with_failures(vec![OllamaError::Authentication {
            status: 403,
            message: "forbidden".into(),
        }]);
        let calls = embedder.call_counter();
        let (indexer, store, document, metrics) = setup(embedder).await;

        let err = indexer
            .index(&document, &drafts(&document, 3), LockMode::Blocking)
            .await
            .unwrap_err();

        assert!(err.is_fatal_alert());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(store.chunk_counts(document.id).await.unwrap().total, 0);
        assert!(!store.is_locked(document.id));
        assert_eq!(metrics.snapshot().auth_failures, 1);
    }

    #[tokio::test]
    async fn test_short_id_list_is_a_hard_failure() {
        let inner = MemoryVectorStore::new(DIMS);
        let document = inner
            .register_document(&Document::new("hash-2", "table.csv", "/docs/table.csv"))
            .await
            .unwrap();
        let metrics = Arc::new(MetricsCollector::new());
        let indexer = Indexer::new(
            Arc::new(ShortChangingStore::new(inner.clone())),
            Arc::new(ScriptedEmbedder::new(DIMS)),
            RetryPolicy::none(),
            metrics.clone(),
        )
        .unwrap();

        let err = indexer
            .index(&document, &drafts(&document, 4), LockMode::Blocking)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert_eq!(metrics.snapshot().chunks_indexed, 0);
        assert_eq!(metrics.snapshot().index_failures, 1);
        assert!(!inner.is_locked(document.id));
    }

    #[tokio::test]
    async fn test_non_blocking_contention() {
        let (indexer, store, document, _) = setup(ScriptedEmbedder::new(DIMS)).await;

        let held = store.acquire_lock(document.id, LockMode::Blocking).await.unwrap().unwrap();
        let err = indexer
            .index(&document, &drafts(&document, 2), LockMode::NonBlocking)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::LockContention(_)));
        held.release().await.unwrap();

        assert_eq!(
            indexer.index(&document, &drafts(&document, 2), LockMode::NonBlocking).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected_up_front() {
        let store = MemoryVectorStore::new(DIMS);
        let result = Indexer::new(
            Arc::new(store),
            Arc::new(ScriptedEmbedder::new(DIMS + 1)),
            RetryPolicy::none(),
            Arc::new(MetricsCollector::new()),
        );
        assert!(matches!(result, Err(IngestError::Config(_))));
    }

    #[tokio::test]
    async fn test_delete_document_cascades() {
        let (indexer, store, document, _) = setup(ScriptedEmbedder::new(DIMS)).await;
        indexer.index(&document, &drafts(&document, 2), LockMode::Blocking).await.unwrap();

        indexer.delete_document(document.id, LockMode::Blocking).await.unwrap();
        assert!(store.get_document(document.id).await.unwrap().is_none());
        assert_eq!(store.coverage().await.unwrap().total_chunks, 0);
    }

    #[test]
    fn test_with_extra_keeps_back_references() {
        let document = Document::new("h", "a.md", "/a.md");
        let draft = ChunkDraft::from_texts(&document, &["x".to_string()], "paragraph")
            .remove(0)
            .with_extra(&json!({"domain": "physics", "document_id": "spoofed"}));
        assert_eq!(draft.metadata["domain"], "physics");
        assert_eq!(draft.metadata["document_id"], document.id.to_string());
    }
}
