//! In-memory store with emulated advisory locks.
//!
//! Shares one process, so "sessions" are lock guards. Lock keys are derived
//! the same way every time (SHA-256 of namespace and id), mirroring the
//! server-side hashing of the Postgres store.

use crate::error::{StoreError, StoreResult};
use crate::store::{validate_batch, LockMode, LockedDocument, VectorStore};
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use vellum_core::{
    new_id, Chunk, ChunkCounts, ChunkId, Coverage, Document, DocumentId, DocumentStatus,
    EmbeddedChunk,
};

type LockKey = (i32, i32);

fn stable_hash(value: &str) -> i32 {
    let digest = Sha256::digest(value.as_bytes());
    i32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

#[derive(Default)]
struct Tables {
    documents: HashMap<DocumentId, Document>,
    chunks: Vec<Chunk>,
}

struct Shared {
    tables: Mutex<Tables>,
    locks: Mutex<HashSet<LockKey>>,
    released: Notify,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A [`VectorStore`] held entirely in memory.
#[derive(Clone)]
pub struct MemoryVectorStore {
    shared: Arc<Shared>,
    namespace: String,
    dimensions: usize,
}

impl MemoryVectorStore {
    pub fn new(dimensions: usize) -> Self {
        Self::with_namespace("vellum.index", dimensions)
    }

    pub fn with_namespace(namespace: impl Into<String>, dimensions: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: Mutex::new(Tables::default()),
                locks: Mutex::new(HashSet::new()),
                released: Notify::new(),
            }),
            namespace: namespace.into(),
            dimensions,
        }
    }

    /// The lock key pair for a document.
    pub fn lock_key(&self, id: DocumentId) -> LockKey {
        (stable_hash(&self.namespace), stable_hash(&id.to_string()))
    }

    /// Whether any guard currently holds the document's lock.
    pub fn is_locked(&self, id: DocumentId) -> bool {
        guard(&self.shared.locks).contains(&self.lock_key(id))
    }

    /// Seed chunk rows without embeddings, as older tooling left them.
    pub fn insert_unembedded_chunks(&self, id: DocumentId, contents: &[&str]) -> Vec<ChunkId> {
        let mut tables = guard(&self.shared.tables);
        contents
            .iter()
            .enumerate()
            .map(|(index, content)| {
                let chunk = Chunk {
                    id: new_id(),
                    document_id: id,
                    chunk_index: index as i32,
                    content: content.to_string(),
                    embedding: None,
                    metadata: serde_json::json!({ "document_id": id.to_string() }),
                };
                let chunk_id = chunk.id;
                tables.chunks.push(chunk);
                chunk_id
            })
            .collect()
    }

    fn try_lock(&self, key: LockKey) -> bool {
        guard(&self.shared.locks).insert(key)
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn register_document(&self, document: &Document) -> StoreResult<Document> {
        let mut tables = guard(&self.shared.tables);
        if let Some(existing) = tables
            .documents
            .values()
            .find(|d| d.content_hash == document.content_hash)
        {
            return Ok(existing.clone());
        }
        tables.documents.insert(document.id, document.clone());
        Ok(document.clone())
    }

    async fn get_document(&self, id: DocumentId) -> StoreResult<Option<Document>> {
        Ok(guard(&self.shared.tables).documents.get(&id).cloned())
    }

    async fn find_by_hash(&self, content_hash: &str) -> StoreResult<Option<Document>> {
        Ok(guard(&self.shared.tables)
            .documents
            .values()
            .find(|d| d.content_hash == content_hash)
            .cloned())
    }

    async fn documents_at_path(&self, file_path: &str) -> StoreResult<Vec<Document>> {
        let mut docs: Vec<Document> = guard(&self.shared.tables)
            .documents
            .values()
            .filter(|d| d.file_path == file_path)
            .cloned()
            .collect();
        docs.sort_by_key(|d| d.created_at);
        Ok(docs)
    }

    async fn list_documents(&self, limit: i64) -> StoreResult<Vec<Document>> {
        let mut docs: Vec<Document> = guard(&self.shared.tables)
            .documents
            .values()
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        docs.truncate(limit.max(0) as usize);
        Ok(docs)
    }

    async fn set_status(
        &self,
        id: DocumentId,
        status: DocumentStatus,
        chunking_strategy: Option<&str>,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let mut tables = guard(&self.shared.tables);
        let doc = tables
            .documents
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("document {}", id)))?;
        doc.status = status;
        if let Some(strategy) = chunking_strategy {
            doc.chunking_strategy = Some(strategy.to_string());
        }
        doc.error = error.map(str::to_string);
        doc.updated_at = Utc::now();
        Ok(())
    }

    async fn documents_missing_embeddings(&self, limit: i64) -> StoreResult<Vec<Document>> {
        let tables = guard(&self.shared.tables);
        let missing: HashSet<DocumentId> = tables
            .chunks
            .iter()
            .filter(|c| c.embedding.is_none())
            .map(|c| c.document_id)
            .collect();
        let mut docs: Vec<Document> = tables
            .documents
            .values()
            .filter(|d| missing.contains(&d.id))
            .cloned()
            .collect();
        docs.sort_by_key(|d| d.created_at);
        docs.truncate(limit.max(0) as usize);
        Ok(docs)
    }

    async fn chunks_for_document(&self, id: DocumentId) -> StoreResult<Vec<Chunk>> {
        let mut chunks: Vec<Chunk> = guard(&self.shared.tables)
            .chunks
            .iter()
            .filter(|c| c.document_id == id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn chunk_counts(&self, id: DocumentId) -> StoreResult<ChunkCounts> {
        let tables = guard(&self.shared.tables);
        let mut counts = ChunkCounts::default();
        for chunk in tables.chunks.iter().filter(|c| c.document_id == id) {
            counts.total += 1;
            if chunk.is_embedded() {
                counts.embedded += 1;
            }
        }
        Ok(counts)
    }

    async fn coverage(&self) -> StoreResult<Coverage> {
        let tables = guard(&self.shared.tables);
        Ok(Coverage {
            total_chunks: tables.chunks.len() as i64,
            embedded_chunks: tables.chunks.iter().filter(|c| c.is_embedded()).count() as i64,
        })
    }

    async fn acquire_lock(
        &self,
        id: DocumentId,
        mode: LockMode,
    ) -> StoreResult<Option<Box<dyn LockedDocument>>> {
        let key = self.lock_key(id);
        loop {
            // Register for wakeups before checking, so a release in between is not missed.
            let released = self.shared.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if self.try_lock(key) {
                return Ok(Some(Box::new(MemoryLockedDocument {
                    shared: Arc::clone(&self.shared),
                    key,
                    document_id: id,
                    dimensions: self.dimensions,
                    held: true,
                })));
            }
            if mode == LockMode::NonBlocking {
                return Ok(None);
            }
            released.await;
        }
    }
}

struct MemoryLockedDocument {
    shared: Arc<Shared>,
    key: LockKey,
    document_id: DocumentId,
    dimensions: usize,
    held: bool,
}

impl MemoryLockedDocument {
    fn unlock(&mut self) {
        if self.held {
            guard(&self.shared.locks).remove(&self.key);
            self.held = false;
            self.shared.released.notify_waiters();
        }
    }
}

#[async_trait]
impl LockedDocument for MemoryLockedDocument {
    fn document_id(&self) -> DocumentId {
        self.document_id
    }

    async fn replace_chunks(&mut self, chunks: &[EmbeddedChunk]) -> StoreResult<Vec<ChunkId>> {
        validate_batch(chunks, self.dimensions)?;
        let mut tables = guard(&self.shared.tables);
        if !tables.documents.contains_key(&self.document_id) {
            return Err(StoreError::NotFound(format!("document {}", self.document_id)));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = chunks.iter().find(|c| !seen.insert(c.chunk_index)) {
            return Err(StoreError::Validation(format!(
                "duplicate chunk_index {} in batch",
                dup.chunk_index
            )));
        }

        let document_id = self.document_id;
        tables.chunks.retain(|c| c.document_id != document_id);
        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let id = new_id();
            tables.chunks.push(Chunk {
                id,
                document_id,
                chunk_index: chunk.chunk_index,
                content: chunk.content.clone(),
                embedding: Some(chunk.embedding.clone()),
                metadata: chunk.metadata.clone(),
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn delete_document(&mut self) -> StoreResult<()> {
        let mut tables = guard(&self.shared.tables);
        let document_id = self.document_id;
        tables.documents.remove(&document_id);
        tables.chunks.retain(|c| c.document_id != document_id);
        Ok(())
    }

    async fn release(mut self: Box<Self>) -> StoreResult<()> {
        self.unlock();
        Ok(())
    }
}

impl Drop for MemoryLockedDocument {
    fn drop(&mut self) {
        self.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn embedded(index: i32) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk_index: index,
            content: format!("chunk {}", index),
            embedding: vec![0.5, 0.5],
            metadata: serde_json::json!({}),
        }
    }

    async fn registered(store: &MemoryVectorStore) -> Document {
        store
            .register_document(&Document::new(new_id().to_string(), "a.md", "/a.md"))
            .await
            .unwrap()
    }

    #[test]
    fn test_lock_key_is_stable() {
        let a = MemoryVectorStore::new(2);
        let b = MemoryVectorStore::new(2);
        let id = new_id();
        assert_eq!(a.lock_key(id), b.lock_key(id));
        assert_ne!(a.lock_key(id), a.lock_key(new_id()));
    }

    #[tokio::test]
    async fn test_register_dedupes_by_hash() {
        let store = MemoryVectorStore::new(2);
        let first = store
            .register_document(&Document::new("h", "a.md", "/a.md"))
            .await
            .unwrap();
        let second = store
            .register_document(&Document::new("h", "b.md", "/b.md"))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_non_blocking_lock_is_refused_while_held() {
        let store = MemoryVectorStore::new(2);
        let doc = registered(&store).await;

        let held = store.acquire_lock(doc.id, LockMode::Blocking).await.unwrap();
        assert!(held.is_some());
        assert!(store
            .acquire_lock(doc.id, LockMode::NonBlocking)
            .await
            .unwrap()
            .is_none());

        held.unwrap().release().await.unwrap();
        assert!(!store.is_locked(doc.id));
        assert!(store
            .acquire_lock(doc.id, LockMode::NonBlocking)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_blocking_lock_waits_for_release() {
        let store = MemoryVectorStore::new(2);
        let doc = registered(&store).await;
        let held = store
            .acquire_lock(doc.id, LockMode::Blocking)
            .await
            .unwrap()
            .unwrap();

        let waiter_store = store.clone();
        let waiter = tokio::spawn(async move {
            waiter_store
                .acquire_lock(doc.id, LockMode::Blocking)
                .await
                .unwrap()
                .is_some()
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        held.release().await.unwrap();
        assert!(tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap());
    }

    #[tokio::test]
    async fn test_dropped_guard_releases_lock() {
        let store = MemoryVectorStore::new(2);
        let doc = registered(&store).await;
        {
            let _guard = store.acquire_lock(doc.id, LockMode::Blocking).await.unwrap();
            assert!(store.is_locked(doc.id));
        }
        assert!(!store.is_locked(doc.id));
    }

    #[tokio::test]
    async fn test_replace_chunks_swaps_rows() {
        let store = MemoryVectorStore::new(2);
        let doc = registered(&store).await;
        store.insert_unembedded_chunks(doc.id, &["old a", "old b"]);
        assert_eq!(store.documents_missing_embeddings(10).await.unwrap().len(), 1);

        let mut lock = store
            .acquire_lock(doc.id, LockMode::Blocking)
            .await
            .unwrap()
            .unwrap();
        let ids = lock
            .replace_chunks(&[embedded(0), embedded(1), embedded(2)])
            .await
            .unwrap();
        lock.release().await.unwrap();

        assert_eq!(ids.len(), 3);
        assert_eq!(
            store.chunk_counts(doc.id).await.unwrap(),
            ChunkCounts { total: 3, embedded: 3 }
        );
        assert!(store.documents_missing_embeddings(10).await.unwrap().is_empty());
        assert_eq!(store.coverage().await.unwrap().percent(), 100.0);
    }

    #[tokio::test]
    async fn test_replace_chunks_rejects_bad_batch_without_changes() {
        let store = MemoryVectorStore::new(2);
        let doc = registered(&store).await;
        let mut lock = store
            .acquire_lock(doc.id, LockMode::Blocking)
            .await
            .unwrap()
            .unwrap();
        lock.replace_chunks(&[embedded(0)]).await.unwrap();

        let mut wrong = embedded(1);
        wrong.embedding = vec![1.0];
        assert!(matches!(
            lock.replace_chunks(&[embedded(0), wrong]).await,
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            lock.replace_chunks(&[embedded(0), embedded(0)]).await,
            Err(StoreError::Validation(_))
        ));
        lock.release().await.unwrap();

        assert_eq!(store.chunk_counts(doc.id).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_delete_cascades_chunks() {
        let store = MemoryVectorStore::new(2);
        let doc = registered(&store).await;
        let mut lock = store
            .acquire_lock(doc.id, LockMode::Blocking)
            .await
            .unwrap()
            .unwrap();
        lock.replace_chunks(&[embedded(0), embedded(1)]).await.unwrap();
        lock.delete_document().await.unwrap();
        lock.release().await.unwrap();

        assert!(store.get_document(doc.id).await.unwrap().is_none());
        assert_eq!(store.coverage().await.unwrap().total_chunks, 0);
    }

    #[tokio::test]
    async fn test_set_status() {
        let store = MemoryVectorStore::new(2);
        let doc = registered(&store).await;
        store
            .set_status(doc.id, DocumentStatus::Completed, Some("recursive"), None)
            .await
            .unwrap();
        let stored = store.get_document(doc.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Completed);
        assert_eq!(stored.chunking_strategy.as_deref(), Some("recursive"));

        assert!(store
            .set_status(new_id(), DocumentStatus::Error, None, Some("x"))
            .await
            .is_err());
    }
}
