//! Postgres + pgvector store.
//!
//! The advisory lock key is computed by the server:
//! `(hashtext(namespace), hashtext(document_id))`. Every process therefore
//! derives the same key for the same document, whatever its own hasher does.

use crate::error::{StoreError, StoreResult};
use crate::schema;
use crate::store::{validate_batch, LockMode, LockedDocument, VectorStore};
use async_trait::async_trait;
use pgvector::Vector;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Connection, PgPool, Postgres, Row};
use tracing::{debug, warn};
use vellum_core::{
    new_id, Chunk, ChunkCounts, ChunkId, Coverage, Document, DocumentId, DocumentStatus,
    EmbeddedChunk,
};

const DOCUMENT_COLUMNS: &str = "id, content_hash, file_name, file_path, status, \
     chunking_strategy, metadata, error, created_at, updated_at";

fn document_from_row(row: &PgRow) -> StoreResult<Document> {
    let status: String = row.try_get("status")?;
    Ok(Document {
        id: row.try_get("id")?,
        content_hash: row.try_get("content_hash")?,
        file_name: row.try_get("file_name")?,
        file_path: row.try_get("file_path")?,
        status: DocumentStatus::from_str(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown document status '{}'", status)))?,
        chunking_strategy: row.try_get("chunking_strategy")?,
        metadata: row.try_get("metadata")?,
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn chunk_from_row(row: &PgRow) -> StoreResult<Chunk> {
    let embedding: Option<Vector> = row.try_get("embedding")?;
    Ok(Chunk {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        chunk_index: row.try_get("chunk_index")?,
        content: row.try_get("content")?,
        embedding: embedding.map(|v| v.to_vec()),
        metadata: row.try_get("metadata")?,
    })
}

/// Postgres-backed [`VectorStore`].
#[derive(Clone)]
pub struct PgVectorStore {
    pool: PgPool,
    namespace: String,
    dimensions: usize,
}

impl PgVectorStore {
    /// Connect, then apply the schema.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        namespace: impl Into<String>,
        dimensions: usize,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let store = Self::from_pool(pool, namespace, dimensions);
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: PgPool, namespace: impl Into<String>, dimensions: usize) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
            dimensions,
        }
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        schema::migrate(&self.pool, self.dimensions).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// The lock key pair as the server computes it. Diagnostic only.
    pub async fn lock_key(&self, id: DocumentId) -> StoreResult<(i32, i32)> {
        let key: (i32, i32) = sqlx::query_as("SELECT hashtext($1), hashtext($2)")
            .bind(&self.namespace)
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(key)
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn register_document(&self, document: &Document) -> StoreResult<Document> {
        sqlx::query(
            "INSERT INTO documents
                 (id, content_hash, file_name, file_path, status, chunking_strategy, metadata, error, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (content_hash) DO NOTHING",
        )
        .bind(document.id)
        .bind(&document.content_hash)
        .bind(&document.file_name)
        .bind(&document.file_path)
        .bind(document.status.as_str())
        .bind(&document.chunking_strategy)
        .bind(&document.metadata)
        .bind(&document.error)
        .bind(document.created_at)
        .bind(document.updated_at)
        .execute(&self.pool)
        .await?;

        self.find_by_hash(&document.content_hash)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("document {}", document.content_hash)))
    }

    async fn get_document(&self, id: DocumentId) -> StoreResult<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE id = $1",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn find_by_hash(&self, content_hash: &str) -> StoreResult<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE content_hash = $1",
            DOCUMENT_COLUMNS
        ))
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn documents_at_path(&self, file_path: &str) -> StoreResult<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE file_path = $1 ORDER BY created_at",
            DOCUMENT_COLUMNS
        ))
        .bind(file_path)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(document_from_row).collect()
    }

    async fn list_documents(&self, limit: i64) -> StoreResult<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents ORDER BY updated_at DESC LIMIT $1",
            DOCUMENT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(document_from_row).collect()
    }

    async fn set_status(
        &self,
        id: DocumentId,
        status: DocumentStatus,
        chunking_strategy: Option<&str>,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE documents
             SET status = $2,
                 chunking_strategy = COALESCE($3, chunking_strategy),
                 error = $4,
                 updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(chunking_strategy)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("document {}", id)));
        }
        Ok(())
    }

    async fn documents_missing_embeddings(&self, limit: i64) -> StoreResult<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents d
             WHERE EXISTS (
                 SELECT 1 FROM chunks c WHERE c.document_id = d.id AND c.embedding IS NULL
             )
             ORDER BY d.created_at
             LIMIT $1",
            DOCUMENT_COLUMNS
                .split(", ")
                .map(|c| format!("d.{}", c.trim()))
                .collect::<Vec<_>>()
                .join(", ")
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(document_from_row).collect()
    }

    async fn chunks_for_document(&self, id: DocumentId) -> StoreResult<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT id, document_id, chunk_index, content, embedding, metadata
             FROM chunks WHERE document_id = $1 ORDER BY chunk_index",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(chunk_from_row).collect()
    }

    async fn chunk_counts(&self, id: DocumentId) -> StoreResult<ChunkCounts> {
        let (total, embedded): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(embedding) FROM chunks WHERE document_id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(ChunkCounts { total, embedded })
    }

    async fn coverage(&self) -> StoreResult<Coverage> {
        let (total_chunks, embedded_chunks): (i64, i64) =
            sqlx::query_as("SELECT COUNT(*), COUNT(embedding) FROM chunks")
                .fetch_one(&self.pool)
                .await?;
        Ok(Coverage {
            total_chunks,
            embedded_chunks,
        })
    }

    async fn acquire_lock(
        &self,
        id: DocumentId,
        mode: LockMode,
    ) -> StoreResult<Option<Box<dyn LockedDocument>>> {
        // Session-scoped: the lock lives on this one connection until released.
        let mut conn = self.pool.acquire().await?;
        let key = id.to_string();

        match mode {
            LockMode::Blocking => {
                sqlx::query("SELECT pg_advisory_lock(hashtext($1), hashtext($2))")
                    .bind(&self.namespace)
                    .bind(&key)
                    .execute(&mut *conn)
                    .await?;
            }
            LockMode::NonBlocking => {
                let acquired: bool =
                    sqlx::query_scalar("SELECT pg_try_advisory_lock(hashtext($1), hashtext($2))")
                        .bind(&self.namespace)
                        .bind(&key)
                        .fetch_one(&mut *conn)
                        .await?;
                if !acquired {
                    debug!(document_id = %id, "Advisory lock busy");
                    return Ok(None);
                }
            }
        }

        debug!(document_id = %id, mode = mode.as_str(), "Advisory lock acquired");
        Ok(Some(Box::new(PgLockedDocument {
            conn: Some(conn),
            namespace: self.namespace.clone(),
            document_id: id,
            dimensions: self.dimensions,
        })))
    }
}

/// A held advisory lock plus the connection that owns it.
struct PgLockedDocument {
    conn: Option<PoolConnection<Postgres>>,
    namespace: String,
    document_id: DocumentId,
    dimensions: usize,
}

impl PgLockedDocument {
    fn conn(&mut self) -> StoreResult<&mut PoolConnection<Postgres>> {
        self.conn.as_mut().ok_or_else(|| {
            StoreError::Validation(format!(
                "lock for document {} was already released",
                self.document_id
            ))
        })
    }
}

#[async_trait]
impl LockedDocument for PgLockedDocument {
    fn document_id(&self) -> DocumentId {
        self.document_id
    }

    async fn replace_chunks(&mut self, chunks: &[EmbeddedChunk]) -> StoreResult<Vec<ChunkId>> {
        validate_batch(chunks, self.dimensions)?;
        let document_id = self.document_id;
        let conn = self.conn()?;
        let mut tx = conn.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE document_id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        let mut ids: Vec<ChunkId> = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let id: Option<ChunkId> = sqlx::query_scalar(
                "INSERT INTO chunks (id, document_id, chunk_index, content, embedding, metadata)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 RETURNING id",
            )
            .bind(new_id())
            .bind(document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(Vector::from(chunk.embedding.clone()))
            .bind(&chunk.metadata)
            .fetch_optional(&mut *tx)
            .await?;
            ids.extend(id);
        }

        if ids.len() != chunks.len() {
            tx.rollback().await?;
            return Err(StoreError::Validation(format!(
                "insert returned {} ids for {} chunks",
                ids.len(),
                chunks.len()
            )));
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn delete_document(&mut self) -> StoreResult<()> {
        let document_id = self.document_id;
        let conn = self.conn()?;
        sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(document_id)
            .execute(&mut **conn)
            .await?;
        Ok(())
    }

    async fn release(mut self: Box<Self>) -> StoreResult<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        let unlocked: Result<bool, sqlx::Error> =
            sqlx::query_scalar("SELECT pg_advisory_unlock(hashtext($1), hashtext($2))")
                .bind(&self.namespace)
                .bind(self.document_id.to_string())
                .fetch_one(&mut *conn)
                .await;

        match unlocked {
            Ok(true) => Ok(()),
            Ok(false) => {
                // The session did not hold the lock; do not hand it back to the pool.
                warn!(document_id = %self.document_id, "Advisory unlock reported no lock held");
                let _ = conn.detach().close().await;
                Ok(())
            }
            Err(e) => {
                warn!(document_id = %self.document_id, error = %e, "Advisory unlock failed, closing session");
                let _ = conn.detach().close().await;
                Err(StoreError::Database(e))
            }
        }
    }
}

impl Drop for PgLockedDocument {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            // Ending the session is what frees a session-level advisory lock.
            warn!(document_id = %self.document_id, "Lock guard dropped without release, closing session");
            drop(conn.detach());
        }
    }
}
