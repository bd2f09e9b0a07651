//! Postgres schema and migrations.

use crate::error::{StoreError, StoreResult};
use sqlx::PgPool;
use tracing::info;

/// Build the schema script for a given embedding width.
///
/// The script runs as one implicit transaction and takes a transaction-scoped
/// advisory lock first, so concurrent starters migrate one at a time.
pub(crate) fn schema_sql(dimensions: usize) -> String {
    format!(
        r#"
        SELECT pg_advisory_xact_lock(hashtext('vellum.migrate'));

        CREATE EXTENSION IF NOT EXISTS vector;

        CREATE TABLE IF NOT EXISTS documents (
            id UUID PRIMARY KEY,
            content_hash TEXT NOT NULL UNIQUE,
            file_name TEXT NOT NULL,
            file_path TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'processing', 'completed', 'error')),
            chunking_strategy TEXT,
            metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            error TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );

        CREATE INDEX IF NOT EXISTS idx_documents_path ON documents(file_path);
        CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status);

        CREATE TABLE IF NOT EXISTS chunks (
            id UUID PRIMARY KEY,
            document_id UUID NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            chunk_index INTEGER NOT NULL,
            content TEXT NOT NULL,
            embedding vector({dimensions}),
            metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE (document_id, chunk_index)
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);
        CREATE INDEX IF NOT EXISTS idx_chunks_missing_embedding
            ON chunks(document_id) WHERE embedding IS NULL;
        "#
    )
}

/// Create tables if needed and check the stored vector width.
pub(crate) async fn migrate(pool: &PgPool, dimensions: usize) -> StoreResult<()> {
    info!(dimensions, "Applying vector store schema");
    sqlx::raw_sql(&schema_sql(dimensions)).execute(pool).await?;

    // For pgvector columns the type modifier is the declared width.
    let stored: Option<i32> = sqlx::query_scalar(
        "SELECT atttypmod FROM pg_attribute
         WHERE attrelid = 'chunks'::regclass AND attname = 'embedding'",
    )
    .fetch_optional(pool)
    .await?;

    match stored {
        Some(width) if width > 0 && width as usize != dimensions => {
            Err(StoreError::Migration(format!(
                "chunks.embedding is vector({}) but the embedding model produces {} dimensions",
                width, dimensions
            )))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_embeds_dimensions() {
        let sql = schema_sql(768);
        assert!(sql.contains("embedding vector(768)"));
        assert!(sql.contains("ON DELETE CASCADE"));
        assert!(sql.contains("content_hash TEXT NOT NULL UNIQUE"));
        // Escaped braces render as JSON literals
        assert!(sql.contains("DEFAULT '{}'::jsonb"));
    }
}
