//! `SqliteSemanticStore` (C6): relational document/chunk rows in `libsql`
//! composed with a per-project [`VectorIndex`] obtained from a
//! [`ProjectIndexManager`] (C3) for the embeddings themselves.
//!
//! Grounded on the same turso-relational/redb-vector split the rest of this
//! crate follows: text and metadata are cheap to scan and never need a
//! float comparison, so they live in `libsql`; embeddings live in the
//! project's `redb` vector index, which is the only thing that needs to
//! score them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use memory_core::embeddings::Embedder;
use memory_core::error::{Error, Result};
use memory_core::index::ProjectIndexManager;
use memory_core::project::validate_project_id;
use memory_core::semantic::{
    chunk_text, validate_embedding_dimension, Chunk, Document, MetadataFilter, SemanticHit,
    SemanticStore,
};

use crate::pool::ConnectionPool;

fn metadata_to_json(metadata: &HashMap<String, String>) -> Result<String> {
    serde_json::to_string(metadata).map_err(Error::Serialization)
}

fn metadata_from_json(raw: &str) -> Result<HashMap<String, String>> {
    serde_json::from_str(raw).map_err(Error::Serialization)
}

fn row_to_document(row: &libsql::Row) -> Result<Document> {
    let doc_id: String = row.get(0).map_err(|e| Error::Storage(e.into()))?;
    let project_id: String = row.get(1).map_err(|e| Error::Storage(e.into()))?;
    let source_path: String = row.get(2).map_err(|e| Error::Storage(e.into()))?;
    let source_type: String = row.get(3).map_err(|e| Error::Storage(e.into()))?;
    let metadata: String = row.get(4).map_err(|e| Error::Storage(e.into()))?;
    let ingested_at: i64 = row.get(5).map_err(|e| Error::Storage(e.into()))?;

    Ok(Document {
        doc_id: Uuid::parse_str(&doc_id).map_err(|e| Error::Storage(e.into()))?,
        project_id,
        source_path,
        source_type,
        metadata: metadata_from_json(&metadata)?,
        ingested_at: DateTime::from_timestamp(ingested_at, 0).unwrap_or_default(),
    })
}

/// The relational half of a chunk row: no embedding, the vector index holds
/// that.
struct ChunkRow {
    chunk_id: Uuid,
    doc_id: Uuid,
    project_id: String,
    text: String,
    ordinal: usize,
    metadata: HashMap<String, String>,
}

fn row_to_chunk_row(row: &libsql::Row) -> Result<ChunkRow> {
    let chunk_id: String = row.get(0).map_err(|e| Error::Storage(e.into()))?;
    let doc_id: String = row.get(1).map_err(|e| Error::Storage(e.into()))?;
    let project_id: String = row.get(2).map_err(|e| Error::Storage(e.into()))?;
    let text: String = row.get(3).map_err(|e| Error::Storage(e.into()))?;
    let ordinal: i64 = row.get(4).map_err(|e| Error::Storage(e.into()))?;
    let metadata: String = row.get(5).map_err(|e| Error::Storage(e.into()))?;

    Ok(ChunkRow {
        chunk_id: Uuid::parse_str(&chunk_id).map_err(|e| Error::Storage(e.into()))?,
        doc_id: Uuid::parse_str(&doc_id).map_err(|e| Error::Storage(e.into()))?,
        project_id,
        text,
        ordinal: ordinal as usize,
        metadata: metadata_from_json(&metadata)?,
    })
}

fn matches_filter(metadata: &HashMap<String, String>, filter: Option<&MetadataFilter>) -> bool {
    match filter {
        None => true,
        Some(filter) => filter
            .equals
            .iter()
            .all(|(key, value)| metadata.get(key) == Some(value)),
    }
}

/// `libsql` + `redb`-backed semantic store.
pub struct SqliteSemanticStore {
    pool: Arc<ConnectionPool>,
    index_manager: Arc<dyn ProjectIndexManager>,
    embedder: Arc<dyn Embedder>,
    embedding_dim: usize,
}

impl SqliteSemanticStore {
    /// Wrap an already-initialized connection pool with the vector index
    /// manager and embedder it should delegate embedding work to.
    #[must_use]
    pub fn new(
        pool: Arc<ConnectionPool>,
        index_manager: Arc<dyn ProjectIndexManager>,
        embedder: Arc<dyn Embedder>,
        embedding_dim: usize,
    ) -> Self {
        Self { pool, index_manager, embedder, embedding_dim }
    }

    async fn chunk_rows_for_document(&self, project_id: &str, doc_id: Uuid) -> Result<Vec<ChunkRow>> {
        let handle = self.pool.acquire().await?;
        let mut rows = handle
            .connection()
            .query(
                "SELECT chunk_id, doc_id, project_id, text, ordinal, metadata FROM chunks \
                 WHERE project_id = ? AND doc_id = ? ORDER BY ordinal ASC",
                libsql::params![project_id, doc_id.to_string()],
            )
            .await
            .map_err(|e| Error::Storage(e.into()))?;

        let mut chunks = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.into()))? {
            chunks.push(row_to_chunk_row(&row)?);
        }
        Ok(chunks)
    }
}

#[async_trait]
impl SemanticStore for SqliteSemanticStore {
    async fn add_document(
        &self,
        project_id: &str,
        source_path: &str,
        source_type: &str,
        text: &str,
        chunk_size: usize,
        chunk_overlap: usize,
        metadata: HashMap<String, String>,
    ) -> Result<Document> {
        validate_project_id(project_id)?;

        let texts = chunk_text(text, chunk_size, chunk_overlap);
        if texts.is_empty() {
            return Err(Error::InvalidInput("document text produced no chunks".into()));
        }

        let embeddings = self.embedder.embed_batch(&texts).await?;
        for embedding in &embeddings {
            validate_embedding_dimension(project_id, embedding, self.embedding_dim)?;
        }

        let doc_id = Uuid::new_v4();
        let now = Utc::now();
        let total_chunks = texts.len();

        let chunks: Vec<Chunk> = texts
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(ordinal, (slice, embedding))| {
                let mut chunk_metadata = metadata.clone();
                chunk_metadata.insert("chunk_index".to_string(), ordinal.to_string());
                chunk_metadata.insert("total_chunks".to_string(), total_chunks.to_string());
                Chunk {
                    chunk_id: Uuid::new_v4(),
                    doc_id,
                    project_id: project_id.to_string(),
                    text: slice,
                    ordinal,
                    embedding,
                    metadata: chunk_metadata,
                }
            })
            .collect();

        let handle = self.pool.acquire().await?;
        handle
            .connection()
            .execute(
                "INSERT INTO documents (doc_id, project_id, source_path, source_type, \
                 metadata, ingested_at) VALUES (?, ?, ?, ?, ?, ?)",
                libsql::params![
                    doc_id.to_string(),
                    project_id,
                    source_path,
                    source_type,
                    metadata_to_json(&metadata)?,
                    now.timestamp(),
                ],
            )
            .await
            .map_err(|e| Error::Storage(e.into()))?;

        for chunk in &chunks {
            handle
                .connection()
                .execute(
                    "INSERT INTO chunks (chunk_id, doc_id, project_id, text, ordinal, metadata) \
                     VALUES (?, ?, ?, ?, ?, ?)",
                    libsql::params![
                        chunk.chunk_id.to_string(),
                        chunk.doc_id.to_string(),
                        chunk.project_id.clone(),
                        chunk.text.clone(),
                        i64::try_from(chunk.ordinal).unwrap_or(i64::MAX),
                        metadata_to_json(&chunk.metadata)?,
                    ],
                )
                .await
                .map_err(|e| Error::Storage(e.into()))?;
        }
        drop(handle);

        let index = self.index_manager.index_for(project_id).await?;
        for chunk in &chunks {
            index.upsert(chunk).await?;
        }

        debug!(project_id, doc_id = %doc_id, chunk_count = chunks.len(), "document ingested");
        Ok(Document {
            doc_id,
            project_id: project_id.to_string(),
            source_path: source_path.to_string(),
            source_type: source_type.to_string(),
            metadata,
            ingested_at: now,
        })
    }

    async fn search(
        &self,
        project_id: &str,
        query_embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SemanticHit>> {
        validate_project_id(project_id)?;
        if query_embedding.len() != self.embedding_dim {
            return Err(Error::InvalidInput(format!(
                "query embedding dimension {} does not match configured dimension {}",
                query_embedding.len(),
                self.embedding_dim
            )));
        }

        let index = self.index_manager.index_for(project_id).await?;
        if filter.is_none() {
            return index.search(query_embedding, top_k).await;
        }

        // A metadata filter can drop hits, so over-fetch from the index and
        // re-truncate after filtering rather than under-filling `top_k`.
        let over_fetch = top_k.saturating_mul(4).max(top_k);
        let hits = index.search(query_embedding, over_fetch).await?;
        let mut filtered: Vec<SemanticHit> = hits
            .into_iter()
            .filter(|hit| matches_filter(&hit.chunk.metadata, filter))
            .collect();
        filtered.truncate(top_k);
        Ok(filtered)
    }

    async fn delete_document(&self, project_id: &str, doc_id: Uuid) -> Result<()> {
        validate_project_id(project_id)?;
        let chunks = self.chunk_rows_for_document(project_id, doc_id).await?;

        let handle = self.pool.acquire().await?;
        let mut rows = handle
            .connection()
            .query(
                "SELECT doc_id FROM documents WHERE doc_id = ? AND project_id = ?",
                libsql::params![doc_id.to_string(), project_id],
            )
            .await
            .map_err(|e| Error::Storage(e.into()))?;
        if rows.next().await.map_err(|e| Error::Storage(e.into()))?.is_none() {
            return Err(Error::not_found("document", doc_id));
        }

        handle
            .connection()
            .execute(
                "DELETE FROM documents WHERE doc_id = ? AND project_id = ?",
                libsql::params![doc_id.to_string(), project_id],
            )
            .await
            .map_err(|e| Error::Storage(e.into()))?;
        handle
            .connection()
            .execute(
                "DELETE FROM chunks WHERE doc_id = ? AND project_id = ?",
                libsql::params![doc_id.to_string(), project_id],
            )
            .await
            .map_err(|e| Error::Storage(e.into()))?;
        drop(handle);

        let index = self.index_manager.index_for(project_id).await?;
        for chunk in chunks {
            index.remove(chunk.chunk_id).await?;
        }
        Ok(())
    }

    async fn get_chunk_by_id(&self, project_id: &str, chunk_id: Uuid) -> Result<Chunk> {
        validate_project_id(project_id)?;
        let handle = self.pool.acquire().await?;
        let mut rows = handle
            .connection()
            .query(
                "SELECT chunk_id, doc_id, project_id, text, ordinal, metadata FROM chunks \
                 WHERE chunk_id = ? AND project_id = ?",
                libsql::params![chunk_id.to_string(), project_id],
            )
            .await
            .map_err(|e| Error::Storage(e.into()))?;
        let row = rows
            .next()
            .await
            .map_err(|e| Error::Storage(e.into()))?
            .ok_or_else(|| Error::not_found("chunk", chunk_id))?;
        let chunk_row = row_to_chunk_row(&row)?;
        drop(handle);

        let index = self.index_manager.index_for(project_id).await?;
        let hits = index.search(&vec![0.0; self.embedding_dim], usize::MAX).await?;
        let embedding = hits
            .into_iter()
            .find(|hit| hit.chunk.chunk_id == chunk_row.chunk_id)
            .map(|hit| hit.chunk.embedding)
            .ok_or_else(|| Error::not_found("chunk", chunk_id))?;

        Ok(Chunk {
            chunk_id: chunk_row.chunk_id,
            doc_id: chunk_row.doc_id,
            project_id: chunk_row.project_id,
            text: chunk_row.text,
            ordinal: chunk_row.ordinal,
            embedding,
            metadata: chunk_row.metadata,
        })
    }

    async fn list_documents(&self, project_id: &str) -> Result<Vec<(Document, usize)>> {
        validate_project_id(project_id)?;
        let handle = self.pool.acquire().await?;
        let mut rows = handle
            .connection()
            .query(
                "SELECT doc_id, project_id, source_path, source_type, metadata, ingested_at \
                 FROM documents WHERE project_id = ? ORDER BY ingested_at ASC",
                libsql::params![project_id],
            )
            .await
            .map_err(|e| Error::Storage(e.into()))?;

        let mut documents = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.into()))? {
            documents.push(row_to_document(&row)?);
        }
        drop(handle);

        let mut out = Vec::with_capacity(documents.len());
        for document in documents {
            let count = self.chunk_rows_for_document(project_id, document.doc_id).await?.len();
            out.push((document, count));
        }
        Ok(out)
    }

    async fn delete_project(&self, project_id: &str) -> Result<()> {
        let handle = self.pool.acquire().await?;
        handle
            .connection()
            .execute("DELETE FROM documents WHERE project_id = ?", libsql::params![project_id])
            .await
            .map_err(|e| Error::Storage(e.into()))?;
        handle
            .connection()
            .execute("DELETE FROM chunks WHERE project_id = ?", libsql::params![project_id])
            .await
            .map_err(|e| Error::Storage(e.into()))?;
        drop(handle);

        self.index_manager.remove(project_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_schema;
    use memory_core::embeddings::MockEmbedder;
    use memory_storage_redb::RedbProjectIndexManager;

    async fn store() -> (SqliteSemanticStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = ConnectionPool::open(&dir.path().join("semantic.db"), 2).await.unwrap();
        let handle = pool.acquire().await.unwrap();
        init_schema(handle.connection()).await.unwrap();
        drop(handle);

        let index_manager = Arc::new(RedbProjectIndexManager::new(dir.path().join("vectors")));
        let embedder = Arc::new(MockEmbedder::new(8));
        let store = SqliteSemanticStore::new(pool, index_manager, embedder, 8);
        (store, dir)
    }

    #[tokio::test]
    async fn add_document_then_search_finds_the_matching_chunk() {
        let (store, _dir) = store().await;
        let doc = store
            .add_document(
                "proj-abc12345",
                "notes.md",
                "markdown",
                "the quick brown fox jumps over the lazy dog",
                4,
                1,
                HashMap::new(),
            )
            .await
            .unwrap();

        let embedding = store.embedder.embed("the quick brown fox").await.unwrap();
        let hits = store.search("proj-abc12345", &embedding, 5, None).await.unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].chunk.doc_id, doc.doc_id);
    }

    #[tokio::test]
    async fn delete_document_is_not_idempotent_on_the_second_call() {
        let (store, _dir) = store().await;
        let doc = store
            .add_document("proj-abc12345", "a.md", "markdown", "hello world", 10, 0, HashMap::new())
            .await
            .unwrap();
        store.delete_document("proj-abc12345", doc.doc_id).await.unwrap();
        assert!(store.delete_document("proj-abc12345", doc.doc_id).await.is_err());
    }

    #[tokio::test]
    async fn get_chunk_by_id_returns_the_stored_embedding() {
        let (store, _dir) = store().await;
        let doc = store
            .add_document("proj-abc12345", "a.md", "markdown", "alpha beta gamma delta", 2, 0, HashMap::new())
            .await
            .unwrap();
        let listed = store.list_documents("proj-abc12345").await.unwrap();
        let (_, chunk_count) = &listed[0];
        assert!(*chunk_count > 0);

        let chunks = store.chunk_rows_for_document("proj-abc12345", doc.doc_id).await.unwrap();
        let chunk = store.get_chunk_by_id("proj-abc12345", chunks[0].chunk_id).await.unwrap();
        assert_eq!(chunk.text, chunks[0].text);
        assert_eq!(chunk.embedding.len(), 8);
    }

    #[tokio::test]
    async fn list_documents_reports_chunk_counts() {
        let (store, _dir) = store().await;
        store
            .add_document(
                "proj-abc12345",
                "a.md",
                "markdown",
                "one two three four five six seven eight",
                4,
                0,
                HashMap::new(),
            )
            .await
            .unwrap();
        let listed = store.list_documents("proj-abc12345").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].1, 2);
    }
}
