//! Semantic store (C6): chunked documents with dense vectors.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// A source document that has been split into chunks and embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Opaque stable identifier.
    pub doc_id: Uuid,
    /// Tenant this document belongs to.
    pub project_id: String,
    /// Caller-supplied path or name identifying the source.
    pub source_path: String,
    /// Caller-supplied type tag, e.g. `"markdown"`, `"code"`.
    pub source_type: String,
    /// Free-form metadata propagated onto every chunk.
    pub metadata: HashMap<String, String>,
    /// When this document was ingested.
    pub ingested_at: DateTime<Utc>,
}

/// A contiguous text slice from a document, with its dense embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Opaque stable identifier.
    pub chunk_id: Uuid,
    /// The document this chunk was produced from.
    pub doc_id: Uuid,
    /// Tenant this chunk belongs to; always equal to the owning document's.
    pub project_id: String,
    /// The textual slice.
    pub text: String,
    /// Position within the document, contiguous from 0.
    pub ordinal: usize,
    /// Dense embedding of [`Chunk::text`]; length equals the store's
    /// configured dimension.
    pub embedding: Vec<f32>,
    /// Inherited from the document plus `chunk_index`/`total_chunks`.
    pub metadata: HashMap<String, String>,
}

/// One hit from [`SemanticStore::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticHit {
    /// The matching chunk.
    pub chunk: Chunk,
    /// Raw cosine similarity in `[-1, 1]`.
    pub score: f32,
}

/// Split `text` into overlapping word-window chunks.
///
/// `stride = chunk_size - chunk_overlap` must be at least 1; callers are
/// expected to validate `chunk_overlap < chunk_size` before calling this
/// (the component design treats both as fixed configuration, not
/// per-request input). Empty chunks (e.g. from trailing whitespace) are
/// dropped. The returned chunks' texts, rejoined with single spaces and
/// overlap removed, cover every word of `text` — no word is skipped.
#[must_use]
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    let stride = chunk_size.saturating_sub(chunk_overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + chunk_size).min(words.len());
        let slice = words[start..end].join(" ");
        if !slice.is_empty() {
            chunks.push(slice);
        }
        if end == words.len() {
            break;
        }
        start += stride;
    }
    chunks
}

/// Metadata predicate applied post-search in [`SemanticStore::search`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    /// Every `(key, value)` pair here must match a chunk's metadata.
    pub equals: HashMap<String, String>,
}

/// Storage-backend contract for the semantic memory substrate. A concrete
/// implementation composes a relational store for chunk/document rows with
/// a vector index obtained from a [`crate::index::ProjectIndexManager`]
/// (C3).
#[async_trait]
pub trait SemanticStore: Send + Sync {
    /// Chunk, embed and store `text` as a new document.
    ///
    /// All-or-nothing: if any produced chunk's embedding dimension does not
    /// match the store's configured dimension, the entire document is
    /// rejected and nothing is persisted.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Corruption`] if an embedding's
    /// dimension does not match the expected dimension.
    async fn add_document(
        &self,
        project_id: &str,
        source_path: &str,
        source_type: &str,
        text: &str,
        chunk_size: usize,
        chunk_overlap: usize,
        metadata: HashMap<String, String>,
    ) -> Result<Document>;

    /// Cosine-similarity search within `project_id`'s vector index,
    /// post-filtered by `filter`, returning up to `top_k` hits sorted by
    /// score descending.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::InvalidInput`] if `query_embedding`'s
    /// length does not match the store's configured dimension.
    async fn search(
        &self,
        project_id: &str,
        query_embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SemanticHit>>;

    /// Remove a document, all its chunks, and all their vectors atomically.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::NotFound`] if `doc_id` does not exist
    /// in `project_id`. Calling this twice on the same `doc_id` therefore
    /// succeeds once and then returns `NotFound`.
    async fn delete_document(&self, project_id: &str, doc_id: Uuid) -> Result<()>;

    /// Exact chunk fetch by id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::NotFound`] if no such chunk exists in
    /// `project_id`.
    async fn get_chunk_by_id(&self, project_id: &str, chunk_id: Uuid) -> Result<Chunk>;

    /// Inventory of documents in this project, for `src.list`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::InvalidInput`] if `project_id` fails
    /// validation.
    async fn list_documents(&self, project_id: &str) -> Result<Vec<(Document, usize)>>;

    /// Remove every document, chunk and vector belonging to `project_id`.
    ///
    /// # Errors
    ///
    /// Returns a storage-backend error on I/O failure.
    async fn delete_project(&self, project_id: &str) -> Result<()>;
}

/// Validate that `embedding` has exactly `expected_dim` components.
///
/// # Errors
///
/// Returns [`Error::Corruption`] naming `project_id` if the dimensions
/// differ.
pub fn validate_embedding_dimension(
    project_id: &str,
    embedding: &[f32],
    expected_dim: usize,
) -> Result<()> {
    if embedding.len() == expected_dim {
        Ok(())
    } else {
        Err(Error::Corruption {
            project_id: project_id.to_string(),
            detail: format!(
                "embedding dimension {} does not match configured dimension {expected_dim}",
                embedding.len()
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_text_covers_every_word_with_overlap() {
        let words: Vec<String> = (0..1200).map(|i| format!("w{i}")).collect();
        let text = words.join(" ");
        let chunks = chunk_text(&text, 500, 50);
        assert!(!chunks.is_empty());
        // First word of the document must appear in the first chunk.
        assert!(chunks[0].starts_with("w0 "));
        // Last word of the document must appear in the last chunk.
        assert!(chunks.last().unwrap().ends_with("w1199"));
    }

    #[test]
    fn chunk_text_on_empty_input_yields_no_chunks() {
        assert!(chunk_text("   ", 500, 50).is_empty());
    }

    #[test]
    fn chunk_text_on_short_input_yields_one_chunk() {
        let chunks = chunk_text("just a few words here", 500, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "just a few words here");
    }

    #[test]
    fn validate_embedding_dimension_rejects_mismatch() {
        let err = validate_embedding_dimension("proj-deadbeef", &[0.1, 0.2], 384).unwrap_err();
        assert!(err.is_corruption());
    }
}
