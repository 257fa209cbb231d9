//! Project Index Manager (C3): owns per-project vector index handles.

use async_trait::async_trait;

use crate::error::Result;
use crate::semantic::{Chunk, SemanticHit};

/// A single project's vector index. Configured for cosine distance;
/// isolated from every other project's index by construction (a distinct
/// on-disk location per project).
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite a chunk's vector.
    ///
    /// # Errors
    ///
    /// Returns a storage-backend error on I/O failure.
    async fn upsert(&self, chunk: &Chunk) -> Result<()>;

    /// Brute-force cosine-similarity search, returning up to `top_k` hits
    /// sorted by score descending.
    ///
    /// # Errors
    ///
    /// Returns a storage-backend error on I/O failure.
    async fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<SemanticHit>>;

    /// Remove a single chunk's vector. Idempotent: removing an absent
    /// `chunk_id` is not an error.
    ///
    /// # Errors
    ///
    /// Returns a storage-backend error on I/O failure.
    async fn remove(&self, chunk_id: uuid::Uuid) -> Result<()>;

    /// Number of vectors currently held.
    ///
    /// # Errors
    ///
    /// Returns a storage-backend error on I/O failure.
    async fn len(&self) -> Result<usize>;
}

/// Owns the lazily-created, per-project [`VectorIndex`] handles. Grounded
/// on the same "cache a handle keyed by project, create on first access,
/// remove idempotently" shape used throughout this codebase's client-cache
/// components.
#[async_trait]
pub trait ProjectIndexManager: Send + Sync {
    /// Return the vector index for `project_id`, creating its on-disk
    /// location on first access.
    ///
    /// # Errors
    ///
    /// Returns a storage-backend error if the index cannot be created or
    /// opened.
    async fn index_for(&self, project_id: &str) -> Result<std::sync::Arc<dyn VectorIndex>>;

    /// Drop the cached handle and remove the project's on-disk index.
    /// Idempotent: removing a project with no index yet created succeeds.
    ///
    /// # Errors
    ///
    /// Returns a storage-backend error on I/O failure.
    async fn remove(&self, project_id: &str) -> Result<()>;
}
