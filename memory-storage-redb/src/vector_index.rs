//! Brute-force cosine-similarity vector index (C3/C6), one `redb` database
//! per project, and the manager that lazily creates and caches them.
//!
//! Grounded on the brute-force `SimpleVectorStore` shape used elsewhere in
//! this codebase's retrieval layer: for the scale a single project's
//! documents realistically reach, a full scan with a partial sort beats
//! the complexity of an approximate index, and it never reports a false
//! negative. `redb` transactions are synchronous, so every transaction
//! runs inside `spawn_blocking`, mirroring the rest of this crate's store
//! operations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use uuid::Uuid;

use memory_core::embeddings::cosine_similarity;
use memory_core::error::{Error, Result};
use memory_core::index::{ProjectIndexManager, VectorIndex};
use memory_core::semantic::{Chunk, SemanticHit};

const CHUNKS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("chunks");

fn join_error(e: tokio::task::JoinError) -> Error {
    Error::Storage(anyhow::anyhow!("vector index task join error: {e}"))
}

/// One project's vector index: a `redb` database holding every chunk this
/// project owns, keyed by chunk id.
pub struct RedbVectorIndex {
    db: Arc<Database>,
}

impl RedbVectorIndex {
    /// Open (creating if absent) the vector index database at `path`.
    ///
    /// # Errors
    ///
    /// Returns a storage-backend error if the database cannot be created or
    /// opened.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(|e| Error::Storage(e.into()))?;
        Ok(Self { db: Arc::new(db) })
    }
}

#[async_trait]
impl VectorIndex for RedbVectorIndex {
    async fn upsert(&self, chunk: &Chunk) -> Result<()> {
        let db = Arc::clone(&self.db);
        let bytes = postcard::to_allocvec(chunk).map_err(|e| Error::Storage(e.into()))?;
        let chunk_id = *chunk.chunk_id.as_bytes();

        tokio::task::spawn_blocking(move || {
            let write_txn = db.begin_write().map_err(|e| Error::Storage(e.into()))?;
            {
                let mut table = write_txn
                    .open_table(CHUNKS_TABLE)
                    .map_err(|e| Error::Storage(e.into()))?;
                table
                    .insert(chunk_id.as_slice(), bytes.as_slice())
                    .map_err(|e| Error::Storage(e.into()))?;
            }
            write_txn.commit().map_err(|e| Error::Storage(e.into()))?;
            Ok::<(), Error>(())
        })
        .await
        .map_err(join_error)??;
        Ok(())
    }

    async fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<SemanticHit>> {
        let db = Arc::clone(&self.db);
        let query_embedding = query_embedding.to_vec();

        let mut scored = tokio::task::spawn_blocking(move || {
            let read_txn = db.begin_read().map_err(|e| Error::Storage(e.into()))?;
            let table = match read_txn.open_table(CHUNKS_TABLE) {
                Ok(table) => table,
                Err(redb::TableError::TableDoesNotExist(_)) => return Ok::<_, Error>(Vec::new()),
                Err(e) => return Err(Error::Storage(e.into())),
            };

            let mut scored = Vec::new();
            for entry in table.iter().map_err(|e| Error::Storage(e.into()))? {
                let (_, value) = entry.map_err(|e| Error::Storage(e.into()))?;
                let chunk: Chunk =
                    postcard::from_bytes(value.value()).map_err(|e| Error::Storage(e.into()))?;
                let score = cosine_similarity(&query_embedding, &chunk.embedding);
                scored.push(SemanticHit { chunk, score });
            }
            Ok(scored)
        })
        .await
        .map_err(join_error)??;

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn remove(&self, chunk_id: Uuid) -> Result<()> {
        let db = Arc::clone(&self.db);
        let chunk_id = *chunk_id.as_bytes();

        tokio::task::spawn_blocking(move || {
            let write_txn = db.begin_write().map_err(|e| Error::Storage(e.into()))?;
            {
                let mut table = write_txn
                    .open_table(CHUNKS_TABLE)
                    .map_err(|e| Error::Storage(e.into()))?;
                table
                    .remove(chunk_id.as_slice())
                    .map_err(|e| Error::Storage(e.into()))?;
            }
            write_txn.commit().map_err(|e| Error::Storage(e.into()))?;
            Ok::<(), Error>(())
        })
        .await
        .map_err(join_error)??;
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let db = Arc::clone(&self.db);
        let count = tokio::task::spawn_blocking(move || {
            let read_txn = db.begin_read().map_err(|e| Error::Storage(e.into()))?;
            match read_txn.open_table(CHUNKS_TABLE) {
                Ok(table) => Ok::<_, Error>(table.len().map_err(|e| Error::Storage(e.into()))?),
                Err(redb::TableError::TableDoesNotExist(_)) => Ok(0),
                Err(e) => Err(Error::Storage(e.into())),
            }
        })
        .await
        .map_err(join_error)??;
        Ok(count as usize)
    }
}

/// Caches one [`RedbVectorIndex`] handle per project, lazily creating the
/// on-disk location at `<data_root>/<project_id>/semantic/vectors.redb` on
/// first access. Mirrors the "cache a client keyed by project, build the
/// directory on demand, remove idempotently" shape this codebase uses for
/// other per-tenant external-client caches.
pub struct RedbProjectIndexManager {
    data_root: PathBuf,
    handles: Mutex<HashMap<String, Arc<RedbVectorIndex>>>,
}

impl RedbProjectIndexManager {
    /// Build a manager rooted at `data_root`. No directories are created
    /// until a project's index is first accessed.
    #[must_use]
    pub fn new(data_root: PathBuf) -> Self {
        Self {
            data_root,
            handles: Mutex::new(HashMap::new()),
        }
    }

    fn index_path(&self, project_id: &str) -> PathBuf {
        self.data_root.join(project_id).join("semantic").join("vectors.redb")
    }
}

#[async_trait]
impl ProjectIndexManager for RedbProjectIndexManager {
    async fn index_for(&self, project_id: &str) -> Result<Arc<dyn VectorIndex>> {
        if let Some(existing) = self.handles.lock().get(project_id) {
            return Ok(existing.clone());
        }
        let path = self.index_path(project_id);
        let index = Arc::new(RedbVectorIndex::open(&path)?);
        self.handles.lock().insert(project_id.to_string(), index.clone());
        Ok(index)
    }

    async fn remove(&self, project_id: &str) -> Result<()> {
        self.handles.lock().remove(project_id);
        let path = self.index_path(project_id);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as StdHashMap;

    use super::*;

    fn chunk(text: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            chunk_id: Uuid::new_v4(),
            doc_id: Uuid::new_v4(),
            project_id: "proj-abc12345".into(),
            text: text.into(),
            ordinal: 0,
            embedding,
            metadata: StdHashMap::new(),
        }
    }

    #[tokio::test]
    async fn upsert_then_search_returns_the_closest_vector_first() {
        let dir = tempfile::tempdir().unwrap();
        let index = RedbVectorIndex::open(&dir.path().join("v.redb")).unwrap();
        index.upsert(&chunk("close", vec![1.0, 0.0, 0.0])).await.unwrap();
        index.upsert(&chunk("far", vec![0.0, 1.0, 0.0])).await.unwrap();

        let hits = index.search(&[1.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "close");
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let index = RedbVectorIndex::open(&dir.path().join("v.redb")).unwrap();
        let c = chunk("x", vec![1.0, 0.0]);
        index.upsert(&c).await.unwrap();
        index.remove(c.chunk_id).await.unwrap();
        index.remove(c.chunk_id).await.unwrap();
        assert_eq!(index.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn manager_caches_handles_and_isolates_projects() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RedbProjectIndexManager::new(dir.path().to_path_buf());

        let idx_a = manager.index_for("proj-a-aaaaaaaa").await.unwrap();
        idx_a.upsert(&chunk("a-only", vec![1.0, 0.0])).await.unwrap();

        let idx_b = manager.index_for("proj-b-bbbbbbbb").await.unwrap();
        assert_eq!(idx_b.len().await.unwrap(), 0);

        let idx_a_again = manager.index_for("proj-a-aaaaaaaa").await.unwrap();
        assert_eq!(idx_a_again.len().await.unwrap(), 1);

        manager.remove("proj-a-aaaaaaaa").await.unwrap();
        assert!(!dir.path().join("proj-a-aaaaaaaa/semantic/vectors.redb").exists());
    }
}
