//! `libsql`-backed connection pool (C1) and relational/semantic storage
//! backends for the symbolic (C4), episodic (C5) and semantic (C6) memory
//! substrates.
//!
//! [`memory_storage_redb`] supplies the per-project vector index this
//! crate's [`semantic_store::SqliteSemanticStore`] composes with its own
//! relational chunk/document tables, and the root project registry used by
//! [`memory_core::engine::MemoryEngine`].

mod episodic_store;
mod pool;
mod schema;
mod semantic_store;
mod symbolic_store;

use std::path::Path;
use std::sync::Arc;

use memory_core::error::Result;

pub use episodic_store::SqliteEpisodicStore;
pub use pool::{ConnectionPool, PooledHandle};
pub use schema::init_schema;
pub use semantic_store::SqliteSemanticStore;
pub use symbolic_store::SqliteSymbolicStore;

/// Open a pool at `db_path`, run the schema migration, and return it ready
/// for use by [`SqliteSymbolicStore`]/[`SqliteEpisodicStore`].
///
/// # Errors
///
/// Returns a storage-backend error if the database cannot be opened or the
/// schema cannot be created.
pub async fn open_pool(db_path: &Path, pool_size: usize) -> Result<Arc<ConnectionPool>> {
    let pool = ConnectionPool::open(db_path, pool_size).await?;
    let handle = pool.acquire().await?;
    init_schema(handle.connection()).await?;
    drop(handle);
    Ok(pool)
}
