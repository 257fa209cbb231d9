//! Project Registry (C10): the root-level map of known projects.

use async_trait::async_trait;

use crate::error::Result;
use crate::project::Project;

/// Backs `proj.list` and the first/last step of project deletion. Stored
/// separately from any per-project database so that listing projects never
/// requires opening every project's store.
#[async_trait]
pub trait ProjectRegistry: Send + Sync {
    /// Record `project_id` as known, first-write-wins on the creation
    /// timestamp. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::InvalidInput`] if `project_id` fails
    /// validation.
    async fn register(&self, project_id: &str) -> Result<Project>;

    /// All known projects.
    ///
    /// # Errors
    ///
    /// Returns a storage-backend error on I/O failure.
    async fn list(&self) -> Result<Vec<Project>>;

    /// Remove `project_id` from the registry. Called before cascading
    /// deletion into the symbolic/episodic/semantic stores, so a crash
    /// mid-cascade never leaves an orphaned registry entry pointing at a
    /// half-deleted project. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a storage-backend error on I/O failure.
    async fn remove(&self, project_id: &str) -> Result<()>;

    /// Whether `project_id` is currently registered.
    ///
    /// # Errors
    ///
    /// Returns a storage-backend error on I/O failure.
    async fn contains(&self, project_id: &str) -> Result<bool>;
}
