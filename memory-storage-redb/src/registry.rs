//! Root project registry (C10): a single `redb` database independent of any
//! per-project store, so `proj.list` never requires opening every project's
//! database.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};

use memory_core::error::{Error, Result};
use memory_core::project::{validate_project_id, Project};
use memory_core::registry::ProjectRegistry;

const PROJECTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("projects");

fn join_error(e: tokio::task::JoinError) -> Error {
    Error::Storage(anyhow::anyhow!("project registry task join error: {e}"))
}

/// `redb`-backed [`ProjectRegistry`].
pub struct RedbProjectRegistry {
    db: Arc<Database>,
}

impl RedbProjectRegistry {
    /// Open (creating if absent) the registry database at `path`.
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
impl ProjectRegistry for RedbProjectRegistry {
    async fn register(&self, project_id: &str) -> Result<Project> {
        validate_project_id(project_id)?;

        let db = Arc::clone(&self.db);
        let project_id = project_id.to_string();
        let now = Utc::now();

        tokio::task::spawn_blocking(move || {
            let write_txn = db.begin_write().map_err(|e| Error::Storage(e.into()))?;
            let project = {
                let mut table = write_txn
                    .open_table(PROJECTS_TABLE)
                    .map_err(|e| Error::Storage(e.into()))?;
                if let Some(existing) =
                    table.get(project_id.as_str()).map_err(|e| Error::Storage(e.into()))?
                {
                    postcard::from_bytes(existing.value()).map_err(|e| Error::Storage(e.into()))?
                } else {
                    let project = Project {
                        project_id: project_id.clone(),
                        created_at: now,
                    };
                    let bytes =
                        postcard::to_allocvec(&project).map_err(|e| Error::Storage(e.into()))?;
                    table
                        .insert(project_id.as_str(), bytes.as_slice())
                        .map_err(|e| Error::Storage(e.into()))?;
                    project
                }
            };
            write_txn.commit().map_err(|e| Error::Storage(e.into()))?;
            Ok::<Project, Error>(project)
        })
        .await
        .map_err(join_error)?
    }

    async fn list(&self) -> Result<Vec<Project>> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let read_txn = db.begin_read().map_err(|e| Error::Storage(e.into()))?;
            let table = match read_txn.open_table(PROJECTS_TABLE) {
                Ok(table) => table,
                Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
                Err(e) => return Err(Error::Storage(e.into())),
            };

            let mut projects = Vec::new();
            for entry in table.iter().map_err(|e| Error::Storage(e.into()))? {
                let (_, value) = entry.map_err(|e| Error::Storage(e.into()))?;
                let project: Project =
                    postcard::from_bytes(value.value()).map_err(|e| Error::Storage(e.into()))?;
                projects.push(project);
            }
            projects.sort_by(|a: &Project, b: &Project| a.created_at.cmp(&b.created_at));
            Ok(projects)
        })
        .await
        .map_err(join_error)?
    }

    async fn remove(&self, project_id: &str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let project_id = project_id.to_string();
        tokio::task::spawn_blocking(move || {
            let write_txn = db.begin_write().map_err(|e| Error::Storage(e.into()))?;
            {
                let mut table = write_txn
                    .open_table(PROJECTS_TABLE)
                    .map_err(|e| Error::Storage(e.into()))?;
                table.remove(project_id.as_str()).map_err(|e| Error::Storage(e.into()))?;
            }
            write_txn.commit().map_err(|e| Error::Storage(e.into()))?;
            Ok::<(), Error>(())
        })
        .await
        .map_err(join_error)??;
        Ok(())
    }

    async fn contains(&self, project_id: &str) -> Result<bool> {
        let db = Arc::clone(&self.db);
        let project_id = project_id.to_string();
        tokio::task::spawn_blocking(move || {
            let read_txn = db.begin_read().map_err(|e| Error::Storage(e.into()))?;
            match read_txn.open_table(PROJECTS_TABLE) {
                Ok(table) => {
                    Ok(table.get(project_id.as_str()).map_err(|e| Error::Storage(e.into()))?.is_some())
                }
                Err(redb::TableError::TableDoesNotExist(_)) => Ok(false),
                Err(e) => Err(Error::Storage(e.into())),
            }
        })
        .await
        .map_err(join_error)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_is_idempotent_and_first_write_wins_the_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RedbProjectRegistry::open(&dir.path().join("registry.redb")).unwrap();

        let first = registry.register("proj-abc12345").await.unwrap();
        let second = registry.register("proj-abc12345").await.unwrap();
        assert_eq!(first.created_at, second.created_at);
    }

    #[tokio::test]
    async fn list_returns_every_registered_project() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RedbProjectRegistry::open(&dir.path().join("registry.redb")).unwrap();

        registry.register("proj-aaa12345").await.unwrap();
        registry.register("proj-bbb12345").await.unwrap();

        let listed = registry.list().await.unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RedbProjectRegistry::open(&dir.path().join("registry.redb")).unwrap();

        registry.register("proj-abc12345").await.unwrap();
        registry.remove("proj-abc12345").await.unwrap();
        registry.remove("proj-abc12345").await.unwrap();

        assert!(!registry.contains("proj-abc12345").await.unwrap());
    }

    #[tokio::test]
    async fn register_rejects_an_invalid_project_id() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RedbProjectRegistry::open(&dir.path().join("registry.redb")).unwrap();
        assert!(registry.register("Not Valid").await.is_err());
    }
}
