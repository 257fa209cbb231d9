//! `SqliteSymbolicStore` (C4): the relational implementation of
//! [`memory_core::symbolic::SymbolicStore`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use memory_core::error::{Error, Result};
use memory_core::project::validate_project_id;
use memory_core::symbolic::{
    clip_confidence, AddFactOutcome, Fact, FactFilter, FactHistoryEntry, Source, SymbolicStore,
};

use crate::pool::ConnectionPool;

fn validate_nonempty(label: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(Error::InvalidInput(format!("{label} must not be empty")))
    } else {
        Ok(())
    }
}

fn source_to_str(source: Source) -> &'static str {
    match source {
        Source::Import => "import",
        Source::Extractor => "extractor",
        Source::Agent => "agent",
        Source::User => "user",
    }
}

fn source_from_str(raw: &str) -> Result<Source> {
    match raw {
        "import" => Ok(Source::Import),
        "extractor" => Ok(Source::Extractor),
        "agent" => Ok(Source::Agent),
        "user" => Ok(Source::User),
        other => Err(Error::Storage(anyhow::anyhow!("unknown fact source {other:?}"))),
    }
}

fn row_to_fact(row: &libsql::Row) -> Result<Fact> {
    let id: String = row.get(0).map_err(|e| Error::Storage(e.into()))?;
    let project_id: String = row.get(1).map_err(|e| Error::Storage(e.into()))?;
    let scope: String = row.get(2).map_err(|e| Error::Storage(e.into()))?;
    let category: String = row.get(3).map_err(|e| Error::Storage(e.into()))?;
    let key: String = row.get(4).map_err(|e| Error::Storage(e.into()))?;
    let value: String = row.get(5).map_err(|e| Error::Storage(e.into()))?;
    let confidence: f64 = row.get(6).map_err(|e| Error::Storage(e.into()))?;
    let source: String = row.get(7).map_err(|e| Error::Storage(e.into()))?;
    let created_at: i64 = row.get(8).map_err(|e| Error::Storage(e.into()))?;
    let updated_at: i64 = row.get(9).map_err(|e| Error::Storage(e.into()))?;

    Ok(Fact {
        id: Uuid::parse_str(&id).map_err(|e| Error::Storage(e.into()))?,
        project_id,
        scope,
        category,
        key,
        value,
        confidence: confidence as f32,
        source: source_from_str(&source)?,
        created_at: DateTime::from_timestamp(created_at, 0).unwrap_or_default(),
        updated_at: DateTime::from_timestamp(updated_at, 0).unwrap_or_default(),
        history: Vec::new(),
    })
}

fn row_to_history_entry(row: &libsql::Row) -> Result<FactHistoryEntry> {
    let at: i64 = row.get(0).map_err(|e| Error::Storage(e.into()))?;
    let prev_value: String = row.get(1).map_err(|e| Error::Storage(e.into()))?;
    let prev_confidence: f64 = row.get(2).map_err(|e| Error::Storage(e.into()))?;
    let reason: String = row.get(3).map_err(|e| Error::Storage(e.into()))?;
    Ok(FactHistoryEntry {
        at: DateTime::from_timestamp(at, 0).unwrap_or_default(),
        prev_value,
        prev_confidence: prev_confidence as f32,
        reason,
    })
}

/// Relational, `libsql`-backed symbolic store.
pub struct SqliteSymbolicStore {
    pool: Arc<ConnectionPool>,
}

impl SqliteSymbolicStore {
    /// Wrap an already-initialized connection pool.
    #[must_use]
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    async fn load_history(&self, fact_id: Uuid) -> Result<Vec<FactHistoryEntry>> {
        let handle = self.pool.acquire().await?;
        let mut rows = handle
            .connection()
            .query(
                "SELECT at, prev_value, prev_confidence, reason FROM fact_history \
                 WHERE fact_id = ? ORDER BY at ASC",
                libsql::params![fact_id.to_string()],
            )
            .await
            .map_err(|e| Error::Storage(e.into()))?;

        let mut history = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.into()))? {
            history.push(row_to_history_entry(&row)?);
        }
        Ok(history)
    }

    async fn find_active(
        &self,
        project_id: &str,
        scope: &str,
        category: &str,
        key: &str,
    ) -> Result<Option<Fact>> {
        let handle = self.pool.acquire().await?;
        let mut rows = handle
            .connection()
            .query(
                "SELECT id, project_id, scope, category, key, value, confidence, source, \
                 created_at, updated_at FROM facts \
                 WHERE project_id = ? AND scope = ? AND category = ? AND key = ?",
                libsql::params![project_id, scope, category, key],
            )
            .await
            .map_err(|e| Error::Storage(e.into()))?;

        match rows.next().await.map_err(|e| Error::Storage(e.into()))? {
            Some(row) => Ok(Some(row_to_fact(&row)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SymbolicStore for SqliteSymbolicStore {
    async fn add_fact(
        &self,
        project_id: &str,
        scope: &str,
        category: &str,
        key: &str,
        value: &str,
        confidence: f32,
        source: Source,
    ) -> Result<AddFactOutcome> {
        validate_project_id(project_id)?;
        validate_nonempty("scope", scope)?;
        validate_nonempty("category", category)?;
        validate_nonempty("key", key)?;

        let confidence = clip_confidence(confidence);
        let now = Utc::now();
        let existing = self.find_active(project_id, scope, category, key).await?;

        let handle = self.pool.acquire().await?;

        let (fact, replaced) = match existing {
            None => {
                let id = Uuid::new_v4();
                handle
                    .connection()
                    .execute(
                        "INSERT INTO facts (id, project_id, scope, category, key, value, \
                         confidence, source, created_at, updated_at) \
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                        libsql::params![
                            id.to_string(),
                            project_id,
                            scope,
                            category,
                            key,
                            value,
                            f64::from(confidence),
                            source_to_str(source),
                            now.timestamp(),
                            now.timestamp(),
                        ],
                    )
                    .await
                    .map_err(|e| Error::Storage(e.into()))?;

                let fact = Fact {
                    id,
                    project_id: project_id.to_string(),
                    scope: scope.to_string(),
                    category: category.to_string(),
                    key: key.to_string(),
                    value: value.to_string(),
                    confidence,
                    source,
                    created_at: now,
                    updated_at: now,
                    history: Vec::new(),
                };
                (fact, false)
            }
            Some(active) => {
                let should_replace =
                    confidence > active.confidence || (confidence == active.confidence && source >= active.source);

                let reason = if should_replace { "replaced" } else { "observed_and_rejected" };
                handle
                    .connection()
                    .execute(
                        "INSERT INTO fact_history (fact_id, project_id, at, prev_value, \
                         prev_confidence, reason) VALUES (?, ?, ?, ?, ?, ?)",
                        libsql::params![
                            active.id.to_string(),
                            project_id,
                            now.timestamp(),
                            active.value.clone(),
                            f64::from(active.confidence),
                            reason,
                        ],
                    )
                    .await
                    .map_err(|e| Error::Storage(e.into()))?;

                if should_replace {
                    handle
                        .connection()
                        .execute(
                            "UPDATE facts SET value = ?, confidence = ?, source = ?, \
                             updated_at = ? WHERE id = ?",
                            libsql::params![
                                value,
                                f64::from(confidence),
                                source_to_str(source),
                                now.timestamp(),
                                active.id.to_string(),
                            ],
                        )
                        .await
                        .map_err(|e| Error::Storage(e.into()))?;

                    let fact = Fact {
                        value: value.to_string(),
                        confidence,
                        source,
                        updated_at: now,
                        ..active
                    };
                    (fact, true)
                } else {
                    (active, false)
                }
            }
        };

        drop(handle);
        let history = self.load_history(fact.id).await?;
        debug!(project_id, scope, category, key, replaced, "fact upserted");
        Ok(AddFactOutcome { fact: Fact { history, ..fact }, replaced })
    }

    async fn query_facts(&self, project_id: &str, filter: &FactFilter) -> Result<Vec<Fact>> {
        validate_project_id(project_id)?;

        let mut sql = String::from(
            "SELECT id, project_id, scope, category, key, value, confidence, source, \
             created_at, updated_at FROM facts WHERE project_id = ?",
        );
        let mut params: Vec<libsql::Value> = vec![project_id.to_string().into()];

        if let Some(scope) = &filter.scope {
            sql.push_str(" AND scope = ?");
            params.push(scope.clone().into());
        }
        if let Some(category) = &filter.category {
            sql.push_str(" AND category = ?");
            params.push(category.clone().into());
        }
        if let Some(key) = &filter.key {
            sql.push_str(" AND key = ?");
            params.push(key.clone().into());
        }
        if let Some(min_confidence) = filter.min_confidence {
            sql.push_str(" AND confidence >= ?");
            params.push(f64::from(min_confidence).into());
        }
        sql.push_str(" ORDER BY confidence DESC, updated_at DESC");

        let handle = self.pool.acquire().await?;
        let mut rows = handle
            .connection()
            .query(&sql, libsql::params_from_iter(params))
            .await
            .map_err(|e| Error::Storage(e.into()))?;

        let mut facts = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.into()))? {
            facts.push(row_to_fact(&row)?);
        }
        drop(handle);

        for fact in &mut facts {
            fact.history = self.load_history(fact.id).await?;
        }
        Ok(facts)
    }

    async fn list_scopes(&self, project_id: &str) -> Result<Vec<String>> {
        validate_project_id(project_id)?;
        let handle = self.pool.acquire().await?;
        let mut rows = handle
            .connection()
            .query(
                "SELECT DISTINCT scope FROM facts WHERE project_id = ? ORDER BY scope ASC",
                libsql::params![project_id],
            )
            .await
            .map_err(|e| Error::Storage(e.into()))?;

        let mut scopes = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.into()))? {
            scopes.push(row.get::<String>(0).map_err(|e| Error::Storage(e.into()))?);
        }
        Ok(scopes)
    }

    async fn list_categories(&self, project_id: &str, scope: &str) -> Result<Vec<String>> {
        validate_project_id(project_id)?;
        let handle = self.pool.acquire().await?;
        let mut rows = handle
            .connection()
            .query(
                "SELECT DISTINCT category FROM facts WHERE project_id = ? AND scope = ? \
                 ORDER BY category ASC",
                libsql::params![project_id, scope],
            )
            .await
            .map_err(|e| Error::Storage(e.into()))?;

        let mut categories = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.into()))? {
            categories.push(row.get::<String>(0).map_err(|e| Error::Storage(e.into()))?);
        }
        Ok(categories)
    }

    async fn delete_fact(&self, project_id: &str, id: Uuid) -> Result<()> {
        validate_project_id(project_id)?;
        let handle = self.pool.acquire().await?;

        let mut rows = handle
            .connection()
            .query(
                "SELECT value, confidence FROM facts WHERE id = ? AND project_id = ?",
                libsql::params![id.to_string(), project_id],
            )
            .await
            .map_err(|e| Error::Storage(e.into()))?;

        let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.into()))? else {
            return Err(Error::fact_not_found(id));
        };
        let prev_value: String = row.get(0).map_err(|e| Error::Storage(e.into()))?;
        let prev_confidence: f64 = row.get(1).map_err(|e| Error::Storage(e.into()))?;

        handle
            .connection()
            .execute(
                "INSERT INTO fact_history (fact_id, project_id, at, prev_value, \
                 prev_confidence, reason) VALUES (?, ?, ?, ?, ?, 'deleted')",
                libsql::params![id.to_string(), project_id, Utc::now().timestamp(), prev_value, prev_confidence],
            )
            .await
            .map_err(|e| Error::Storage(e.into()))?;

        handle
            .connection()
            .execute(
                "DELETE FROM facts WHERE id = ? AND project_id = ?",
                libsql::params![id.to_string(), project_id],
            )
            .await
            .map_err(|e| Error::Storage(e.into()))?;
        Ok(())
    }

    async fn delete_project(&self, project_id: &str) -> Result<()> {
        let handle = self.pool.acquire().await?;
        handle
            .connection()
            .execute("DELETE FROM facts WHERE project_id = ?", libsql::params![project_id])
            .await
            .map_err(|e| Error::Storage(e.into()))?;
        handle
            .connection()
            .execute(
                "DELETE FROM fact_history WHERE project_id = ?",
                libsql::params![project_id],
            )
            .await
            .map_err(|e| Error::Storage(e.into()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_schema;

    async fn store() -> (SqliteSymbolicStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = ConnectionPool::open(&dir.path().join("facts.db"), 2).await.unwrap();
        let handle = pool.acquire().await.unwrap();
        init_schema(handle.connection()).await.unwrap();
        drop(handle);
        (SqliteSymbolicStore::new(pool), dir)
    }

    #[tokio::test]
    async fn higher_confidence_replaces_the_active_row() {
        let (store, _dir) = store().await;
        store
            .add_fact("proj-abc12345", "user", "preference", "editor", "vim", 0.5, Source::Agent)
            .await
            .unwrap();
        let outcome = store
            .add_fact("proj-abc12345", "user", "preference", "editor", "emacs", 0.9, Source::Agent)
            .await
            .unwrap();
        assert!(outcome.replaced);
        assert_eq!(outcome.fact.value, "emacs");
        assert_eq!(outcome.fact.history.len(), 1);
    }

    #[tokio::test]
    async fn lower_confidence_is_recorded_but_not_applied() {
        let (store, _dir) = store().await;
        store
            .add_fact("proj-abc12345", "user", "preference", "editor", "vim", 0.9, Source::Agent)
            .await
            .unwrap();
        let outcome = store
            .add_fact("proj-abc12345", "user", "preference", "editor", "emacs", 0.3, Source::Agent)
            .await
            .unwrap();
        assert!(!outcome.replaced);
        assert_eq!(outcome.fact.value, "vim");
        assert_eq!(outcome.fact.history.len(), 1);
    }

    #[tokio::test]
    async fn delete_fact_is_not_idempotent_on_the_second_call() {
        let (store, _dir) = store().await;
        let outcome = store
            .add_fact("proj-abc12345", "user", "preference", "editor", "vim", 0.9, Source::Agent)
            .await
            .unwrap();
        store.delete_fact("proj-abc12345", outcome.fact.id).await.unwrap();
        assert!(store.delete_fact("proj-abc12345", outcome.fact.id).await.is_err());
    }

    #[tokio::test]
    async fn delete_project_only_touches_that_project() {
        let (store, _dir) = store().await;
        store
            .add_fact("proj-aaa12345", "user", "preference", "editor", "vim", 0.9, Source::Agent)
            .await
            .unwrap();
        store
            .add_fact("proj-bbb12345", "user", "preference", "editor", "emacs", 0.9, Source::Agent)
            .await
            .unwrap();

        store.delete_project("proj-aaa12345").await.unwrap();

        assert!(store
            .query_facts("proj-aaa12345", &FactFilter::default())
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            store.query_facts("proj-bbb12345", &FactFilter::default()).await.unwrap().len(),
            1
        );
    }
}
