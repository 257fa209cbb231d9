//! `SqliteEpisodicStore` (C5): the relational implementation of
//! [`memory_core::episodic::EpisodicStore`], with fingerprint-based
//! deduplication windowed by [`DeduplicationMode`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use memory_core::config::DeduplicationMode;
use memory_core::episodic::{
    fingerprint, AddEpisodeOutcome, Episode, EpisodeFilter, EpisodicStore, LessonType,
};
use memory_core::error::{Error, Result};
use memory_core::project::validate_project_id;

use crate::pool::ConnectionPool;

fn lesson_type_to_str(lesson_type: LessonType) -> &'static str {
    match lesson_type {
        LessonType::Pattern => "pattern",
        LessonType::Antipattern => "antipattern",
        LessonType::Procedure => "procedure",
        LessonType::Warning => "warning",
    }
}

fn lesson_type_from_str(raw: &str) -> Result<LessonType> {
    match raw {
        "pattern" => Ok(LessonType::Pattern),
        "antipattern" => Ok(LessonType::Antipattern),
        "procedure" => Ok(LessonType::Procedure),
        "warning" => Ok(LessonType::Warning),
        other => Err(Error::Storage(anyhow::anyhow!("unknown lesson type {other:?}"))),
    }
}

/// A candidate row found by a dedup-window lookup: enough to decide whether
/// it falls inside the active window, and enough to bump it if it does.
struct DedupCandidate {
    id: Uuid,
    created_at: DateTime<Utc>,
    session_id: Option<String>,
    ref_count: u32,
}

fn row_to_episode(row: &libsql::Row) -> Result<Episode> {
    let id: String = row.get(0).map_err(|e| Error::Storage(e.into()))?;
    let project_id: String = row.get(1).map_err(|e| Error::Storage(e.into()))?;
    let created_at: i64 = row.get(2).map_err(|e| Error::Storage(e.into()))?;
    let situation: String = row.get(3).map_err(|e| Error::Storage(e.into()))?;
    let action: String = row.get(4).map_err(|e| Error::Storage(e.into()))?;
    let outcome: String = row.get(5).map_err(|e| Error::Storage(e.into()))?;
    let lesson: String = row.get(6).map_err(|e| Error::Storage(e.into()))?;
    let lesson_type: String = row.get(7).map_err(|e| Error::Storage(e.into()))?;
    let confidence: f64 = row.get(8).map_err(|e| Error::Storage(e.into()))?;
    let quality: f64 = row.get(9).map_err(|e| Error::Storage(e.into()))?;
    let fingerprint: String = row.get(10).map_err(|e| Error::Storage(e.into()))?;
    let ref_count: i64 = row.get(11).map_err(|e| Error::Storage(e.into()))?;

    Ok(Episode {
        id: Uuid::parse_str(&id).map_err(|e| Error::Storage(e.into()))?,
        project_id,
        created_at: DateTime::from_timestamp(created_at, 0).unwrap_or_default(),
        situation,
        action,
        outcome,
        lesson,
        lesson_type: lesson_type_from_str(&lesson_type)?,
        confidence: confidence as f32,
        quality: quality as f32,
        fingerprint,
        ref_count: ref_count as u32,
    })
}

/// Relational, `libsql`-backed episodic store.
pub struct SqliteEpisodicStore {
    pool: Arc<ConnectionPool>,
}

impl SqliteEpisodicStore {
    /// Wrap an already-initialized connection pool.
    #[must_use]
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    /// Find the most recent row sharing `fingerprint` in this project,
    /// regardless of window — callers decide whether it falls inside the
    /// active window.
    async fn find_latest_by_fingerprint(
        &self,
        project_id: &str,
        fingerprint: &str,
    ) -> Result<Option<DedupCandidate>> {
        let handle = self.pool.acquire().await?;
        let mut rows = handle
            .connection()
            .query(
                "SELECT id, created_at, session_id, ref_count FROM episodes \
                 WHERE project_id = ? AND fingerprint = ? ORDER BY created_at DESC LIMIT 1",
                libsql::params![project_id, fingerprint],
            )
            .await
            .map_err(|e| Error::Storage(e.into()))?;

        let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.into()))? else {
            return Ok(None);
        };
        let id: String = row.get(0).map_err(|e| Error::Storage(e.into()))?;
        let created_at: i64 = row.get(1).map_err(|e| Error::Storage(e.into()))?;
        let session_id: Option<String> = row.get(2).map_err(|e| Error::Storage(e.into()))?;
        let ref_count: i64 = row.get(3).map_err(|e| Error::Storage(e.into()))?;

        Ok(Some(DedupCandidate {
            id: Uuid::parse_str(&id).map_err(|e| Error::Storage(e.into()))?,
            created_at: DateTime::from_timestamp(created_at, 0).unwrap_or_default(),
            session_id,
            ref_count: ref_count as u32,
        }))
    }

    async fn load_episode(&self, id: Uuid) -> Result<Episode> {
        let handle = self.pool.acquire().await?;
        let mut rows = handle
            .connection()
            .query(
                "SELECT id, project_id, created_at, situation, action, outcome, lesson, \
                 lesson_type, confidence, quality, fingerprint, ref_count FROM episodes \
                 WHERE id = ?",
                libsql::params![id.to_string()],
            )
            .await
            .map_err(|e| Error::Storage(e.into()))?;
        let row = rows
            .next()
            .await
            .map_err(|e| Error::Storage(e.into()))?
            .ok_or_else(|| Error::not_found("episode", id))?;
        row_to_episode(&row)
    }
}

/// Whether `candidate` falls inside `mode`'s active window relative to
/// `now`/`session_id`.
fn candidate_in_window(
    candidate: &DedupCandidate,
    mode: DeduplicationMode,
    now: DateTime<Utc>,
    session_id: Option<&str>,
) -> bool {
    match mode {
        DeduplicationMode::Global => true,
        DeduplicationMode::PerDay => candidate.created_at.date_naive() == now.date_naive(),
        DeduplicationMode::PerSession => match session_id {
            Some(sid) => candidate.session_id.as_deref() == Some(sid),
            None => false,
        },
    }
}

#[async_trait]
impl EpisodicStore for SqliteEpisodicStore {
    async fn add_episode(
        &self,
        project_id: &str,
        episode: Episode,
        mode: DeduplicationMode,
        session_id: Option<&str>,
    ) -> Result<AddEpisodeOutcome> {
        validate_project_id(project_id)?;

        let confidence = episode.confidence.clamp(0.0, 1.0);
        let quality = episode.quality.clamp(0.0, 1.0);
        let fp = fingerprint(&episode.situation, &episode.action, &episode.outcome);
        let now = Utc::now();

        let candidate = self.find_latest_by_fingerprint(project_id, &fp).await?;
        let matched = candidate
            .as_ref()
            .filter(|c| candidate_in_window(c, mode, now, session_id));

        if let Some(candidate) = matched {
            let handle = self.pool.acquire().await?;
            handle
                .connection()
                .execute(
                    "UPDATE episodes SET ref_count = ? WHERE id = ?",
                    libsql::params![i64::from(candidate.ref_count + 1), candidate.id.to_string()],
                )
                .await
                .map_err(|e| Error::Storage(e.into()))?;
            drop(handle);

            let episode = self.load_episode(candidate.id).await?;
            debug!(project_id, fingerprint = %fp, ref_count = episode.ref_count, "episode deduped");
            return Ok(AddEpisodeOutcome { episode, deduped: true });
        }

        let id = Uuid::new_v4();
        let session_value: libsql::Value = match session_id {
            Some(s) => libsql::Value::Text(s.to_string()),
            None => libsql::Value::Null,
        };
        let handle = self.pool.acquire().await?;
        handle
            .connection()
            .execute(
                "INSERT INTO episodes (id, project_id, created_at, situation, action, outcome, \
                 lesson, lesson_type, confidence, quality, fingerprint, ref_count, session_id) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)",
                libsql::params![
                    id.to_string(),
                    project_id,
                    now.timestamp(),
                    episode.situation.clone(),
                    episode.action.clone(),
                    episode.outcome.clone(),
                    episode.lesson.clone(),
                    lesson_type_to_str(episode.lesson_type),
                    f64::from(confidence),
                    f64::from(quality),
                    fp.clone(),
                    session_value,
                ],
            )
            .await
            .map_err(|e| Error::Storage(e.into()))?;

        let stored = Episode {
            id,
            project_id: project_id.to_string(),
            created_at: now,
            confidence,
            quality,
            fingerprint: fp,
            ref_count: 1,
            ..episode
        };
        debug!(project_id, episode_id = %id, "episode recorded");
        Ok(AddEpisodeOutcome { episode: stored, deduped: false })
    }

    async fn query_episodes(
        &self,
        project_id: &str,
        filter: &EpisodeFilter,
        top_k: usize,
    ) -> Result<Vec<Episode>> {
        validate_project_id(project_id)?;

        let mut sql = String::from(
            "SELECT id, project_id, created_at, situation, action, outcome, lesson, \
             lesson_type, confidence, quality, fingerprint, ref_count FROM episodes \
             WHERE project_id = ?",
        );
        let mut params: Vec<libsql::Value> = vec![project_id.to_string().into()];

        if let Some(lesson_type) = filter.lesson_type {
            sql.push_str(" AND lesson_type = ?");
            params.push(lesson_type_to_str(lesson_type).to_string().into());
        }
        if let Some(min_confidence) = filter.min_confidence {
            sql.push_str(" AND confidence >= ?");
            params.push(f64::from(min_confidence).into());
        }
        if let Some(min_quality) = filter.min_quality {
            sql.push_str(" AND quality >= ?");
            params.push(f64::from(min_quality).into());
        }
        if let Some(text) = &filter.text_contains {
            sql.push_str(" AND (LOWER(situation) LIKE ? OR LOWER(lesson) LIKE ?)");
            let pattern = format!("%{}%", text.to_lowercase());
            params.push(pattern.clone().into());
            params.push(pattern.into());
        }
        sql.push_str(" ORDER BY (confidence * quality) DESC, created_at DESC LIMIT ?");
        params.push(i64::try_from(top_k).unwrap_or(i64::MAX).into());

        let handle = self.pool.acquire().await?;
        let mut rows = handle
            .connection()
            .query(&sql, libsql::params_from_iter(params))
            .await
            .map_err(|e| Error::Storage(e.into()))?;

        let mut episodes = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.into()))? {
            episodes.push(row_to_episode(&row)?);
        }
        Ok(episodes)
    }

    async fn list_recent_episodes(&self, project_id: &str, limit: usize) -> Result<Vec<Episode>> {
        validate_project_id(project_id)?;
        let handle = self.pool.acquire().await?;
        let mut rows = handle
            .connection()
            .query(
                "SELECT id, project_id, created_at, situation, action, outcome, lesson, \
                 lesson_type, confidence, quality, fingerprint, ref_count FROM episodes \
                 WHERE project_id = ? ORDER BY created_at DESC LIMIT ?",
                libsql::params![project_id, i64::try_from(limit).unwrap_or(i64::MAX)],
            )
            .await
            .map_err(|e| Error::Storage(e.into()))?;

        let mut episodes = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.into()))? {
            episodes.push(row_to_episode(&row)?);
        }
        Ok(episodes)
    }

    async fn delete_project(&self, project_id: &str) -> Result<()> {
        let handle = self.pool.acquire().await?;
        handle
            .connection()
            .execute("DELETE FROM episodes WHERE project_id = ?", libsql::params![project_id])
            .await
            .map_err(|e| Error::Storage(e.into()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_schema;

    async fn store() -> (SqliteEpisodicStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = ConnectionPool::open(&dir.path().join("episodes.db"), 2).await.unwrap();
        let handle = pool.acquire().await.unwrap();
        init_schema(handle.connection()).await.unwrap();
        drop(handle);
        (SqliteEpisodicStore::new(pool), dir)
    }

    fn episode(situation: &str, action: &str, outcome: &str) -> Episode {
        Episode {
            id: Uuid::new_v4(),
            project_id: "proj-abc12345".into(),
            created_at: Utc::now(),
            situation: situation.into(),
            action: action.into(),
            outcome: outcome.into(),
            lesson: "retry with --locked".into(),
            lesson_type: LessonType::Pattern,
            confidence: 0.8,
            quality: 0.7,
            fingerprint: String::new(),
            ref_count: 1,
        }
    }

    #[tokio::test]
    async fn global_mode_collapses_repeats_into_one_row_with_increasing_ref_count() {
        let (store, _dir) = store().await;
        let e = episode("build failed", "retried with --locked", "it passed");

        let first = store
            .add_episode("proj-abc12345", e.clone(), DeduplicationMode::Global, None)
            .await
            .unwrap();
        assert!(!first.deduped);
        assert_eq!(first.episode.ref_count, 1);

        let second = store
            .add_episode("proj-abc12345", e, DeduplicationMode::Global, None)
            .await
            .unwrap();
        assert!(second.deduped);
        assert_eq!(second.episode.ref_count, 2);
        assert_eq!(second.episode.id, first.episode.id);
    }

    #[tokio::test]
    async fn per_session_mode_only_collapses_within_the_same_session() {
        let (store, _dir) = store().await;
        let e = episode("deploy failed", "rolled back", "service recovered");

        let first = store
            .add_episode("proj-abc12345", e.clone(), DeduplicationMode::PerSession, Some("s1"))
            .await
            .unwrap();
        assert!(!first.deduped);

        let same_session = store
            .add_episode("proj-abc12345", e.clone(), DeduplicationMode::PerSession, Some("s1"))
            .await
            .unwrap();
        assert!(same_session.deduped);

        let other_session = store
            .add_episode("proj-abc12345", e, DeduplicationMode::PerSession, Some("s2"))
            .await
            .unwrap();
        assert!(!other_session.deduped);
    }

    #[tokio::test]
    async fn distinct_content_never_collapses() {
        let (store, _dir) = store().await;
        store
            .add_episode(
                "proj-abc12345",
                episode("a", "b", "c"),
                DeduplicationMode::Global,
                None,
            )
            .await
            .unwrap();
        let outcome = store
            .add_episode(
                "proj-abc12345",
                episode("x", "y", "z"),
                DeduplicationMode::Global,
                None,
            )
            .await
            .unwrap();
        assert!(!outcome.deduped);
        assert_eq!(store.list_recent_episodes("proj-abc12345", 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delete_project_removes_its_episodes() {
        let (store, _dir) = store().await;
        store
            .add_episode("proj-aaa12345", episode("a", "b", "c"), DeduplicationMode::Global, None)
            .await
            .unwrap();
        store.delete_project("proj-aaa12345").await.unwrap();
        assert!(store.list_recent_episodes("proj-aaa12345", 10).await.unwrap().is_empty());
    }
}
