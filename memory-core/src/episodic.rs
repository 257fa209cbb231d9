//! Episodic store (C5): situation/action/outcome/lesson records with
//! fingerprint-based deduplication.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::DeduplicationMode;
use crate::error::Result;

/// What kind of takeaway an episode records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonType {
    /// Something that worked and should be repeated.
    Pattern,
    /// Something that did not work and should be avoided.
    Antipattern,
    /// A reusable step-by-step procedure.
    Procedure,
    /// A caution without a clear corrective action.
    Warning,
}

/// One recorded situation/action/outcome/lesson tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// Opaque stable identifier.
    pub id: Uuid,
    /// Tenant this episode belongs to.
    pub project_id: String,
    /// First recorded.
    pub created_at: DateTime<Utc>,
    /// Context in which the action was taken.
    pub situation: String,
    /// What was done.
    pub action: String,
    /// What happened as a result.
    pub outcome: String,
    /// The generalized takeaway.
    pub lesson: String,
    /// Category of the takeaway.
    pub lesson_type: LessonType,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// Ranking signal in `[0, 1]`, independent of confidence.
    pub quality: f32,
    /// Content hash over the normalized `(situation, action, outcome)`.
    pub fingerprint: String,
    /// How many times an equivalent episode was submitted and collapsed
    /// into this row within the active deduplication window.
    pub ref_count: u32,
}

/// Compute the deduplication fingerprint for a candidate episode.
///
/// Normalization: lowercase, collapse runs of whitespace to a single space,
/// trim. This mirrors the round-trip invariant: two episodes that read the
/// same to a human fingerprint identically regardless of incidental
/// whitespace or casing differences in the input.
#[must_use]
pub fn fingerprint(situation: &str, action: &str, outcome: &str) -> String {
    let normalize = |s: &str| s.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
    let mut hasher = Sha256::new();
    hasher.update(normalize(situation).as_bytes());
    hasher.update(b"\u{1}");
    hasher.update(normalize(action).as_bytes());
    hasher.update(b"\u{1}");
    hasher.update(normalize(outcome).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Filter applied to [`EpisodicStore::query_episodes`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpisodeFilter {
    /// Restrict to this lesson type, if set.
    pub lesson_type: Option<LessonType>,
    /// Drop episodes below this confidence, if set.
    pub min_confidence: Option<f32>,
    /// Drop episodes below this quality, if set.
    pub min_quality: Option<f32>,
    /// Case-insensitive substring match over `situation` or `lesson`, if
    /// set.
    pub text_contains: Option<String>,
}

/// Outcome of [`EpisodicStore::add_episode`].
#[derive(Debug, Clone, PartialEq)]
pub struct AddEpisodeOutcome {
    /// The episode as stored: either the newly inserted row, or the
    /// existing row whose `ref_count` was incremented.
    pub episode: Episode,
    /// Whether this call matched an existing fingerprint within the active
    /// window rather than inserting a new row.
    pub deduped: bool,
}

/// Storage-backend contract for the episodic memory substrate.
#[async_trait]
pub trait EpisodicStore: Send + Sync {
    /// Record an episode, collapsing it into an existing row with an equal
    /// fingerprint if one exists within `mode`'s active window for this
    /// project.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::InvalidInput`] if `project_id` fails
    /// validation.
    async fn add_episode(
        &self,
        project_id: &str,
        episode: Episode,
        mode: DeduplicationMode,
        session_id: Option<&str>,
    ) -> Result<AddEpisodeOutcome>;

    /// Return episodes matching `filter`, ordered by `confidence * quality`
    /// desc then recency desc, truncated to `top_k`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::InvalidInput`] if `project_id` fails
    /// validation.
    async fn query_episodes(
        &self,
        project_id: &str,
        filter: &EpisodeFilter,
        top_k: usize,
    ) -> Result<Vec<Episode>>;

    /// Most recently recorded episodes, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::InvalidInput`] if `project_id` fails
    /// validation.
    async fn list_recent_episodes(&self, project_id: &str, limit: usize) -> Result<Vec<Episode>>;

    /// Remove every episode belonging to `project_id`.
    ///
    /// # Errors
    ///
    /// Returns a storage-backend error on I/O failure.
    async fn delete_project(&self, project_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_under_whitespace_and_case_changes() {
        let a = fingerprint("The Build Failed", "retried   with  --locked", "it passed");
        let b = fingerprint("the build failed", "retried with --locked", "It Passed");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_distinguishes_different_content() {
        let a = fingerprint("sit", "act", "outcome a");
        let b = fingerprint("sit", "act", "outcome b");
        assert_ne!(a, b);
    }
}
