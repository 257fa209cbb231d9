//! Symbolic store (C4): structured facts with confidence, scope and an
//! append-only audit history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Where a fact or episode originated, used to break confidence ties on
/// upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Lowest-ranked: bulk import.
    Import,
    /// Heuristic or model-assisted extraction (C7).
    Extractor,
    /// The agent stated it directly.
    Agent,
    /// Highest-ranked: the human user stated it directly.
    User,
}

/// One entry in a fact's audit trail, recorded on every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactHistoryEntry {
    /// When this entry was recorded.
    pub at: DateTime<Utc>,
    /// The value the fact held immediately before this mutation.
    pub prev_value: String,
    /// The confidence the fact held immediately before this mutation.
    pub prev_confidence: f32,
    /// Why the entry exists: `"replaced"` or `"observed_and_rejected"`.
    pub reason: String,
}

/// A structured fact: `(scope, category, key) -> value`, with confidence
/// and provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Opaque stable identifier.
    pub id: Uuid,
    /// Tenant this fact belongs to.
    pub project_id: String,
    /// Coarse grouping; open-set, e.g. `"user"`, `"project"`, `"session"`.
    pub scope: String,
    /// Free-form short tag, e.g. `"preference"`, `"decision"`.
    pub category: String,
    /// Unique within `(project_id, scope, category)`.
    pub key: String,
    /// JSON-encoded for composite values; plain text otherwise.
    pub value: String,
    /// Confidence in `[0, 1]`; clipped on write.
    pub confidence: f32,
    /// Where this fact came from.
    pub source: Source,
    /// First write.
    pub created_at: DateTime<Utc>,
    /// Most recent write.
    pub updated_at: DateTime<Utc>,
    /// Append-only audit trail.
    pub history: Vec<FactHistoryEntry>,
}

/// A filter applied to [`SymbolicStore::query_facts`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactFilter {
    /// Restrict to this scope, if set.
    pub scope: Option<String>,
    /// Restrict to this category, if set.
    pub category: Option<String>,
    /// Restrict to this exact key, if set.
    pub key: Option<String>,
    /// Drop facts below this confidence, if set.
    pub min_confidence: Option<f32>,
}

/// Outcome of [`SymbolicStore::add_fact`].
#[derive(Debug, Clone, PartialEq)]
pub struct AddFactOutcome {
    /// The fact as stored after resolving the upsert.
    pub fact: Fact,
    /// Whether the incoming write replaced a pre-existing active row.
    pub replaced: bool,
}

/// Storage-backend contract for the symbolic memory substrate.
///
/// Implementations must guarantee the audit-completeness invariant: every
/// successful call that changes a fact's value or confidence appends
/// exactly one [`FactHistoryEntry`].
#[async_trait]
pub trait SymbolicStore: Send + Sync {
    /// Upsert a fact per the precedence rule in the component design: a
    /// higher confidence, or an equal confidence from a higher-ranked
    /// [`Source`], replaces the active row; otherwise the write is recorded
    /// as an observation and the active row is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::InvalidInput`] if `project_id`,
    /// `scope`, `category` or `key` fail validation.
    async fn add_fact(
        &self,
        project_id: &str,
        scope: &str,
        category: &str,
        key: &str,
        value: &str,
        confidence: f32,
        source: Source,
    ) -> Result<AddFactOutcome>;

    /// Return active facts matching `filter`, ordered by confidence desc
    /// then recency desc.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::InvalidInput`] if `project_id` fails
    /// validation.
    async fn query_facts(&self, project_id: &str, filter: &FactFilter) -> Result<Vec<Fact>>;

    /// Distinct scopes with at least one active fact in this project.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::InvalidInput`] if `project_id` fails
    /// validation.
    async fn list_scopes(&self, project_id: &str) -> Result<Vec<String>>;

    /// Distinct categories within `scope` with at least one active fact.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::InvalidInput`] if `project_id` fails
    /// validation.
    async fn list_categories(&self, project_id: &str, scope: &str) -> Result<Vec<String>>;

    /// Soft-delete a fact, recording a final history entry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::NotFound`] if no active fact with
    /// `id` exists in `project_id`.
    async fn delete_fact(&self, project_id: &str, id: Uuid) -> Result<()>;

    /// Remove every fact and its history belonging to `project_id`. Used by
    /// project deletion; must not affect any other project.
    ///
    /// # Errors
    ///
    /// Returns a storage-backend error on I/O failure.
    async fn delete_project(&self, project_id: &str) -> Result<()>;
}

/// Clip a raw confidence value into the valid `[0, 1]` range.
#[must_use]
pub fn clip_confidence(confidence: f32) -> f32 {
    confidence.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_ranks_user_above_agent_above_extractor_above_import() {
        assert!(Source::User > Source::Agent);
        assert!(Source::Agent > Source::Extractor);
        assert!(Source::Extractor > Source::Import);
    }

    #[test]
    fn clip_confidence_saturates_at_bounds() {
        assert!((clip_confidence(-0.4) - 0.0).abs() < f32::EPSILON);
        assert!((clip_confidence(1.8) - 1.0).abs() < f32::EPSILON);
        assert!((clip_confidence(0.42) - 0.42).abs() < f32::EPSILON);
    }
}
