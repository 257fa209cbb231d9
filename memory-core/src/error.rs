//! Error taxonomy for the memory server.
//!
//! Every fallible operation in this crate and its storage backends returns
//! [`Result<T>`], whose error kinds mirror the caller-facing contract: which
//! failures are safe to retry, which indicate a programming or input
//! mistake, and which require operator intervention.

use uuid::Uuid;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds returned by the memory server.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The caller supplied a malformed argument (bad `project_id` grammar,
    /// unknown memory type, empty scope, out-of-range value, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The referenced project, document, chunk or fact does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A fact write conflicted with an existing row of equal or higher
    /// authority. The existing value is kept; callers may consult this to
    /// know what survived.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A call to the external embedding or completion function failed to
    /// respond before its deadline. Retryable.
    #[error("external call timed out: {0}")]
    ExternalTimeout(String),

    /// A call to the external embedding or completion function failed.
    /// Retryable.
    #[error("external call failed: {0}")]
    ExternalFailure(String),

    /// An on-disk invariant was violated (for example an embedding of the
    /// wrong dimension reached the vector index). The affected project
    /// should be treated read-only until an operator investigates.
    #[error("storage corruption in project {project_id}: {detail}")]
    Corruption {
        /// Project whose on-disk state violated an invariant.
        project_id: String,
        /// What was found to be wrong.
        detail: String,
    },

    /// The connection pool or vector index ran out of a bounded resource
    /// (pool slots, disk space). Retryable once the resource frees up.
    #[error("resource exhausted: {0}")]
    Exhausted(String),

    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML configuration parsing failure.
    #[error("configuration error: {0}")]
    Configuration(#[from] toml::de::Error),

    /// Catch-all for storage-backend errors that don't map cleanly onto a
    /// more specific kind above.
    #[error("storage error: {0}")]
    Storage(#[source] anyhow::Error),
}

impl Error {
    /// Construct an [`Error::NotFound`] naming the missing entity by id.
    #[must_use]
    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{kind} {id} not found"))
    }

    /// Construct an [`Error::NotFound`] naming a missing fact.
    #[must_use]
    pub fn fact_not_found(id: Uuid) -> Self {
        Self::not_found("fact", id)
    }

    /// Whether a caller may reasonably retry this operation unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ExternalTimeout(_) | Self::ExternalFailure(_) | Self::Exhausted(_)
        )
    }

    /// Whether this error reflects on-disk corruption requiring operator
    /// attention rather than a transient or caller-side condition.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption { .. })
    }

    /// Stable machine-readable kind string for the structured error
    /// envelope described in the external interface contract.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::ExternalTimeout(_) => "external_timeout",
            Self::ExternalFailure(_) => "external_failure",
            Self::Corruption { .. } => "corruption",
            Self::Exhausted(_) => "exhausted",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Configuration(_) => "configuration",
            Self::Storage(_) => "storage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds_are_exactly_the_external_and_exhausted_variants() {
        assert!(Error::ExternalTimeout("t".into()).is_retryable());
        assert!(Error::ExternalFailure("t".into()).is_retryable());
        assert!(Error::Exhausted("t".into()).is_retryable());
        assert!(!Error::InvalidInput("t".into()).is_retryable());
        assert!(!Error::NotFound("t".into()).is_retryable());
    }

    #[test]
    fn corruption_is_flagged_distinctly() {
        let err = Error::Corruption {
            project_id: "proj-deadbeef".into(),
            detail: "dimension mismatch".into(),
        };
        assert!(err.is_corruption());
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "corruption");
    }

    #[test]
    fn kind_strings_match_the_external_contract() {
        assert_eq!(Error::InvalidInput("x".into()).kind(), "invalid_input");
        assert_eq!(Error::Conflict("x".into()).kind(), "conflict");
    }
}
