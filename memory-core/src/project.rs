//! The project: the tenant unit every other entity is rooted under.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::{Error, Result};

/// Registry entry for a project (C10). Backs `proj.list`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Project {
    /// `name-shortUUID` tenant key.
    pub project_id: String,
    /// When this project was first written to.
    pub created_at: DateTime<Utc>,
}

static PROJECT_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[a-z0-9][a-z0-9-]{0,31}-[0-9a-f]{8}$").unwrap()
});

/// Validate the `name-shortUUID` grammar a `project_id` must satisfy.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if `project_id` does not match the
/// `1..32 lower-alphanumeric/hyphen name` + `-` + `8 hex chars` grammar.
pub fn validate_project_id(project_id: &str) -> Result<()> {
    if PROJECT_ID_PATTERN.is_match(project_id) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "project_id {project_id:?} does not match the name-shortUUID grammar"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_ids() {
        assert!(validate_project_id("proj-abc12345").is_ok());
        assert!(validate_project_id("a-00000000").is_ok());
    }

    #[test]
    fn rejects_missing_hex_suffix() {
        assert!(validate_project_id("proj-abc").is_err());
        assert!(validate_project_id("projabc12345").is_err());
        assert!(validate_project_id("PROJ-abc12345").is_err());
    }
}
