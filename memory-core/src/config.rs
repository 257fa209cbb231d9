//! Runtime configuration for the memory server.
//!
//! Layering order, lowest to highest precedence: [`MemoryConfig::default`],
//! then a TOML document via [`MemoryConfig::from_toml_str`], then the
//! process environment via [`MemoryConfig::from_env`]. Callers typically
//! load the file first and then apply env overrides on top:
//!
//! ```
//! use memory_core::config::MemoryConfig;
//!
//! let mut config = MemoryConfig::default();
//! config.apply_env_overrides();
//! assert_eq!(config.pool_size, 5);
//! ```

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::Result;

/// Which of the three deduplication horizons applies to episode fingerprint
/// matching (C5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeduplicationMode {
    /// Duplicates collapse within the same calendar day.
    PerDay,
    /// Duplicates collapse within the caller-supplied session id.
    PerSession,
    /// Duplicates collapse for the lifetime of the project.
    Global,
}

/// Which extraction strategy the conversation analyzer (C7) uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Pattern/keyword recognizers; always available, no external calls.
    Heuristic,
    /// Delegates to an external `complete()` with a strict output schema,
    /// falling back to heuristic extraction on a parse failure.
    Model,
}

/// Authority weights used by the memory reader (C8) when merging results
/// from the three memory substrates. Ordering (symbolic > episodic >
/// semantic) is a contract; the magnitudes are tunable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AuthorityWeights {
    /// Weight applied to symbolic facts.
    pub symbolic: f32,
    /// Weight applied to episodic lessons.
    pub episodic: f32,
    /// Scale applied to clipped semantic cosine similarity.
    pub semantic: f32,
}

impl Default for AuthorityWeights {
    fn default() -> Self {
        Self {
            symbolic: DEFAULT_AUTHORITY_SYMBOLIC,
            episodic: DEFAULT_AUTHORITY_EPISODIC,
            semantic: DEFAULT_AUTHORITY_SEMANTIC,
        }
    }
}

/// Per-section character caps used by the context assembler (C9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblerCaps {
    /// Cap on the "Facts" section.
    pub facts_cap: usize,
    /// Cap on the "Lessons" section.
    pub lessons_cap: usize,
    /// Cap on the "Reference" section.
    pub reference_cap: usize,
}

impl Default for AssemblerCaps {
    fn default() -> Self {
        Self {
            facts_cap: DEFAULT_SECTION_CAP_CHARS,
            lessons_cap: DEFAULT_SECTION_CAP_CHARS,
            reference_cap: DEFAULT_SECTION_CAP_CHARS,
        }
    }
}

/// Full runtime configuration for a [`crate::engine::MemoryEngine`] instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Connections opened per project by the connection pool (C1).
    pub pool_size: usize,
    /// Maximum entries retained by the query result cache (C2).
    pub cache_max_size: usize,
    /// Time-to-live, in seconds, of a cache entry (C2).
    pub cache_ttl_seconds: u64,
    /// Word-window size used when chunking documents (C6).
    pub chunk_size: usize,
    /// Word overlap between consecutive chunks (C6).
    pub chunk_overlap: usize,
    /// Expected dense-vector dimension (C6).
    pub embedding_dim: usize,
    /// Facts below this confidence are dropped at extraction time (C7).
    pub min_fact_confidence: f32,
    /// Episodes below this confidence are dropped at extraction time (C7).
    pub min_episode_confidence: f32,
    /// Episode deduplication horizon (C5).
    pub deduplication_mode: DeduplicationMode,
    /// Conversation analyzer strategy (C7).
    pub extraction_mode: ExtractionMode,
    /// Messages shorter than this are skipped by the analyzer (C7).
    pub min_message_length: usize,
    /// Regular expressions the analyzer skips entirely, e.g. `"^test$"`.
    pub skip_patterns: Vec<String>,
    /// Authority weights used by the memory reader (C8).
    pub authority: AuthorityWeights,
    /// Per-section caps used by the context assembler (C9).
    pub assembler: AssemblerCaps,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            cache_max_size: DEFAULT_CACHE_MAX_SIZE,
            cache_ttl_seconds: DEFAULT_CACHE_TTL_SECONDS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            min_fact_confidence: DEFAULT_MIN_FACT_CONFIDENCE,
            min_episode_confidence: DEFAULT_MIN_EPISODE_CONFIDENCE,
            deduplication_mode: DeduplicationMode::PerDay,
            extraction_mode: ExtractionMode::Heuristic,
            min_message_length: DEFAULT_MIN_MESSAGE_LENGTH,
            skip_patterns: vec!["^test$".into(), "^help$".into(), "^hello$".into()],
            authority: AuthorityWeights::default(),
            assembler: AssemblerCaps::default(),
        }
    }
}

impl MemoryConfig {
    /// Parse a configuration document from a TOML string, layered over
    /// [`MemoryConfig::default`] for any field the document omits.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Configuration`] if `text` is not
    /// valid TOML for this shape.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a configuration document from a file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Io`] if the file cannot be read, or
    /// [`crate::error::Error::Configuration`] if its contents are not valid
    /// TOML for this shape.
    pub fn from_toml_file(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Build a configuration entirely from the process environment, falling
    /// back to [`MemoryConfig::default`] for unset or unparsable variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Overlay `MEMORY_*` environment variables onto `self`, warning and
    /// keeping the prior value for any variable that is set but does not
    /// parse.
    pub fn apply_env_overrides(&mut self) {
        Self::apply_parsed_env("MEMORY_POOL_SIZE", &mut self.pool_size);
        Self::apply_parsed_env("MEMORY_CACHE_MAX_SIZE", &mut self.cache_max_size);
        Self::apply_parsed_env("MEMORY_CACHE_TTL_SECONDS", &mut self.cache_ttl_seconds);
        Self::apply_parsed_env("MEMORY_CHUNK_SIZE", &mut self.chunk_size);
        Self::apply_parsed_env("MEMORY_CHUNK_OVERLAP", &mut self.chunk_overlap);
        Self::apply_parsed_env("MEMORY_EMBEDDING_DIM", &mut self.embedding_dim);
        Self::apply_parsed_env("MEMORY_MIN_FACT_CONFIDENCE", &mut self.min_fact_confidence);
        Self::apply_parsed_env(
            "MEMORY_MIN_EPISODE_CONFIDENCE",
            &mut self.min_episode_confidence,
        );
        Self::apply_parsed_env("MEMORY_MIN_MESSAGE_LENGTH", &mut self.min_message_length);

        if let Ok(raw) = std::env::var("MEMORY_EXTRACTION_MODE") {
            match raw.as_str() {
                "heuristic" => self.extraction_mode = ExtractionMode::Heuristic,
                "model" => self.extraction_mode = ExtractionMode::Model,
                other => {
                    tracing::warn!(value = other, "invalid MEMORY_EXTRACTION_MODE, keeping prior value");
                }
            }
        }

        if let Ok(raw) = std::env::var("MEMORY_DEDUPLICATION_MODE") {
            match raw.as_str() {
                "per_day" => self.deduplication_mode = DeduplicationMode::PerDay,
                "per_session" => self.deduplication_mode = DeduplicationMode::PerSession,
                "global" => self.deduplication_mode = DeduplicationMode::Global,
                other => {
                    tracing::warn!(value = other, "invalid MEMORY_DEDUPLICATION_MODE, keeping prior value");
                }
            }
        }
    }

    fn apply_parsed_env<T: std::str::FromStr>(var: &str, slot: &mut T) {
        if let Ok(raw) = std::env::var(var) {
            match raw.parse() {
                Ok(value) => *slot = value,
                Err(_) => {
                    tracing::warn!(var, value = raw, "invalid environment override, keeping prior value");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_match_the_documented_contract() {
        let config = MemoryConfig::default();
        assert_eq!(config.pool_size, 5);
        assert_eq!(config.cache_max_size, 500);
        assert_eq!(config.cache_ttl_seconds, 300);
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.embedding_dim, 384);
        assert!((config.min_fact_confidence - 0.7).abs() < f32::EPSILON);
        assert!((config.min_episode_confidence - 0.6).abs() < f32::EPSILON);
    }

    #[test]
    fn toml_document_overrides_only_the_fields_it_sets() {
        let config = MemoryConfig::from_toml_str("pool_size = 12\n").unwrap();
        assert_eq!(config.pool_size, 12);
        assert_eq!(config.cache_max_size, 500);
    }

    #[test]
    #[serial]
    fn invalid_env_value_is_ignored_with_a_warning() {
        // SAFETY-equivalent: serialized via `serial_test` so no other test
        // observes this process's environment mid-mutation.
        unsafe {
            std::env::set_var("MEMORY_POOL_SIZE", "not-a-number");
        }
        let config = MemoryConfig::from_env();
        assert_eq!(config.pool_size, 5);
        unsafe {
            std::env::remove_var("MEMORY_POOL_SIZE");
        }
    }

    #[test]
    #[serial]
    fn valid_env_value_overrides_default() {
        unsafe {
            std::env::set_var("MEMORY_POOL_SIZE", "9");
        }
        let config = MemoryConfig::from_env();
        assert_eq!(config.pool_size, 9);
        unsafe {
            std::env::remove_var("MEMORY_POOL_SIZE");
        }
    }
}
