//! Conversation Analyzer (C7): turns a `(user, agent)` turn into candidate
//! facts and episodes.
//!
//! The analyzer never writes to a store itself; it returns pure candidate
//! values and lets the caller decide whether to commit them through
//! [`crate::symbolic::SymbolicStore::add_fact`] or
//! [`crate::episodic::EpisodicStore::add_episode`].

use std::sync::LazyLock;
use std::time::Instant;

use regex::Regex;

use crate::config::{ExtractionMode, MemoryConfig};
use crate::constants::MAX_SKIP_PATTERN_LENGTH;
use crate::episodic::LessonType;
use crate::error::{Error, Result};
use crate::symbolic::Source;

/// A fact candidate surfaced by extraction, not yet committed to a store.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFact {
    /// Proposed scope, e.g. `"project"`.
    pub scope: String,
    /// Proposed category, e.g. `"decision"`.
    pub category: String,
    /// Proposed key.
    pub key: String,
    /// Proposed value.
    pub value: String,
    /// Confidence in `[0.6, 0.95]` assigned by the recognizer.
    pub confidence: f32,
}

/// An episode candidate surfaced by extraction, not yet committed to a
/// store.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateEpisode {
    /// Context in which the action was taken.
    pub situation: String,
    /// What was done.
    pub action: String,
    /// What happened.
    pub outcome: String,
    /// The generalized takeaway.
    pub lesson: String,
    /// Category of the takeaway.
    pub lesson_type: LessonType,
    /// Confidence in `[0.6, 0.95]` assigned by the recognizer.
    pub confidence: f32,
}

/// Result of [`analyze`]: candidates plus what the filtering pipeline did
/// before extraction ran, if anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisResult {
    /// Facts surfaced by extraction, already above
    /// [`MemoryConfig::min_fact_confidence`].
    pub facts: Vec<CandidateFact>,
    /// Episodes surfaced by extraction, already above
    /// [`MemoryConfig::min_episode_confidence`].
    pub episodes: Vec<CandidateEpisode>,
    /// Set when the message was filtered out before extraction ran:
    /// `"too_short"` or `"skip_pattern"`.
    pub skipped_reason: Option<String>,
}

static DECLARATIVE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)^\s*(?:the\s+)?([a-z0-9_ ]{2,40}?)\s+is\s+([^.!?]{1,120})[.!?]?\s*$").unwrap()
});

static PREFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\bI\s+prefer\s+([^.!?]{1,60})\s+over\s+([^.!?]{1,60})").unwrap()
});

static DECISION: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\bwe\s+decided\s+to\s+([^.!?]{2,120})").unwrap()
});

static OUTCOME_GOOD: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\bthis\s+work(?:ed|s)\b").unwrap()
});

static OUTCOME_BAD: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\bthis\s+did(?:n'?t| not)\s+work\b").unwrap()
});

static LESSON: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\blesson\s+learned:?\s*([^.!?]{2,160})").unwrap()
});

/// Validate a user-configured skip pattern before compiling it, rejecting
/// patterns long enough or nested enough to risk pathological matching
/// cost.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if `pattern` exceeds
/// [`MAX_SKIP_PATTERN_LENGTH`] or contains a nested quantifier shape known
/// to cause catastrophic backtracking in some engines.
pub fn validate_skip_pattern(pattern: &str) -> Result<()> {
    if pattern.len() > MAX_SKIP_PATTERN_LENGTH {
        return Err(Error::InvalidInput(format!(
            "skip pattern exceeds {MAX_SKIP_PATTERN_LENGTH} characters"
        )));
    }
    let nested_quantifier = pattern.contains("+)+")
        || pattern.contains("*)*")
        || pattern.contains("+)*")
        || pattern.contains("*)+");
    if nested_quantifier {
        return Err(Error::InvalidInput(
            "skip pattern contains a nested quantifier".to_string(),
        ));
    }
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| Error::InvalidInput(format!("invalid skip pattern: {e}")))
}

fn should_skip(message: &str, config: &MemoryConfig) -> Option<String> {
    if message.trim().len() < config.min_message_length {
        return Some("too_short".to_string());
    }
    for pattern in &config.skip_patterns {
        if validate_skip_pattern(pattern).is_err() {
            continue;
        }
        if let Ok(re) = Regex::new(pattern) {
            if re.is_match(message.trim()) {
                return Some("skip_pattern".to_string());
            }
        }
    }
    None
}

fn extract_facts_heuristic(user_message: &str, agent_response: &str) -> Vec<CandidateFact> {
    let mut facts = Vec::new();

    for line in user_message.lines().chain(agent_response.lines()) {
        if let Some(caps) = DECLARATIVE.captures(line) {
            let key = caps[1].trim().to_lowercase().replace(' ', "_");
            let value = caps[2].trim().to_string();
            if !key.is_empty() && !value.is_empty() {
                facts.push(CandidateFact {
                    scope: "project".to_string(),
                    category: "fact".to_string(),
                    key,
                    value,
                    confidence: 0.7,
                });
            }
        }
    }

    if let Some(caps) = PREFERENCE.captures(user_message) {
        facts.push(CandidateFact {
            scope: "user".to_string(),
            category: "preference".to_string(),
            key: "preference".to_string(),
            value: format!("{} over {}", caps[1].trim(), caps[2].trim()),
            confidence: 0.8,
        });
    }

    if let Some(caps) = DECISION.captures(user_message) {
        facts.push(CandidateFact {
            scope: "project".to_string(),
            category: "decision".to_string(),
            key: "decision".to_string(),
            value: caps[1].trim().to_string(),
            confidence: 0.75,
        });
    }

    facts.truncate(10);
    facts
}

fn extract_episodes_heuristic(
    user_message: &str,
    agent_response: &str,
) -> Vec<CandidateEpisode> {
    let mut episodes = Vec::new();
    let combined = format!("{user_message} {agent_response}");

    let lesson_text = LESSON.captures(&combined).map(|c| c[1].trim().to_string());

    if OUTCOME_GOOD.is_match(&combined) {
        episodes.push(CandidateEpisode {
            situation: user_message.to_string(),
            action: agent_response.to_string(),
            outcome: "worked".to_string(),
            lesson: lesson_text.clone().unwrap_or_else(|| "approach succeeded".to_string()),
            lesson_type: LessonType::Pattern,
            confidence: 0.75,
        });
    }

    if OUTCOME_BAD.is_match(&combined) {
        episodes.push(CandidateEpisode {
            situation: user_message.to_string(),
            action: agent_response.to_string(),
            outcome: "did not work".to_string(),
            lesson: lesson_text.unwrap_or_else(|| "approach failed".to_string()),
            lesson_type: LessonType::Antipattern,
            confidence: 0.7,
        });
    }

    episodes.truncate(10);
    episodes
}

/// Analyze one `(user_message, agent_response)` turn, applying the
/// filtering pipeline (length, skip patterns, extraction, confidence gate)
/// described in the component design.
///
/// This function owns only the heuristic extraction path. If
/// `config.extraction_mode` is [`ExtractionMode::Model`], it logs and falls
/// through to the same heuristic extractors rather than erroring — a caller
/// that wants model-assisted extraction is expected to run its own
/// completion-backed extractor first and call this function as its
/// fallback, per the component design's "parsing failures fall back to
/// heuristic" contract.
///
/// # Errors
///
/// This function is currently infallible and always returns `Ok`; it
/// returns [`Result`] so a future extraction path can surface errors
/// without changing the signature.
pub fn analyze(
    user_message: &str,
    agent_response: &str,
    config: &MemoryConfig,
) -> Result<AnalysisResult> {
    let started = Instant::now();

    if let Some(reason) = should_skip(user_message, config) {
        return Ok(AnalysisResult {
            skipped_reason: Some(reason),
            ..Default::default()
        });
    }

    // Model-assisted extraction is an external collaborator; the core only
    // owns the heuristic path. A caller that selects `ExtractionMode::Model`
    // is expected to call its own completion-backed extractor and fall back
    // to this function on failure, per the component design's "parsing
    // failures fall back to heuristic" contract.
    if config.extraction_mode == ExtractionMode::Model {
        tracing::debug!("model-assisted extraction requested; core provides heuristic fallback only");
    }

    let mut facts = extract_facts_heuristic(user_message, agent_response);
    let mut episodes = extract_episodes_heuristic(user_message, agent_response);

    facts.retain(|f| f.confidence >= config.min_fact_confidence);
    episodes.retain(|e| e.confidence >= config.min_episode_confidence);

    tracing::trace!(
        elapsed_us = started.elapsed().as_micros(),
        facts = facts.len(),
        episodes = episodes.len(),
        "heuristic extraction complete"
    );

    Ok(AnalysisResult {
        facts,
        episodes,
        skipped_reason: None,
    })
}

/// The [`Source`] tag extracted facts/episodes should be committed with.
pub const EXTRACTOR_SOURCE: Source = Source::Extractor;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_messages_are_skipped_before_extraction() {
        let config = MemoryConfig::default();
        let result = analyze("hi", "hello", &config).unwrap();
        assert_eq!(result.skipped_reason.as_deref(), Some("too_short"));
        assert!(result.facts.is_empty());
    }

    #[test]
    fn declarative_sentence_yields_a_fact_candidate() {
        let config = MemoryConfig::default();
        let result = analyze(
            "the build system is bazel, which should be plenty of words",
            "noted",
            &config,
        )
        .unwrap();
        assert!(result.facts.iter().any(|f| f.value.contains("bazel")));
    }

    #[test]
    fn decision_sentence_yields_a_decision_fact() {
        let config = MemoryConfig::default();
        let result = analyze(
            "after a long discussion we decided to use postgres for this service",
            "sounds good",
            &config,
        )
        .unwrap();
        assert!(result.facts.iter().any(|f| f.category == "decision"));
    }

    #[test]
    fn positive_outcome_yields_a_pattern_episode() {
        let config = MemoryConfig::default();
        let result = analyze(
            "we retried the flaky test with a longer timeout and more patience",
            "this worked, the test passed consistently afterwards",
            &config,
        )
        .unwrap();
        assert!(result
            .episodes
            .iter()
            .any(|e| e.lesson_type == LessonType::Pattern));
    }

    #[test]
    fn low_confidence_candidates_are_filtered_out() {
        let mut config = MemoryConfig::default();
        config.min_fact_confidence = 0.99;
        let result = analyze(
            "the build system is bazel, which should be plenty of words",
            "noted",
            &config,
        )
        .unwrap();
        assert!(result.facts.is_empty());
    }

    #[test]
    fn overlong_skip_pattern_is_rejected() {
        let pattern = "a".repeat(MAX_SKIP_PATTERN_LENGTH + 1);
        assert!(validate_skip_pattern(&pattern).is_err());
    }

    #[test]
    fn nested_quantifier_skip_pattern_is_rejected() {
        assert!(validate_skip_pattern("(a+)+b").is_err());
    }

    #[test]
    fn heuristic_extraction_on_a_short_exchange_is_fast() {
        let config = MemoryConfig::default();
        let user = "we decided to use rust for the new service because of its safety guarantees";
        let agent = "great choice, this worked well on our last project too";
        let started = Instant::now();
        for _ in 0..50 {
            let _ = analyze(user, agent, &config).unwrap();
        }
        assert!(started.elapsed().as_millis() < 500);
    }
}
