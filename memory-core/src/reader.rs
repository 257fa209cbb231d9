//! Memory Reader (C8): authority-weighted merge of the three memory
//! substrates into one ranked answer set.

use serde::{Deserialize, Serialize};

use crate::config::AuthorityWeights;
use crate::embeddings::clip_similarity_unit_interval;
use crate::episodic::Episode;
use crate::semantic::SemanticHit;
use crate::symbolic::Fact;

/// Which memory substrate a merged result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// C4.
    Symbolic,
    /// C5.
    Episodic,
    /// C6.
    Semantic,
}

impl SourceType {
    /// Tie-break priority when two results have equal authority: symbolic
    /// first, then episodic, then semantic.
    const fn priority(self) -> u8 {
        match self {
            Self::Symbolic => 2,
            Self::Episodic => 1,
            Self::Semantic => 0,
        }
    }
}

/// One merged result, tagged with the authority weight that placed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedResult {
    /// Which substrate this came from.
    pub source_type: SourceType,
    /// Human-readable content for this result.
    pub content: String,
    /// Authority weight in `[0, 1]` used for ranking.
    pub authority: f32,
    /// Short explanation of why this was surfaced, e.g. the matched key or
    /// the raw similarity score.
    pub explanation: String,
    /// Recency used for tie-breaking, as a Unix timestamp.
    pub recency: i64,
}

/// A detected disagreement between two merged results on the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// The shared key or topic in disagreement.
    pub key: String,
    /// The higher-authority value.
    pub authoritative_value: String,
    /// The lower-authority value that disagrees.
    pub conflicting_value: String,
}

/// Full merge output of [`merge`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedView {
    /// Results ordered by authority desc, then source-type priority, then
    /// recency desc.
    pub results: Vec<MergedResult>,
    /// Detected contradictions; reported but never change ranking.
    pub conflicts: Vec<Conflict>,
}

/// Merge raw store outputs into one authority-ranked view, per the C8
/// component design: symbolic facts always outrank episodic lessons, which
/// always outrank semantic chunks, regardless of the chunk's similarity
/// score.
#[must_use]
pub fn merge(
    facts: &[Fact],
    episodes: &[Episode],
    semantic_hits: &[SemanticHit],
    weights: AuthorityWeights,
) -> MergedView {
    let mut results = Vec::with_capacity(facts.len() + episodes.len() + semantic_hits.len());

    for fact in facts {
        results.push(MergedResult {
            source_type: SourceType::Symbolic,
            content: format!("{}={}", fact.key, fact.value),
            authority: weights.symbolic,
            explanation: format!("fact {}/{}", fact.scope, fact.category),
            recency: fact.updated_at.timestamp(),
        });
    }

    for episode in episodes {
        results.push(MergedResult {
            source_type: SourceType::Episodic,
            content: episode.lesson.clone(),
            authority: weights.episodic,
            explanation: format!("episode ({:?})", episode.lesson_type),
            recency: episode.created_at.timestamp(),
        });
    }

    for hit in semantic_hits {
        let clipped = clip_similarity_unit_interval(hit.score);
        results.push(MergedResult {
            source_type: SourceType::Semantic,
            content: hit.chunk.text.clone(),
            authority: weights.semantic * clipped,
            explanation: format!("cosine similarity {:.3}", hit.score),
            recency: 0,
        });
    }

    results.sort_by(|a, b| {
        b.authority
            .partial_cmp(&a.authority)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.source_type.priority().cmp(&a.source_type.priority()))
            .then_with(|| b.recency.cmp(&a.recency))
    });

    let conflicts = detect_conflicts(facts, semantic_hits);

    MergedView { results, conflicts }
}

/// Detect same-key disagreements between the symbolic store (ground truth)
/// and semantic chunks, without altering ranking.
fn detect_conflicts(facts: &[Fact], semantic_hits: &[SemanticHit]) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    for fact in facts {
        for hit in semantic_hits {
            if hit.chunk.text.contains(&fact.key) && !hit.chunk.text.contains(&fact.value) {
                conflicts.push(Conflict {
                    key: fact.key.clone(),
                    authoritative_value: fact.value.clone(),
                    conflicting_value: hit.chunk.text.clone(),
                });
            }
        }
    }
    conflicts
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::episodic::LessonType;
    use crate::semantic::Chunk;
    use crate::symbolic::Source;
    use std::collections::HashMap;

    fn fact(key: &str, value: &str, confidence: f32) -> Fact {
        Fact {
            id: Uuid::new_v4(),
            project_id: "proj-abc12345".into(),
            scope: "project".into(),
            category: "fact".into(),
            key: key.into(),
            value: value.into(),
            confidence,
            source: Source::User,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            history: Vec::new(),
        }
    }

    fn episode(lesson: &str, confidence: f32) -> Episode {
        Episode {
            id: Uuid::new_v4(),
            project_id: "proj-abc12345".into(),
            created_at: Utc::now(),
            situation: "s".into(),
            action: "a".into(),
            outcome: "o".into(),
            lesson: lesson.into(),
            lesson_type: LessonType::Pattern,
            confidence,
            quality: 0.9,
            fingerprint: "fp".into(),
            ref_count: 1,
        }
    }

    fn semantic_hit(text: &str, score: f32) -> SemanticHit {
        SemanticHit {
            chunk: Chunk {
                chunk_id: Uuid::new_v4(),
                doc_id: Uuid::new_v4(),
                project_id: "proj-abc12345".into(),
                text: text.into(),
                ordinal: 0,
                embedding: vec![0.0; 4],
                metadata: HashMap::new(),
            },
            score,
        }
    }

    #[test]
    fn authority_law_symbolic_outranks_semantic_even_at_low_confidence() {
        let facts = vec![fact("language", "python", 0.1)];
        let hits = vec![semantic_hit("language is rust, definitely", 0.99)];
        let view = merge(&facts, &[], &hits, AuthorityWeights::default());
        assert_eq!(view.results[0].source_type, SourceType::Symbolic);
    }

    #[test]
    fn episodic_outranks_semantic_at_equal_raw_confidence() {
        let episodes = vec![episode("retry with backoff", 0.8)];
        let hits = vec![semantic_hit("unrelated chunk", 0.8)];
        let view = merge(&[], &episodes, &hits, AuthorityWeights::default());
        assert_eq!(view.results[0].source_type, SourceType::Episodic);
    }

    #[test]
    fn negative_similarity_is_floored_rather_than_inflating_rank() {
        let hits = vec![semantic_hit("chunk", -0.9)];
        let view = merge(&[], &[], &hits, AuthorityWeights::default());
        assert!((view.results[0].authority - 0.0).abs() < 1e-6);
    }

    #[test]
    fn conflicting_fact_and_chunk_are_reported_without_changing_order() {
        let facts = vec![fact("theme", "dark", 1.0)];
        let hits = vec![semantic_hit("the theme is light by default", 0.9)];
        let view = merge(&facts, &[], &hits, AuthorityWeights::default());
        assert_eq!(view.conflicts.len(), 1);
        assert_eq!(view.results[0].source_type, SourceType::Symbolic);
    }
}
