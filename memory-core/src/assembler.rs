//! Context Assembler (C9): formats a merged view into a sectioned
//! prompt-injection payload.

use crate::config::AssemblerCaps;
use crate::reader::{MergedView, SourceType};

/// Deterministic, prompt-ready rendering of a [`MergedView`].
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    /// Rendered "Facts" section (symbolic results), possibly empty.
    pub facts_section: String,
    /// Rendered "Lessons" section (episodic results), possibly empty.
    pub lessons_section: String,
    /// Rendered "Reference" section (semantic results), possibly empty.
    pub reference_section: String,
}

impl AssembledContext {
    /// Join the non-empty sections into one compact string for callers
    /// that inject directly into a prompt.
    #[must_use]
    pub fn render(&self) -> String {
        let mut parts = Vec::new();
        if !self.facts_section.is_empty() {
            parts.push(format!("Facts:\n{}", self.facts_section));
        }
        if !self.lessons_section.is_empty() {
            parts.push(format!("Lessons:\n{}", self.lessons_section));
        }
        if !self.reference_section.is_empty() {
            parts.push(format!("Reference:\n{}", self.reference_section));
        }
        parts.join("\n\n")
    }
}

/// Build a section from already-ordered results, never truncating a unit
/// mid-way: a unit that would overflow `cap` is dropped entirely rather
/// than clipped.
fn build_section(units: impl Iterator<Item = String>, cap: usize) -> String {
    let mut out = String::new();
    for unit in units {
        let candidate_len = out.len() + usize::from(!out.is_empty()) + unit.len();
        if candidate_len > cap {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&unit);
    }
    out
}

/// Assemble `view` into sectioned, prompt-ready text under `caps`.
#[must_use]
pub fn assemble(view: &MergedView, caps: AssemblerCaps) -> AssembledContext {
    let facts_units = view
        .results
        .iter()
        .filter(|r| r.source_type == SourceType::Symbolic)
        .map(|r| format!("- {}", r.content));
    let lessons_units = view
        .results
        .iter()
        .filter(|r| r.source_type == SourceType::Episodic)
        .map(|r| format!("- {}", r.content));
    let reference_units = view
        .results
        .iter()
        .filter(|r| r.source_type == SourceType::Semantic)
        .map(|r| format!("- {}", r.content));

    AssembledContext {
        facts_section: build_section(facts_units, caps.facts_cap),
        lessons_section: build_section(lessons_units, caps.lessons_cap),
        reference_section: build_section(reference_units, caps.reference_cap),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::MergedResult;

    fn result(source_type: SourceType, content: &str) -> MergedResult {
        MergedResult {
            source_type,
            content: content.to_string(),
            authority: 1.0,
            explanation: String::new(),
            recency: 0,
        }
    }

    #[test]
    fn never_truncates_a_unit_mid_way() {
        let view = MergedView {
            results: vec![
                result(SourceType::Symbolic, "short one"),
                result(SourceType::Symbolic, &"x".repeat(100)),
            ],
            conflicts: vec![],
        };
        let caps = AssemblerCaps {
            facts_cap: 30,
            lessons_cap: 2_000,
            reference_cap: 2_000,
        };
        let assembled = assemble(&view, caps);
        assert!(assembled.facts_section.contains("short one"));
        assert!(!assembled.facts_section.contains(&"x".repeat(100)));
    }

    #[test]
    fn sections_route_by_source_type() {
        let view = MergedView {
            results: vec![
                result(SourceType::Symbolic, "fact one"),
                result(SourceType::Episodic, "lesson one"),
                result(SourceType::Semantic, "chunk one"),
            ],
            conflicts: vec![],
        };
        let assembled = assemble(&view, AssemblerCaps::default());
        assert!(assembled.facts_section.contains("fact one"));
        assert!(assembled.lessons_section.contains("lesson one"));
        assert!(assembled.reference_section.contains("chunk one"));
    }

    #[test]
    fn empty_view_renders_empty_string() {
        let assembled = assemble(&MergedView::default(), AssemblerCaps::default());
        assert_eq!(assembled.render(), "");
    }
}
