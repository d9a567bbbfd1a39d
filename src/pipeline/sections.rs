//! Heuristic section splitter for model output.
//!
//! The prompt asks the model for three parts: a brief summary, a full
//! analysis and a translation of the source text. Models follow heading
//! instructions loosely, so the reply is partitioned by an ordered table of
//! marker rules rather than a grammar. Rules are tried in table order within
//! each role; the first rule that matches anywhere wins, even if a later
//! rule would match earlier in the text.
//!
//! Partitioning:
//!
//! 1. The translation marker splits the reply: everything from the marker on
//!    is the translation, everything before it is the main body.
//! 2. Inside the main body, a brief marker that precedes a full marker opens
//!    the brief section, which runs up to the full marker.
//! 3. The full section runs from the full marker to the end of the main body.
//!    With no usable markers the whole main body is the full section.
//!
//! Sections never overlap and no text is dropped apart from surrounding
//! whitespace and any preamble before the first marker.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Which part of the report a marker opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionRole {
    Brief,
    Full,
    Translation,
}

struct MarkerRule {
    role: SectionRole,
    pattern: Regex,
}

static MARKER_RULES: Lazy<Vec<MarkerRule>> = Lazy::new(|| {
    let table: [(SectionRole, &str); 11] = [
        (SectionRole::Translation, r"原文翻译"),
        (SectionRole::Translation, r"译文"),
        (SectionRole::Translation, r"\bTranslation\b"),
        (SectionRole::Brief, r"第一篇[:：]\s*简洁版本"),
        (SectionRole::Brief, r"简洁版本"),
        (SectionRole::Brief, r"（简洁版）"),
        (SectionRole::Brief, r"\bBrief\b"),
        (SectionRole::Full, r"第二篇[:：]\s*完整版本"),
        (SectionRole::Full, r"完整版本"),
        (SectionRole::Full, r"（完整版）"),
        (SectionRole::Full, r"\bFull\b"),
    ];
    table
        .into_iter()
        .map(|(role, pattern)| MarkerRule {
            role,
            pattern: Regex::new(pattern).unwrap(),
        })
        .collect()
});

/// The three parts of an analysis.
///
/// `brief` and `translation` are empty when their markers were not found;
/// `full` then carries whatever text remained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SectionSet {
    pub brief: String,
    pub full: String,
    pub translation: String,
}

impl SectionSet {
    pub fn has_brief(&self) -> bool {
        !self.brief.is_empty()
    }

    pub fn has_translation(&self) -> bool {
        !self.translation.is_empty()
    }
}

/// Byte offset of the first marker for `role`, trying rules in table order.
pub fn first_marker(text: &str, role: SectionRole) -> Option<usize> {
    MARKER_RULES
        .iter()
        .filter(|rule| rule.role == role)
        .find_map(|rule| rule.pattern.find(text))
        .map(|m| m.start())
}

/// Partition raw model output into brief, full and translation sections.
///
/// Never fails. `split("")` returns three empty strings.
pub fn split(raw: &str) -> SectionSet {
    let text = raw.trim();

    let (main, translation) = match first_marker(text, SectionRole::Translation) {
        Some(at) => text.split_at(at),
        None => (text, ""),
    };

    let brief_at = first_marker(main, SectionRole::Brief);
    let full_at = first_marker(main, SectionRole::Full);

    let (brief, full) = match (brief_at, full_at) {
        (Some(b), Some(f)) if b < f => (&main[b..f], &main[f..]),
        (None, Some(f)) => ("", &main[f..]),
        _ => ("", main),
    };

    SectionSet {
        brief: brief.trim().to_string(),
        full: full.trim().to_string(),
        translation: translation.trim().to_string(),
    }
}
