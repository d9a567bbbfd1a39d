//! Text cleaning between extraction and the chat request.
//!
//! PDF text layers routinely contain stray control bytes (form feeds from
//! page boundaries, `0x01`–`0x08` glyph placeholders) and long runs of
//! spaces used for column alignment. Both waste prompt tokens and some
//! endpoints reject raw control characters in JSON strings outright.
//!
//! Two passes, in this order: drop control characters, then collapse
//! whitespace runs. Dropping first means a control byte sitting between two
//! spaces still collapses to one space, which is what makes [`clean`]
//! idempotent.

use once_cell::sync::Lazy;
use regex::Regex;

// Tab, line feed and carriage return (0x09, 0x0A, 0x0D) are kept.
static RE_CONTROL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F]").unwrap());

static RE_WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

/// Strip control characters, collapse whitespace runs of two or more into a
/// single space, and trim both ends.
pub fn clean(text: &str) -> String {
    let s = RE_CONTROL.replace_all(text, "");
    let s = RE_WHITESPACE_RUN.replace_all(&s, " ");
    s.trim().to_string()
}
