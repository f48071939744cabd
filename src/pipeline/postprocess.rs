//! Post-processing: clean a model reply before it is decoded as JSON.
//!
//! Models asked for "only JSON" still wrap it in ```` ```json ```` fences
//! fairly often, and some gateways prepend a BOM. Both break `serde_json`.
//! These rules remove the wrapper and nothing else; anything that is still
//! not JSON afterwards is reported as malformed content by the interpreter.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to the model's `content` field.
///
/// 1. Strip invisible Unicode (BOM, zero-width characters)
/// 2. Strip a leading fence marker (with optional language tag)
/// 3. Strip a trailing fence marker
pub fn clean_content(input: &str) -> String {
    let s = remove_invisible_chars(input);
    strip_code_fences(&s)
}

// ── Rules 2 & 3: fences ──────────────────────────────────────────────────────

static RE_LEADING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*```[A-Za-z0-9_-]*[ \t]*\r?\n?").unwrap());

static RE_TRAILING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*```\s*$").unwrap());

/// Remove one leading and one trailing fenced-block marker.
///
/// Leading and trailing markers are handled independently: a reply that was
/// cut off by the token limit keeps its opening fence stripped even though
/// the closing one never arrived.
pub fn strip_code_fences(input: &str) -> String {
    let s = RE_LEADING_FENCE.replace(input, "");
    RE_TRAILING_FENCE.replace(&s, "").trim().to_string()
}

// ── Rule 1: invisible characters ─────────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(['\u{200B}', '\u{FEFF}', '\u{200C}', '\u{200D}', '\u{2060}'], "")
}
