//! Sanitisation: deterministic cleanup of the raw model response.
//!
//! Even when asked for "JSON only", models wrap the payload in ` ```json `
//! fences, add a sentence of preamble, or emit a BOM. This stage strips those
//! wrappers without touching the payload itself. It never fails: the worst
//! case is the trimmed input returned unchanged.
//!
//! ## Rule Order
//!
//! 1. Normalise line endings (CRLF → LF) so fence detection sees clean lines
//! 2. Strip invisible Unicode (BOM, zero-width spaces) that breaks parsing
//! 3. Unwrap the first fenced code block holding structure; fences around
//!    prose only are left in place
//! 4. Trim surrounding whitespace
//! 5. Mark text with no `{` or `[` at all as unstructured

use once_cell::sync::Lazy;
use regex::Regex;

/// Sanitised text plus the empty-span marker for the next stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedText {
    pub text: String,
    /// `false` when the text is entirely prose: no `{` or `[` anywhere.
    pub structured: bool,
    /// `true` when a fenced block was unwrapped.
    pub unfenced: bool,
}

/// Apply all sanitisation rules to the raw response.
pub fn sanitize(raw: &str) -> SanitizedText {
    let s = normalise_line_endings(raw);
    let s = remove_invisible_chars(&s);
    let (s, unfenced) = match unwrap_fences(&s) {
        Some(inner) => (inner, true),
        None => (s, false),
    };
    let text = s.trim().to_string();
    let structured = text.contains(['{', '[']);
    SanitizedText {
        text,
        structured,
        unfenced,
    }
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Unwrap fenced code blocks ────────────────────────────────────────
//
// A fence opens with three or more backticks and an optional language tag
// (```json, ```JSON5, ``` javascript). The block body runs to the next fence
// line or, for a truncated response, to the end of the text.

static RE_FENCE_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)`{3,}[ \t]*[A-Za-z0-9_+-]*[ \t]*\n(.*?)(?:\n[ \t]*`{3,}|\z)")
        .unwrap()
});

static RE_INLINE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)`{3,}(?:json)?(.*?)(?:`{3,}|\z)").unwrap());

fn unwrap_fences(input: &str) -> Option<String> {
    if !input.contains("```") {
        return None;
    }
    let blocks: Vec<&str> = RE_FENCE_BLOCK
        .captures_iter(input)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    if let Some(block) = blocks.iter().find(|b| b.contains(['{', '['])) {
        return Some((*block).to_string());
    }
    if !blocks.is_empty() {
        // Only prose inside the fences; the payload, if any, is outside them.
        return None;
    }
    // Fence markers on the same line as the payload: ```{"a":1}```
    RE_INLINE_FENCE
        .captures(input)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|inner| inner.contains(['{', '[']))
}

// ── Tests ────────────────────────────────────────────────────────────────────
