//! Boundary location: find the JSON value embedded in sanitised text.
//!
//! A naive first-`{`-to-last-`}` substring breaks as soon as the trailing
//! prose itself contains a brace, and a first-`{`-to-first-`}` substring
//! breaks on nesting. Instead the scan keeps a delimiter stack while tracking
//! whether it is inside a string literal (respecting `\"` escapes), so braces
//! inside descriptions never move the boundary. The span ends where the
//! stack empties.
//!
//! Candidate openings are tried left to right. The first balanced candidate
//! that parses and holds line items wins outright. Otherwise balanced
//! candidates are ranked (item keys, then any string literal), so a prose
//! aside such as `[see below]` or a quoted `{"items": []}` example does not
//! shadow the payload. An opener that never balances runs to the end of the
//! text and is flagged as truncated, but only when it is followed by
//! something JSON can start with; `:-{` in the preamble is skipped.

use super::normalize::item_candidates;
use super::sanitize::SanitizedText;
use super::Staged;
use crate::config::ExtractionConfig;
use crate::error::DiagnosticKind;
use crate::output::{Diagnostic, Stage};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// The substring believed to contain the JSON value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonSpan<'a> {
    pub text: &'a str,
    /// Byte offset of the span in the sanitised text.
    pub start: usize,
    /// Exclusive byte offset of the span end.
    pub end: usize,
    /// Delimiters still open at the end of the span, outermost first.
    /// Empty unless `truncated`.
    pub unclosed: Vec<char>,
    /// The span ended inside a string literal.
    pub in_string: bool,
    pub truncated: bool,
    /// `false` when no opening delimiter exists and the whole text was passed through.
    pub structured: bool,
}

/// Result of scanning from one opening delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ScanEnd {
    /// Exclusive byte offset one past the balancing closer.
    Closed(usize),
    /// End of text reached with delimiters still open.
    Open { unclosed: Vec<char>, in_string: bool },
}

/// Closer for an opening delimiter.
pub(crate) fn closer_for(open: char) -> char {
    if open == '[' {
        ']'
    } else {
        '}'
    }
}

/// Walk `text` from byte `start` (which must hold `{` or `[`) until the
/// delimiter stack empties.
///
/// Closers that do not match the innermost opener are ignored.
pub(crate) fn scan_balanced(text: &str, start: usize) -> ScanEnd {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => stack.push(ch),
            '}' | ']' => {
                if stack.last().map(|&o| closer_for(o)) == Some(ch) {
                    stack.pop();
                    if stack.is_empty() {
                        return ScanEnd::Closed(start + offset + 1);
                    }
                }
            }
            _ => {}
        }
    }

    ScanEnd::Open {
        unclosed: stack,
        in_string,
    }
}

/// Locate the JSON span in `input`.
pub fn locate<'a>(input: &'a SanitizedText, config: &ExtractionConfig) -> Staged<JsonSpan<'a>> {
    let text = input.text.as_str();
    let mut diagnostics = Vec::new();

    let span = if input.structured {
        find_span(text)
    } else {
        None
    };

    let Some(span) = span else {
        debug!("locate: no opening delimiter in {} bytes", text.len());
        diagnostics.push(
            Diagnostic::new(
                Stage::Locate,
                DiagnosticKind::NoStructureFound,
                "no '{' or '[' found; passing the full text to the parser",
            )
            .with_fragment(text, config.max_fragment_len),
        );
        return Staged::new(
            JsonSpan {
                text,
                start: 0,
                end: text.len(),
                unclosed: Vec::new(),
                in_string: false,
                truncated: false,
                structured: false,
            },
            diagnostics,
        );
    };

    debug!(
        "locate: span {}..{} of {} bytes (truncated: {})",
        span.start,
        span.end,
        text.len(),
        span.truncated
    );

    let before = text[..span.start].trim();
    let after = text[span.end..].trim();
    if !before.is_empty() || !after.is_empty() {
        let discarded = if before.is_empty() { after } else { before };
        diagnostics.push(
            Diagnostic::new(
                Stage::Locate,
                DiagnosticKind::SurroundingText,
                format!(
                    "discarded {} bytes before and {} bytes after the structured value",
                    before.len(),
                    after.len()
                ),
            )
            .with_fragment(discarded, config.max_fragment_len),
        );
    }

    if span.truncated {
        let closers: String = span.unclosed.iter().rev().map(|&o| closer_for(o)).collect();
        diagnostics.push(
            Diagnostic::new(
                Stage::Locate,
                DiagnosticKind::TruncatedInput,
                format!(
                    "delimiters never balanced; possibly truncated (missing '{}'{})",
                    closers,
                    if span.in_string {
                        " inside an open string"
                    } else {
                        ""
                    }
                ),
            )
            .with_fragment(tail(span.text, config.max_fragment_len), config.max_fragment_len),
        );
    }

    Staged::new(span, diagnostics)
}

/// How strongly a balanced candidate looks like the receipt payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    Bare,
    HasString,
    HasItemKey,
}

fn rank(candidate: &str) -> Rank {
    if RE_ITEM_KEY.is_match(candidate) {
        Rank::HasItemKey
    } else if candidate.contains('"') {
        Rank::HasString
    } else {
        Rank::Bare
    }
}

static RE_ITEM_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)"(?:items|line_?items|products|purchases|description|item|item_?name|product|name)"\s*:"#,
    )
    .unwrap()
});

/// `true` when the opener at `start` is followed by something a JSON
/// container can begin with. `:-{ sorry` is not; `{"items"` and `[ {` are.
fn opens_json(text: &str, start: usize) -> bool {
    let open = text[start..].chars().next();
    let next = text[start + 1..].trim_start().chars().next();
    match (open, next) {
        (_, None) => true,
        (Some('{'), Some(c)) => c == '"' || c == '}',
        (Some('['), Some(c)) => matches!(c, '"' | '{' | '[' | ']' | '-' | '0'..='9'),
        _ => false,
    }
}

fn find_span(text: &str) -> Option<JsonSpan<'_>> {
    let mut best: Option<(Rank, JsonSpan<'_>)> = None;
    let mut prose_truncated: Option<JsonSpan<'_>> = None;
    let mut cursor = 0;

    while let Some(rel) = text[cursor..].find(['{', '[']) {
        let start = cursor + rel;
        match scan_balanced(text, start) {
            ScanEnd::Closed(end) => {
                let candidate = &text[start..end];
                let span = JsonSpan {
                    text: candidate,
                    start,
                    end,
                    unclosed: Vec::new(),
                    in_string: false,
                    truncated: false,
                    structured: true,
                };
                if holds_items(candidate) {
                    return Some(span);
                }
                let r = rank(candidate);
                if best.as_ref().map_or(true, |(b, _)| r > *b) {
                    best = Some((r, span));
                }
                cursor = end;
            }
            ScanEnd::Open {
                unclosed,
                in_string,
            } => {
                let end = start + text[start..].trim_end().len();
                let span = JsonSpan {
                    text: &text[start..end],
                    start,
                    end,
                    unclosed,
                    in_string,
                    truncated: true,
                    structured: true,
                };
                if opens_json(text, start) {
                    // A cut-off payload beats an earlier example, unless only
                    // the example names line items.
                    let best_has_items = matches!(best, Some((Rank::HasItemKey, _)));
                    if best_has_items && rank(span.text) < Rank::HasItemKey {
                        return best.map(|(_, b)| b);
                    }
                    return Some(span);
                }
                if prose_truncated.is_none() {
                    prose_truncated = Some(span);
                }
                cursor = start + 1;
            }
        }
    }

    let best_is_bare = best.as_ref().map_or(true, |(r, _)| *r == Rank::Bare);
    if best_is_bare && prose_truncated.is_some() {
        return prose_truncated;
    }
    best.map(|(_, span)| span)
}

/// The candidate parses as-is and carries at least one line-item object.
/// `[1]` in a footnote does not count.
fn holds_items(candidate: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(candidate)
        .map(|v| item_candidates(&v).iter().any(|item| item.is_object()))
        .unwrap_or(false)
}

/// Last `max_len` characters of `s`.
fn tail(s: &str, max_len: usize) -> &str {
    let count = s.chars().count();
    if count <= max_len {
        return s;
    }
    let skip = count - max_len;
    let idx = s.char_indices().nth(skip).map(|(i, _)| i).unwrap_or(0);
    &s[idx..]
}
