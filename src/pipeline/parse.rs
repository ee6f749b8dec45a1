//! Layered parsing: strict, then repaired, then heuristic.
//!
//! The layers share one input shape ([`ParseInput`]) and one output shape
//! (`Result<ParsedReceipt, Diagnostic>`) and live in an ordered table. The
//! first layer to succeed wins; a failing layer contributes an informational
//! diagnostic and the next one runs. Strict mode truncates the table to its
//! first entry.

use super::locate::{scan_balanced, JsonSpan, ScanEnd};
use super::normalize::item_candidates;
use super::repair::{cut_back, repair};
use super::Staged;
use crate::config::ExtractionConfig;
use crate::error::DiagnosticKind;
use crate::output::{Diagnostic, Stage};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

/// Everything a parse layer may look at.
#[derive(Debug, Clone, Copy)]
pub struct ParseInput<'a> {
    pub span: &'a JsonSpan<'a>,
    /// The full sanitised text; the heuristic layer scans all of it.
    pub text: &'a str,
}

/// Which layer produced a [`ParsedReceipt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseLayer {
    Strict,
    Repaired,
    Heuristic,
}

impl ParseLayer {
    pub fn name(self) -> &'static str {
        match self {
            ParseLayer::Strict => "strict",
            ParseLayer::Repaired => "repair",
            ParseLayer::Heuristic => "heuristic",
        }
    }
}

/// A successful but not yet validated parse.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReceipt {
    pub value: Value,
    pub layer: ParseLayer,
    /// Source text per item, aligned with the item list, when the layer
    /// knows it better than re-serialising the item value.
    pub item_fragments: Option<Vec<String>>,
    /// Notes the layer wants attached on success.
    pub notes: Vec<Diagnostic>,
}

type Layer = fn(&ParseInput<'_>, &ExtractionConfig) -> Result<ParsedReceipt, Diagnostic>;

const LAYERS: [(ParseLayer, Layer); 3] = [
    (ParseLayer::Strict, parse_strict as Layer),
    (ParseLayer::Repaired, parse_repaired as Layer),
    (ParseLayer::Heuristic, parse_heuristic as Layer),
];

/// Run the layers in order until one succeeds.
///
/// On failure every layer's diagnostic is returned, followed by a terminal
/// `parse_failed`.
pub fn parse(
    input: &ParseInput<'_>,
    config: &ExtractionConfig,
) -> Result<Staged<ParsedReceipt>, Vec<Diagnostic>> {
    let layers = if config.strict_mode {
        &LAYERS[..1]
    } else {
        &LAYERS[..]
    };

    let mut diagnostics = Vec::new();
    for (layer, run) in layers {
        match run(input, config) {
            Ok(mut parsed) => {
                debug!("parse: layer '{}' succeeded", layer.name());
                diagnostics.append(&mut parsed.notes);
                return Ok(Staged::new(parsed, diagnostics));
            }
            Err(d) => {
                debug!("parse: layer '{}' failed: {}", layer.name(), d.message);
                diagnostics.push(d);
            }
        }
    }

    let tried: Vec<&str> = layers.iter().map(|(l, _)| l.name()).collect();
    diagnostics.push(
        Diagnostic::new(
            Stage::Parse,
            DiagnosticKind::ParseFailed,
            format!("all parse layers failed ({})", tried.join(", ")),
        )
        .with_fragment(input.span.text, config.max_fragment_len),
    );
    Err(diagnostics)
}

fn attempt_failed(
    layer: ParseLayer,
    reason: impl std::fmt::Display,
    fragment: &str,
    config: &ExtractionConfig,
) -> Diagnostic {
    Diagnostic::new(
        Stage::Parse,
        DiagnosticKind::ParseAttemptFailed,
        format!("{} parse failed: {}", layer.name(), reason),
    )
    .with_fragment(fragment, config.max_fragment_len)
}

// ── Layer 1: strict ──────────────────────────────────────────────────────────

fn parse_strict(
    input: &ParseInput<'_>,
    config: &ExtractionConfig,
) -> Result<ParsedReceipt, Diagnostic> {
    let text = input.span.text;
    match serde_json::from_str::<Value>(text) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Ok(ParsedReceipt {
            value,
            layer: ParseLayer::Strict,
            item_fragments: None,
            notes: Vec::new(),
        }),
        Ok(other) => Err(attempt_failed(
            ParseLayer::Strict,
            format!("expected an object or array, found {}", json_type(&other)),
            text,
            config,
        )),
        Err(e) => Err(attempt_failed(ParseLayer::Strict, e, text, config)),
    }
}

// ── Layer 2: repair ──────────────────────────────────────────────────────────

fn parse_repaired(
    input: &ParseInput<'_>,
    config: &ExtractionConfig,
) -> Result<ParsedReceipt, Diagnostic> {
    let span = input.span;
    if !span.structured {
        return Err(attempt_failed(
            ParseLayer::Repaired,
            "no structured span to repair",
            span.text,
            config,
        ));
    }

    let mut last_error = String::new();
    for attempt in 1..=config.max_repair_attempts {
        let cut = (attempt - 1) as usize;
        let Some(candidate) = cut_back(span.text, cut) else {
            break;
        };
        let repaired = repair(candidate);
        match serde_json::from_str::<Value>(&repaired.text) {
            Ok(value @ (Value::Object(_) | Value::Array(_))) => {
                if cut > 0 && item_candidates(&value).is_empty() {
                    last_error = format!("attempt {attempt} kept no line items");
                    continue;
                }
                let mut fixes = repaired.fixes;
                if cut > 0 {
                    fixes.insert(
                        0,
                        format!(
                            "discarded {} trailing bytes",
                            span.text.len() - candidate.len()
                        ),
                    );
                }
                let note = Diagnostic::new(
                    Stage::Parse,
                    DiagnosticKind::RepairApplied,
                    format!(
                        "parsed after repair attempt {}: {}",
                        attempt,
                        if fixes.is_empty() {
                            "no changes".to_string()
                        } else {
                            fixes.join("; ")
                        }
                    ),
                )
                .with_fragment(span.text, config.max_fragment_len);
                return Ok(ParsedReceipt {
                    value,
                    layer: ParseLayer::Repaired,
                    item_fragments: None,
                    notes: vec![note],
                });
            }
            Ok(other) => {
                last_error = format!("expected an object or array, found {}", json_type(&other));
            }
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(attempt_failed(
        ParseLayer::Repaired,
        format!(
            "{} attempt(s) exhausted; last error: {}",
            config.max_repair_attempts, last_error
        ),
        span.text,
        config,
    ))
}

// ── Layer 3: heuristic field extraction ──────────────────────────────────────
//
// Every `"description": "..."` occurrence anchors one item. The item's window
// starts at the nearest `{` before the anchor (so fields listed before the
// description are kept) and ends at the `}` balancing that brace. Without a
// balancing brace it ends at the first unquoted closer after the anchor, or
// where the next window starts. Header fields come from the text outside
// every window, before and after the items.

const STRING_LIT: &str = r#""((?:[^"\\]|\\.)*)""#;
const NUMBER_LIT: &str = r"(-?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)";

fn field_regex(keys: &str) -> Regex {
    Regex::new(&format!(
        r#"(?i)"(?:{keys})"\s*:\s*(?:{STRING_LIT}|{NUMBER_LIT})"#
    ))
    .unwrap()
}

static RE_DESCRIPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"(?i)"(?:description|item_?description|item_?name|item|product|name)"\s*:\s*{STRING_LIT}"#
    ))
    .unwrap()
});
static RE_QUANTITY: Lazy<Regex> = Lazy::new(|| field_regex("quantity|qty"));
static RE_UNIT_PRICE: Lazy<Regex> = Lazy::new(|| field_regex("unit_?price|price|unit_?cost"));
static RE_LINE_TOTAL: Lazy<Regex> = Lazy::new(|| field_regex("line_?total|total|amount"));
static RE_CATEGORY: Lazy<Regex> = Lazy::new(|| field_regex("category"));
static RE_VENDOR: Lazy<Regex> =
    Lazy::new(|| field_regex("vendor|vendor_?name|store|store_?name|merchant"));
static RE_DATE: Lazy<Regex> = Lazy::new(|| field_regex("date|purchase_?date|transaction_?date"));
static RE_HEADER_TOTAL: Lazy<Regex> = Lazy::new(|| field_regex("total|total_?amount|grand_?total"));
static RE_GRAND_TOTAL: Lazy<Regex> = Lazy::new(|| field_regex("grand_?total|total_?amount|receipt_?total"));

fn parse_heuristic(
    input: &ParseInput<'_>,
    config: &ExtractionConfig,
) -> Result<ParsedReceipt, Diagnostic> {
    let text = input.text;
    let anchors: Vec<(usize, usize)> = RE_DESCRIPTION
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect();
    if anchors.is_empty() {
        return Err(attempt_failed(
            ParseLayer::Heuristic,
            "no description fields found",
            text,
            config,
        ));
    }

    // Window starts: nearest '{' between the previous anchor and this one.
    let mut starts = Vec::with_capacity(anchors.len());
    let mut prev_end = 0;
    for &(a_start, a_end) in &anchors {
        let start = text[prev_end..a_start]
            .rfind('{')
            .map(|i| prev_end + i)
            .unwrap_or(a_start);
        starts.push(start);
        prev_end = a_end;
    }

    let mut windows = Vec::with_capacity(anchors.len());
    for (i, &start) in starts.iter().enumerate() {
        let limit = starts.get(i + 1).copied().unwrap_or(text.len());
        windows.push((start, window_end(text, start, anchors[i].1, limit)));
    }

    let mut items = Vec::with_capacity(windows.len());
    let mut fragments = Vec::with_capacity(windows.len());
    for &(start, end) in &windows {
        let window = &text[start..end];
        let mut item = Map::new();
        if let Some(desc) = RE_DESCRIPTION.captures(window).and_then(|c| c.get(1)) {
            item.insert("description".into(), Value::String(unescape(desc.as_str())));
        }
        for (key, re) in [
            ("quantity", &*RE_QUANTITY),
            ("unitPrice", &*RE_UNIT_PRICE),
            ("lineTotal", &*RE_LINE_TOTAL),
            ("category", &*RE_CATEGORY),
        ] {
            if let Some(v) = capture_value(re, window) {
                item.insert(key.into(), v);
            }
        }
        items.push(Value::Object(item));
        fragments.push(trim_window(window).to_string());
    }

    let header = outside_windows(text, &windows);
    let mut receipt = Map::new();
    for (key, re) in [
        ("vendor", &*RE_VENDOR),
        ("date", &*RE_DATE),
        ("total", &*RE_HEADER_TOTAL),
    ] {
        if let Some(v) = capture_value(re, &header) {
            receipt.insert(key.into(), v);
        }
    }
    if !receipt.contains_key("total") {
        if let Some(v) = capture_value(&RE_GRAND_TOTAL, text) {
            receipt.insert("total".into(), v);
        }
    }
    let count = items.len();
    receipt.insert("items".into(), Value::Array(items));

    debug!("parse: heuristic layer recovered {} item(s)", count);
    let note = Diagnostic::new(
        Stage::Parse,
        DiagnosticKind::HeuristicRecovery,
        format!("recovered {count} item(s) by field matching; structure could not be parsed"),
    )
    .with_fragment(text, config.max_fragment_len);

    Ok(ParsedReceipt {
        value: Value::Object(receipt),
        layer: ParseLayer::Heuristic,
        item_fragments: Some(fragments),
        notes: vec![note],
    })
}

/// End of the item window opened at `start`, never past `limit`.
fn window_end(text: &str, start: usize, anchor_end: usize, limit: usize) -> usize {
    if text[start..].starts_with('{') {
        if let ScanEnd::Closed(end) = scan_balanced(text, start) {
            if end <= limit {
                return end;
            }
        }
    }
    first_closer(&text[anchor_end..limit]).map_or(limit, |i| anchor_end + i + 1)
}

/// Byte offset of the first `}` or `]` outside a string literal.
fn first_closer(s: &str) -> Option<usize> {
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in s.char_indices() {
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
            '}' | ']' => return Some(i),
            _ => {}
        }
    }
    None
}

/// The text between and around the item windows, joined by newlines.
fn outside_windows(text: &str, windows: &[(usize, usize)]) -> String {
    let mut pieces = Vec::with_capacity(windows.len() + 1);
    let mut cursor = 0;
    for &(start, end) in windows {
        if start > cursor {
            pieces.push(&text[cursor..start]);
        }
        cursor = cursor.max(end);
    }
    pieces.push(&text[cursor..]);
    pieces.join("\n")
}

fn capture_value(re: &Regex, haystack: &str) -> Option<Value> {
    let caps = re.captures(haystack)?;
    if let Some(s) = caps.get(1) {
        return Some(Value::String(unescape(s.as_str())));
    }
    caps.get(2)
        .and_then(|n| serde_json::from_str::<Value>(n.as_str()).ok())
}

/// Decode JSON string escapes; falls back to the raw text on bad escapes.
fn unescape(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{raw}\"")).unwrap_or_else(|_| raw.to_string())
}

fn trim_window(window: &str) -> &str {
    window
        .trim()
        .trim_end_matches(|c: char| c == ',' || c == ']' || c == '}' || c.is_whitespace())
}

pub(crate) fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
