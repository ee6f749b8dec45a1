//! Result types produced by the extraction pipeline.
//!
//! [`ExtractionResult`] is always returned by value; a failed extraction is a
//! result with `status = failed`, no record, every diagnostic gathered up to
//! the failing stage, and the untouched raw response for offline debugging.

use crate::error::{DiagnosticKind, ExtractError, Severity};
use crate::taxonomy::Category;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Diagnostics ──────────────────────────────────────────────────────────

/// The pipeline stage a diagnostic originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Sanitize,
    Locate,
    Parse,
    Validate,
    Categorize,
    Pipeline,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Sanitize => "sanitize",
            Stage::Locate => "locate",
            Stage::Parse => "parse",
            Stage::Validate => "validate",
            Stage::Categorize => "categorize",
            Stage::Pipeline => "pipeline",
        };
        f.write_str(s)
    }
}

/// One note explaining why a result is partial, or why it failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment: Option<String>,
}

impl Diagnostic {
    pub fn new(stage: Stage, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            severity: kind.severity(),
            message: message.into(),
            fragment: None,
        }
    }

    /// Attach the source text that triggered this diagnostic, truncated to
    /// `max_len` characters.
    pub fn with_fragment(mut self, fragment: &str, max_len: usize) -> Self {
        self.fragment = Some(truncate_chars(fragment, max_len));
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.stage, self.kind, self.message)
    }
}

/// Truncate to at most `max_len` characters, marking the cut with `…`.
pub(crate) fn truncate_chars(s: &str, max_len: usize) -> String {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => format!("{}\u{2026}", &s[..idx]),
        None => s.to_string(),
    }
}

// ── Record ───────────────────────────────────────────────────────────────

/// Where an item's category came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategorySource {
    /// Supplied by the model and found in the taxonomy.
    Upstream,
    /// Matched a caller keyword override.
    Override,
    /// Matched a built-in keyword rule.
    Rule,
    /// Nothing matched; default category.
    Default,
}

/// One validated purchase line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    /// Whitespace-normalised, never empty.
    pub description: String,
    /// Strictly positive.
    pub quantity: f64,
    /// Non-negative; 0 when unknown (see `price_known`).
    pub unit_price: f64,
    /// `false` when the unit price was neither reported nor derivable.
    pub price_known: bool,
    /// `quantity × unit_price`, recomputed locally.
    pub line_total: f64,
    /// The line total as reported upstream, for discrepancy checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_total: Option<f64>,
    pub category: Category,
    pub category_source: CategorySource,
    /// The source text this item was built from.
    pub raw_fragment: String,
}

impl LineItem {
    /// `reported_total - line_total`, when a total was reported.
    pub fn total_discrepancy(&self) -> Option<f64> {
        self.reported_total.map(|r| r - self.line_total)
    }
}

/// A validated receipt. `items` is non-empty and in source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    /// ISO-8601 (`YYYY-MM-DD`) when serialised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub items: Vec<LineItem>,
    /// Receipt total as reported upstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
}

impl ReceiptRecord {
    /// Sum of recomputed line totals.
    pub fn items_total(&self) -> f64 {
        self.items.iter().map(|i| i.line_total).sum()
    }
}

// ── Result ───────────────────────────────────────────────────────────────

/// Overall outcome of one pipeline invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    /// Record produced; at most informational diagnostics.
    Ok,
    /// Record produced with at least one warning.
    Degraded,
    /// No usable record.
    Failed,
}

/// The single value every pipeline invocation returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub status: ExtractionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<ReceiptRecord>,
    pub diagnostics: Vec<Diagnostic>,
    pub raw_response: String,
}

impl ExtractionResult {
    /// Build a result, deriving `status` from the record and diagnostics.
    pub fn new(
        record: Option<ReceiptRecord>,
        diagnostics: Vec<Diagnostic>,
        raw_response: String,
    ) -> Self {
        let worst = diagnostics.iter().map(|d| d.severity).max();
        let status = match (&record, worst) {
            (None, _) | (_, Some(Severity::Error)) => ExtractionStatus::Failed,
            (Some(r), _) if r.items.is_empty() => ExtractionStatus::Failed,
            (Some(_), Some(Severity::Warning)) => ExtractionStatus::Degraded,
            (Some(_), _) => ExtractionStatus::Ok,
        };
        let record = if status == ExtractionStatus::Failed {
            None
        } else {
            record
        };
        Self {
            status,
            record,
            diagnostics,
            raw_response,
        }
    }

    /// Terminal result carrying what was gathered so far.
    pub fn failed(diagnostics: Vec<Diagnostic>, raw_response: String) -> Self {
        Self::new(None, diagnostics, raw_response)
    }

    /// `true` for `ok` and `degraded`.
    pub fn is_usable(&self) -> bool {
        self.status != ExtractionStatus::Failed
    }

    /// Diagnostics of a given kind.
    pub fn diagnostics_of(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }

    pub fn has_diagnostic(&self, kind: DiagnosticKind) -> bool {
        self.diagnostics_of(kind).next().is_some()
    }

    /// Convert into `Result`, treating `failed` as an error.
    ///
    /// The error names the first terminal diagnostic, or the last diagnostic
    /// when none is terminal.
    pub fn into_result(self) -> Result<ReceiptRecord, ExtractError> {
        if let Some(record) = self.record {
            return Ok(record);
        }
        let culprit = self
            .diagnostics
            .iter()
            .find(|d| d.severity == Severity::Error)
            .or_else(|| self.diagnostics.last());
        Err(match culprit {
            Some(d) => ExtractError::ExtractionFailed {
                stage: d.stage.to_string(),
                reason: d.message.clone(),
            },
            None => ExtractError::ExtractionFailed {
                stage: Stage::Pipeline.to_string(),
                reason: "no record produced".into(),
            },
        })
    }
}
