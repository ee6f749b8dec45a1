//! Error and diagnostic types for the receipt-extract library.
//!
//! Two distinct types reflect two distinct failure modes:
//!
//! * [`ExtractError`]: **Fatal.** The pipeline cannot be invoked at all
//!   (bad configuration, unreadable input file, unwritable output). Returned
//!   as `Err(ExtractError)` from the file-based and batch entry points.
//!
//! * [`DiagnosticKind`]: **Non-fatal** (mostly). A stage degraded or gave
//!   up on part of the input. Stored inside
//!   [`crate::output::Diagnostic`] on every [`crate::output::ExtractionResult`]
//!   so callers can inspect exactly why a record is partial instead of
//!   receiving a bare failure.
//!
//! Only [`Severity::Error`] kinds are terminal; see [`DiagnosticKind::severity`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the receipt-extract library.
///
/// Stage-level problems use [`DiagnosticKind`] and are recorded on the
/// result rather than propagated here.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A config file could not be parsed as JSON.
    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not read a saved model response.
    #[error("Failed to read response file '{path}': {source}")]
    InputReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the JSON result file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Extraction outcome ────────────────────────────────────────────────
    /// The pipeline ran but produced no usable record.
    ///
    /// Returned by [`crate::output::ExtractionResult::into_result`] when the
    /// caller wants to treat a `failed` status as an error.
    #[error("Receipt extraction failed at stage '{stage}': {reason}")]
    ExtractionFailed { stage: String, reason: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// How much a diagnostic affects the overall result status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational; the status stays `ok`.
    Info,
    /// Partial uncertainty; the status becomes `degraded`.
    Warning,
    /// Terminal; the status becomes `failed`.
    Error,
}

/// What went wrong (or was worked around) inside a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Prose surrounding the structured value was discarded.
    #[error("surrounding text discarded")]
    SurroundingText,

    /// No `{` or `[` was found in the sanitised text.
    #[error("no structure found")]
    NoStructureFound,

    /// Delimiters never balanced; the response was probably cut off.
    #[error("possibly truncated input")]
    TruncatedInput,

    /// One parse layer failed; a later layer may still succeed.
    #[error("parse attempt failed")]
    ParseAttemptFailed,

    /// The span only parsed after a repair pass.
    #[error("repair applied")]
    RepairApplied,

    /// Fields were recovered piecemeal by pattern matching.
    #[error("heuristic recovery")]
    HeuristicRecovery,

    /// Every parse layer failed.
    #[error("unrecoverable parse failure")]
    ParseFailed,

    /// A field could not be converted to its expected type.
    #[error("field coercion error")]
    FieldCoercion,

    /// A line item was removed during normalisation.
    #[error("item dropped")]
    ItemDropped,

    /// Unit price was absent and could not be derived.
    #[error("price unknown")]
    PriceUnknown,

    /// Unit price was derived from the reported line total.
    #[error("price derived")]
    PriceDerived,

    /// Reported and recomputed totals disagree.
    #[error("total mismatch")]
    TotalMismatch,

    /// The upstream category is not part of the taxonomy.
    #[error("category rejected")]
    CategoryRejected,

    /// No rule matched; the default category was assigned.
    #[error("unknown category")]
    UnknownCategory,

    /// Normalisation left zero usable line items.
    #[error("empty result")]
    EmptyResult,

    /// A stage panicked; this is a bug, not a property of the input.
    #[error("internal error")]
    InternalError,
}

impl DiagnosticKind {
    /// Fixed severity of this kind.
    pub fn severity(self) -> Severity {
        use DiagnosticKind::*;
        match self {
            SurroundingText | ParseAttemptFailed | PriceUnknown | PriceDerived | TotalMismatch
            | CategoryRejected => Severity::Info,
            NoStructureFound | TruncatedInput | RepairApplied | HeuristicRecovery
            | FieldCoercion | ItemDropped | UnknownCategory => Severity::Warning,
            ParseFailed | EmptyResult | InternalError => Severity::Error,
        }
    }

    /// `true` when a diagnostic of this kind ends the pipeline.
    pub fn is_terminal(self) -> bool {
        self.severity() == Severity::Error
    }
}
