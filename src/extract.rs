//! Extraction entry points.
//!
//! [`extract`] is the core: synchronous, pure, and total. Whatever the model
//! sent back, the caller gets an [`ExtractionResult`]; a panic inside a stage
//! is caught and reported as an `internal_error` diagnostic. The file and
//! batch entry points wrap it and are the only places a fatal
//! [`ExtractError`] can come from.

use crate::config::ExtractionConfig;
use crate::error::{DiagnosticKind, ExtractError};
use crate::output::{Diagnostic, ExtractionResult, ExtractionStatus, Stage};
use crate::pipeline::parse::{self, ParseInput};
use crate::pipeline::{categorize, locate, normalize, sanitize};
use futures::stream::{self, StreamExt};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Turn one raw model response into an [`ExtractionResult`].
///
/// Deterministic: the same input and configuration always produce the same
/// result.
///
/// # Example
/// ```rust
/// use receipt_extract::{extract, Category, ExtractionConfig, ExtractionStatus};
///
/// let raw = r#"Sure! {"vendor":"Co-op","items":[{"description":"Layer Pellets","quantity":2,"unitPrice":14.5}]}"#;
/// let result = extract(raw, &ExtractionConfig::default());
/// assert_eq!(result.status, ExtractionStatus::Ok);
/// let record = result.record.unwrap();
/// assert_eq!(record.items[0].category, Category::FeedSupplies);
/// ```
pub fn extract(raw: impl Into<String>, config: &ExtractionConfig) -> ExtractionResult {
    let raw = raw.into();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_pipeline(&raw, config)));
    let result = match outcome {
        Ok(result) => result,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!("Extraction panicked: {}", reason);
            ExtractionResult::failed(
                vec![Diagnostic::new(
                    Stage::Pipeline,
                    DiagnosticKind::InternalError,
                    format!("a pipeline stage panicked: {reason}"),
                )],
                raw,
            )
        }
    };

    match result.status {
        ExtractionStatus::Failed => warn!(
            "Extraction failed with {} diagnostic(s)",
            result.diagnostics.len()
        ),
        status => info!(
            "Extraction {:?}: {} item(s), {} diagnostic(s)",
            status,
            result.record.as_ref().map_or(0, |r| r.items.len()),
            result.diagnostics.len()
        ),
    }
    result
}

fn run_pipeline(raw: &str, config: &ExtractionConfig) -> ExtractionResult {
    let mut diagnostics: Vec<Diagnostic> = Vec::new();

    // ── Step 1: Sanitize ─────────────────────────────────────────────────
    let sanitized = sanitize::sanitize(raw);
    debug!(
        "sanitize: {} -> {} bytes (unfenced: {})",
        raw.len(),
        sanitized.text.len(),
        sanitized.unfenced
    );

    // ── Step 2: Locate the JSON span ─────────────────────────────────────
    let span = locate::locate(&sanitized, config).merge_into(&mut diagnostics);

    // ── Step 3: Layered parse ────────────────────────────────────────────
    let input = ParseInput {
        span: &span,
        text: &sanitized.text,
    };
    let parsed = match parse::parse(&input, config) {
        Ok(staged) => staged.merge_into(&mut diagnostics),
        Err(mut diags) => {
            diagnostics.append(&mut diags);
            return ExtractionResult::failed(diagnostics, raw.to_string());
        }
    };

    // ── Step 4: Validate and normalise ───────────────────────────────────
    let validated = match normalize::normalize(&parsed, config) {
        Ok(staged) => staged.merge_into(&mut diagnostics),
        Err(mut diags) => {
            diagnostics.append(&mut diags);
            return ExtractionResult::failed(diagnostics, raw.to_string());
        }
    };

    // ── Step 5: Categorise ───────────────────────────────────────────────
    let record = categorize::categorize(validated, config).merge_into(&mut diagnostics);

    ExtractionResult::new(Some(record), diagnostics, raw.to_string())
}

/// Read a saved model response from disk and extract it.
pub fn extract_file(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, ExtractError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| ExtractError::InputReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    debug!("Read {} bytes from {}", raw.len(), path.display());
    Ok(extract(raw, config))
}

/// Extract and write the JSON result directly to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files. The
/// result is written whatever its status and also returned.
pub fn extract_to_file(
    raw: impl Into<String>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, ExtractError> {
    let result = extract(raw, config);
    write_result_json(&result, output_path.as_ref())?;
    Ok(result)
}

/// Serialise `value` as pretty JSON and write it atomically to `path`.
pub fn write_result_json<T: serde::Serialize>(value: &T, path: &Path) -> Result<(), ExtractError> {
    let write_err = |e: std::io::Error| ExtractError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    let mut json = serde_json::to_string_pretty(value)
        .map_err(|e| ExtractError::Internal(format!("Failed to serialise result: {e}")))?;
    json.push('\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json).map_err(write_err)?;
    std::fs::rename(&tmp_path, path).map_err(write_err)?;
    Ok(())
}

/// Extract many responses concurrently.
///
/// Each response runs on the blocking pool; at most `config.concurrency` run
/// at once. Results come back in input order. Progress events fire through
/// `config.progress_callback` when set.
///
/// # Errors
/// Only if a blocking task could not be joined (the runtime is shutting
/// down). Individual extraction failures are results with status `failed`.
pub async fn extract_batch(
    responses: Vec<String>,
    config: &ExtractionConfig,
) -> Result<Vec<ExtractionResult>, ExtractError> {
    let total = responses.len();
    info!("Starting batch extraction of {} response(s)", total);
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let shared = Arc::new(config.clone());
    let results: Vec<Result<ExtractionResult, ExtractError>> =
        stream::iter(responses.into_iter().enumerate().map(|(index, raw)| {
            let config = Arc::clone(&shared);
            async move {
                if let Some(ref cb) = config.progress_callback {
                    cb.on_receipt_start(index, total);
                }
                let task_config = Arc::clone(&config);
                let result = tokio::task::spawn_blocking(move || extract(raw, &task_config))
                    .await
                    .map_err(|e| {
                        ExtractError::Internal(format!("Extraction task {index} failed: {e}"))
                    })?;
                if let Some(ref cb) = config.progress_callback {
                    let items = result.record.as_ref().map_or(0, |r| r.items.len());
                    cb.on_receipt_complete(index, total, result.status, items);
                }
                Ok(result)
            }
        }))
        .buffered(config.concurrency.max(1))
        .collect()
        .await;

    let results = results.into_iter().collect::<Result<Vec<_>, _>>()?;
    let usable = results.iter().filter(|r| r.is_usable()).count();
    info!("Batch complete: {}/{} usable", usable, total);
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, usable);
    }
    Ok(results)
}

/// Synchronous wrapper around [`extract_batch`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_batch_sync(
    responses: Vec<String>,
    config: &ExtractionConfig,
) -> Result<Vec<ExtractionResult>, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_batch(responses, config))
}
