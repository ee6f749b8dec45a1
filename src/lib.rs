//! # receipt-extract
//!
//! Turn the free-form text a language model returns for a photographed
//! receipt into a validated, categorised purchase record.
//!
//! ## Why this crate?
//!
//! Asked for "JSON only", models still wrap the payload in markdown fences,
//! add a friendly sentence before and after, leave trailing commas, stop
//! mid-array when they hit a token limit, and spell `unitPrice` five
//! different ways. Passing that text straight to `serde_json::from_str`
//! throws away a record that is almost always recoverable. This crate runs
//! it through a short deterministic pipeline instead and reports, item by
//! item, what it had to fix or drop.
//!
//! ## Pipeline Overview
//!
//! ```text
//! raw model text
//!  │
//!  ├─ 1. Sanitize    strip fences, BOMs, line-ending noise
//!  ├─ 2. Locate      string-aware balanced scan for the JSON span
//!  ├─ 3. Parse       strict → repair → heuristic field matching
//!  ├─ 4. Normalize   field aliases, numeric/date coercion, item drops
//!  ├─ 5. Categorize  upstream category, overrides, keyword rules
//!  └─ 6. Result      status ok / degraded / failed + diagnostics
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use receipt_extract::{extract, ExtractionConfig, ExtractionStatus};
//!
//! let raw = "Here is the receipt data:\n```json\n\
//!     {\"vendor\":\"Tractor Supply\",\"items\":[\
//!     {\"description\":\"50lb Dog Food\",\"quantity\":2,\"unitPrice\":24.99},\
//!     {\"description\":\"Cattle Dewormer\"}]}\n```\nThanks!";
//!
//! let result = extract(raw, &ExtractionConfig::default());
//! assert_eq!(result.status, ExtractionStatus::Ok);
//! for d in &result.diagnostics {
//!     eprintln!("{d}");
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `receipt-extract` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! receipt-extract = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod taxonomy;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{CategoryOverride, ExtractionConfig, ExtractionConfigBuilder, MAX_REPAIR_ATTEMPTS};
pub use error::{DiagnosticKind, ExtractError, Severity};
pub use extract::{
    extract, extract_batch, extract_batch_sync, extract_file, extract_to_file, write_result_json,
};
pub use output::{
    CategorySource, Diagnostic, ExtractionResult, ExtractionStatus, LineItem, ReceiptRecord, Stage,
};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::{build_receipt_prompt, RECEIPT_SYSTEM_PROMPT};
pub use taxonomy::Category;
