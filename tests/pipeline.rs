//! Integration tests for the receipt-extract pipeline.
//!
//! Every test drives the public API with text shaped like real model
//! responses: fenced, chatty, truncated or slightly malformed. No network.

use receipt_extract::{
    extract, extract_batch, extract_file, extract_to_file, Category, CategorySource,
    DiagnosticKind, ExtractionConfig, ExtractionProgressCallback, ExtractionResult,
    ExtractionStatus, ReceiptRecord,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

// ── Test helpers ─────────────────────────────────────────────────────────────

const PAYLOAD: &str = r#"{"vendor":"Tractor Supply","items":[{"description":"50lb Dog Food","quantity":2,"unitPrice":24.99},{"description":"Cattle Dewormer"}]}"#;

/// Route library logs through the test harness; `RUST_LOG=debug` shows
/// every stage decision for a failing test.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn run(raw: &str) -> ExtractionResult {
    init_tracing();
    extract(raw, &ExtractionConfig::default())
}

fn record_of(raw: &str) -> ReceiptRecord {
    let result = run(raw);
    result
        .record
        .unwrap_or_else(|| panic!("no record; diagnostics: {:#?}", result.diagnostics))
}

fn descriptions(record: &ReceiptRecord) -> Vec<&str> {
    record.items.iter().map(|i| i.description.as_str()).collect()
}

// ── Reference scenario ───────────────────────────────────────────────────────

#[test]
fn fenced_response_with_prose_and_missing_price() {
    let raw = format!("Here is the receipt data:\n```json\n{PAYLOAD}\n```\nThanks!");
    let result = run(&raw);

    assert_eq!(result.status, ExtractionStatus::Ok);
    let record = result.record.as_ref().unwrap();
    assert_eq!(record.vendor.as_deref(), Some("Tractor Supply"));
    assert_eq!(record.items.len(), 2);

    let food = &record.items[0];
    assert_eq!(food.category, Category::FeedSupplies);
    assert_eq!(food.quantity, 2.0);
    assert_eq!(food.unit_price, 24.99);
    assert_eq!(food.line_total, 49.98);

    let dewormer = &record.items[1];
    assert_eq!(dewormer.category, Category::VeterinaryHealth);
    assert_eq!(dewormer.quantity, 1.0);
    assert_eq!(dewormer.unit_price, 0.0);
    assert!(!dewormer.price_known);

    let unknown: Vec<_> = result.diagnostics_of(DiagnosticKind::PriceUnknown).collect();
    assert_eq!(unknown.len(), 1);
    assert!(unknown[0].message.contains("Cattle Dewormer"));
    assert_eq!(result.raw_response, raw);
}

// ── Pipeline properties ──────────────────────────────────────────────────────

#[test]
fn idempotent() {
    let raw = format!("Sure!\n```json\n{PAYLOAD}\n```");
    assert_eq!(run(&raw), run(&raw));
}

#[test]
fn markdown_fences_do_not_change_the_record() {
    let plain = record_of(PAYLOAD);
    for wrapped in [
        format!("```json\n{PAYLOAD}\n```"),
        format!("```\n{PAYLOAD}\n```"),
        format!("```JSON\r\n{PAYLOAD}\r\n```\r\n"),
    ] {
        assert_eq!(record_of(&wrapped), plain, "input: {wrapped:?}");
    }
}

#[test]
fn surrounding_prose_does_not_change_the_record() {
    let plain = record_of(PAYLOAD);
    for chatty in [
        format!("Of course! Here's what I found: {PAYLOAD}"),
        format!("{PAYLOAD}\n\nLet me know if you need anything else {{like a summary}}."),
        format!("Note [1]: totals may be off.\n{PAYLOAD}\nThat's all!"),
        format!("Sorry :-{{ the photo was blurry, but here: {PAYLOAD}"),
        format!("I used the format {{\"items\": []}} as asked: {PAYLOAD}"),
    ] {
        let result = run(&chatty);
        assert_eq!(result.record.as_ref(), Some(&plain), "input: {chatty:?}");
        assert!(result.has_diagnostic(DiagnosticKind::SurroundingText));
    }
}

#[test]
fn prose_only_fence_does_not_hide_the_payload() {
    let plain = record_of(PAYLOAD);
    let raw = format!("```\nNote: prices include tax\n```\n{PAYLOAD}");
    let result = run(&raw);
    assert_eq!(result.status, ExtractionStatus::Ok);
    assert_eq!(result.record.as_ref(), Some(&plain));
}

#[test]
fn braces_inside_descriptions_do_not_end_the_span() {
    let raw = r#"{"items":[{"description":"Bolt {M8} ] pack","quantity":4,"unitPrice":0.25},{"description":"Hay \"premium\" }","unitPrice":9}]} see you {soon}"#;
    let record = record_of(raw);
    assert_eq!(descriptions(&record), vec!["Bolt {M8} ] pack", "Hay \"premium\" }"]);
    assert_eq!(record.items[0].line_total, 1.0);
}

#[test]
fn truncated_array_keeps_complete_items() {
    // Three items with the closing `]` and final `}` removed.
    let raw = r#"{"vendor":"Co-op","items":[{"description":"Layer Pellets","quantity":1,"unitPrice":15.5},{"description":"Scratch Grain","quantity":2,"unitPrice":11},{"description":"Oyster Shell","quantity":1,"unitPrice":7.25}"#;
    let result = run(raw);
    assert_eq!(result.status, ExtractionStatus::Degraded);
    assert!(result.has_diagnostic(DiagnosticKind::TruncatedInput));
    assert!(result.has_diagnostic(DiagnosticKind::RepairApplied));
    let record = result.record.unwrap();
    assert!(record.items.len() >= 2);
    assert_eq!(record.items[0].description, "Layer Pellets");
    assert_eq!(record.items[1].description, "Scratch Grain");
}

#[test]
fn truncated_mid_item_keeps_earlier_items() {
    let raw = r#"```json
{"items":[{"description":"Hay","quantity":3,"unitPrice":8},{"description":"Straw","quantity":2,"unitPrice":6},{"description":"Bedding Pel"#;
    let record = record_of(raw);
    assert_eq!(&descriptions(&record)[..2], &["Hay", "Straw"]);
}

#[test]
fn zero_items_is_failed_never_ok() {
    for raw in [
        r#"{"vendor":"Co-op","items":[]}"#,
        r#"{"vendor":"Co-op","items":[{"description":""},{"quantity":2}]}"#,
        r#"[]"#,
    ] {
        let result = run(raw);
        assert_eq!(result.status, ExtractionStatus::Failed, "input: {raw}");
        assert!(result.record.is_none());
        assert!(result.has_diagnostic(DiagnosticKind::EmptyResult));
        assert!(result.into_result().is_err());
    }
}

#[test]
fn categories_are_deterministic() {
    let descriptions = [
        "50lb Dog Food",
        "Cattle Dewormer",
        "Galvanized Water Trough",
        "Horse Shampoo",
        "Something Odd",
    ];
    let first: Vec<Category> = descriptions
        .iter()
        .map(|d| {
            record_of(&format!(r#"[{{"description":"{d}","unitPrice":1}}]"#)).items[0]
                .category
                .clone()
        })
        .collect();
    for _ in 0..5 {
        let again: Vec<Category> = descriptions
            .iter()
            .map(|d| {
                record_of(&format!(r#"[{{"description":"{d}","unitPrice":1}}]"#)).items[0]
                    .category
                    .clone()
            })
            .collect();
        assert_eq!(again, first);
    }
    assert_eq!(
        first,
        vec![
            Category::FeedSupplies,
            Category::VeterinaryHealth,
            Category::Equipment,
            Category::UncategorizedSupplies,
            Category::UncategorizedSupplies,
        ]
    );
}

// ── Failure modes ────────────────────────────────────────────────────────────

#[test]
fn refusal_text_fails_with_raw_text_preserved() {
    let raw = "I'm sorry, but I can't read the receipt in this image.";
    let result = run(raw);
    assert_eq!(result.status, ExtractionStatus::Failed);
    assert!(result.has_diagnostic(DiagnosticKind::NoStructureFound));
    assert!(result.has_diagnostic(DiagnosticKind::ParseFailed));
    assert_eq!(result.raw_response, raw);
}

#[test]
fn strict_mode_rejects_repairable_input() {
    let raw = r#"{"items":[{"description":"Hay","unitPrice":8,},]}"#;
    let config = ExtractionConfig::builder().strict_mode(true).build().unwrap();
    let result = extract(raw, &config);
    assert_eq!(result.status, ExtractionStatus::Failed);
    assert_eq!(result.diagnostics_of(DiagnosticKind::ParseAttemptFailed).count(), 1);
    assert!(result.has_diagnostic(DiagnosticKind::ParseFailed));

    let lenient = run(raw);
    assert_eq!(lenient.status, ExtractionStatus::Degraded);
}

#[test]
fn missing_comma_falls_through_to_heuristics() {
    let raw = r#"{"vendor": "Co-op", "items": [{"description": "Hay", "quantity": 2, "unitPrice": 8} {"description": "Oats", "unitPrice": "$5.00"}]}"#;
    let result = run(raw);
    assert_eq!(result.status, ExtractionStatus::Degraded);
    assert!(result.has_diagnostic(DiagnosticKind::HeuristicRecovery));
    let record = result.record.unwrap();
    assert_eq!(record.vendor.as_deref(), Some("Co-op"));
    assert_eq!(descriptions(&record), vec!["Hay", "Oats"]);
    assert_eq!(record.items[0].quantity, 2.0);
    assert_eq!(record.items[1].unit_price, 5.0);
    assert!(record.items[1].raw_fragment.contains("Oats"));
}

#[test]
fn heuristic_receipt_total_after_items_is_not_a_line_total() {
    let raw = r#"{"vendor":"Co-op","items":[{"description":"Hay","unitPrice":5} {"description":"Oats","unitPrice":3}],"total":8}"#;
    let result = run(raw);
    assert!(result.has_diagnostic(DiagnosticKind::HeuristicRecovery));
    assert!(!result.has_diagnostic(DiagnosticKind::TotalMismatch));
    let record = result.record.unwrap();
    assert_eq!(record.total, Some(8.0));
    assert_eq!(record.items[1].unit_price, 3.0);
    assert_eq!(record.items[1].line_total, 3.0);

    // The last item has no price: it must stay unknown, not be derived
    // from the receipt total.
    let raw = r#"{"vendor":"Co-op","items":[{"description":"Hay","unitPrice":5} {"description":"Oats"}],"total":8}"#;
    let result = run(raw);
    assert!(!result.has_diagnostic(DiagnosticKind::PriceDerived));
    let record = result.record.unwrap();
    assert_eq!(record.total, Some(8.0));
    assert!(!record.items[1].price_known);
}

#[test]
fn bad_item_is_dropped_but_the_rest_survive() {
    let raw = r#"{"items":[{"description":"Hay","quantity":"two","unitPrice":8},{"description":"Oats","qty":"3","price":"4.50"}]}"#;
    let result = run(raw);
    assert_eq!(result.status, ExtractionStatus::Degraded);
    let record = result.record.as_ref().unwrap();
    assert_eq!(descriptions(record), vec!["Oats"]);
    assert_eq!(record.items[0].line_total, 13.5);
    let coercion: Vec<_> = result.diagnostics_of(DiagnosticKind::FieldCoercion).collect();
    assert_eq!(coercion.len(), 1);
    assert!(coercion[0].fragment.as_deref().unwrap_or("").contains("two"));
}

// ── Supplementary behaviour ──────────────────────────────────────────────────

#[test]
fn header_fields_aliases_and_dates() {
    let raw = r#"{"storeName":"Valley Feed & Seed","purchaseDate":"03/09/2024","grandTotal":"$1,016.00",
        "lineItems":[{"name":"Round Bale","qty":8,"unitCost":"$127.00","category":"Feed Supplies"}]}"#;
    let result = run(raw);
    assert_eq!(result.status, ExtractionStatus::Ok);
    let record = result.record.unwrap();
    assert_eq!(record.vendor.as_deref(), Some("Valley Feed & Seed"));
    assert_eq!(record.date.map(|d| d.to_string()).as_deref(), Some("2024-03-09"));
    assert_eq!(record.total, Some(1016.0));
    assert_eq!(record.items[0].category_source, CategorySource::Upstream);
    assert_eq!(record.items_total(), 1016.0);
}

#[test]
fn receipt_total_mismatch_is_informational() {
    let raw = r#"{"total":30,"items":[{"description":"Hay","quantity":2,"unitPrice":8}]}"#;
    let result = run(raw);
    assert_eq!(result.status, ExtractionStatus::Ok);
    assert!(result.has_diagnostic(DiagnosticKind::TotalMismatch));
}

#[test]
fn overrides_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{"maxRepairAttempts":2,"categoryOverrides":[{"keyword":"dog food","category":"pet_supplies"}]}"#,
    )
    .unwrap();
    let config = ExtractionConfig::from_json_file(&path).unwrap();
    assert_eq!(config.max_repair_attempts, 2);

    let record = extract(PAYLOAD, &config).record.unwrap();
    assert_eq!(record.items[0].category, Category::Custom("pet_supplies".into()));
    assert_eq!(record.items[0].category_source, CategorySource::Override);
    assert_eq!(record.items[1].category, Category::VeterinaryHealth);
}

#[test]
fn invalid_config_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"maxRepairAttempts":0}"#).unwrap();
    assert!(ExtractionConfig::from_json_file(&path).is_err());
}

#[test]
fn file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("response.txt");
    let output = dir.path().join("out").join("result.json");
    std::fs::write(&input, format!("```json\n{PAYLOAD}\n```")).unwrap();

    let from_file = extract_file(&input, &ExtractionConfig::default()).unwrap();
    let written = extract_to_file(
        from_file.raw_response.clone(),
        &output,
        &ExtractionConfig::default(),
    )
    .unwrap();
    assert_eq!(from_file, written);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["record"]["items"][1]["category"], "veterinary_health");
    assert_eq!(json["record"]["items"][1]["priceKnown"], false);
    assert_eq!(json["diagnostics"][0]["kind"], "price_unknown");
}

// ── Batch ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    started: AtomicUsize,
    completed: Mutex<Vec<(usize, ExtractionStatus)>>,
    summary: Mutex<Option<(usize, usize)>>,
}

impl ExtractionProgressCallback for Recorder {
    fn on_receipt_start(&self, _index: usize, _total: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_receipt_complete(&self, index: usize, _total: usize, status: ExtractionStatus, _items: usize) {
        self.completed.lock().unwrap().push((index, status));
    }
    fn on_batch_complete(&self, total: usize, usable: usize) {
        *self.summary.lock().unwrap() = Some((total, usable));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn batch_keeps_input_order_and_reports_progress() {
    init_tracing();
    let recorder = Arc::new(Recorder::default());
    let config = ExtractionConfig::builder()
        .concurrency(2)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    let mut inputs: Vec<String> = (0..6)
        .map(|i| format!(r#"[{{"description":"Hay bale {i}","unitPrice":{i}}}]"#))
        .collect();
    inputs.push("no receipt here".into());

    let results = extract_batch(inputs, &config).await.unwrap();
    assert_eq!(results.len(), 7);
    for (i, r) in results.iter().take(6).enumerate() {
        let record = r.record.as_ref().unwrap();
        assert_eq!(record.items[0].description, format!("Hay bale {i}"));
    }
    assert_eq!(results[6].status, ExtractionStatus::Failed);

    assert_eq!(recorder.started.load(Ordering::SeqCst), 7);
    let mut completed = recorder.completed.lock().unwrap().clone();
    completed.sort_by_key(|(i, _)| *i);
    assert_eq!(completed.len(), 7);
    assert_eq!(completed[6], (6, ExtractionStatus::Failed));
    assert_eq!(*recorder.summary.lock().unwrap(), Some((7, 6)));
}
