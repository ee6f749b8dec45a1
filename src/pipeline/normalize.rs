//! Schema validation and normalisation of a parsed receipt.
//!
//! Models name the same field a dozen ways (`unitPrice`, `unit_price`,
//! `price`) and type it loosely (`2`, `"2"`, `"$1,400.00"`). Keys are matched
//! after normalisation (lower-case, `_`/`-`/space removed) against alias
//! lists; values are coerced with explicit ambiguity rules. A field that
//! cannot be coerced is dropped with a diagnostic. An item whose quantity or
//! unit price cannot be coerced, or whose description is empty, is dropped
//! whole. Zero surviving items is terminal.

use super::parse::{json_type, ParsedReceipt};
use super::Staged;
use crate::config::ExtractionConfig;
use crate::error::DiagnosticKind;
use crate::output::{Diagnostic, Stage};
use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

const ITEMS_KEYS: &[&str] = &["items", "lineitems", "products", "purchases"];
const VENDOR_KEYS: &[&str] = &["vendor", "vendorname", "store", "storename", "merchant"];
const DATE_KEYS: &[&str] = &["date", "purchasedate", "transactiondate"];
const RECEIPT_TOTAL_KEYS: &[&str] = &["total", "totalamount", "grandtotal"];
const DESCRIPTION_KEYS: &[&str] = &["description", "name", "item", "product"];
const QUANTITY_KEYS: &[&str] = &["quantity", "qty"];
const UNIT_PRICE_KEYS: &[&str] = &["unitprice", "price", "unitcost"];
const LINE_TOTAL_KEYS: &[&str] = &["linetotal", "total", "amount"];
const CATEGORY_KEYS: &[&str] = &["category"];

/// Nesting depth searched for the object holding the item list.
const MAX_SEARCH_DEPTH: usize = 3;

/// A line item that passed validation but is not yet categorised.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedItem {
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub price_known: bool,
    pub reported_total: Option<f64>,
    /// Category string exactly as supplied upstream.
    pub upstream_category: Option<String>,
    pub raw_fragment: String,
}

/// A receipt whose fields are typed and whose items are non-empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedReceipt {
    pub vendor: Option<String>,
    pub date: Option<NaiveDate>,
    pub total: Option<f64>,
    pub items: Vec<ValidatedItem>,
}

/// Validate and normalise a parsed receipt.
pub fn normalize(
    parsed: &ParsedReceipt,
    config: &ExtractionConfig,
) -> Result<Staged<ValidatedReceipt>, Vec<Diagnostic>> {
    let mut diagnostics = Vec::new();
    // A lone item object is not a receipt header: its `total` is a line total.
    let header = receipt_object(&parsed.value).filter(|obj| {
        get_alias(obj, ITEMS_KEYS).is_some() || get_alias(obj, DESCRIPTION_KEYS).is_none()
    });
    let candidates = item_candidates(&parsed.value);
    debug!("normalize: {} item candidate(s)", candidates.len());

    let mut items = Vec::with_capacity(candidates.len());
    for (idx, candidate) in candidates.iter().enumerate() {
        let fragment = parsed
            .item_fragments
            .as_ref()
            .and_then(|f| f.get(idx).cloned())
            .unwrap_or_else(|| candidate.to_string());
        if let Some(item) = normalize_item(idx, candidate, fragment, config, &mut diagnostics) {
            items.push(item);
        }
    }

    if items.is_empty() {
        diagnostics.push(
            Diagnostic::new(
                Stage::Validate,
                DiagnosticKind::EmptyResult,
                format!(
                    "no usable line items after normalisation ({} candidate(s))",
                    candidates.len()
                ),
            )
            .with_fragment(&parsed.value.to_string(), config.max_fragment_len),
        );
        return Err(diagnostics);
    }

    let (vendor, date, total) = match header {
        Some(obj) => (
            header_vendor(obj, config, &mut diagnostics),
            header_date(obj, config, &mut diagnostics),
            header_total(obj, config, &mut diagnostics),
        ),
        None => (None, None, None),
    };

    if let Some(reported) = total {
        if items.iter().all(|i| i.price_known) {
            let computed: f64 = items.iter().map(|i| round4(i.quantity * i.unit_price)).sum();
            if (reported - computed).abs() > config.price_tolerance {
                diagnostics.push(Diagnostic::new(
                    Stage::Validate,
                    DiagnosticKind::TotalMismatch,
                    format!("receipt total {reported} differs from the item sum {}", round4(computed)),
                ));
            }
        }
    }

    Ok(Staged::new(
        ValidatedReceipt {
            vendor,
            date,
            total,
            items,
        },
        diagnostics,
    ))
}

// ── Locating the receipt and its items ──────────────────────────────────────

/// The candidate line items in `value`, in source order.
///
/// A bare array is the item list. Otherwise the object holding an item-list
/// key is searched (up to a few levels deep); an object that itself carries a
/// description is treated as a single item.
pub fn item_candidates(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => match receipt_object(value) {
            Some(obj) => match get_alias(obj, ITEMS_KEYS) {
                Some(Value::Array(items)) => items.iter().collect(),
                Some(single @ Value::Object(_)) => vec![single],
                _ if get_alias(obj, DESCRIPTION_KEYS).is_some() => vec![value],
                _ => Vec::new(),
            },
            None => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// The object that carries the header fields and the item list.
fn receipt_object(value: &Value) -> Option<&Map<String, Value>> {
    fn search(value: &Value, depth: usize) -> Option<&Map<String, Value>> {
        let obj = value.as_object()?;
        if get_alias(obj, ITEMS_KEYS).is_some() {
            return Some(obj);
        }
        if depth == 0 {
            return None;
        }
        obj.values()
            .filter(|v| v.is_object())
            .find_map(|v| search(v, depth - 1))
    }
    let obj = value.as_object()?;
    search(value, MAX_SEARCH_DEPTH).or(Some(obj))
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

/// First value whose normalised key is in `aliases`, honouring alias order.
fn get_alias<'a>(obj: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|alias| {
        obj.iter()
            .find(|(k, _)| normalize_key(k) == *alias)
            .map(|(_, v)| v)
    })
}

// ── Items ───────────────────────────────────────────────────────────────────

fn normalize_item(
    idx: usize,
    candidate: &Value,
    fragment: String,
    config: &ExtractionConfig,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<ValidatedItem> {
    let position = idx + 1;
    let drop_item = |diagnostics: &mut Vec<Diagnostic>, kind: DiagnosticKind, reason: String| {
        diagnostics.push(
            Diagnostic::new(Stage::Validate, kind, format!("item {position} dropped: {reason}"))
                .with_fragment(&fragment, config.max_fragment_len),
        );
    };

    let obj = match candidate {
        Value::Object(obj) => obj,
        // A bare string in the item list is a description-only item.
        Value::String(s) => {
            let description = normalize_whitespace(s);
            if description.is_empty() {
                drop_item(diagnostics, DiagnosticKind::ItemDropped, "empty description".into());
                return None;
            }
            push_price_unknown(position, &description, &fragment, config, diagnostics);
            return Some(ValidatedItem {
                description,
                quantity: 1.0,
                unit_price: 0.0,
                price_known: false,
                reported_total: None,
                upstream_category: None,
                raw_fragment: fragment,
            });
        }
        other => {
            drop_item(
                diagnostics,
                DiagnosticKind::ItemDropped,
                format!("expected an object, found {}", json_type(other)),
            );
            return None;
        }
    };

    let description = match get_alias(obj, DESCRIPTION_KEYS) {
        Some(Value::String(s)) => normalize_whitespace(s),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    if description.is_empty() {
        drop_item(diagnostics, DiagnosticKind::ItemDropped, "missing or empty description".into());
        return None;
    }

    let quantity = match get_alias(obj, QUANTITY_KEYS).map(coerce_amount) {
        None | Some(Ok(None)) => 1.0,
        Some(Ok(Some(q))) if q > 0.0 => q,
        Some(Ok(Some(q))) => {
            drop_item(
                diagnostics,
                DiagnosticKind::FieldCoercion,
                format!("quantity must be positive, got {q}"),
            );
            return None;
        }
        Some(Err(reason)) => {
            drop_item(diagnostics, DiagnosticKind::FieldCoercion, format!("quantity {reason}"));
            return None;
        }
    };

    let reported_total = match get_alias(obj, LINE_TOTAL_KEYS).map(coerce_amount) {
        None | Some(Ok(None)) => None,
        Some(Ok(Some(t))) => Some(t),
        Some(Err(reason)) => {
            diagnostics.push(
                Diagnostic::new(
                    Stage::Validate,
                    DiagnosticKind::FieldCoercion,
                    format!("item {position} line total ignored: {reason}"),
                )
                .with_fragment(&fragment, config.max_fragment_len),
            );
            None
        }
    };

    let (unit_price, price_known) = match get_alias(obj, UNIT_PRICE_KEYS).map(coerce_amount) {
        Some(Ok(Some(p))) if p >= 0.0 => (p, true),
        Some(Ok(Some(p))) => {
            drop_item(
                diagnostics,
                DiagnosticKind::FieldCoercion,
                format!("unit price must not be negative, got {p}"),
            );
            return None;
        }
        Some(Err(reason)) => {
            drop_item(diagnostics, DiagnosticKind::FieldCoercion, format!("unit price {reason}"));
            return None;
        }
        None | Some(Ok(None)) => match reported_total {
            Some(total) if total >= 0.0 => {
                let derived = round4(total / quantity);
                diagnostics.push(Diagnostic::new(
                    Stage::Validate,
                    DiagnosticKind::PriceDerived,
                    format!("item {position} ('{description}'): unit price {derived} derived from line total {total}"),
                ));
                (derived, true)
            }
            _ => {
                push_price_unknown(position, &description, &fragment, config, diagnostics);
                (0.0, false)
            }
        },
    };

    if let Some(reported) = reported_total {
        let computed = round4(quantity * unit_price);
        if price_known && (reported - computed).abs() > config.price_tolerance {
            diagnostics.push(Diagnostic::new(
                Stage::Validate,
                DiagnosticKind::TotalMismatch,
                format!(
                    "item {position} ('{description}'): reported total {reported} but {quantity} × {unit_price} = {computed}"
                ),
            ));
        }
    }

    let upstream_category = match get_alias(obj, CATEGORY_KEYS) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Null) | None => None,
        Some(Value::String(_)) => None,
        Some(other) => {
            diagnostics.push(Diagnostic::new(
                Stage::Validate,
                DiagnosticKind::CategoryRejected,
                format!(
                    "item {position} ('{description}'): category ignored, expected a string, found {}",
                    json_type(other)
                ),
            ));
            None
        }
    };

    Some(ValidatedItem {
        description,
        quantity,
        unit_price,
        price_known,
        reported_total,
        upstream_category,
        raw_fragment: fragment,
    })
}

fn push_price_unknown(
    position: usize,
    description: &str,
    fragment: &str,
    config: &ExtractionConfig,
    diagnostics: &mut Vec<Diagnostic>,
) {
    diagnostics.push(
        Diagnostic::new(
            Stage::Validate,
            DiagnosticKind::PriceUnknown,
            format!("item {position} ('{description}'): price unknown, unit price set to 0"),
        )
        .with_fragment(fragment, config.max_fragment_len),
    );
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

// ── Header fields ───────────────────────────────────────────────────────────

fn header_vendor(
    obj: &Map<String, Value>,
    config: &ExtractionConfig,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<String> {
    let value = get_alias(obj, VENDOR_KEYS)?;
    let vendor = match value {
        Value::String(s) => normalize_whitespace(s),
        Value::Number(n) => n.to_string(),
        Value::Object(inner) => match get_alias(inner, &["name"]) {
            Some(Value::String(s)) => normalize_whitespace(s),
            _ => String::new(),
        },
        Value::Null => return None,
        other => {
            diagnostics.push(
                Diagnostic::new(
                    Stage::Validate,
                    DiagnosticKind::FieldCoercion,
                    format!("vendor ignored: expected a string, found {}", json_type(other)),
                )
                .with_fragment(&other.to_string(), config.max_fragment_len),
            );
            return None;
        }
    };
    (!vendor.is_empty()).then_some(vendor)
}

fn header_date(
    obj: &Map<String, Value>,
    config: &ExtractionConfig,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<NaiveDate> {
    match get_alias(obj, DATE_KEYS)? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => match parse_date(s) {
            Some(d) => Some(d),
            None => {
                diagnostics.push(
                    Diagnostic::new(
                        Stage::Validate,
                        DiagnosticKind::FieldCoercion,
                        format!("date ignored: '{}' is not a recognised date", s.trim()),
                    )
                    .with_fragment(s, config.max_fragment_len),
                );
                None
            }
        },
        other => {
            diagnostics.push(Diagnostic::new(
                Stage::Validate,
                DiagnosticKind::FieldCoercion,
                format!("date ignored: expected a string, found {}", json_type(other)),
            ));
            None
        }
    }
}

fn header_total(
    obj: &Map<String, Value>,
    config: &ExtractionConfig,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<f64> {
    let value = get_alias(obj, RECEIPT_TOTAL_KEYS)?;
    match coerce_amount(value) {
        Ok(Some(t)) if t >= 0.0 => Some(t),
        Ok(None) => None,
        Ok(Some(t)) => {
            diagnostics.push(Diagnostic::new(
                Stage::Validate,
                DiagnosticKind::FieldCoercion,
                format!("receipt total ignored: must not be negative, got {t}"),
            ));
            None
        }
        Err(reason) => {
            diagnostics.push(
                Diagnostic::new(
                    Stage::Validate,
                    DiagnosticKind::FieldCoercion,
                    format!("receipt total ignored: {reason}"),
                )
                .with_fragment(&value.to_string(), config.max_fragment_len),
            );
            None
        }
    }
}

/// Accepted date layouts, tried in order.
/// Two-digit years come first: `%Y` would read `24` as the year 24.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y", "%Y/%m/%d", "%B %d, %Y", "%b %d, %Y", "%B %d %Y",
    "%b %d %Y",
];

/// Parse a receipt date. US month-first order wins for slashed dates.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    // `2024-03-09T10:15:00` without an offset
    if let Some((date, _time)) = s.split_once('T') {
        if let Ok(d) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
            return Some(d);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

// ── Numeric coercion ────────────────────────────────────────────────────────

static RE_CURRENCY_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:USD|CAD|EUR|GBP|AUD)\s*|\s*(?:USD|CAD|EUR|GBP|AUD)$").unwrap());
static RE_GROUPED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,3}(?:,\d{3})+(?:\.\d+)?$").unwrap());
static RE_PLAIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:\d+(?:\.\d*)?|\.\d+)$").unwrap());

/// Coerce a JSON value into an amount.
///
/// `Ok(None)` means absent (null or blank). `Err` carries the reason the
/// value is ambiguous or of the wrong type.
pub fn coerce_amount(value: &Value) -> Result<Option<f64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .filter(|f| f.is_finite())
            .map(Some)
            .ok_or_else(|| format!("'{n}' is not a finite number")),
        Value::String(s) => parse_amount(s),
        other => Err(format!("expected a number, found {}", json_type(other))),
    }
}

/// Parse `"$1,400.00"`-style text.
pub fn parse_amount(s: &str) -> Result<Option<f64>, String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let without_code = RE_CURRENCY_CODE.replace_all(trimmed, "");
    let mut cleaned: String = without_code
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '$' | '€' | '£' | '¥'))
        .collect();
    let negative = cleaned.starts_with('-');
    if negative {
        cleaned.remove(0);
    }

    if cleaned.matches('.').count() > 1 {
        return Err(format!("'{trimmed}' is ambiguous: multiple decimal points"));
    }
    let digits = if cleaned.contains(',') {
        if !RE_GROUPED.is_match(&cleaned) {
            return Err(format!("'{trimmed}' is ambiguous: malformed thousands separators"));
        }
        cleaned.replace(',', "")
    } else if RE_PLAIN.is_match(&cleaned) {
        cleaned
    } else {
        return Err(format!("'{trimmed}' is not a number"));
    };

    let n: f64 = digits
        .parse()
        .map_err(|_| format!("'{trimmed}' is not a number"))?;
    Ok(Some(if negative { -n } else { n }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::parse::ParseLayer;
    use serde_json::json;

    fn parsed(value: Value) -> ParsedReceipt {
        ParsedReceipt {
            value,
            layer: ParseLayer::Strict,
            item_fragments: None,
            notes: Vec::new(),
        }
    }

    fn kinds(diags: &[Diagnostic]) -> Vec<DiagnosticKind> {
        diags.iter().map(|d| d.kind).collect()
    }

    #[test]
    fn parse_amount_accepts_currency_formatting() {
        assert_eq!(parse_amount("$1,400.00"), Ok(Some(1400.0)));
        assert_eq!(parse_amount(" 24.99 "), Ok(Some(24.99)));
        assert_eq!(parse_amount("USD 12"), Ok(Some(12.0)));
        assert_eq!(parse_amount("€3.5"), Ok(Some(3.5)));
        assert_eq!(parse_amount("-2"), Ok(Some(-2.0)));
        assert_eq!(parse_amount(""), Ok(None));
    }

    #[test]
    fn parse_amount_rejects_ambiguity() {
        assert!(parse_amount("1.2.3").unwrap_err().contains("multiple decimal points"));
        assert!(parse_amount("1,5").unwrap_err().contains("thousands"));
        assert!(parse_amount("two").is_err());
        assert!(parse_amount("2 bags").is_err());
    }

    #[test]
    fn coerce_amount_types() {
        assert_eq!(coerce_amount(&json!(3)), Ok(Some(3.0)));
        assert_eq!(coerce_amount(&json!(null)), Ok(None));
        assert!(coerce_amount(&json!(true)).is_err());
        assert!(coerce_amount(&json!([1])).is_err());
    }

    #[test]
    fn dates() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 9);
        assert_eq!(parse_date("2024-03-09"), d);
        assert_eq!(parse_date("03/09/2024"), d);
        assert_eq!(parse_date("3/9/24"), d);
        assert_eq!(parse_date("March 9, 2024"), d);
        assert_eq!(parse_date("Mar 9, 2024"), d);
        assert_eq!(parse_date("2024-03-09T17:45:00Z"), d);
        assert_eq!(parse_date("2024-03-09T17:45:00"), d);
        assert_eq!(parse_date("last tuesday"), None);
    }

    #[test]
    fn defaults_quantity_and_flags_unknown_price() {
        let out = normalize(
            &parsed(json!({"items": [{"description": "  Cattle   Dewormer "}]})),
            &ExtractionConfig::default(),
        )
        .unwrap();
        let item = &out.value.items[0];
        assert_eq!(item.description, "Cattle Dewormer");
        assert_eq!(item.quantity, 1.0);
        assert_eq!(item.unit_price, 0.0);
        assert!(!item.price_known);
        assert_eq!(kinds(&out.diagnostics), vec![DiagnosticKind::PriceUnknown]);
    }

    #[test]
    fn aliases_and_string_numbers() {
        let out = normalize(
            &parsed(json!({
                "store_name": "Co-op",
                "purchase_date": "2024-03-09",
                "line_items": [{"item": "Hay", "qty": "3", "unit_price": "$7.50", "category": "Feed"}]
            })),
            &ExtractionConfig::default(),
        )
        .unwrap();
        let r = out.value;
        assert_eq!(r.vendor.as_deref(), Some("Co-op"));
        assert_eq!(r.date, NaiveDate::from_ymd_opt(2024, 3, 9));
        assert_eq!(r.items[0].quantity, 3.0);
        assert_eq!(r.items[0].unit_price, 7.5);
        assert_eq!(r.items[0].upstream_category.as_deref(), Some("Feed"));
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn ambiguous_quantity_drops_item_only() {
        let out = normalize(
            &parsed(json!([
                {"description": "Hay", "quantity": "1.2.3", "unitPrice": 5},
                {"description": "Oats", "unitPrice": 9}
            ])),
            &ExtractionConfig::default(),
        )
        .unwrap();
        assert_eq!(out.value.items.len(), 1);
        assert_eq!(out.value.items[0].description, "Oats");
        assert_eq!(kinds(&out.diagnostics), vec![DiagnosticKind::FieldCoercion]);
    }

    #[test]
    fn negative_price_and_zero_quantity_drop_items() {
        let diags = normalize(
            &parsed(json!([
                {"description": "Coupon", "unitPrice": -5},
                {"description": "Hay", "quantity": 0}
            ])),
            &ExtractionConfig::default(),
        )
        .unwrap_err();
        assert_eq!(
            kinds(&diags),
            vec![
                DiagnosticKind::FieldCoercion,
                DiagnosticKind::FieldCoercion,
                DiagnosticKind::EmptyResult
            ]
        );
    }

    #[test]
    fn unit_price_derived_from_line_total() {
        let out = normalize(
            &parsed(json!({"items": [{"description": "Hay", "quantity": 4, "total": "30"}]})),
            &ExtractionConfig::default(),
        )
        .unwrap();
        let item = &out.value.items[0];
        assert_eq!(item.unit_price, 7.5);
        assert!(item.price_known);
        assert_eq!(item.reported_total, Some(30.0));
        assert_eq!(kinds(&out.diagnostics), vec![DiagnosticKind::PriceDerived]);
    }

    #[test]
    fn line_total_mismatch_is_reported() {
        let out = normalize(
            &parsed(json!({"items": [{"description": "Hay", "quantity": 2, "unitPrice": 5, "lineTotal": 12}]})),
            &ExtractionConfig::default(),
        )
        .unwrap();
        assert_eq!(kinds(&out.diagnostics), vec![DiagnosticKind::TotalMismatch]);
    }

    #[test]
    fn receipt_total_mismatch_is_reported() {
        let out = normalize(
            &parsed(json!({"total": "$20.00", "items": [{"description": "Hay", "unitPrice": 5}]})),
            &ExtractionConfig::default(),
        )
        .unwrap();
        assert_eq!(out.value.total, Some(20.0));
        assert_eq!(kinds(&out.diagnostics), vec![DiagnosticKind::TotalMismatch]);
    }

    #[test]
    fn empty_descriptions_yield_empty_result() {
        let diags = normalize(
            &parsed(json!({"items": [{"description": "   "}, {"quantity": 2}]})),
            &ExtractionConfig::default(),
        )
        .unwrap_err();
        assert_eq!(diags.last().unwrap().kind, DiagnosticKind::EmptyResult);
        assert_eq!(
            diags
                .iter()
                .filter(|d| d.kind == DiagnosticKind::ItemDropped)
                .count(),
            2
        );
    }

    #[test]
    fn nested_receipt_object_is_found() {
        let v = json!({"receipt": {"vendor": "TSC", "items": [{"description": "Hay"}]}});
        assert_eq!(item_candidates(&v).len(), 1);
        let out = normalize(&parsed(v), &ExtractionConfig::default()).unwrap();
        assert_eq!(out.value.vendor.as_deref(), Some("TSC"));
    }

    #[test]
    fn single_item_object_and_string_items() {
        assert_eq!(item_candidates(&json!({"description": "Hay"})).len(), 1);
        let out = normalize(&parsed(json!(["Hay", "Oats"])), &ExtractionConfig::default()).unwrap();
        assert_eq!(out.value.items.len(), 2);
        assert_eq!(out.value.items[1].description, "Oats");
    }

    #[test]
    fn bad_date_is_dropped_with_warning() {
        let out = normalize(
            &parsed(json!({"date": "someday", "items": [{"description": "Hay", "unitPrice": 1}]})),
            &ExtractionConfig::default(),
        )
        .unwrap();
        assert!(out.value.date.is_none());
        assert_eq!(kinds(&out.diagnostics), vec![DiagnosticKind::FieldCoercion]);
    }

    #[test]
    fn heuristic_fragments_are_used() {
        let mut p = parsed(json!({"items": [{"description": "Hay"}]}));
        p.item_fragments = Some(vec!["{\"description\": \"Hay\"".into()]);
        let out = normalize(&p, &ExtractionConfig::default()).unwrap();
        assert_eq!(out.value.items[0].raw_fragment, "{\"description\": \"Hay\"");
    }
}
