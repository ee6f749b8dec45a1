//! System prompts for callers that own the upstream model call.
//!
//! The pipeline never talks to a model itself, but it parses best what it
//! asked for. Keeping the prompt next to the parser means a change to the
//! accepted field names or the taxonomy lands in both places at once, and
//! unit tests can check the two stay in sync.

use crate::taxonomy::Category;

/// Default system prompt for reading a photographed receipt.
///
/// Describes the JSON shape [`crate::extract`] expects and the built-in
/// taxonomy. Use [`build_receipt_prompt`] when the configuration adds
/// custom categories.
pub const RECEIPT_SYSTEM_PROMPT: &str = r#"You are an expert bookkeeping assistant for a farm. Your task is to read a photographed purchase receipt and return its contents as JSON.

Follow these rules precisely:

1. OUTPUT SHAPE
   Return exactly one JSON object:
   {"vendor": string, "date": "YYYY-MM-DD", "total": number,
    "items": [{"description": string, "quantity": number, "unitPrice": number, "category": string}]}

2. LINE ITEMS
   - One entry per purchased line, in the order printed on the receipt
   - Use the product name as printed for "description"
   - Use numbers, not strings, for quantity and unitPrice; no currency symbols
   - If quantity is not printed, use 1
   - If a price is unreadable, omit "unitPrice" rather than guessing

3. CATEGORIES
   Assign every item exactly one of:
{categories}

4. OUTPUT FORMAT
   - Output ONLY the JSON object
   - Do NOT wrap it in ```json fences
   - Do NOT add commentary or explanations"#;

/// Placeholder in [`RECEIPT_SYSTEM_PROMPT`] replaced by the category list.
const CATEGORIES_PLACEHOLDER: &str = "{categories}";

/// Render the system prompt with the built-in taxonomy plus `extra`
/// categories (typically [`crate::ExtractionConfig::custom_categories`]).
pub fn build_receipt_prompt(extra: &[Category]) -> String {
    let lines: Vec<String> = Category::BUILT_IN
        .iter()
        .chain(extra.iter().filter(|c| !Category::BUILT_IN.contains(c)))
        .map(|c| format!("   - {}", c))
        .collect();
    RECEIPT_SYSTEM_PROMPT.replace(CATEGORIES_PLACEHOLDER, &lines.join("\n"))
}
