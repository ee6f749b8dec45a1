//! The closed set of expense categories line items are classified into.
//!
//! Four categories ship built in. Callers extend the taxonomy through
//! [`crate::config::CategoryOverride`]: an override whose category name is
//! not built in becomes a [`Category::Custom`] entry that upstream responses
//! may also use.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An expense category.
///
/// Serialises as its snake_case name (`"feed_supplies"`, …); custom
/// categories serialise as their normalised name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    FeedSupplies,
    VeterinaryHealth,
    Equipment,
    /// Fallback when no rule matches.
    UncategorizedSupplies,
    /// Caller-defined extension of the taxonomy.
    Custom(String),
}

impl Category {
    /// Built-in categories, in declaration order.
    pub const BUILT_IN: [Category; 4] = [
        Category::FeedSupplies,
        Category::VeterinaryHealth,
        Category::Equipment,
        Category::UncategorizedSupplies,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Category::FeedSupplies => "feed_supplies",
            Category::VeterinaryHealth => "veterinary_health",
            Category::Equipment => "equipment",
            Category::UncategorizedSupplies => "uncategorized_supplies",
            Category::Custom(name) => name,
        }
    }

    /// Resolve a free-form name against the built-in taxonomy.
    ///
    /// Case and punctuation are ignored: `"Veterinary Health"`,
    /// `"veterinary-health"` and `"VETERINARY_HEALTH"` all match.
    pub fn from_builtin_name(name: &str) -> Option<Category> {
        let key = normalize_category_name(name);
        Self::BUILT_IN.into_iter().find(|c| c.as_str() == key)
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Category::Custom(_))
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::UncategorizedSupplies
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        Category::from_builtin_name(&s).unwrap_or_else(|| Category::Custom(normalize_category_name(&s)))
    }
}

impl From<&str> for Category {
    fn from(s: &str) -> Self {
        Category::from(s.to_string())
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        c.as_str().to_string()
    }
}

/// Lower-case, map every run of non-alphanumerics to a single `_`, and trim
/// leading/trailing underscores. `"Feed & Supplies"` → `"feed_supplies"`.
pub fn normalize_category_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for ch in name.trim().chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_match_loosely() {
        assert_eq!(
            Category::from_builtin_name("Veterinary Health"),
            Some(Category::VeterinaryHealth)
        );
        assert_eq!(
            Category::from_builtin_name("feed & supplies"),
            Some(Category::FeedSupplies)
        );
        assert_eq!(
            Category::from_builtin_name(" EQUIPMENT. "),
            Some(Category::Equipment)
        );
        assert_eq!(Category::from_builtin_name("groceries"), None);
    }

    #[test]
    fn unknown_name_becomes_custom() {
        assert_eq!(
            Category::from("Grooming Supplies"),
            Category::Custom("grooming_supplies".into())
        );
        assert!(Category::from("grooming").is_custom());
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&Category::FeedSupplies).unwrap();
        assert_eq!(json, "\"feed_supplies\"");
        let back: Category = serde_json::from_str("\"veterinary_health\"").unwrap();
        assert_eq!(back, Category::VeterinaryHealth);
        let custom: Category = serde_json::from_str("\"Fencing\"").unwrap();
        assert_eq!(custom, Category::Custom("fencing".into()));
    }

    #[test]
    fn normalize_collapses_punctuation() {
        assert_eq!(normalize_category_name("--Feed__Supplies--"), "feed_supplies");
        assert_eq!(normalize_category_name(""), "");
    }
}
