//! Category assignment for validated line items.
//!
//! An upstream category that names a taxonomy entry is kept. Otherwise the
//! description is tokenised and run through an ordered rule table; the first
//! matching rule wins. Caller overrides sit at the front of the table, so a
//! farm that files "salt block" under feed can say so without touching the
//! built-ins.
//!
//! ## Rule Order
//!
//! 1. Caller overrides, in configuration order
//! 2. Veterinary and health products
//! 3. Grooming supplies
//! 4. Equipment and hardware
//! 5. Feed keywords
//! 6. Any weight unit (`50lb`, `25 kg`): bulk goods are almost always feed
//!
//! Nothing matched: `uncategorized_supplies`, with a warning.

use super::normalize::{round4, ValidatedItem, ValidatedReceipt};
use super::Staged;
use crate::config::ExtractionConfig;
use crate::error::DiagnosticKind;
use crate::output::{CategorySource, Diagnostic, LineItem, ReceiptRecord, Stage};
use crate::taxonomy::{normalize_category_name, Category};
use tracing::debug;

/// How a rule decides whether a description belongs to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// Any keyword, matched as a contiguous run of whole tokens.
    Keywords(Vec<Vec<String>>),
    /// A number immediately followed by a weight unit.
    WeightUnit,
}

impl Matcher {
    fn keywords(words: &[&str]) -> Self {
        Matcher::Keywords(words.iter().map(|w| tokenize(w)).collect())
    }

    pub fn matches(&self, tokens: &[String]) -> bool {
        match self {
            Matcher::Keywords(keywords) => keywords
                .iter()
                .any(|kw| !kw.is_empty() && tokens.windows(kw.len()).any(|w| w == kw.as_slice())),
            Matcher::WeightUnit => tokens.windows(2).any(|w| {
                w[0].chars().all(|c| c.is_ascii_digit() || c == '.')
                    && WEIGHT_UNITS.contains(&w[1].as_str())
            }),
        }
    }
}

/// One entry of the ordered rule table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRule {
    pub name: String,
    pub matcher: Matcher,
    pub category: Category,
    pub source: CategorySource,
}

const WEIGHT_UNITS: &[&str] = &[
    "lb", "lbs", "pound", "pounds", "oz", "kg", "kgs", "kilo", "kilos", "ton", "tons", "bu",
    "bushel", "bushels", "cwt",
];

const VETERINARY: &[&str] = &[
    "vaccine", "vaccination", "dewormer", "wormer", "antibiotic", "antibiotics", "penicillin",
    "ivermectin", "syringe", "syringes", "needle", "needles", "medicine", "medication",
    "ointment", "wound spray", "fly spray", "vitamin", "vitamins", "electrolyte",
    "electrolytes", "bolus", "drench", "vet", "veterinary", "pour on",
];

const GROOMING: &[&str] = &[
    "shampoo", "conditioner", "brush", "comb", "curry", "muzzle", "clipper", "clippers",
    "hoof pick", "grooming", "detangler",
];

const EQUIPMENT: &[&str] = &[
    "bucket", "buckets", "feeder", "waterer", "trough", "fence", "fencing", "gate", "halter",
    "lead rope", "saddle", "bridle", "tool", "tools", "shovel", "fork", "wheelbarrow", "heater",
    "tank", "hose", "panel", "post", "posts", "wire", "charger", "insulator", "tarp", "collar",
    "leash", "crate", "kennel",
];

const FEED: &[&str] = &[
    "feed", "grain", "hay", "straw", "pellet", "pellets", "food", "kibble", "oats", "corn",
    "barley", "alfalfa", "chow", "scratch", "mash", "crumble", "crumbles", "mineral",
    "minerals", "salt", "lick", "treats", "bran", "silage", "seed",
];

/// The ordered rule table for one configuration.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<CategoryRule>,
    /// Caller-defined categories an upstream response may name.
    custom: Vec<Category>,
}

impl RuleSet {
    pub fn new(config: &ExtractionConfig) -> Self {
        let mut rules: Vec<CategoryRule> = config
            .category_overrides
            .iter()
            .map(|o| CategoryRule {
                name: format!("override '{}'", o.keyword),
                matcher: Matcher::Keywords(vec![tokenize(&o.keyword)]),
                category: o.category.clone(),
                source: CategorySource::Override,
            })
            .collect();

        let built_in = [
            ("veterinary", Matcher::keywords(VETERINARY), Category::VeterinaryHealth),
            ("grooming", Matcher::keywords(GROOMING), Category::UncategorizedSupplies),
            ("equipment", Matcher::keywords(EQUIPMENT), Category::Equipment),
            ("feed", Matcher::keywords(FEED), Category::FeedSupplies),
            ("weight unit", Matcher::WeightUnit, Category::FeedSupplies),
        ];
        rules.extend(built_in.into_iter().map(|(name, matcher, category)| CategoryRule {
            name: name.to_string(),
            matcher,
            category,
            source: CategorySource::Rule,
        }));

        Self {
            rules,
            custom: config.custom_categories(),
        }
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    /// First rule matching `description`.
    pub fn classify(&self, description: &str) -> Option<&CategoryRule> {
        let tokens = tokenize(description);
        self.rules.iter().find(|r| r.matcher.matches(&tokens))
    }

    /// Resolve an upstream category string against the taxonomy.
    pub fn resolve_upstream(&self, name: &str) -> Option<Category> {
        Category::from_builtin_name(name).or_else(|| {
            let key = normalize_category_name(name);
            self.custom.iter().find(|c| c.as_str() == key).cloned()
        })
    }
}

/// Lower-case alphanumeric tokens; digit/letter boundaries split, so
/// `"50lb"` yields `["50", "lb"]` and `"2.5kg"` yields `["2.5", "kg"]`.
pub fn tokenize(s: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut numeric = false;

    for ch in s.chars().flat_map(char::to_lowercase) {
        let is_num = ch.is_ascii_digit() || (ch == '.' && numeric && !current.is_empty());
        if ch.is_alphanumeric() || is_num {
            if !current.is_empty() && is_num != numeric {
                tokens.push(std::mem::take(&mut current));
            }
            numeric = is_num;
            current.push(ch);
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    // "2." from "2. bags"
    for t in &mut tokens {
        if t.ends_with('.') {
            t.pop();
        }
    }
    tokens
}

/// Assign a category to every item and build the final record.
pub fn categorize(receipt: ValidatedReceipt, config: &ExtractionConfig) -> Staged<ReceiptRecord> {
    let rules = RuleSet::new(config);
    let mut diagnostics = Vec::new();

    let items = receipt
        .items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| categorize_item(idx + 1, item, &rules, &mut diagnostics))
        .collect();

    Staged::new(
        ReceiptRecord {
            vendor: receipt.vendor,
            date: receipt.date,
            items,
            total: receipt.total,
        },
        diagnostics,
    )
}

fn categorize_item(
    position: usize,
    item: ValidatedItem,
    rules: &RuleSet,
    diagnostics: &mut Vec<Diagnostic>,
) -> LineItem {
    let (category, category_source) = match item
        .upstream_category
        .as_deref()
        .map(|name| (name, rules.resolve_upstream(name)))
    {
        Some((_, Some(category))) => (category, CategorySource::Upstream),
        upstream => {
            if let Some((name, None)) = upstream {
                diagnostics.push(Diagnostic::new(
                    Stage::Categorize,
                    DiagnosticKind::CategoryRejected,
                    format!(
                        "item {position} ('{}'): upstream category '{name}' is not in the taxonomy",
                        item.description
                    ),
                ));
            }
            match rules.classify(&item.description) {
                Some(rule) => {
                    debug!(
                        "categorize: '{}' -> {} (rule: {})",
                        item.description, rule.category, rule.name
                    );
                    (rule.category.clone(), rule.source)
                }
                None => {
                    diagnostics.push(Diagnostic::new(
                        Stage::Categorize,
                        DiagnosticKind::UnknownCategory,
                        format!(
                            "item {position} ('{}'): no rule matched; assigned {}",
                            item.description,
                            Category::UncategorizedSupplies
                        ),
                    ));
                    (Category::UncategorizedSupplies, CategorySource::Default)
                }
            }
        }
    };

    LineItem {
        line_total: round4(item.quantity * item.unit_price),
        description: item.description,
        quantity: item.quantity,
        unit_price: item.unit_price,
        price_known: item.price_known,
        reported_total: item.reported_total,
        category,
        category_source,
        raw_fragment: item.raw_fragment,
    }
}
