//! Configuration types for receipt extraction.
//!
//! All pipeline behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`] or loaded from JSON. Keeping every
//! knob in one struct makes it trivial to share configs across threads,
//! serialise them for logging, and diff two runs to understand why their
//! outputs differ.

use crate::error::ExtractError;
use crate::progress::ProgressCallback;
use crate::taxonomy::Category;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Upper bound for [`ExtractionConfig::max_repair_attempts`].
pub const MAX_REPAIR_ATTEMPTS: u32 = 8;

/// Configuration for one or many pipeline invocations.
///
/// # Example
/// ```rust
/// use receipt_extract::{Category, ExtractionConfig};
///
/// let config = ExtractionConfig::builder()
///     .max_repair_attempts(3)
///     .category_override("salt block", Category::FeedSupplies)
///     .build()
///     .unwrap();
/// assert!(!config.strict_mode);
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractionConfig {
    /// Only the strict parse layer runs. Default: false.
    ///
    /// Useful when the upstream call requested a JSON response format and
    /// anything that does not parse verbatim should be surfaced for review.
    pub strict_mode: bool,

    /// Number of repair passes before falling through to heuristic
    /// extraction. Range: 1–8. Default: 1.
    ///
    /// The first pass fixes trailing commas, unterminated strings and missing
    /// closers. Every further pass cuts the span back to an earlier value
    /// boundary first, trading the damaged tail for a parseable prefix.
    pub max_repair_attempts: u32,

    /// Keyword rules checked ahead of the built-in ones, in order.
    pub category_overrides: Vec<CategoryOverride>,

    /// Maximum characters of source text kept on a diagnostic. Default: 160.
    pub max_fragment_len: usize,

    /// Absolute difference below which two money amounts are equal. Default: 0.01.
    pub price_tolerance: f64,

    /// Parallel invocations in [`crate::extract::extract_batch`]. Default: 4.
    pub concurrency: usize,

    /// Optional batch progress events.
    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            max_repair_attempts: 1,
            category_overrides: Vec::new(),
            max_fragment_len: 160,
            price_tolerance: 0.01,
            concurrency: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("strict_mode", &self.strict_mode)
            .field("max_repair_attempts", &self.max_repair_attempts)
            .field("category_overrides", &self.category_overrides)
            .field("max_fragment_len", &self.max_fragment_len)
            .field("price_tolerance", &self.price_tolerance)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Parse a JSON config document (camelCase keys). Call [`Self::validate`] after.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ExtractError::InputReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = Self::from_json_str(&text).map_err(|e| ExtractError::ConfigParse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the builder enforces.
    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.max_repair_attempts == 0 || self.max_repair_attempts > MAX_REPAIR_ATTEMPTS {
            return Err(ExtractError::InvalidConfig(format!(
                "maxRepairAttempts must be 1–{}, got {}",
                MAX_REPAIR_ATTEMPTS, self.max_repair_attempts
            )));
        }
        if self.concurrency == 0 {
            return Err(ExtractError::InvalidConfig(
                "concurrency must be ≥ 1".into(),
            ));
        }
        if !(self.price_tolerance >= 0.0 && self.price_tolerance.is_finite()) {
            return Err(ExtractError::InvalidConfig(format!(
                "priceTolerance must be a finite non-negative number, got {}",
                self.price_tolerance
            )));
        }
        if let Some(bad) = self
            .category_overrides
            .iter()
            .find(|o| o.keyword.trim().is_empty())
        {
            return Err(ExtractError::InvalidConfig(format!(
                "category override for '{}' has an empty keyword",
                bad.category
            )));
        }
        Ok(())
    }

    /// Custom categories introduced by the overrides, deduplicated, in order.
    pub fn custom_categories(&self) -> Vec<Category> {
        let mut out: Vec<Category> = Vec::new();
        for o in &self.category_overrides {
            if o.category.is_custom() && !out.contains(&o.category) {
                out.push(o.category.clone());
            }
        }
        out
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn strict_mode(mut self, v: bool) -> Self {
        self.config.strict_mode = v;
        self
    }

    pub fn max_repair_attempts(mut self, n: u32) -> Self {
        self.config.max_repair_attempts = n;
        self
    }

    /// Append one keyword rule. Earlier overrides win over later ones.
    pub fn category_override(
        mut self,
        keyword: impl Into<String>,
        category: impl Into<Category>,
    ) -> Self {
        self.config.category_overrides.push(CategoryOverride {
            keyword: keyword.into(),
            category: category.into(),
        });
        self
    }

    pub fn category_overrides(mut self, overrides: Vec<CategoryOverride>) -> Self {
        self.config.category_overrides = overrides;
        self
    }

    pub fn max_fragment_len(mut self, n: usize) -> Self {
        self.config.max_fragment_len = n.max(16);
        self
    }

    pub fn price_tolerance(mut self, t: f64) -> Self {
        self.config.price_tolerance = t;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// A caller-supplied keyword rule: descriptions containing `keyword` (as a
/// whole word or word sequence, case-insensitive) map to `category`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryOverride {
    pub keyword: String,
    pub category: Category,
}

impl std::str::FromStr for CategoryOverride {
    type Err = ExtractError;

    /// Parse `keyword=category`, the form used on the command line.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (keyword, category) = s.split_once('=').ok_or_else(|| {
            ExtractError::InvalidConfig(format!(
                "category override '{s}' must look like keyword=category"
            ))
        })?;
        let (keyword, category) = (keyword.trim(), category.trim());
        if keyword.is_empty() || category.is_empty() {
            return Err(ExtractError::InvalidConfig(format!(
                "category override '{s}' has an empty keyword or category"
            )));
        }
        Ok(CategoryOverride {
            keyword: keyword.to_string(),
            category: Category::from(category),
        })
    }
}
