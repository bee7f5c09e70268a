//! Term catalog: moderation categories compiled into matchers
//!
//! Terms match case-insensitively on word boundaries. Within a category the
//! longest term wins when several start at the same position.

use crate::error::CatalogError;
use crate::types::Severity;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Replacement for redacted MEDIUM/LOW substrings
pub const REDACTION_PLACEHOLDER: &str = "[redacted]";

/// Built-in categories: (name, severity, terms)
const DEFAULT_CATEGORIES: &[(&str, Severity, &[&str])] = &[
    (
        "violent_threat",
        Severity::High,
        &["kill yourself", "kys", "shoot up", "bomb threat", "death threat"],
    ),
    (
        "hate_speech",
        Severity::High,
        &["white power", "ethnic cleansing", "heil hitler", "subhuman"],
    ),
    ("sexual_minors", Severity::High, &["csam", "child porn"]),
    (
        "payment_fraud",
        Severity::High,
        &[
            "stolen credit card",
            "stolen cards",
            "carding",
            "phishing page",
            "bypass checkout",
            "skip payment",
        ],
    ),
    (
        "profanity",
        Severity::Medium,
        &["fuck", "fucking", "shit", "bitch", "asshole", "bastard"],
    ),
    ("mild_language", Severity::Low, &["damn", "crap", "sucks"]),
    (
        "spam",
        Severity::Low,
        &["click here", "free money", "100% guaranteed", "act now"],
    ),
];

static DEFAULT_CATALOG: Lazy<TermCatalog> = Lazy::new(|| {
    TermCatalog::compile(default_category_configs())
        .expect("built-in moderation catalog compiles")
});

/// Serializable declaration of one category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Category name shown in flags and warnings
    pub name: String,
    /// Severity applied to every term of the category
    pub severity: Severity,
    /// Literal terms (not regex)
    pub terms: Vec<String>,
}

impl CategoryConfig {
    /// Create a category declaration
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        severity: Severity,
        terms: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            severity,
            terms: terms.into_iter().map(Into::into).collect(),
        }
    }
}

/// Moderation configuration section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    /// Drop the built-in categories and use only `categories`
    pub replace_defaults: bool,
    /// Additional categories
    pub categories: Vec<CategoryConfig>,
}

impl ModerationConfig {
    /// Compile into a catalog
    ///
    /// Without `replace_defaults`, extra categories are appended to the
    /// built-in set. Reusing a built-in name extends that category's terms
    /// only when the severity matches; otherwise it is a duplicate.
    ///
    /// # Errors
    /// Returns error if any category is malformed
    pub fn build_catalog(&self) -> Result<TermCatalog, CatalogError> {
        if !self.replace_defaults && self.categories.is_empty() {
            return Ok(TermCatalog::builtin().clone());
        }

        let mut configs = if self.replace_defaults {
            Vec::new()
        } else {
            default_category_configs()
        };

        for extra in &self.categories {
            match configs.iter_mut().find(|c| c.name == extra.name) {
                Some(existing) if existing.severity == extra.severity => {
                    existing.terms.extend(extra.terms.iter().cloned());
                }
                Some(_) => return Err(CatalogError::DuplicateCategory(extra.name.clone())),
                None => configs.push(extra.clone()),
            }
        }

        TermCatalog::compile(configs)
    }
}

fn default_category_configs() -> Vec<CategoryConfig> {
    DEFAULT_CATEGORIES
        .iter()
        .map(|(name, severity, terms)| CategoryConfig::new(*name, *severity, terms.iter().copied()))
        .collect()
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledCategory {
    pub(crate) name: String,
    pub(crate) severity: Severity,
    pub(crate) pattern: Regex,
}

/// Compiled, immutable set of moderation categories
#[derive(Debug, Clone)]
pub struct TermCatalog {
    categories: Vec<CompiledCategory>,
}

impl TermCatalog {
    /// Process-wide built-in catalog
    #[inline]
    #[must_use]
    pub fn builtin() -> &'static TermCatalog {
        &DEFAULT_CATALOG
    }

    /// Compile category declarations
    ///
    /// # Errors
    /// Returns error on empty names or terms, duplicate categories, or a
    /// term that would match [`REDACTION_PLACEHOLDER`]
    pub fn compile(configs: Vec<CategoryConfig>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        let mut categories = Vec::with_capacity(configs.len());

        for config in configs {
            let name = config.name.trim().to_string();
            if name.is_empty() {
                return Err(CatalogError::EmptyCategoryName);
            }
            if !seen.insert(name.clone()) {
                return Err(CatalogError::DuplicateCategory(name));
            }

            let mut terms: Vec<String> = Vec::with_capacity(config.terms.len());
            for term in &config.terms {
                let term = term.trim().to_lowercase();
                if term.is_empty() {
                    return Err(CatalogError::EmptyTerm { category: name });
                }
                if overlaps_placeholder(&term) {
                    return Err(CatalogError::PlaceholderCollision { category: name, term });
                }
                if !terms.contains(&term) {
                    terms.push(term);
                }
            }
            if terms.is_empty() {
                return Err(CatalogError::NoTerms(name));
            }

            // longest first so alternation prefers "fucking" over "fuck"
            terms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

            let pattern = build_pattern(&terms).map_err(|source| CatalogError::Pattern {
                category: name.clone(),
                source,
            })?;

            if pattern.is_match(REDACTION_PLACEHOLDER) {
                let term = terms
                    .iter()
                    .find(|t| REDACTION_PLACEHOLDER.contains(t.as_str()))
                    .cloned()
                    .unwrap_or_default();
                return Err(CatalogError::PlaceholderCollision { category: name, term });
            }

            categories.push(CompiledCategory {
                name,
                severity: config.severity,
                pattern,
            });
        }

        tracing::debug!(categories = categories.len(), "compiled moderation catalog");
        Ok(Self { categories })
    }

    /// Number of categories
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// Check if catalog has no categories
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Category names with their severities
    pub fn categories(&self) -> impl Iterator<Item = (&str, Severity)> {
        self.categories.iter().map(|c| (c.name.as_str(), c.severity))
    }

    pub(crate) fn compiled(&self) -> &[CompiledCategory] {
        &self.categories
    }
}

impl Default for TermCatalog {
    fn default() -> Self {
        Self::builtin().clone()
    }
}

/// Alternation of escaped terms; `\b` only on sides that start/end with a
/// word character, otherwise the assertion could never hold.
fn build_pattern(terms: &[String]) -> Result<Regex, regex::Error> {
    let alternatives: Vec<String> = terms
        .iter()
        .map(|term| {
            let starts_word = term.chars().next().is_some_and(is_word_char);
            let ends_word = term.chars().last().is_some_and(is_word_char);
            format!(
                "{}{}{}",
                if starts_word { r"\b" } else { "" },
                regex::escape(term),
                if ends_word { r"\b" } else { "" },
            )
        })
        .collect();

    RegexBuilder::new(&format!("(?:{})", alternatives.join("|")))
        .case_insensitive(true)
        .build()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whether a match of `term` could cover part of an inserted placeholder
///
/// Terms are word-bounded at word-character ends, so such a match has to
/// contain a bracket or the whole word of the placeholder.
fn overlaps_placeholder(term: &str) -> bool {
    let word = REDACTION_PLACEHOLDER.trim_matches(|c| c == '[' || c == ']');
    term.contains(['[', ']']) || term.split(|c: char| !is_word_char(c)).any(|w| w == word)
}
