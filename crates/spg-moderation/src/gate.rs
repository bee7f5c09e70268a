//! The safety gate
//!
//! Pure and deterministic: the same text always yields the same verdict.

use crate::catalog::{TermCatalog, REDACTION_PLACEHOLDER};
use crate::types::{Flag, ModerationResult, PromptVerdict, Severity};
use std::collections::HashSet;
use std::sync::Arc;

/// Upper bound on redaction passes
///
/// The catalog rejects terms that can match across an inserted placeholder,
/// so the first pass always reaches the fixpoint and the second finds
/// nothing. The bound only caps work if that rule is ever relaxed.
const MAX_REDACTION_PASSES: usize = 4;

/// Classifies and sanitizes prompts against a [`TermCatalog`]
///
/// Cheap to clone; the compiled catalog is shared.
#[derive(Debug, Clone)]
pub struct SafetyGate {
    catalog: Arc<TermCatalog>,
}

impl SafetyGate {
    /// Create gate over a compiled catalog
    #[inline]
    #[must_use]
    pub fn new(catalog: TermCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
        }
    }

    /// Catalog in use
    #[inline]
    #[must_use]
    pub fn catalog(&self) -> &TermCatalog {
        &self.catalog
    }

    /// Scan text for catalog terms without deciding anything
    ///
    /// One flag per distinct (category, term) pair, ordered by first
    /// occurrence, then category name.
    #[must_use]
    pub fn scan(&self, text: &str) -> ModerationResult {
        let compiled = self.catalog.compiled();
        let mut hits: Vec<(usize, usize, String)> = Vec::new();

        for (idx, category) in compiled.iter().enumerate() {
            let mut seen = HashSet::new();
            for m in category.pattern.find_iter(text) {
                if seen.insert(m.as_str().to_lowercase()) {
                    hits.push((m.start(), idx, m.as_str().to_string()));
                }
            }
        }

        if hits.is_empty() {
            return ModerationResult::clean();
        }

        hits.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| compiled[a.1].name.cmp(&compiled[b.1].name))
        });

        let flags = hits
            .into_iter()
            .map(|(_, idx, matched_term)| Flag {
                category: compiled[idx].name.clone(),
                severity: compiled[idx].severity,
                matched_term,
            })
            .collect();

        ModerationResult::from_flags(flags)
    }

    /// Validate a prompt
    ///
    /// - any HIGH flag: `safe = false`, `sanitized` is the input unchanged
    /// - only MEDIUM/LOW flags: `safe = true`, flagged substrings replaced by
    ///   [`REDACTION_PLACEHOLDER`]
    /// - no flags: `safe = true`, `sanitized` is the input verbatim
    #[must_use]
    pub fn validate_prompt(&self, text: &str) -> PromptVerdict {
        let result = self.scan(text);

        if !result.safe {
            if let Some(flag) = result.most_severe() {
                tracing::warn!(
                    category = %flag.category,
                    severity = %flag.severity,
                    flags = result.flags.len(),
                    "prompt blocked by safety gate"
                );
            }
            return PromptVerdict {
                safe: false,
                sanitized: text.to_string(),
                result,
            };
        }

        if result.is_clean() {
            return PromptVerdict {
                safe: true,
                sanitized: text.to_string(),
                result,
            };
        }

        let sanitized = self.redact(text);
        tracing::info!(flags = result.flags.len(), "prompt sanitized by safety gate");

        PromptVerdict {
            safe: true,
            sanitized,
            result,
        }
    }

    /// Replace every MEDIUM/LOW match until none remain
    fn redact(&self, text: &str) -> String {
        let mut current = text.to_string();
        for _ in 0..MAX_REDACTION_PASSES {
            let spans = self.redactable_spans(&current);
            if spans.is_empty() {
                break;
            }
            current = replace_spans(&current, &spans);
        }
        current
    }

    /// Merged byte ranges of non-blocking matches
    fn redactable_spans(&self, text: &str) -> Vec<(usize, usize)> {
        let mut spans: Vec<(usize, usize)> = self
            .catalog
            .compiled()
            .iter()
            .filter(|c| c.severity < Severity::High)
            .flat_map(|c| c.pattern.find_iter(text).map(|m| (m.start(), m.end())))
            .collect();

        spans.sort_unstable();

        let mut merged: Vec<(usize, usize)> = Vec::with_capacity(spans.len());
        for (start, end) in spans {
            match merged.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }
        merged
    }
}

impl Default for SafetyGate {
    fn default() -> Self {
        Self::new(TermCatalog::default())
    }
}

/// Validate a prompt against the built-in catalog
#[must_use]
pub fn validate_prompt(text: &str) -> PromptVerdict {
    SafetyGate::default().validate_prompt(text)
}

fn replace_spans(text: &str, spans: &[(usize, usize)]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for &(start, end) in spans {
        out.push_str(&text[cursor..start]);
        out.push_str(REDACTION_PLACEHOLDER);
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out
}
