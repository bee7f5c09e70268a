//! Moderation result types
//!
//! [`ModerationResult`] is what a scan finds; [`PromptVerdict`] is what the
//! gate decides.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Severity of a moderation category
///
/// Ordered `Low < Medium < High`. Only `High` blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Flag and sanitize
    #[serde(alias = "LOW")]
    Low,
    /// Flag and sanitize
    #[serde(alias = "MEDIUM")]
    Medium,
    /// Always blocks
    #[serde(alias = "HIGH")]
    High,
}

impl Severity {
    /// Whether a match of this severity blocks submission
    #[inline]
    #[must_use]
    pub const fn is_blocking(self) -> bool {
        matches!(self, Self::High)
    }

    /// Upper-case label used in warnings and logs
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected policy-relevant match in a prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag {
    /// Category the term belongs to
    pub category: String,
    /// Severity of that category
    pub severity: Severity,
    /// Matched text, as it first appeared in the prompt
    pub matched_term: String,
}

/// Outcome of scanning one prompt
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModerationResult {
    /// False iff any flag is HIGH
    pub safe: bool,
    /// Flags ordered by first occurrence in the text
    pub flags: Vec<Flag>,
}

impl ModerationResult {
    /// Build a result from ordered flags
    #[must_use]
    pub fn from_flags(flags: Vec<Flag>) -> Self {
        let safe = !flags.iter().any(|f| f.severity.is_blocking());
        Self { safe, flags }
    }

    /// Result with no flags
    #[inline]
    #[must_use]
    pub fn clean() -> Self {
        Self {
            safe: true,
            flags: Vec::new(),
        }
    }

    /// Check if nothing was flagged
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.flags.is_empty()
    }

    /// Highest-severity flag; ties resolve to the earliest flag
    #[must_use]
    pub fn most_severe(&self) -> Option<&Flag> {
        self.flags
            .iter()
            .rev()
            .max_by_key(|f| f.severity)
    }

    /// Warning to display for this result, if any
    #[must_use]
    pub fn warning(&self) -> Option<ModerationWarning> {
        self.most_severe().map(ModerationWarning::from_flag)
    }
}

/// User-facing warning derived from the highest-severity flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationWarning {
    /// Blocking warnings stop submission
    pub blocking: bool,
    /// Violated category
    pub category: String,
    /// Severity of the category
    pub severity: Severity,
    /// Display text
    pub message: String,
}

impl ModerationWarning {
    fn from_flag(flag: &Flag) -> Self {
        let blocking = flag.severity.is_blocking();
        let message = if blocking {
            format!(
                "Your prompt was blocked because it contains content in the '{}' category. \
                 Edit the prompt and try again.",
                flag.category
            )
        } else {
            format!(
                "Some wording in your prompt was flagged as '{}' and was redacted before generation.",
                flag.category
            )
        };
        Self {
            blocking,
            category: flag.category.clone(),
            severity: flag.severity,
            message,
        }
    }
}

/// Decision of the safety gate for one prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptVerdict {
    /// Whether the prompt may be submitted
    pub safe: bool,
    /// Text to submit; equal to the input when blocked or clean
    pub sanitized: String,
    /// Underlying scan
    pub result: ModerationResult,
}

impl PromptVerdict {
    /// Text that may be forwarded to the generator
    ///
    /// `None` when blocked, so raw blocked text is never reachable through
    /// this accessor.
    #[inline]
    #[must_use]
    pub fn submission(&self) -> Option<&str> {
        self.safe.then_some(self.sanitized.as_str())
    }

    /// Warning to show, blocking or not
    #[inline]
    #[must_use]
    pub fn warning(&self) -> Option<ModerationWarning> {
        self.result.warning()
    }

    /// Blocking warning, present only when the prompt was rejected
    #[must_use]
    pub fn blocking_warning(&self) -> Option<ModerationWarning> {
        if self.safe {
            None
        } else {
            self.warning()
        }
    }

    /// Flags raised by the scan
    #[inline]
    #[must_use]
    pub fn flags(&self) -> &[Flag] {
        &self.result.flags
    }
}
