//! Stateful wrapper remembering the last verdict for display

use crate::gate::SafetyGate;
use crate::types::{ModerationWarning, PromptVerdict};

/// Per-session moderation state
///
/// Holds only the most recent verdict; the gate itself stays pure.
#[derive(Debug, Clone, Default)]
pub struct ModerationSession {
    gate: SafetyGate,
    last: Option<PromptVerdict>,
}

impl ModerationSession {
    /// Create session over a gate
    #[inline]
    #[must_use]
    pub fn new(gate: SafetyGate) -> Self {
        Self { gate, last: None }
    }

    /// Validate and remember the verdict
    pub fn validate(&mut self, text: &str) -> &PromptVerdict {
        self.last.insert(self.gate.validate_prompt(text))
    }

    /// Last verdict, if any
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&PromptVerdict> {
        self.last.as_ref()
    }

    /// Warning for the last verdict
    #[inline]
    #[must_use]
    pub fn warning(&self) -> Option<ModerationWarning> {
        self.last.as_ref().and_then(PromptVerdict::warning)
    }

    /// Forget the last verdict
    #[inline]
    pub fn reset(&mut self) {
        self.last = None;
    }
}
