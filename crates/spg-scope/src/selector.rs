//! Scope targets
//!
//! `Builder` resolves to the document root; each storefront instance gets an
//! attribute selector no other instance can match.

use crate::types::{PreviewId, ScopeBinding, ScopeTag};
use std::fmt::{self, Display, Formatter};

/// Attribute marking a storefront subtree root
pub const SCOPE_ATTRIBUTE: &str = "data-spg-scope";

/// Attribute carrying the preview instance ID
pub const PREVIEW_ATTRIBUTE: &str = "data-spg-preview";

/// Whether a theme event raised in `event_scope` may repaint `current_scope`
#[inline]
#[must_use]
pub fn should_apply_theme(event_scope: ScopeTag, current_scope: ScopeTag) -> bool {
    event_scope == current_scope
}

/// Selector a scope's style rules are attached to
#[inline]
#[must_use]
pub fn scope_target(binding: &ScopeBinding) -> ScopeSelector {
    match binding {
        ScopeBinding::Builder => ScopeSelector::Root,
        ScopeBinding::Storefront(id) => ScopeSelector::Storefront(*id),
    }
}

/// Style target for a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeSelector {
    /// Host document root
    Root,
    /// Subtree root of one preview instance
    Storefront(PreviewId),
}

impl ScopeSelector {
    /// Attributes to set on the subtree root so the selector matches it
    #[must_use]
    pub fn attributes(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Root => Vec::new(),
            Self::Storefront(id) => vec![
                (SCOPE_ATTRIBUTE, ScopeTag::Storefront.to_string()),
                (PREVIEW_ATTRIBUTE, id.to_string()),
            ],
        }
    }

    /// Whether rules under this selector may reach an element with `binding`
    ///
    /// The root selector reaches builder elements only: storefront subtrees
    /// carry their own variables and never inherit the chrome theme.
    #[must_use]
    pub fn contains(&self, binding: &ScopeBinding) -> bool {
        match (self, binding) {
            (Self::Root, ScopeBinding::Builder) => true,
            (Self::Storefront(a), ScopeBinding::Storefront(b)) => a == b,
            _ => false,
        }
    }
}

impl Display for ScopeSelector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str(":root"),
            Self::Storefront(id) => write!(
                f,
                "[{SCOPE_ATTRIBUTE}=\"storefront\"][{PREVIEW_ATTRIBUTE}=\"{id}\"]"
            ),
        }
    }
}
