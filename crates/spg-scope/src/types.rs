//! Scope types
//!
//! Defines the identities the controller relates:
//! - Scope tags and bindings
//! - Preview and element identifiers
//! - Theme events

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use ulid::Ulid;

/// Partition controlling which subtree a theme event may affect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeTag {
    /// Host editor chrome
    Builder,
    /// Generated preview content
    Storefront,
}

impl Display for ScopeTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builder => f.write_str("builder"),
            Self::Storefront => f.write_str("storefront"),
        }
    }
}

/// Unique preview instance identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PreviewId(pub Ulid);

impl PreviewId {
    /// Generate new preview ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for PreviewId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for PreviewId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier of a root element in the host document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementId(pub u64);

static NEXT_ELEMENT: AtomicU64 = AtomicU64::new(1);

impl ElementId {
    /// Allocate a process-unique element ID
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_ELEMENT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for ElementId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "el#{}", self.0)
    }
}

/// Scope an element is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeBinding {
    /// Process-wide host chrome
    Builder,
    /// One preview instance
    Storefront(PreviewId),
}

impl ScopeBinding {
    /// Tag of this binding
    #[inline]
    #[must_use]
    pub const fn tag(&self) -> ScopeTag {
        match self {
            Self::Builder => ScopeTag::Builder,
            Self::Storefront(_) => ScopeTag::Storefront,
        }
    }

    /// Preview instance, if storefront
    #[inline]
    #[must_use]
    pub const fn preview(&self) -> Option<PreviewId> {
        match self {
            Self::Builder => None,
            Self::Storefront(id) => Some(*id),
        }
    }
}

/// Color mode carried by a theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    /// Light
    Light,
    /// Dark
    Dark,
    /// Follow the OS
    #[default]
    System,
}

/// Theme contents: mode plus CSS custom properties
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ThemePayload {
    /// Color mode
    pub mode: ThemeMode,
    /// Custom properties, e.g. `--primary` → `222 47% 11%`
    pub variables: BTreeMap<String, String>,
}

impl ThemePayload {
    /// Payload with a mode and no variables
    #[inline]
    #[must_use]
    pub fn new(mode: ThemeMode) -> Self {
        Self {
            mode,
            variables: BTreeMap::new(),
        }
    }

    /// Add a custom property
    #[inline]
    #[must_use]
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }
}

/// A theme broadcast on the shared bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeEvent {
    /// Scope the event was raised in
    pub scope: ScopeTag,
    /// Narrow a storefront event to one preview instance
    pub instance: Option<PreviewId>,
    /// Theme to apply
    pub payload: ThemePayload,
}

impl ThemeEvent {
    /// Event for the host chrome
    #[inline]
    #[must_use]
    pub fn builder(payload: ThemePayload) -> Self {
        Self {
            scope: ScopeTag::Builder,
            instance: None,
            payload,
        }
    }

    /// Event for every storefront preview
    #[inline]
    #[must_use]
    pub fn storefront(payload: ThemePayload) -> Self {
        Self {
            scope: ScopeTag::Storefront,
            instance: None,
            payload,
        }
    }

    /// Event for one storefront preview
    #[inline]
    #[must_use]
    pub fn for_preview(preview: PreviewId, payload: ThemePayload) -> Self {
        Self {
            scope: ScopeTag::Storefront,
            instance: Some(preview),
            payload,
        }
    }
}
