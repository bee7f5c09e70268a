//! SPG Scope - Scope Isolation Controller
//!
//! Keeps theme changes raised in the editor chrome (`builder`) and in a live
//! preview (`storefront`) from leaking into each other, even though both
//! subtrees share one event bus.
//!
//! # Example
//!
//! ```rust
//! use spg_scope::{ElementId, PreviewId, ScopeBinding, ScopeController, ThemeEvent, ThemePayload};
//!
//! let controller = ScopeController::new();
//! let chrome = ElementId::next();
//! controller.tag_scope(chrome, ScopeBinding::Builder).unwrap();
//!
//! let report = controller.dispatch(&ThemeEvent::storefront(ThemePayload::default()));
//! assert!(report.applied.is_empty());
//! assert!(controller.theme_of(chrome).is_none());
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod controller;
mod selector;
mod types;

pub use controller::{DispatchReport, ScopeController, ScopeError, SkipReason, ThemeApplication};
pub use selector::{
    scope_target, should_apply_theme, ScopeSelector, PREVIEW_ATTRIBUTE, SCOPE_ATTRIBUTE,
};
pub use types::{
    ElementId, PreviewId, ScopeBinding, ScopeTag, ThemeEvent, ThemeMode, ThemePayload,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
