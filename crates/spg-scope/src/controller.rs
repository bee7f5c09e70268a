//! Scope isolation controller
//!
//! Element ownership is an explicit relation (`ElementId` → `ScopeBinding`).
//! Every theme mutation goes through [`ScopeController::apply_theme`], which
//! checks that relation first.

use crate::selector::{scope_target, should_apply_theme, ScopeSelector};
use crate::types::{ElementId, PreviewId, ScopeBinding, ThemeEvent, ThemePayload};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Why a theme was not applied to an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Element has no scope tag
    Untagged,
    /// Element belongs to another scope
    ScopeMismatch,
    /// Storefront event narrowed to a different preview
    OtherInstance,
}

/// Result of applying one event to one element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeApplication {
    /// Theme stored for the element
    Applied,
    /// Element left untouched
    Skipped(SkipReason),
}

/// Elements repainted by one dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Repainted elements, ascending
    pub applied: Vec<ElementId>,
    /// Tagged elements left untouched
    pub skipped: usize,
}

/// Scope tagging errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// Element already owned by another scope
    #[error("{element} is already tagged {existing:?}, refusing {requested:?}")]
    AlreadyTagged {
        /// Element being tagged
        element: ElementId,
        /// Current owner
        existing: ScopeBinding,
        /// Rejected binding
        requested: ScopeBinding,
    },
}

/// Partitions theme propagation between host chrome and previews
///
/// Shared by every subtree on one event bus; `Send + Sync`.
#[derive(Debug, Default)]
pub struct ScopeController {
    bindings: DashMap<ElementId, ScopeBinding>,
    themes: DashMap<ElementId, ThemePayload>,
}

impl ScopeController {
    /// Create empty controller
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Establish scope ownership of a root element
    ///
    /// Called once at mount. Repeating the same binding is a no-op.
    ///
    /// # Errors
    /// [`ScopeError::AlreadyTagged`] if the element is owned by a different
    /// binding
    pub fn tag_scope(&self, element: ElementId, binding: ScopeBinding) -> Result<(), ScopeError> {
        match self.bindings.entry(element) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                if *existing.get() == binding {
                    Ok(())
                } else {
                    Err(ScopeError::AlreadyTagged {
                        element,
                        existing: *existing.get(),
                        requested: binding,
                    })
                }
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(binding);
                tracing::debug!(%element, scope = %binding.tag(), "scope tagged");
                Ok(())
            }
        }
    }

    /// Owner of an element
    #[inline]
    #[must_use]
    pub fn owner(&self, element: ElementId) -> Option<ScopeBinding> {
        self.bindings.get(&element).map(|b| *b)
    }

    /// Style target of an element's owner
    #[must_use]
    pub fn target_of(&self, element: ElementId) -> Option<ScopeSelector> {
        self.owner(element).map(|b| scope_target(&b))
    }

    /// Apply an event to one element, if its owner allows it
    pub fn apply_theme(&self, element: ElementId, event: &ThemeEvent) -> ThemeApplication {
        let Some(binding) = self.owner(element) else {
            return ThemeApplication::Skipped(SkipReason::Untagged);
        };
        match Self::admits(&binding, event) {
            Ok(()) => {
                self.themes.insert(element, event.payload.clone());
                ThemeApplication::Applied
            }
            Err(reason) => ThemeApplication::Skipped(reason),
        }
    }

    /// Broadcast an event to every tagged element
    ///
    /// Synchronous; a later dispatch for the same scope replaces the stored
    /// theme outright.
    pub fn dispatch(&self, event: &ThemeEvent) -> DispatchReport {
        let mut elements: Vec<ElementId> = self.bindings.iter().map(|e| *e.key()).collect();
        elements.sort_unstable();

        let mut report = DispatchReport::default();
        for element in elements {
            match self.apply_theme(element, event) {
                ThemeApplication::Applied => report.applied.push(element),
                ThemeApplication::Skipped(_) => report.skipped += 1,
            }
        }

        tracing::debug!(
            scope = %event.scope,
            applied = report.applied.len(),
            skipped = report.skipped,
            "theme dispatched"
        );
        report
    }

    /// Current theme of an element
    #[inline]
    #[must_use]
    pub fn theme_of(&self, element: ElementId) -> Option<ThemePayload> {
        self.themes.get(&element).map(|t| t.clone())
    }

    /// Remove an element's tag and theme
    pub fn untag(&self, element: ElementId) -> Option<ScopeBinding> {
        self.themes.remove(&element);
        self.bindings.remove(&element).map(|(_, b)| b)
    }

    /// Drop every element bound to a preview instance
    ///
    /// Returns the number of elements released.
    pub fn release_preview(&self, preview: PreviewId) -> usize {
        let owned: Vec<ElementId> = self
            .bindings
            .iter()
            .filter(|e| e.value().preview() == Some(preview))
            .map(|e| *e.key())
            .collect();

        for element in &owned {
            self.untag(*element);
        }

        if !owned.is_empty() {
            tracing::debug!(%preview, released = owned.len(), "preview scope released");
        }
        owned.len()
    }

    /// Number of tagged elements
    #[inline]
    #[must_use]
    pub fn tagged_count(&self) -> usize {
        self.bindings.len()
    }

    fn admits(binding: &ScopeBinding, event: &ThemeEvent) -> Result<(), SkipReason> {
        if !should_apply_theme(event.scope, binding.tag()) {
            return Err(SkipReason::ScopeMismatch);
        }
        match (event.instance, binding.preview()) {
            (Some(wanted), Some(actual)) if wanted != actual => Err(SkipReason::OtherInstance),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ScopeTag, ThemeMode};
    use pretty_assertions::assert_eq;

    fn dark() -> ThemePayload {
        ThemePayload::new(ThemeMode::Dark).with_var("--primary", "0 0% 100%")
    }

    fn light() -> ThemePayload {
        ThemePayload::new(ThemeMode::Light).with_var("--primary", "222 47% 11%")
    }

    #[test]
    fn tag_once_and_idempotent() {
        let ctl = ScopeController::new();
        let el = ElementId::next();
        let preview = PreviewId::new();

        ctl.tag_scope(el, ScopeBinding::Storefront(preview)).unwrap();
        ctl.tag_scope(el, ScopeBinding::Storefront(preview)).unwrap();

        let err = ctl.tag_scope(el, ScopeBinding::Builder).unwrap_err();
        assert!(matches!(err, ScopeError::AlreadyTagged { .. }));
        assert_eq!(ctl.owner(el), Some(ScopeBinding::Storefront(preview)));
    }

    #[test]
    fn storefront_event_never_repaints_builder() {
        let ctl = ScopeController::new();
        let chrome = ElementId::next();
        let preview_root = ElementId::next();
        ctl.tag_scope(chrome, ScopeBinding::Builder).unwrap();
        ctl.tag_scope(preview_root, ScopeBinding::Storefront(PreviewId::new()))
            .unwrap();

        ctl.dispatch(&ThemeEvent::builder(light()));
        let report = ctl.dispatch(&ThemeEvent::storefront(dark()));

        assert_eq!(report.applied, vec![preview_root]);
        assert_eq!(ctl.theme_of(chrome), Some(light()));
        assert_eq!(ctl.theme_of(preview_root), Some(dark()));
    }

    #[test]
    fn untagged_elements_are_never_mutated() {
        let ctl = ScopeController::new();
        let stray = ElementId::next();
        assert_eq!(
            ctl.apply_theme(stray, &ThemeEvent::builder(light())),
            ThemeApplication::Skipped(SkipReason::Untagged)
        );
        assert!(ctl.theme_of(stray).is_none());
    }

    #[test]
    fn last_event_wins_per_scope() {
        let ctl = ScopeController::new();
        let chrome = ElementId::next();
        ctl.tag_scope(chrome, ScopeBinding::Builder).unwrap();

        ctl.dispatch(&ThemeEvent::builder(light()));
        ctl.dispatch(&ThemeEvent::builder(dark()));
        assert_eq!(ctl.theme_of(chrome), Some(dark()));
    }

    #[test]
    fn instance_narrowing() {
        let ctl = ScopeController::new();
        let (a, b) = (PreviewId::new(), PreviewId::new());
        let (el_a, el_b) = (ElementId::next(), ElementId::next());
        ctl.tag_scope(el_a, ScopeBinding::Storefront(a)).unwrap();
        ctl.tag_scope(el_b, ScopeBinding::Storefront(b)).unwrap();

        let report = ctl.dispatch(&ThemeEvent::for_preview(a, dark()));
        assert_eq!(report.applied, vec![el_a]);
        assert_eq!(
            ctl.apply_theme(el_b, &ThemeEvent::for_preview(a, dark())),
            ThemeApplication::Skipped(SkipReason::OtherInstance)
        );
    }

    #[test]
    fn release_preview_drops_only_its_elements() {
        let ctl = ScopeController::new();
        let preview = PreviewId::new();
        let chrome = ElementId::next();
        let root = ElementId::next();
        ctl.tag_scope(chrome, ScopeBinding::Builder).unwrap();
        ctl.tag_scope(root, ScopeBinding::Storefront(preview)).unwrap();
        ctl.dispatch(&ThemeEvent::storefront(dark()));

        assert_eq!(ctl.release_preview(preview), 1);
        assert!(ctl.owner(root).is_none());
        assert!(ctl.theme_of(root).is_none());
        assert_eq!(ctl.owner(chrome), Some(ScopeBinding::Builder));
        assert_eq!(ctl.tagged_count(), 1);
    }

    #[test]
    fn target_of_uses_owner() {
        let ctl = ScopeController::new();
        let chrome = ElementId::next();
        ctl.tag_scope(chrome, ScopeBinding::Builder).unwrap();
        assert_eq!(ctl.target_of(chrome), Some(ScopeSelector::Root));
        assert_eq!(ScopeBinding::Builder.tag(), ScopeTag::Builder);
    }
}
