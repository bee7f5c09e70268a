//! Merging generated output with the overlay
//!
//! Per-key rules:
//! - protected path: overlay, unconditionally
//! - generated alias of a protected specifier: dropped, reported as shadowed
//! - otherwise generated if present, else overlay fallback

use crate::file::GeneratedFileSet;
use crate::hash::FileSetHash;
use crate::overlay::Overlay;
use crate::path::{ModulePath, RESOLVABLE_EXTENSIONS};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

/// Where a merged entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Generator output
    Generated,
    /// Protected overlay entry
    OverlayProtected,
    /// Overlay filled a gap the generator left
    OverlayFallback,
}

/// One file of the merged bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedEntry {
    /// Module source
    pub content: Cow<'static, str>,
    /// Origin
    pub provenance: Provenance,
}

/// Generator output ∪ overlay, with protected precedence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MergedFileSet {
    entries: BTreeMap<ModulePath, MergedEntry>,
}

impl MergedFileSet {
    /// Entry at exact path
    #[inline]
    #[must_use]
    pub fn get(&self, path: &ModulePath) -> Option<&MergedEntry> {
        self.entries.get(path)
    }

    /// Content at exact path
    #[inline]
    #[must_use]
    pub fn content(&self, path: &ModulePath) -> Option<&str> {
        self.entries.get(path).map(|e| e.content.as_ref())
    }

    /// Resolve an import specifier the way the preview bundler does
    ///
    /// Tries the exact path, then each resolvable extension, then
    /// `/index` with each extension.
    #[must_use]
    pub fn resolve(&self, specifier: &str) -> Option<(&ModulePath, &MergedEntry)> {
        let base: ModulePath = specifier.parse().ok()?;
        if let Some(found) = self.entries.get_key_value(&base) {
            return Some(found);
        }

        RESOLVABLE_EXTENSIONS
            .iter()
            .map(|ext| format!("{base}.{ext}"))
            .chain(
                RESOLVABLE_EXTENSIONS
                    .iter()
                    .map(|ext| format!("{base}/index.{ext}")),
            )
            .filter_map(|candidate| candidate.parse::<ModulePath>().ok())
            .find_map(|candidate| self.entries.get_key_value(&candidate))
    }

    /// Iterate in path order
    pub fn iter(&self) -> impl Iterator<Item = (&ModulePath, &MergedEntry)> {
        self.entries.iter()
    }

    /// Paths with a given provenance
    pub fn paths_with(&self, provenance: Provenance) -> impl Iterator<Item = &ModulePath> {
        self.entries
            .iter()
            .filter(move |(_, e)| e.provenance == provenance)
            .map(|(p, _)| p)
    }

    /// Number of files
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Digest of paths and contents
    #[must_use]
    pub fn fingerprint(&self) -> FileSetHash {
        FileSetHash::compute(
            self.entries
                .iter()
                .map(|(p, e)| (p.as_str(), e.content.as_ref())),
        )
    }
}

/// Merge result plus what the generator tried to override
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The merged bundle
    pub files: MergedFileSet,
    /// Generated paths discarded because they shadow a protected module
    pub shadowed: Vec<ModulePath>,
}

/// Merge a generated file set with the overlay
///
/// Total and deterministic: every generated and overlay path is decided
/// independently of the others, except that a fallback is skipped when the
/// generator already answers to the same import specifier.
#[must_use]
pub fn merge(generated: &GeneratedFileSet, overlay: &Overlay) -> MergeOutcome {
    let protected = overlay.protected();
    let mut entries = BTreeMap::new();
    let mut shadowed = Vec::new();
    let mut generated_specifiers = BTreeSet::new();

    for (path, content) in generated.iter() {
        if protected.shadows(path) {
            shadowed.push(path.clone());
            continue;
        }
        generated_specifiers.insert(path.module_specifier());
        entries.insert(
            path.clone(),
            MergedEntry {
                content: Cow::Owned(content.to_string()),
                provenance: Provenance::Generated,
            },
        );
    }

    for file in overlay.files() {
        if protected.contains(&file.path) {
            entries.insert(
                file.path.clone(),
                MergedEntry {
                    content: file.content.clone(),
                    provenance: Provenance::OverlayProtected,
                },
            );
        } else if !generated_specifiers.contains(&file.path.module_specifier()) {
            entries.insert(
                file.path.clone(),
                MergedEntry {
                    content: file.content.clone(),
                    provenance: Provenance::OverlayFallback,
                },
            );
        }
    }

    for path in &shadowed {
        tracing::warn!(path = %path, "generated file shadows a protected module; using overlay");
    }

    let files = MergedFileSet { entries };
    tracing::debug!(
        files = files.len(),
        shadowed = shadowed.len(),
        fingerprint = %files.fingerprint().short(),
        "merged generated files with overlay"
    );

    MergeOutcome { files, shadowed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{CART_HOOK_PATH, CHECKOUT_HOOK_MOCK, CHECKOUT_HOOK_PATH};
    use pretty_assertions::assert_eq;

    fn p(s: &str) -> ModulePath {
        s.parse().unwrap()
    }

    #[test]
    fn generated_wins_for_fallback() {
        let overlay = Overlay::builtin().unwrap();
        let generated = GeneratedFileSet::from_raw([(CART_HOOK_PATH, "custom cart")]).unwrap();

        let outcome = merge(&generated, &overlay);
        let entry = outcome.files.get(&p(CART_HOOK_PATH)).unwrap();
        assert_eq!(entry.content, "custom cart");
        assert_eq!(entry.provenance, Provenance::Generated);
        assert!(outcome.shadowed.is_empty());
    }

    #[test]
    fn fallback_fills_gap() {
        let overlay = Overlay::builtin().unwrap();
        let outcome = merge(&GeneratedFileSet::new(), &overlay);
        assert_eq!(outcome.files.len(), overlay.len());
        assert_eq!(
            outcome.files.get(&p(CART_HOOK_PATH)).unwrap().provenance,
            Provenance::OverlayFallback
        );
    }

    #[test]
    fn protected_alias_is_dropped() {
        let overlay = Overlay::builtin().unwrap();
        let generated = GeneratedFileSet::from_raw([
            ("/hooks/useSellsPayCheckout.tsx", "real checkout"),
            ("/App.tsx", "app"),
        ])
        .unwrap();

        let outcome = merge(&generated, &overlay);
        assert_eq!(outcome.shadowed, vec![p("/hooks/useSellsPayCheckout.tsx")]);
        assert!(outcome.files.get(&p("/hooks/useSellsPayCheckout.tsx")).is_none());

        let (path, entry) = outcome.files.resolve("/hooks/useSellsPayCheckout").unwrap();
        assert_eq!(path.as_str(), CHECKOUT_HOOK_PATH);
        assert_eq!(entry.content, CHECKOUT_HOOK_MOCK);
    }

    #[test]
    fn generated_tsx_suppresses_ts_fallback() {
        let overlay = Overlay::builtin().unwrap();
        let generated = GeneratedFileSet::from_raw([("/hooks/useCart.tsx", "tsx cart")]).unwrap();

        let outcome = merge(&generated, &overlay);
        assert!(outcome.files.get(&p(CART_HOOK_PATH)).is_none());
        let (_, entry) = outcome.files.resolve("/hooks/useCart").unwrap();
        assert_eq!(entry.content, "tsx cart");
    }

    #[test]
    fn resolve_tries_index_files() {
        let overlay = Overlay::builtin().unwrap();
        let generated =
            GeneratedFileSet::from_raw([("/components/Hero/index.tsx", "hero")]).unwrap();
        let outcome = merge(&generated, &overlay);
        assert!(outcome.files.resolve("./components/Hero").is_some());
        assert!(outcome.files.resolve("/components/Missing").is_none());
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let overlay = Overlay::builtin().unwrap();
        let a = merge(
            &GeneratedFileSet::from_raw([("/App.tsx", "a")]).unwrap(),
            &overlay,
        );
        let b = merge(
            &GeneratedFileSet::from_raw([("/App.tsx", "b")]).unwrap(),
            &overlay,
        );
        assert_ne!(a.files.fingerprint(), b.files.fingerprint());
    }
}
