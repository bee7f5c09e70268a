//! The virtual module overlay
//!
//! A read-only lookup table built once at startup. Protected membership is
//! fixed by code and configuration; generated content has no say in it.

use crate::builtin::{
    CART_HOOK_MOCK, CART_HOOK_PATH, CHECKOUT_HOOK_MOCK, CHECKOUT_HOOK_PATH, FORMAT_MOCK,
    FORMAT_PATH, REQUIRED_PROTECTED_PATHS, STYLE_UTILS_MOCK, STYLE_UTILS_PATH, TOAST_HOOK_MOCK,
    TOAST_HOOK_PATH,
};
use crate::error::OverlayError;
use crate::file::VirtualFile;
use crate::path::ModulePath;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

/// Paths generated content can never shadow
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectedPathSet {
    paths: BTreeSet<ModulePath>,
    specifiers: BTreeSet<String>,
}

impl ProtectedPathSet {
    fn insert(&mut self, path: ModulePath) {
        self.specifiers.insert(path.module_specifier());
        self.paths.insert(path);
    }

    /// Exact membership
    #[inline]
    #[must_use]
    pub fn contains(&self, path: &ModulePath) -> bool {
        self.paths.contains(path)
    }

    /// Whether `path` would answer to the same import as a protected path
    ///
    /// True for the protected path itself and for aliases such as a `.tsx`
    /// sibling or an `/index` file under the same specifier.
    #[inline]
    #[must_use]
    pub fn shadows(&self, path: &ModulePath) -> bool {
        self.paths.contains(path) || self.specifiers.contains(&path.module_specifier())
    }

    /// Iterate in path order
    pub fn iter(&self) -> impl Iterator<Item = &ModulePath> {
        self.paths.iter()
    }

    /// Number of protected paths
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Read-only table of virtual modules
#[derive(Debug, Clone)]
pub struct Overlay {
    files: BTreeMap<ModulePath, VirtualFile>,
    protected: ProtectedPathSet,
}

impl Overlay {
    /// Built-in overlay
    ///
    /// # Errors
    /// Returns error if the built-in table is inconsistent
    pub fn builtin() -> Result<Self, OverlayError> {
        OverlayBuilder::with_builtin()?.build()
    }

    /// Built-in overlay extended by configuration
    ///
    /// # Errors
    /// Returns error on malformed paths or a protected path without content
    pub fn from_config(config: &OverlayConfig) -> Result<Self, OverlayError> {
        let mut builder = OverlayBuilder::with_builtin()?;
        for file in &config.protected {
            builder = builder.protected(&file.path, file.content.clone())?;
        }
        for file in &config.fallback {
            builder = builder.fallback(&file.path, file.content.clone())?;
        }
        builder.build()
    }

    /// Resolve a path to its virtual file
    #[inline]
    #[must_use]
    pub fn resolve(&self, path: &ModulePath) -> Option<&VirtualFile> {
        self.files.get(path)
    }

    /// Resolve a raw path string; unparseable paths resolve to nothing
    #[must_use]
    pub fn resolve_str(&self, path: &str) -> Option<&VirtualFile> {
        path.parse::<ModulePath>().ok().and_then(|p| self.files.get(&p))
    }

    /// Check if path is protected
    #[inline]
    #[must_use]
    pub fn is_protected(&self, path: &ModulePath) -> bool {
        self.protected.contains(path)
    }

    /// The protected set
    #[inline]
    #[must_use]
    pub fn protected(&self) -> &ProtectedPathSet {
        &self.protected
    }

    /// Iterate all entries in path order
    pub fn files(&self) -> impl Iterator<Item = &VirtualFile> {
        self.files.values()
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Builder for [`Overlay`]
///
/// A path stays protected once marked, even if a later call registers it as
/// a fallback.
#[derive(Debug, Default)]
pub struct OverlayBuilder {
    files: BTreeMap<ModulePath, VirtualFile>,
    protected: BTreeSet<ModulePath>,
}

impl OverlayBuilder {
    /// Empty builder
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder preloaded with the built-in entries
    ///
    /// # Errors
    /// Returns error if a built-in path fails to parse
    pub fn with_builtin() -> Result<Self, OverlayError> {
        Self::new()
            .protected(CHECKOUT_HOOK_PATH, CHECKOUT_HOOK_MOCK)?
            .protected(STYLE_UTILS_PATH, STYLE_UTILS_MOCK)?
            .fallback(TOAST_HOOK_PATH, TOAST_HOOK_MOCK)?
            .fallback(FORMAT_PATH, FORMAT_MOCK)?
            .fallback(CART_HOOK_PATH, CART_HOOK_MOCK)
    }

    /// Add a protected entry
    ///
    /// # Errors
    /// Returns error if the path is malformed
    pub fn protected(
        mut self,
        path: &str,
        content: impl Into<Cow<'static, str>>,
    ) -> Result<Self, OverlayError> {
        let path: ModulePath = path.parse()?;
        self.protected.insert(path.clone());
        self.files.insert(path.clone(), VirtualFile::new(path, content));
        Ok(self)
    }

    /// Add a fallback entry
    ///
    /// # Errors
    /// Returns error if the path is malformed
    pub fn fallback(
        mut self,
        path: &str,
        content: impl Into<Cow<'static, str>>,
    ) -> Result<Self, OverlayError> {
        let path: ModulePath = path.parse()?;
        self.files.insert(path.clone(), VirtualFile::new(path, content));
        Ok(self)
    }

    /// Mark a path protected without providing content
    ///
    /// # Errors
    /// Returns error if the path is malformed
    pub fn protect_path(mut self, path: &str) -> Result<Self, OverlayError> {
        self.protected.insert(path.parse()?);
        Ok(self)
    }

    /// Validate and freeze
    ///
    /// # Errors
    /// - [`OverlayError::RequiredPathUnprotected`] if the payment trigger or
    ///   style utility is not protected
    /// - [`OverlayError::MissingProtectedEntry`] if a protected path has no
    ///   content
    pub fn build(self) -> Result<Overlay, OverlayError> {
        for required in REQUIRED_PROTECTED_PATHS {
            let path: ModulePath = required.parse()?;
            if !self.protected.contains(&path) {
                return Err(OverlayError::RequiredPathUnprotected((*required).to_string()));
            }
        }

        let mut protected = ProtectedPathSet::default();
        for path in self.protected {
            if !self.files.contains_key(&path) {
                return Err(OverlayError::MissingProtectedEntry(path));
            }
            protected.insert(path);
        }

        tracing::debug!(
            files = self.files.len(),
            protected = protected.len(),
            "overlay built"
        );

        Ok(Overlay {
            files: self.files,
            protected,
        })
    }
}

/// Serializable virtual file declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualFileConfig {
    /// Import path
    pub path: String,
    /// Module source
    pub content: String,
}

/// Overlay configuration section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Extra protected entries
    pub protected: Vec<VirtualFileConfig>,
    /// Extra fallback entries
    pub fallback: Vec<VirtualFileConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_protects_required_paths() {
        let overlay = Overlay::builtin().unwrap();
        for required in REQUIRED_PROTECTED_PATHS {
            let path: ModulePath = required.parse().unwrap();
            assert!(overlay.is_protected(&path));
            assert!(overlay.resolve(&path).is_some());
        }
        assert!(!overlay.is_protected(&CART_HOOK_PATH.parse().unwrap()));
    }

    #[test]
    fn resolve_str_normalizes() {
        let overlay = Overlay::builtin().unwrap();
        assert!(overlay.resolve_str("lib/utils.ts").is_some());
        assert!(overlay.resolve_str("/nope.ts").is_none());
        assert!(overlay.resolve_str("../x").is_none());
    }

    #[test]
    fn missing_protected_entry_fails_build() {
        let err = OverlayBuilder::with_builtin()
            .unwrap()
            .protect_path("/lib/supabase.ts")
            .unwrap()
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            OverlayError::MissingProtectedEntry("/lib/supabase.ts".parse().unwrap())
        );
    }

    #[test]
    fn required_paths_must_be_protected() {
        let err = OverlayBuilder::new()
            .fallback(CHECKOUT_HOOK_PATH, "x")
            .unwrap()
            .protected(STYLE_UTILS_PATH, "y")
            .unwrap()
            .build()
            .unwrap_err();
        assert!(matches!(err, OverlayError::RequiredPathUnprotected(p) if p == CHECKOUT_HOOK_PATH));
    }

    #[test]
    fn protection_is_sticky() {
        let overlay = OverlayBuilder::with_builtin()
            .unwrap()
            .fallback(CHECKOUT_HOOK_PATH, "replaced")
            .unwrap()
            .build()
            .unwrap();
        assert!(overlay.is_protected(&CHECKOUT_HOOK_PATH.parse().unwrap()));
    }

    #[test]
    fn config_adds_protected_entry() {
        let config = OverlayConfig {
            protected: vec![VirtualFileConfig {
                path: "lib/supabase.ts".to_string(),
                content: "export const supabase = null;".to_string(),
            }],
            fallback: Vec::new(),
        };
        let overlay = Overlay::from_config(&config).unwrap();
        assert!(overlay.is_protected(&"/lib/supabase.ts".parse().unwrap()));
        assert_eq!(overlay.protected().len(), 3);
    }

    #[test]
    fn shadows_detects_aliases() {
        let overlay = Overlay::builtin().unwrap();
        let protected = overlay.protected();
        assert!(protected.shadows(&"/hooks/useSellsPayCheckout.tsx".parse().unwrap()));
        assert!(protected.shadows(&"/hooks/useSellsPayCheckout/index.js".parse().unwrap()));
        assert!(protected.shadows(&"/lib/utils.js".parse().unwrap()));
        assert!(!protected.shadows(&"/lib/utils2.ts".parse().unwrap()));
    }
}
