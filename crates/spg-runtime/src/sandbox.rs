//! Isolated execution contexts
//!
//! A [`Sandbox`] owns everything a mounted preview allocates. The runtime
//! creates a fresh one per mount through a [`SandboxFactory`] and always
//! tears the previous one down first.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use spg_containment::PreviewFault;
use spg_overlay::{MergedFileSet, ModulePath};
use spg_scope::PreviewId;
use std::collections::{BTreeSet, VecDeque};

/// Resources released by one teardown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownReport {
    /// Modules that were loaded
    pub modules: usize,
    /// Pending timers cancelled
    pub timers: usize,
    /// Event listeners removed
    pub listeners: usize,
}

/// One isolated execution context
pub trait Sandbox: Send {
    /// Load a merged bundle
    ///
    /// # Errors
    /// A [`PreviewFault`] for anything that goes wrong while loading; the
    /// runtime routes it to the slot's boundary.
    fn mount(&mut self, files: &MergedFileSet) -> Result<(), PreviewFault>;

    /// Release every resource held by the context
    fn teardown(&mut self) -> TeardownReport;
}

/// Allocates sandboxes
pub trait SandboxFactory: Send + Sync {
    /// Fresh context for a preview instance
    fn create(&self, preview: PreviewId) -> Box<dyn Sandbox>;
}

/// Static and dynamic import specifiers
static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?m)(?:\bimport|\bexport)\s[^'";]*?\bfrom\s*['"]([^'"]+)['"]|\bimport\s*['"]([^'"]+)['"]|\bimport\(\s*['"]([^'"]+)['"]\s*\)"#,
    )
    .expect("import pattern is valid")
});

/// Import specifiers appearing in a module, in source order
#[must_use]
pub fn import_specifiers(source: &str) -> Vec<&str> {
    IMPORT_RE
        .captures_iter(source)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)).or_else(|| c.get(3)))
        .map(|m| m.as_str())
        .collect()
}

/// Turn an import specifier into a bundle path
///
/// Relative specifiers resolve against the importer's directory; `@/` maps
/// to the bundle root. Bare package specifiers return `None`.
#[must_use]
pub fn bundle_specifier(importer: &ModulePath, specifier: &str) -> Option<String> {
    if let Some(rest) = specifier.strip_prefix("@/") {
        return Some(format!("/{rest}"));
    }
    if specifier.starts_with('/') {
        return Some(specifier.to_owned());
    }
    if specifier.starts_with("./") || specifier.starts_with("../") {
        let importer = importer.as_str();
        let dir = &importer[..importer.rfind('/').unwrap_or(0)];
        return Some(format!("{dir}/{specifier}"));
    }
    None
}

/// Sandbox that resolves the import graph without executing anything
///
/// Mount walks every module reachable from the entry and faults on the first
/// import that does not resolve in the merged bundle.
#[derive(Debug)]
pub struct DryRunSandbox {
    preview: PreviewId,
    entry: String,
    loaded: BTreeSet<ModulePath>,
}

impl DryRunSandbox {
    /// Create for a preview and entry module
    #[must_use]
    pub fn new(preview: PreviewId, entry: impl Into<String>) -> Self {
        Self {
            preview,
            entry: entry.into(),
            loaded: BTreeSet::new(),
        }
    }

    /// Modules loaded by the last mount
    pub fn loaded(&self) -> impl Iterator<Item = &ModulePath> {
        self.loaded.iter()
    }
}

impl Sandbox for DryRunSandbox {
    fn mount(&mut self, files: &MergedFileSet) -> Result<(), PreviewFault> {
        self.loaded.clear();
        let (entry, _) = files.resolve(&self.entry).ok_or_else(|| {
            PreviewFault::mount(format!("entry module {} not found", self.entry))
        })?;

        let mut queue = VecDeque::from([entry.clone()]);
        while let Some(path) = queue.pop_front() {
            if !self.loaded.insert(path.clone()) {
                continue;
            }
            let Some(source) = files.content(&path) else {
                continue;
            };
            for specifier in import_specifiers(source) {
                let Some(target) = bundle_specifier(&path, specifier) else {
                    continue;
                };
                let (resolved, _) = files.resolve(&target).ok_or_else(|| {
                    PreviewFault::mount(format!(
                        "{path} imports '{specifier}', which does not resolve"
                    ))
                })?;
                if !self.loaded.contains(resolved) {
                    queue.push_back(resolved.clone());
                }
            }
        }

        tracing::debug!(preview = %self.preview, modules = self.loaded.len(), "dry-run mount");
        Ok(())
    }

    fn teardown(&mut self) -> TeardownReport {
        let modules = self.loaded.len();
        self.loaded.clear();
        TeardownReport {
            modules,
            ..TeardownReport::default()
        }
    }
}

/// Factory for [`DryRunSandbox`]
#[derive(Debug, Clone)]
pub struct DryRunSandboxFactory {
    entry: String,
}

impl DryRunSandboxFactory {
    /// Create with an entry module
    #[inline]
    #[must_use]
    pub fn new(entry: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
        }
    }
}

impl SandboxFactory for DryRunSandboxFactory {
    fn create(&self, preview: PreviewId) -> Box<dyn Sandbox> {
        Box::new(DryRunSandbox::new(preview, self.entry.clone()))
    }
}
