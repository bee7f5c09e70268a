//! Virtual files and generated file sets

use crate::path::{ModulePath, PathError};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Immutable overlay entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFile {
    /// Normalized path
    pub path: ModulePath,
    /// Module source
    pub content: Cow<'static, str>,
}

impl VirtualFile {
    /// Create a virtual file
    #[inline]
    #[must_use]
    pub fn new(path: ModulePath, content: impl Into<Cow<'static, str>>) -> Self {
        Self {
            path,
            content: content.into(),
        }
    }
}

/// Files returned by the generator for one request
///
/// Keys are normalized on insertion, so two raw paths that alias the same
/// module collapse into one entry (last one wins).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeneratedFileSet {
    files: BTreeMap<ModulePath, String>,
}

impl GeneratedFileSet {
    /// Create empty set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw generator output
    ///
    /// # Errors
    /// Returns the first path that fails normalization
    pub fn from_raw<I, K, V>(raw: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut set = Self::new();
        for (path, content) in raw {
            set.insert(path.as_ref().parse()?, content);
        }
        Ok(set)
    }

    /// Insert or replace a file
    #[inline]
    pub fn insert(&mut self, path: ModulePath, content: impl Into<String>) -> Option<String> {
        self.files.insert(path, content.into())
    }

    /// Content at path
    #[inline]
    #[must_use]
    pub fn get(&self, path: &ModulePath) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    /// Check if path is defined
    #[inline]
    #[must_use]
    pub fn contains(&self, path: &ModulePath) -> bool {
        self.files.contains_key(path)
    }

    /// Iterate in path order
    pub fn iter(&self) -> impl Iterator<Item = (&ModulePath, &str)> {
        self.files.iter().map(|(p, c)| (p, c.as_str()))
    }

    /// Number of files
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

impl FromIterator<(ModulePath, String)> for GeneratedFileSet {
    fn from_iter<T: IntoIterator<Item = (ModulePath, String)>>(iter: T) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}
