//! Module paths for addressing files in a preview bundle
//!
//! Provides [`ModulePath`], the normalized key of every file set.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Extensions the preview bundler resolves for extensionless imports, in
/// resolution order
pub const RESOLVABLE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs"];

/// Normalized absolute import path
///
/// Always begins with `/`; empty and `.` segments are dropped and `..` is
/// resolved lexically, so aliases of the same file compare equal.
///
/// # Examples
/// - `hooks/useCart.ts` → `/hooks/useCart.ts`
/// - `./lib//utils.ts` → `/lib/utils.ts`
/// - `/components/../lib/utils.ts` → `/lib/utils.ts`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModulePath(String);

impl ModulePath {
    /// Path as a string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments without the leading slash
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0[1..].split('/')
    }

    /// Final segment (file name)
    #[inline]
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// Extension of the file name, if any
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        name.rfind('.')
            .filter(|&idx| idx > 0)
            .map(|idx| &name[idx + 1..])
    }

    /// Bare module specifier this file answers to
    ///
    /// Strips a resolvable extension and a trailing `/index`, so
    /// `/hooks/useCart.tsx` and `/hooks/useCart/index.js` both answer to
    /// `/hooks/useCart`.
    #[must_use]
    pub fn module_specifier(&self) -> String {
        let mut stem = self.0.as_str();
        if let Some(ext) = self.extension() {
            if RESOLVABLE_EXTENSIONS.contains(&ext) {
                stem = &stem[..stem.len() - ext.len() - 1];
            }
        }
        match stem.strip_suffix("/index") {
            Some(parent) if !parent.is_empty() => parent.to_string(),
            _ => stem.to_string(),
        }
    }

    /// Check if this path lives under a directory prefix
    #[must_use]
    pub fn starts_with_dir(&self, dir: &ModulePath) -> bool {
        self.0
            .strip_prefix(dir.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl Display for ModulePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ModulePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(ch) = trimmed.chars().find(|c| *c == '\\' || c.is_control()) {
            return Err(PathError::InvalidCharacter {
                path: s.to_string(),
                ch,
            });
        }

        let mut segments: Vec<&str> = Vec::new();
        for seg in trimmed.split('/') {
            match seg {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(PathError::EscapesRoot(s.to_string()));
                    }
                }
                other => segments.push(other),
            }
        }

        if segments.is_empty() {
            return Err(PathError::Empty);
        }

        Ok(Self(format!("/{}", segments.join("/"))))
    }
}

impl TryFrom<String> for ModulePath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<&str> for ModulePath {
    type Error = PathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ModulePath> for String {
    fn from(path: ModulePath) -> Self {
        path.0
    }
}

impl AsRef<str> for ModulePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Path parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// Nothing left after normalization
    #[error("empty module path")]
    Empty,

    /// `..` climbs above the bundle root
    #[error("module path escapes bundle root: '{0}'")]
    EscapesRoot(String),

    /// Backslash or control character
    #[error("invalid character {ch:?} in module path '{path}'")]
    InvalidCharacter { path: String, ch: char },
}
