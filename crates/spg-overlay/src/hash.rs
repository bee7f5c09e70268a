//! File set fingerprints
//!
//! Provides [`FileSetHash`], a Blake3 digest over a whole file set used to
//! correlate log lines with the bundle that was mounted.

use std::fmt::{self, Display, Formatter};

/// A 32-byte Blake3 digest of a file set
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileSetHash([u8; 32]);

impl FileSetHash {
    /// Hash `(path, content)` pairs; callers pass them in path order
    #[must_use]
    pub fn compute<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut hasher = blake3::Hasher::new();
        for (path, content) in entries {
            hasher.update(path.as_bytes());
            hasher.update(&[0]);
            hasher.update(&(content.len() as u64).to_le_bytes());
            hasher.update(content.as_bytes());
        }
        Self(*hasher.finalize().as_bytes())
    }

    /// Raw bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short representation (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for FileSetHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = FileSetHash::compute([("/a.ts", "x"), ("/b.ts", "y")]);
        let b = FileSetHash::compute([("/a.ts", "x"), ("/b.ts", "y")]);
        assert_eq!(a, b);
        assert_eq!(a.short().len(), 16);
        assert_eq!(a.to_string().len(), 64);
    }

    #[test]
    fn boundaries_are_unambiguous() {
        let a = FileSetHash::compute([("/a.ts", "bc")]);
        let b = FileSetHash::compute([("/a.tsb", "c")]);
        assert_ne!(a, b);
    }
}
