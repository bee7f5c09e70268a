//! Error types for overlay construction

use crate::path::{ModulePath, PathError};

/// Overlay configuration defects
///
/// All of these are raised while the overlay is built at startup; a running
/// overlay never fails per request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OverlayError {
    /// Malformed path in overlay declaration
    #[error("invalid overlay path: {0}")]
    InvalidPath(#[from] PathError),

    /// A protected path has no virtual file behind it
    #[error("protected path has no overlay entry: {0}")]
    MissingProtectedEntry(ModulePath),

    /// A platform-sensitive path is not in the protected set
    #[error("required path is not protected: {0}")]
    RequiredPathUnprotected(String),
}
