//! SPG Overlay - Virtual Module Overlay
//!
//! Supplies inert, non-overridable mocks for platform-coupled import paths
//! and merges them with generator output.
//!
//! # Core Concepts
//!
//! - [`ModulePath`]: normalized import path, immune to aliasing
//! - [`Overlay`]: read-only table of virtual modules, built once at startup
//! - [`ProtectedPathSet`]: paths the generator can never shadow
//! - [`merge`]: total merge with protected-path precedence
//!
//! # Example
//!
//! ```rust
//! use spg_overlay::{merge, GeneratedFileSet, Overlay, CHECKOUT_HOOK_PATH};
//!
//! let overlay = Overlay::builtin().unwrap();
//! let generated = GeneratedFileSet::from_raw([
//!     (CHECKOUT_HOOK_PATH, "export const useSellsPayCheckout = realCheckout;"),
//! ])
//! .unwrap();
//!
//! let outcome = merge(&generated, &overlay);
//! let path = CHECKOUT_HOOK_PATH.parse().unwrap();
//! assert_eq!(
//!     outcome.files.content(&path),
//!     overlay.resolve(&path).map(|f| f.content.as_ref()),
//! );
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod builtin;
mod error;
mod file;
mod hash;
mod merge;
mod overlay;
mod path;

pub use builtin::{
    CART_HOOK_PATH, CHECKOUT_HOOK_PATH, FORMAT_PATH, REQUIRED_PROTECTED_PATHS, STYLE_UTILS_PATH,
    TOAST_HOOK_PATH,
};
pub use error::OverlayError;
pub use file::{GeneratedFileSet, VirtualFile};
pub use hash::FileSetHash;
pub use merge::{merge, MergeOutcome, MergedEntry, MergedFileSet, Provenance};
pub use overlay::{Overlay, OverlayBuilder, OverlayConfig, ProtectedPathSet, VirtualFileConfig};
pub use path::{ModulePath, PathError, RESOLVABLE_EXTENSIONS};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
