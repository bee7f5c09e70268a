//! SPG Moderation - Content Safety Gate
//!
//! Classifies free-text storefront prompts before they reach the code
//! generator:
//! - Any HIGH-severity match blocks the prompt outright
//! - MEDIUM/LOW matches are redacted and the prompt proceeds
//! - Clean prompts pass through verbatim
//!
//! # Example
//!
//! ```rust
//! use spg_moderation::SafetyGate;
//!
//! let gate = SafetyGate::default();
//! let verdict = gate.validate_prompt("make a pirate-themed banner");
//!
//! assert!(verdict.safe);
//! assert_eq!(verdict.sanitized, "make a pirate-themed banner");
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod catalog;
pub mod error;
pub mod gate;
pub mod session;
pub mod types;

pub use catalog::{CategoryConfig, ModerationConfig, TermCatalog, REDACTION_PLACEHOLDER};
pub use error::CatalogError;
pub use gate::{validate_prompt, SafetyGate};
pub use session::ModerationSession;
pub use types::{Flag, ModerationResult, ModerationWarning, PromptVerdict, Severity};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
