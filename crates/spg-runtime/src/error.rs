//! Error types for the preview runtime
//!
//! Only [`PreviewError`] reaches callers of `mount`. Runtime faults never
//! appear here; they stop at the slot's fault boundary.

use crate::config::ConfigError;
use crate::runtime::{PreviewHandle, RequestId};
use spg_containment::ContainmentError;
use spg_moderation::{CatalogError, ModerationWarning};
use spg_overlay::{OverlayError, PathError};
use spg_scope::ScopeError;
use std::time::Duration;

/// External generator failures
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// No endpoint configured for the HTTP generator
    #[error("no generator endpoint configured")]
    NotConfigured,

    /// Endpoint is not a valid URL
    #[error("invalid generator endpoint: {0}")]
    InvalidEndpoint(String),

    /// Transport failure
    #[error("generator request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status
    #[error("generator returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        body: String,
    },

    /// Response body did not match `{ "files": { path: content } }`
    #[error("invalid generator response: {0}")]
    InvalidResponse(String),

    /// Generator returned a path that cannot be normalized
    #[error("generator returned invalid path: {0}")]
    InvalidPath(#[from] PathError),

    /// Call exceeded the configured timeout
    #[error("generation timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Any other backend failure
    #[error("generator failed: {0}")]
    Backend(String),
}

/// Errors returned by the preview runtime
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    /// Prompt hit a HIGH-severity category
    #[error("prompt blocked ({category}): {message}")]
    ModerationBlocked {
        /// Violated category
        category: String,
        /// User-facing text
        message: String,
    },

    /// Generator error or timeout
    #[error("generation failed: {0}")]
    GenerationBackendFailure(#[from] GenerationError),

    /// A newer request was issued before this one resolved
    #[error("{request} superseded by {latest}")]
    Superseded {
        /// Discarded request
        request: RequestId,
        /// Current request
        latest: RequestId,
    },

    /// Handle is not the active preview
    #[error("unknown or stale preview handle {0}")]
    UnknownHandle(PreviewHandle),

    /// Root element could not be tagged
    #[error("scope error: {0}")]
    Scope(#[from] ScopeError),

    /// Fault boundary could not be created
    #[error(transparent)]
    Containment(#[from] ContainmentError),
}

impl PreviewError {
    /// Blocked-prompt error from a gate warning
    #[must_use]
    pub fn blocked(warning: ModerationWarning) -> Self {
        Self::ModerationBlocked {
            category: warning.category,
            message: warning.message,
        }
    }

    /// Check if the user should edit the prompt
    #[inline]
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::ModerationBlocked { .. })
    }

    /// Check if resubmitting the same prompt may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::GenerationBackendFailure(_))
    }
}

/// Configuration defects that stop the runtime from starting
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// Overlay table inconsistent
    #[error("overlay resolution failure: {0}")]
    Overlay(#[from] OverlayError),

    /// Moderation catalog invalid
    #[error("moderation catalog invalid: {0}")]
    Catalog(#[from] CatalogError),

    /// Config file unusable
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generator could not be constructed
    #[error("generator setup failed: {0}")]
    Generator(#[from] GenerationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use spg_moderation::Severity;

    #[test]
    fn classification() {
        let blocked = PreviewError::blocked(ModerationWarning {
            blocking: true,
            category: "violent_threat".to_owned(),
            severity: Severity::High,
            message: "blocked".to_owned(),
        });
        assert!(blocked.is_blocking());
        assert!(!blocked.is_retryable());
        assert!(blocked.to_string().contains("violent_threat"));

        let failed = PreviewError::from(GenerationError::Timeout(Duration::from_secs(60)));
        assert!(failed.is_retryable());
        assert_eq!(
            failed.to_string(),
            "generation failed: generation timed out after 60s"
        );
    }
}
