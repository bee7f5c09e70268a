//! Error types for boundary construction

/// Errors raised while creating a [`FaultBoundary`](crate::FaultBoundary)
#[derive(Debug, thiserror::Error)]
pub enum ContainmentError {
    /// No Tokio runtime to own the retry timer
    #[error("fault boundary '{0}' must be created inside a Tokio runtime")]
    NoRuntime(String),
}
