//! Fault payloads

use chrono::{DateTime, Utc};
use std::any::Any;
use std::fmt::{self, Display, Formatter};

/// Where a fault was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultOrigin {
    /// Loading generated modules into the sandbox
    Mount,
    /// Executing generated code after mount
    Runtime,
    /// A panic caught by the boundary
    Panic,
}

impl Display for FaultOrigin {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mount => "mount",
            Self::Runtime => "runtime",
            Self::Panic => "panic",
        })
    }
}

/// Fault raised inside a contained subtree
///
/// Never escalated past the nearest boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{origin} fault: {message}")]
pub struct PreviewFault {
    /// Where it was raised
    pub origin: FaultOrigin,
    /// Diagnostic text
    pub message: String,
    /// When the boundary received it
    pub at: DateTime<Utc>,
}

impl PreviewFault {
    /// Fault with explicit origin
    #[must_use]
    pub fn new(origin: FaultOrigin, message: impl Into<String>) -> Self {
        Self {
            origin,
            message: message.into(),
            at: Utc::now(),
        }
    }

    /// Fault raised while executing generated code
    #[inline]
    #[must_use]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(FaultOrigin::Runtime, message)
    }

    /// Fault raised while mounting
    #[inline]
    #[must_use]
    pub fn mount(message: impl Into<String>) -> Self {
        Self::new(FaultOrigin::Mount, message)
    }

    /// Fault built from a caught panic payload
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Self::new(FaultOrigin::Panic, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_readable() {
        let caught = std::panic::catch_unwind(|| panic!("boom {}", 7)).unwrap_err();
        let fault = PreviewFault::from_panic(caught.as_ref());
        assert_eq!(fault.origin, FaultOrigin::Panic);
        assert_eq!(fault.message, "boom 7");

        let caught = std::panic::catch_unwind(|| std::panic::panic_any(42_u8)).unwrap_err();
        assert_eq!(
            PreviewFault::from_panic(caught.as_ref()).message,
            "non-string panic payload"
        );
    }

    #[test]
    fn display_names_origin() {
        assert_eq!(
            PreviewFault::mount("missing export").to_string(),
            "mount fault: missing export"
        );
    }
}
