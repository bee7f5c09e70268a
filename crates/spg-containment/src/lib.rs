//! SPG Containment - Fault Containment Boundary
//!
//! A small supervisor around any subtree that may fault:
//! - `Stable` until the first fault
//! - one deferred re-render after a fixed delay (`Retrying`)
//! - `Terminal` on any further fault, rendering a manual-reload surface
//!
//! The transition logic lives in [`BoundaryMachine`] and is usable without a
//! runtime; [`FaultBoundary`] adds the cancellable Tokio timer, state
//! observation and recovery hooks. It must be created inside a runtime.
//!
//! # Example
//!
//! ```rust
//! use spg_containment::{BoundaryConfig, ContainmentState, FaultBoundary, PreviewFault};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), spg_containment::ContainmentError> {
//! let boundary = FaultBoundary::new(BoundaryConfig::default())?;
//! let rendered: Option<()> = boundary.contain(|| Err(PreviewFault::runtime("render failed")));
//! assert!(rendered.is_none());
//! assert_eq!(boundary.state(), ContainmentState::Retrying);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod boundary;
mod error;
mod fault;
mod machine;

pub use boundary::{
    catch_fault, BoundaryConfig, BoundarySnapshot, FaultBoundary, FaultCallback, RecoveryCallback,
    RecoverySurface, DEFAULT_RETRY_DELAY, MANUAL_RELOAD_MESSAGE,
};
pub use error::ContainmentError;
pub use fault::{FaultOrigin, PreviewFault};
pub use machine::{
    allowed_transitions, validate_transition, BoundaryMachine, ContainmentState, FaultOutcome,
    TransitionError,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
