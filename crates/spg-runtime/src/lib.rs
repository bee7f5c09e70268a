//! SPG Runtime - Preview Runtime
//!
//! Orchestrates the safety boundary around generated storefront code:
//! - [`spg_moderation`] screens the prompt
//! - a [`Generator`] produces source files
//! - [`spg_overlay`] substitutes protected modules
//! - a [`Sandbox`] mounts the bundle under a fresh storefront scope
//! - [`spg_containment`] absorbs faults raised inside it
//!
//! # Example
//!
//! ```rust,no_run
//! use spg_runtime::{DryRunSandboxFactory, FileSetGenerator, PreviewConfig, PreviewRuntime};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PreviewConfig::default();
//! let runtime = PreviewRuntime::builder(
//!     config.clone(),
//!     Arc::new(FileSetGenerator::default()),
//!     Arc::new(DryRunSandboxFactory::new(config.entry_module)),
//! )
//! .build()?;
//!
//! let handle = runtime.mount("a minimalist candle shop").await?;
//! runtime.unmount(handle)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod generator;
pub mod runtime;
pub mod sandbox;

pub use config::{ConfigError, PreviewConfig, DEFAULT_ENTRY_MODULE, GENERATOR_ENDPOINT_ENV};
pub use error::{GenerationError, PreviewError, StartupError};
pub use generator::{
    FileSetGenerator, GenerationRequest, GenerationResponse, Generator, HttpGenerator,
};
pub use runtime::{PreviewHandle, PreviewRuntime, PreviewRuntimeBuilder, RequestId};
pub use sandbox::{
    bundle_specifier, import_specifiers, DryRunSandbox, DryRunSandboxFactory, Sandbox,
    SandboxFactory, TeardownReport,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
