//! Runtime configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file is valid.
//! `SPG_GENERATOR_ENDPOINT` overrides the generator endpoint.

use serde::{Deserialize, Serialize};
use spg_moderation::ModerationConfig;
use spg_overlay::OverlayConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding [`PreviewConfig::generator_endpoint`]
pub const GENERATOR_ENDPOINT_ENV: &str = "SPG_GENERATOR_ENDPOINT";

/// Default entry module of a generated storefront
pub const DEFAULT_ENTRY_MODULE: &str = "/App.tsx";

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for this schema
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parse but make no sense
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Preview runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Delay before the single auto-recovery re-render
    pub retry_delay_ms: u64,
    /// Upper bound on one generator call
    pub generation_timeout_secs: u64,
    /// HTTP generator endpoint
    pub generator_endpoint: Option<String>,
    /// Module the sandbox starts from
    pub entry_module: String,
    /// Safety gate catalog
    pub moderation: ModerationConfig,
    /// Extra overlay entries
    pub overlay: OverlayConfig,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 500,
            generation_timeout_secs: 60,
            generator_endpoint: None,
            entry_module: DEFAULT_ENTRY_MODULE.to_owned(),
            moderation: ModerationConfig::default(),
            overlay: OverlayConfig::default(),
        }
    }
}

impl PreviewConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With retry delay
    #[inline]
    #[must_use]
    pub fn with_retry_delay_ms(mut self, ms: u64) -> Self {
        self.retry_delay_ms = ms;
        self
    }

    /// With generation timeout
    #[inline]
    #[must_use]
    pub fn with_generation_timeout_secs(mut self, secs: u64) -> Self {
        self.generation_timeout_secs = secs;
        self
    }

    /// With generator endpoint
    #[inline]
    #[must_use]
    pub fn with_generator_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.generator_endpoint = Some(endpoint.into());
        self
    }

    /// With entry module
    #[inline]
    #[must_use]
    pub fn with_entry_module(mut self, entry: impl Into<String>) -> Self {
        self.entry_module = entry.into();
        self
    }

    /// Retry delay as a duration
    #[inline]
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Generation timeout as a duration
    #[inline]
    #[must_use]
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    /// Parse TOML text
    ///
    /// # Errors
    /// Returns error on malformed TOML or invalid values
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file and apply environment overrides
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?.with_env_overrides();
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Apply overrides from the process environment
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(endpoint) = lookup(GENERATOR_ENDPOINT_ENV).filter(|v| !v.trim().is_empty()) {
            self.generator_endpoint = Some(endpoint);
        }
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.generation_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "generation_timeout_secs must be positive".to_owned(),
            ));
        }
        if self.entry_module.trim().is_empty() {
            return Err(ConfigError::Invalid("entry_module must not be empty".to_owned()));
        }
        Ok(())
    }
}
