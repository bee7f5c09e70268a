//! Code generator backends
//!
//! The generator is an opaque collaborator: a sanitized prompt goes in, a
//! file set comes out. Wire format:
//! - request `{ "prompt": "..." }`
//! - response `{ "files": { "<path>": "<content>" } }`

use crate::error::GenerationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use spg_overlay::GeneratedFileSet;
use std::collections::BTreeMap;
use std::time::Duration;

/// Longest error body kept from a failed response
const MAX_ERROR_BODY: usize = 512;

/// One generation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Sanitized prompt
    pub prompt: String,
}

impl GenerationRequest {
    /// Create a request
    #[inline]
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

/// Raw generator response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Path → module source, paths not yet normalized
    pub files: BTreeMap<String, String>,
}

impl GenerationResponse {
    /// Normalize into a file set
    ///
    /// # Errors
    /// [`GenerationError::InvalidPath`] for a path escaping the root or
    /// containing forbidden characters
    pub fn into_file_set(self) -> Result<GeneratedFileSet, GenerationError> {
        Ok(GeneratedFileSet::from_raw(self.files)?)
    }
}

/// Produces source files for a prompt
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a file set
    async fn generate(&self, request: &GenerationRequest)
        -> Result<GeneratedFileSet, GenerationError>;
}

/// JSON-over-HTTP generator
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    client: reqwest::Client,
    endpoint: reqwest::Url,
}

impl HttpGenerator {
    /// Create a generator posting to `endpoint`
    ///
    /// # Errors
    /// Returns error for an unparsable endpoint or client setup failure
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, GenerationError> {
        let endpoint = reqwest::Url::parse(endpoint)
            .map_err(|e| GenerationError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    /// Endpoint in use
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &reqwest::Url {
        &self.endpoint
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedFileSet, GenerationError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|&i| body.is_char_boundary(i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let parsed: GenerationResponse = serde_json::from_slice(&bytes)
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        tracing::debug!(files = parsed.files.len(), endpoint = %self.endpoint, "generator responded");
        parsed.into_file_set()
    }
}

/// Serves a fixed file set for every prompt
#[derive(Debug, Clone, Default)]
pub struct FileSetGenerator {
    files: GeneratedFileSet,
}

impl FileSetGenerator {
    /// Create from a file set
    #[inline]
    #[must_use]
    pub fn new(files: GeneratedFileSet) -> Self {
        Self { files }
    }

    /// Files served
    #[inline]
    #[must_use]
    pub fn files(&self) -> &GeneratedFileSet {
        &self.files
    }

    /// Take the served files
    #[inline]
    #[must_use]
    pub fn into_files(self) -> GeneratedFileSet {
        self.files
    }

    /// Parse `{ "files": { ... } }` or a bare `{ path: content }` object
    ///
    /// # Errors
    /// Returns error for malformed JSON or invalid paths
    pub fn from_json(text: &str) -> Result<Self, GenerationError> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        let files = match value.get("files") {
            Some(files) => files.clone(),
            None => value,
        };
        let raw: BTreeMap<String, String> = serde_json::from_value(files)
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        Ok(Self::new(GeneratedFileSet::from_raw(raw)?))
    }
}

#[async_trait]
impl Generator for FileSetGenerator {
    async fn generate(
        &self,
        _request: &GenerationRequest,
    ) -> Result<GeneratedFileSet, GenerationError> {
        Ok(self.files.clone())
    }
}
