/*!
 * Error types for the doctrans pipeline.
 *
 * This module contains custom error types for different parts of the pipeline,
 * using the thiserror crate for ergonomic error definitions. The split mirrors
 * the failure taxonomy the orchestrator acts on: input errors are fatal,
 * transient provider errors are retried, auth and consistency errors fail the
 * job immediately.
 */

use std::time::Duration;

use thiserror::Error;

/// Errors raised while parsing a document into translation units
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The bytes are not a parseable paginated document
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// The document parsed but contains no extractable text
    #[error("document contains no translatable content")]
    NoTranslatableContent,
}

/// Errors returned by translation backends
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// The provider throttled the request; may carry a retry-after hint
    #[error("rate limited by provider{}", retry_after.map(|d| format!(" (retry after {}s)", d.as_secs())).unwrap_or_default())]
    RateLimited {
        /// Provider-supplied hint for when to retry
        retry_after: Option<Duration>,
    },

    /// Credentials were rejected; retrying cannot help
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    /// The provider could not be reached or returned a server error
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The provider answered but the response could not be aligned with the request
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Whether the orchestrator's backoff policy may retry this error.
    ///
    /// `MalformedResponse` is retryable but the orchestrator caps it at a
    /// single extra attempt; `AuthRejected` is never retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::AuthRejected(_))
    }

    /// Provider-supplied retry-after hint, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Stable label used when recording the failure on a job record
    pub fn label(&self) -> &'static str {
        match self {
            ProviderError::RateLimited { .. } => "rate_limited",
            ProviderError::AuthRejected(_) => "auth_rejected",
            ProviderError::Unavailable(_) => "provider_unavailable",
            ProviderError::MalformedResponse(_) => "malformed_response",
        }
    }
}

/// Errors raised while merging translated units back into a document
#[derive(Error, Debug)]
pub enum ReassembleError {
    /// The translated unit count does not match the extracted count.
    /// Indicates an upstream contract violation, never retried.
    #[error("translated unit count {actual} does not match extracted count {expected}")]
    UnitCountMismatch {
        /// Number of units produced by extraction
        expected: usize,
        /// Number of translated units supplied
        actual: usize,
    },
}

/// Top-level error type wrapping all pipeline failures
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from document extraction
    #[error("extract error: {0}")]
    Extract(#[from] ExtractError),

    /// Error from a translation backend
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from document reassembly
    #[error("reassembly error: {0}")]
    Reassemble(#[from] ReassembleError),

    /// Error from the artifact store
    #[error("storage error: {0}")]
    Storage(String),

    /// Error from the job record store or queue
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The job was cancelled at a checkpoint
    #[error("job cancelled")]
    Cancelled,

    /// Any other error
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::Storage(error.to_string())
    }
}
