//! Error types surfaced at the crate boundary.
//!
//! Each pipeline stage owns one error enum; the orchestrator rewraps stage
//! failures as [`RecapError::StepFailed`] so callers always know which stage
//! broke. Retryability is inferable from the subtype and the embedded HTTP
//! status (see [`FetchError::status`] and [`FetchError::is_rate_limited`]).

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the host API client and the fetch stage.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The host returned a non-success status that was not recovered by the
    /// retry policy.
    #[error("{endpoint} failed with status {status} after {attempts} attempt(s): {message}")]
    Http {
        /// HTTP status code of the final response.
        status: u16,
        /// Request path, e.g. `/search/issues`.
        endpoint: String,
        /// Total requests issued, including the failing one.
        attempts: u32,
        /// Response body excerpt or a short description.
        message: String,
        /// True when the failure was caused by rate limiting (429, or 403
        /// whose body signals quota exhaustion).
        rate_limited: bool,
    },

    /// Transport-level failure (timeout, connection reset, DNS).
    #[error("network error on {endpoint} after {attempts} attempt(s): {source}")]
    Network {
        endpoint: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// Response body could not be decoded into the expected shape.
    #[error("failed to decode response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    /// No host client became available within the pool acquire timeout.
    #[error("could not acquire host client from pool within {timeout_secs}s")]
    PoolTimeout { timeout_secs: u64 },

    /// Raw data could not be written to or read from the canonical store.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl FetchError {
    /// HTTP status embedded in the error, when one exists.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the failure was caused by rate limiting.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::Http { rate_limited: true, .. })
    }

    /// Permanent errors are never worth retrying: 404 (gone), 403 that is
    /// not rate limiting (no access), 422 (the host rejects the request
    /// shape). Everything else is transient.
    pub fn is_permanent(&self) -> bool {
        match self {
            FetchError::Http {
                status,
                rate_limited,
                ..
            } => !rate_limited && matches!(status, 404 | 403 | 422),
            _ => false,
        }
    }
}

/// Errors from the normalise stage.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The raw input file for the target date does not exist.
    #[error("raw file not found: {0}")]
    MissingInput(PathBuf),

    /// A raw file exists but could not be parsed.
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors from the summarise stage and the LLM router.
#[derive(Debug, Error)]
pub enum SummarizeError {
    /// A normalised input file for the target date does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// A prompt template is missing from the prompts directory.
    #[error("prompt template not found: {0}")]
    MissingTemplate(PathBuf),

    /// No lower-level summaries exist to build this level from.
    #[error("no summary context available: {0}")]
    NoContext(String),

    /// A provider referenced by the task configuration is unknown.
    #[error("unsupported provider: {0}")]
    UnknownProvider(String),

    /// An LLM provider returned a non-success response.
    #[error("{provider} API error ({status}): {message}")]
    Provider {
        provider: &'static str,
        status: u16,
        message: String,
    },

    /// Transport-level failure talking to an LLM provider.
    #[error("{provider} request failed: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// A provider response could not be decoded into the expected shape.
    #[error("{provider} returned an unexpected response: {message}")]
    Malformed {
        provider: &'static str,
        message: String,
    },

    /// Batch submission was attempted against a provider without batch
    /// support.
    #[error("provider '{0}' does not support batch processing")]
    BatchUnsupported(String),

    /// A batch job reached a terminal failure state.
    #[error("batch {batch_id} ended with status {status}")]
    BatchFailed { batch_id: String, status: String },

    /// A batch job did not complete within its dynamic timeout.
    #[error("batch {batch_id} timed out after {timeout_secs}s")]
    BatchTimeout { batch_id: String, timeout_secs: u64 },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SummarizeError {
    /// Structural failures (the model answered, but not in the requested
    /// shape, or ran out of output budget). The standard strategy escalates
    /// on these and only these.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            SummarizeError::Malformed { .. }
                | SummarizeError::Provider {
                    status: 400 | 422,
                    ..
                }
        )
    }
}

/// Errors from the canonical file store and the state stores.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Crate-level error union exposed to external collaborators.
#[derive(Debug, Error)]
pub enum RecapError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Summarize(#[from] SummarizeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A pipeline stage failed; raised by the orchestrator with the stage
    /// name attached. Prior-stage outputs stay on disk.
    #[error("pipeline failed at '{step}': {cause}")]
    StepFailed {
        step: &'static str,
        #[source]
        cause: Box<RecapError>,
    },
}

impl RecapError {
    /// Wrap an error with the pipeline step it occurred in.
    pub fn step(step: &'static str, cause: impl Into<RecapError>) -> Self {
        RecapError::StepFailed {
            step,
            cause: Box::new(cause.into()),
        }
    }

    /// Whether the underlying failure is permanent (never self-heals).
    pub fn is_permanent(&self) -> bool {
        match self {
            RecapError::Fetch(e) => e.is_permanent(),
            RecapError::StepFailed { cause, .. } => cause.is_permanent(),
            _ => false,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = RecapError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_404_is_permanent() {
        let err = FetchError::Http {
            status: 404,
            endpoint: "/repos/org/x/pulls/1".into(),
            attempts: 1,
            message: "Not Found".into(),
            rate_limited: false,
        };
        assert!(err.is_permanent());
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn rate_limited_403_is_not_permanent() {
        let err = FetchError::Http {
            status: 403,
            endpoint: "/search/issues".into(),
            attempts: 8,
            message: "API rate limit exceeded".into(),
            rate_limited: true,
        };
        assert!(!err.is_permanent());
        assert!(err.is_rate_limited());
    }

    #[test]
    fn plain_403_is_permanent() {
        let err = FetchError::Http {
            status: 403,
            endpoint: "/repos/org/private/pulls/2".into(),
            attempts: 1,
            message: "Forbidden".into(),
            rate_limited: false,
        };
        assert!(err.is_permanent());
    }

    #[test]
    fn server_error_is_transient() {
        let err = FetchError::Http {
            status: 502,
            endpoint: "/search/commits".into(),
            attempts: 4,
            message: "Bad Gateway".into(),
            rate_limited: false,
        };
        assert!(!err.is_permanent());
    }

    #[test]
    fn step_failed_preserves_step_and_cause() {
        let inner = FetchError::PoolTimeout { timeout_secs: 30 };
        let err = RecapError::step("fetch", inner);
        let text = err.to_string();
        assert!(text.contains("pipeline failed at 'fetch'"), "{text}");
        assert!(text.contains("30s"), "{text}");
    }

    #[test]
    fn structural_summarize_errors() {
        assert!(SummarizeError::Malformed {
            provider: "openai",
            message: "not json".into()
        }
        .is_structural());
        assert!(!SummarizeError::BatchUnsupported("generic".into()).is_structural());
    }
}
