//! Error types for the Axon model pipeline.
//!
//! Variants follow the failure taxonomy of the acquisition pipeline:
//! - resolution failures (`AdapterNotFound`, `RemoteNotFound`)
//! - transport failures (`Network`, `Timeout`, `AllSourcesFailed`)
//! - integrity failures (`ChecksumMismatch`, `ArtifactCorrupt`)
//! - conversion failures (`ConversionUnsupported`, `ConversionFailed`)
//!
//! A skipped conversion is not an error; it is reported through
//! [`crate::conversion::ConversionOutcome::Skipped`].

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for the Axon library.
#[derive(Debug, Error)]
pub enum AxonError {
    // Resolution errors
    #[error("No adapter found for {namespace}/{name}")]
    AdapterNotFound { namespace: String, name: String },

    #[error("Model not found: {model}")]
    RemoteNotFound { model: String },

    #[error("Invalid model identifier '{input}': {message}")]
    InvalidIdentifier { input: String, message: String },

    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Failed to download from all sources: {last_error}")]
    AllSourcesFailed { attempts: usize, last_error: String },

    #[error("No files could be downloaded for {model} ({attempted} attempted)")]
    PartialSourceFailure { model: String, attempted: usize },

    // Integrity errors
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Artifact at {path:?} is corrupt: {message}")]
    ArtifactCorrupt { path: PathBuf, message: String },

    // Conversion errors
    #[error("No conversion path for framework '{framework}'")]
    ConversionUnsupported { framework: String },

    #[error("Conversion failed: {message}")]
    ConversionFailed { message: String },

    #[error("Operation cancelled")]
    Cancelled,

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("YAML error: {message}")]
    Yaml {
        message: String,
        #[source]
        source: Option<serde_yaml::Error>,
    },

    // Configuration and validation errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Axon operations.
pub type Result<T> = std::result::Result<T, AxonError>;

impl From<std::io::Error> for AxonError {
    fn from(err: std::io::Error) -> Self {
        AxonError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for AxonError {
    fn from(err: serde_json::Error) -> Self {
        AxonError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_yaml::Error> for AxonError {
    fn from(err: serde_yaml::Error) -> Self {
        AxonError::Yaml {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for AxonError {
    fn from(err: reqwest::Error) -> Self {
        // The configured duration is not carried by reqwest; `HttpClient`
        // maps its own send timeouts to `Timeout` instead.
        let message = if err.is_timeout() {
            format!("Request timed out: {}", err)
        } else {
            err.to_string()
        };
        AxonError::Network {
            message,
            source: Some(err),
        }
    }
}

impl AxonError {
    /// Create an IO error with a context message and path.
    pub fn io(context: &str, path: impl AsRef<Path>, err: std::io::Error) -> Self {
        let path = path.as_ref();
        AxonError::Io {
            message: format!("{}: {}", context, err),
            path: Some(path.to_path_buf()),
            source: Some(err),
        }
    }

    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        AxonError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Shorthand for a network error without an underlying reqwest error.
    pub fn network(message: impl Into<String>) -> Self {
        AxonError::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Check if this error should trigger a retry.
    ///
    /// Only transport-level failures are retryable. Resolution failures
    /// such as `AdapterNotFound` never are.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AxonError::Network { .. } | AxonError::Timeout(_))
    }

    /// Whether this error reports a confirmed-absent remote model.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AxonError::RemoteNotFound { .. })
    }
}

/// Attach a path to `std::io::Result` values.
pub trait IoResultExt<T> {
    fn with_path(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| AxonError::io_with_path(e, path.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AxonError::AdapterNotFound {
            namespace: "acme".into(),
            name: "widget".into(),
        };
        assert_eq!(err.to_string(), "No adapter found for acme/widget");

        let err = AxonError::AllSourcesFailed {
            attempts: 2,
            last_error: "status 503".into(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to download from all sources: status 503"
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(AxonError::Timeout(std::time::Duration::from_secs(5)).is_retryable());
        assert!(AxonError::network("connection reset").is_retryable());
        assert!(!AxonError::AdapterNotFound {
            namespace: "x".into(),
            name: "y".into()
        }
        .is_retryable());
        assert!(!AxonError::ChecksumMismatch {
            expected: "a".into(),
            actual: "b".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_with_path_attaches_path() {
        let result: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        match result.with_path("/tmp/nowhere") {
            Err(AxonError::Io { path, .. }) => {
                assert_eq!(path, Some(PathBuf::from("/tmp/nowhere")));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
