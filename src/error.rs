//! Error types for apidiff

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type for apidiff operations
pub type Result<T> = std::result::Result<T, ApiDiffError>;

/// Errors that can occur while recording, loading or comparing sessions
#[derive(Debug, Error)]
pub enum ApiDiffError {
    /// Unknown session, or no stored interaction matched a replayed request
    #[error("Not found: {0}")]
    NotFound(String),

    /// Interaction index outside the recorded range
    #[error("Interaction index {index} out of range: session holds {available} interaction(s)")]
    IndexOutOfRange {
        /// Requested 1-based index
        index: usize,
        /// Number of interactions available
        available: usize,
    },

    /// Filesystem I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// DNS, connect, TLS or HTTP exchange failure
    #[error("Network error: {0}")]
    Network(String),

    /// Malformed manifest, cassette, stats document or JSON body
    #[error("Parse error: {0}")]
    Parse(String),

    /// Persisted interaction did not appear within the wait budget
    #[error("Timed out after {waited:?} waiting for {}", path.display())]
    Timeout {
        /// File that was expected to appear
        path: PathBuf,
        /// Total time spent waiting
        waited: Duration,
    },

    /// Malformed URL, method, header or session name
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ApiDiffError {
    /// Whether the error belongs to the I/O class (filesystem or network)
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Network(_))
    }
}

impl From<serde_yaml::Error> for ApiDiffError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
