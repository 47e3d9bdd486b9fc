//! Error types for cloudseed-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from snapshot encoding and configuration persistence.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure while reading or writing configuration.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file path.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A record snapshot could not be encoded or decoded.
    #[error("record snapshot codec error: {0}")]
    Codec(#[source] serde_json::Error),
}

/// Convenience constructor for [`CoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
