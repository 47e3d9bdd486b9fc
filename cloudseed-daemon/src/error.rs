use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the background sweeper.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Core(#[from] cloudseed_core::CoreError),

    #[error("sync error: {0}")]
    Sync(#[from] cloudseed_sync::SyncError),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("sweeper error: {0}")]
    Protocol(String),

    #[error("no document_dir configured")]
    MissingDocumentDir,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
