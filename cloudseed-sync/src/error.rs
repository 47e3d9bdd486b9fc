//! Error types for cloudseed-sync.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use cloudseed_core::{CoreError, RecordId, RemoteError};

use crate::classifier;

/// What kind of trouble an operation ran into, independent of the
/// store-specific error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network or service hiccup; retry after a backoff.
    Transient,
    /// The server asked for a cooldown.
    RateLimited,
    /// Connectivity is gone until it is restored externally.
    Offline,
    /// Local and server state disagree and need a resolution decision.
    DataConflict,
    /// The request itself is wrong; retrying unchanged will not help.
    Malformed,
    /// The record or zone does not exist remotely.
    NotFound,
}

impl ErrorKind {
    /// Whether a failed save of this kind should be queued for replay.
    pub fn is_deferrable(self) -> bool {
        matches!(
            self,
            ErrorKind::Transient | ErrorKind::RateLimited | ErrorKind::Offline
        )
    }
}

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The connection is offline; the store was not contacted.
    #[error("remote store is offline")]
    Offline,

    /// The connection is cooling down; the store was not contacted.
    #[error("remote store is cooling down for another {remaining:?}")]
    CoolingDown { remaining: Duration },

    /// A write failed in a way that took the connection offline.
    #[error("connection lost: {0}")]
    Disconnected(#[source] RemoteError),

    /// A write was rate limited; the connection is now cooling down.
    #[error("rate limited for {retry_after:?}: {source}")]
    RateLimited {
        retry_after: Duration,
        #[source]
        source: RemoteError,
    },

    /// Transient remote failure.
    #[error("temporary remote failure, try later: {0}")]
    TryLater(#[source] RemoteError),

    /// The request is malformed or not permitted.
    #[error("unable to save: {0}")]
    Unrecoverable(#[source] RemoteError),

    /// Data-level disagreement with the server.
    #[error("record problem: {0}")]
    RecordConflict(#[source] RemoteError),

    /// An error code with no recovery mapping, passed through unchanged.
    #[error(transparent)]
    Remote(RemoteError),

    /// The store reported batch success without confirming the record.
    #[error("remote store never confirmed record {id}")]
    RecordNotFound { id: RecordId },

    /// Conflict resolution kept asking for another round.
    #[error("conflict on {id} still unresolved after {rounds} rounds")]
    ConflictLimit { id: RecordId, rounds: u32 },

    /// The entity has no backing local store.
    #[error("entity {id} is not inserted into a local store")]
    NotInserted { id: RecordId },

    /// The entity was synced before but the remote record is gone.
    #[error("record {id} no longer exists remotely")]
    NotFound { id: RecordId },

    /// The merge callback refused the fetched remote record.
    #[error("failed to load remote record {id} into the local entity")]
    LoadFailed { id: RecordId },

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (document store).
    #[error("document JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// The error's place in the [`ErrorKind`] taxonomy, if it has one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            SyncError::Offline | SyncError::Disconnected(_) => Some(ErrorKind::Offline),
            SyncError::CoolingDown { .. } | SyncError::RateLimited { .. } => {
                Some(ErrorKind::RateLimited)
            }
            SyncError::TryLater(_) => Some(ErrorKind::Transient),
            SyncError::Unrecoverable(_) | SyncError::NotInserted { .. } => {
                Some(ErrorKind::Malformed)
            }
            SyncError::RecordConflict(err) => Some(classifier::conflict_kind(err.code)),
            SyncError::RecordNotFound { .. } | SyncError::NotFound { .. } => {
                Some(ErrorKind::NotFound)
            }
            SyncError::ConflictLimit { .. } | SyncError::LoadFailed { .. } => {
                Some(ErrorKind::DataConflict)
            }
            SyncError::Remote(_)
            | SyncError::Core(_)
            | SyncError::Io { .. }
            | SyncError::Json(_) => None,
        }
    }

    /// Whether a save that failed with this error should be deferred.
    pub fn is_deferrable(&self) -> bool {
        self.kind().is_some_and(ErrorKind::is_deferrable)
    }

    /// The remote error behind this failure, when there is one.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            SyncError::Disconnected(err)
            | SyncError::RateLimited { source: err, .. }
            | SyncError::TryLater(err)
            | SyncError::Unrecoverable(err)
            | SyncError::RecordConflict(err)
            | SyncError::Remote(err) => Some(err),
            _ => None,
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
