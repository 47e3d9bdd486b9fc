//! Remote error classification.
//!
//! [`classify`] is the single place where store-specific error codes are
//! translated into a [`RecoveryAction`]. It is pure: the connection state
//! machine decides what to do with the action.

use std::time::Duration;

use cloudseed_core::{ErrorCode, RemoteError};

use crate::error::{ErrorKind, SyncError};

/// How the caller should recover from a remote error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Transient; retry after a backoff.
    TryLater,
    /// The request is malformed or not permitted.
    Unrecoverable(ErrorCode),
    /// Data-level disagreement; resolve before retrying.
    RecordConflict(ErrorCode),
    /// Connectivity is gone; block writes until it returns.
    EnterOffline,
    /// The server asked for this much quiet time.
    Cooldown(Duration),
    /// No mapping exists; propagate the original error unchanged.
    Unmapped,
}

impl RecoveryAction {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            RecoveryAction::TryLater => Some(ErrorKind::Transient),
            RecoveryAction::Unrecoverable(_) => Some(ErrorKind::Malformed),
            RecoveryAction::RecordConflict(code) => Some(conflict_kind(*code)),
            RecoveryAction::EnterOffline => Some(ErrorKind::Offline),
            RecoveryAction::Cooldown(_) => Some(ErrorKind::RateLimited),
            RecoveryAction::Unmapped => None,
        }
    }

    /// Wrap the original error in the [`SyncError`] matching this action.
    pub fn into_error(self, error: RemoteError) -> SyncError {
        match self {
            RecoveryAction::TryLater => SyncError::TryLater(error),
            RecoveryAction::Unrecoverable(_) => SyncError::Unrecoverable(error),
            RecoveryAction::RecordConflict(_) => SyncError::RecordConflict(error),
            RecoveryAction::EnterOffline => SyncError::Disconnected(error),
            RecoveryAction::Cooldown(retry_after) => SyncError::RateLimited {
                retry_after,
                source: error,
            },
            RecoveryAction::Unmapped => SyncError::Remote(error),
        }
    }
}

/// Map a remote error onto a recovery action.
pub fn classify(error: &RemoteError) -> RecoveryAction {
    use ErrorCode::*;

    match error.code {
        AccountTemporarilyUnavailable
        | InternalError
        | NetworkUnavailable
        | ServiceUnavailable
        | NotAuthenticated
        | OperationCancelled
        | ChangeTokenExpired
        | ZoneBusy
        | QuotaExceeded
        | LimitExceeded
        | ServerResponseLost => RecoveryAction::TryLater,

        NetworkFailure => RecoveryAction::EnterOffline,

        RequestRateLimited => match error.retry_after {
            Some(delay) => RecoveryAction::Cooldown(delay),
            None => RecoveryAction::TryLater,
        },

        BadContainer
        | BadDatabase
        | MissingEntitlement
        | InvalidArguments
        | ResultsTruncated
        | AssetFileNotFound
        | AssetFileModified
        | TooManyParticipants
        | ManagedAccountRestricted
        | AssetNotAvailable => RecoveryAction::Unrecoverable(error.code),

        PartialFailure
        | PermissionFailure
        | UnknownItem
        | ServerRecordChanged
        | ServerRejectedRequest
        | IncompatibleVersion
        | ConstraintViolation
        | BatchRequestFailed
        | ZoneNotFound
        | UserDeletedZone
        | AlreadyShared
        | ReferenceViolation
        | ParticipantMayNeedVerification
        | ParticipantAlreadyInvited => RecoveryAction::RecordConflict(error.code),

        Other(_) => RecoveryAction::Unmapped,
    }
}

/// Classify and wrap in one step, for paths that do not touch connection
/// state (fetches and queries).
pub fn into_sync_error(error: RemoteError) -> SyncError {
    classify(&error).into_error(error)
}

/// Record-level codes that mean "it isn't there" rather than "it changed".
pub(crate) fn conflict_kind(code: ErrorCode) -> ErrorKind {
    match code {
        ErrorCode::UnknownItem | ErrorCode::ZoneNotFound | ErrorCode::UserDeletedZone => {
            ErrorKind::NotFound
        }
        _ => ErrorKind::DataConflict,
    }
}
