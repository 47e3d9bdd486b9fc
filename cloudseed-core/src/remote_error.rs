//! Errors reported by the remote store.
//!
//! A [`RemoteError`] carries the store's error code plus whatever context the
//! store attached: a retry-after hint, the server's current copy of a
//! conflicting record, per-item sub-errors of a batch, and an underlying
//! cause. Nothing here decides what to *do* about an error; that is the
//! classifier's job in `cloudseed-sync`.

use std::fmt;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::record::RemoteRecord;
use crate::types::{ItemId, ZoneId};

static ZONE_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"zoneID=([^:]+):").expect("zone id pattern is valid"));

/// Error codes the remote store can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    AccountTemporarilyUnavailable,
    AlreadyShared,
    AssetFileModified,
    AssetFileNotFound,
    AssetNotAvailable,
    BadContainer,
    BadDatabase,
    BatchRequestFailed,
    ChangeTokenExpired,
    ConstraintViolation,
    IncompatibleVersion,
    InternalError,
    InvalidArguments,
    LimitExceeded,
    ManagedAccountRestricted,
    MissingEntitlement,
    NetworkFailure,
    NetworkUnavailable,
    NotAuthenticated,
    OperationCancelled,
    PartialFailure,
    ParticipantAlreadyInvited,
    ParticipantMayNeedVerification,
    PermissionFailure,
    QuotaExceeded,
    ReferenceViolation,
    RequestRateLimited,
    ResultsTruncated,
    ServerRecordChanged,
    ServerRejectedRequest,
    ServerResponseLost,
    ServiceUnavailable,
    TooManyParticipants,
    UnknownItem,
    UserDeletedZone,
    ZoneBusy,
    ZoneNotFound,
    /// A code this crate does not know about.
    Other(i64),
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Other(raw) => write!(f, "code {raw}"),
            known => write!(f, "{known:?}"),
        }
    }
}

/// An error returned by the remote store.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteError {
    pub code: ErrorCode,
    pub message: String,
    /// Server-requested delay before the next request.
    pub retry_after: Option<Duration>,
    /// The server's current copy, attached to `ServerRecordChanged`.
    pub server_record: Option<Box<RemoteRecord>>,
    /// Per-item failures of a batch operation.
    pub partial_errors: Vec<(ItemId, RemoteError)>,
    pub underlying: Option<Box<RemoteError>>,
}

impl RemoteError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry_after: None,
            server_record: None,
            partial_errors: Vec::new(),
            underlying: None,
        }
    }

    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    pub fn with_server_record(mut self, record: RemoteRecord) -> Self {
        self.server_record = Some(Box::new(record));
        self
    }

    pub fn with_partial(mut self, item: impl Into<ItemId>, error: RemoteError) -> Self {
        self.partial_errors.push((item.into(), error));
        self
    }

    pub fn with_underlying(mut self, error: RemoteError) -> Self {
        self.underlying = Some(Box::new(error));
        self
    }

    pub fn is_not_authenticated(&self) -> bool {
        self.code == ErrorCode::NotAuthenticated
    }

    pub fn is_temporarily_unavailable(&self) -> bool {
        self.code == ErrorCode::AccountTemporarilyUnavailable
    }

    /// The account cannot currently talk to the store at all.
    pub fn indicates_disabled_account(&self) -> bool {
        self.is_not_authenticated() || self.is_temporarily_unavailable()
    }

    /// Does this error, or any nested per-item error, carry `code`?
    pub fn has_code(&self, code: ErrorCode) -> bool {
        if self.code == code {
            return true;
        }
        self.partial_errors
            .iter()
            .any(|(_, partial)| partial.has_code(code))
    }

    /// Zones implicated by per-item `ZoneNotFound` failures.
    ///
    /// Each zone appears once, in the order its first item was reported.
    pub fn zone_ids(&self) -> Vec<ZoneId> {
        let mut zones: Vec<ZoneId> = Vec::new();
        for (item, partial) in &self.partial_errors {
            if !partial.has_code(ErrorCode::ZoneNotFound) {
                continue;
            }
            let Some(zone) = item.zone() else { continue };
            if !zones.contains(zone) {
                zones.push(zone.clone());
            }
        }
        zones
    }

    /// This error followed by its underlying causes, outermost first.
    pub fn error_chain(&self) -> Vec<&RemoteError> {
        let mut chain = vec![self];
        let mut current = self;
        while let Some(next) = current.underlying.as_deref() {
            chain.push(next);
            current = next;
        }
        chain
    }

    /// Zone named in this error's message as `zoneID=<name>:`.
    pub fn zone_id(&self) -> Option<ZoneId> {
        extracted_zone_id(&self.message).map(ZoneId::from)
    }

    /// First zone named anywhere in the underlying-error chain.
    pub fn recursive_zone_id(&self) -> Option<ZoneId> {
        self.error_chain().into_iter().find_map(RemoteError::zone_id)
    }

    /// Multi-line description including every per-item failure.
    pub fn detailed_description(&self) -> String {
        let mut out = format!("{}\n{}\n", self.code, self.message);
        for (item, partial) in &self.partial_errors {
            out.push_str(&format!("\n\t• {item}: {}", partial.detailed_description()));
        }
        out
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for RemoteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.underlying
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Pull the zone name out of a `zoneID=<name>:<owner>` fragment.
pub fn extracted_zone_id(text: &str) -> Option<&str> {
    ZONE_ID_PATTERN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
