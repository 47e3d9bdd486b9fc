//! Conflict-aware single-record save.
//!
//! # Protocol
//!
//! 1. Ask the connection whether a write may go out (offline / cooldown gate).
//! 2. Hand the candidate to [`RemoteStore::write_record`] and wait for the
//!    per-record confirmation.
//! 3. On `ServerRecordChanged` carrying the server's copy, ask the
//!    [`ConflictResolver`]: `Ignore` adopts the server copy, `Replace(c)`
//!    starts again at step 1 with `c`.
//! 4. Any other failure goes through the connection, which may go offline or
//!    start a cooldown, and surfaces as a classified [`SyncError`].
//!
//! The per-record lock is held across every round, so a second save of the
//! same record only evaluates conflicts after the first has settled.

use async_trait::async_trait;

use cloudseed_core::{ErrorCode, RemoteError, RemoteRecord};

use crate::completion::{write_completion, WriteFailure};
use crate::connection::SyncConnection;
use crate::error::SyncError;
use crate::remote::RemoteStore;

/// What to do after the server reported a newer copy of the record.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictResolution {
    /// Keep the server's copy; the local candidate is discarded.
    Ignore,
    /// Retry with this candidate instead.
    Replace(RemoteRecord),
}

/// Caller-supplied conflict policy.
#[async_trait]
pub trait ConflictResolver: Send + Sync {
    async fn resolve(&self, server: &RemoteRecord, error: &RemoteError) -> ConflictResolution;

    /// Entry point used by [`save_record`], which also passes the candidate
    /// that hit the conflict. Defaults to [`ConflictResolver::resolve`].
    async fn resolve_conflict(
        &self,
        candidate: &RemoteRecord,
        server: &RemoteRecord,
        error: &RemoteError,
    ) -> ConflictResolution {
        let _ = candidate;
        self.resolve(server, error).await
    }
}

/// Always keep the server copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreConflicts;

#[async_trait]
impl ConflictResolver for IgnoreConflicts {
    async fn resolve(&self, _server: &RemoteRecord, _error: &RemoteError) -> ConflictResolution {
        ConflictResolution::Ignore
    }
}

/// Resolver backed by a plain closure. See [`resolve_with`].
pub struct FnResolver<F>(F);

#[async_trait]
impl<F> ConflictResolver for FnResolver<F>
where
    F: Fn(&RemoteRecord, &RemoteError) -> ConflictResolution + Send + Sync,
{
    async fn resolve(&self, server: &RemoteRecord, error: &RemoteError) -> ConflictResolution {
        (self.0)(server, error)
    }
}

pub fn resolve_with<F>(f: F) -> FnResolver<F>
where
    F: Fn(&RemoteRecord, &RemoteError) -> ConflictResolution + Send + Sync,
{
    FnResolver(f)
}

/// Last-writer-wins by local edit time.
///
/// The local edit time is read from the conflicting candidate's stamped
/// modification field, so one instance serves any number of records. If the
/// server copy was written after that edit (or either side has no timestamp)
/// the server copy is adopted. Otherwise the local fields are replayed on top
/// of the server copy and saved again.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferNewer;

#[async_trait]
impl ConflictResolver for PreferNewer {
    /// Without a candidate there is no local edit time; keep the server copy.
    async fn resolve(&self, _server: &RemoteRecord, _error: &RemoteError) -> ConflictResolution {
        ConflictResolution::Ignore
    }

    async fn resolve_conflict(
        &self,
        candidate: &RemoteRecord,
        server: &RemoteRecord,
        _error: &RemoteError,
    ) -> ConflictResolution {
        match (server.modified_at, candidate.local_modified_at()) {
            (Some(server_at), Some(local_at)) if local_at > server_at => {
                let mut merged = server.candidate();
                merged.merge_fields_from(candidate);
                ConflictResolution::Replace(merged)
            }
            _ => ConflictResolution::Ignore,
        }
    }
}

/// Save `candidate`, resolving server-side conflicts with `resolver`.
///
/// Returns the server's confirmed copy. `max_rounds` bounds how many times the
/// resolver may ask for a replacement save.
pub async fn save_record<S>(
    connection: &SyncConnection,
    store: &S,
    candidate: RemoteRecord,
    resolver: &dyn ConflictResolver,
    max_rounds: u32,
) -> Result<RemoteRecord, SyncError>
where
    S: RemoteStore + ?Sized,
{
    let id = candidate.id.clone();
    let _guard = connection.lock_record(&id).await;

    let mut candidate = candidate;
    let mut rounds = 0u32;
    loop {
        connection.check_gate().await?;

        let (completion, pending) = write_completion();
        store.write_record(candidate.clone(), completion);

        let err = match pending.wait().await {
            Ok(saved) => {
                tracing::info!("saved: {}", saved.id);
                return Ok(saved);
            }
            Err(WriteFailure::Unconfirmed) => {
                tracing::warn!("store finished without confirming {}", id);
                return Err(SyncError::RecordNotFound { id });
            }
            Err(WriteFailure::Remote(err)) => err,
        };

        let server = match (&err.code, err.server_record.as_deref()) {
            (ErrorCode::ServerRecordChanged, Some(server)) => server.clone(),
            _ => return Err(connection.record_failure(err).await),
        };

        match resolver.resolve_conflict(&candidate, &server, &err).await {
            ConflictResolution::Ignore => {
                tracing::info!("conflict on {}: keeping server copy", id);
                return Ok(server);
            }
            ConflictResolution::Replace(next) => {
                rounds += 1;
                if rounds > max_rounds {
                    return Err(SyncError::ConflictLimit {
                        id,
                        rounds: max_rounds,
                    });
                }
                tracing::debug!("conflict on {}: retrying (round {})", id, rounds);
                candidate = next;
            }
        }
    }
}
