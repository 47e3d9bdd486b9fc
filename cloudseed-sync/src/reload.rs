//! Pull the remote copy of an entity and merge it when it changed.

use cloudseed_core::ErrorCode;

use crate::classifier::into_sync_error;
use crate::error::SyncError;
use crate::remote::RemoteStore;
use crate::version::{cached_snapshot, record_id, set_cached_snapshot, SyncedEntity};

/// What a successful reload did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// Nothing remote and nothing cached: the entity was never synced.
    NeverSynced,
    /// The remote copy matches the cached snapshot; no merge happened.
    Unchanged,
    /// Remote fields were merged into the entity and the cache updated.
    Merged,
}

/// Reload `entity` from `store`.
///
/// Unless `overwrite_local` is set, a remote copy whose `modified_at` equals
/// the cached snapshot's is skipped without calling the merge callback.
pub async fn reload<E, S>(
    entity: &mut E,
    store: &S,
    overwrite_local: bool,
) -> Result<ReloadOutcome, SyncError>
where
    E: SyncedEntity + ?Sized,
    S: RemoteStore + ?Sized,
{
    let id = record_id(entity);
    if !entity.is_inserted() {
        return Err(SyncError::NotInserted { id });
    }

    let results = store
        .fetch_records(std::slice::from_ref(&id))
        .await
        .map_err(into_sync_error)?;

    let remote = match results.into_iter().find(|(item, _)| *item == id) {
        Some((_, Ok(record))) => Some(record),
        Some((_, Err(err))) if err.code == ErrorCode::UnknownItem => None,
        Some((_, Err(err))) => return Err(into_sync_error(err)),
        None => None,
    };

    let Some(remote) = remote else {
        if entity.cached_record_data().is_none() {
            tracing::debug!("{} was never synced, nothing to reload", id);
            return Ok(ReloadOutcome::NeverSynced);
        }
        return Err(SyncError::NotFound { id });
    };

    if !overwrite_local {
        let cached_at = cached_snapshot(entity).and_then(|cached| cached.modified_at);
        if cached_at.is_some() && cached_at == remote.modified_at {
            return Ok(ReloadOutcome::Unchanged);
        }
    }

    if !entity.load_from_remote(&remote) {
        return Err(SyncError::LoadFailed { id });
    }
    set_cached_snapshot(entity, Some(&remote))?;
    entity.persist()?;
    tracing::info!("reloaded: {}", id);
    Ok(ReloadOutcome::Merged)
}
