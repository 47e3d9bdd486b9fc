//! Saves that failed for connectivity reasons, kept for replay.
//!
//! The candidate that could not be written is stored verbatim on the entity
//! and persisted with it. [`sweep_pending`] replays every stored candidate;
//! a slot is cleared once the store confirms the write or [`drop_pending`]
//! is called.

use cloudseed_core::{RecordId, RemoteRecord};

use crate::connection::SyncConnection;
use crate::error::SyncError;
use crate::remote::RemoteStore;
use crate::save::{save_record, ConflictResolver};
use crate::version::{build_record, record_id, set_cached_snapshot, SyncedEntity};

/// An entity that can hold one pending save.
pub trait DeferredSavable: SyncedEntity {
    fn pending_record_data(&self) -> Option<&[u8]>;

    fn set_pending_record_data(&mut self, data: Option<Vec<u8>>);
}

/// Result of a save that did not fail outright.
#[derive(Debug)]
pub enum SaveOutcome {
    /// The store confirmed this copy.
    Saved(RemoteRecord),
    /// The save hit a retryable failure and was queued on the entity.
    Deferred(SyncError),
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved(_))
    }
}

/// Tally of one sweep over pending saves.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub saved: usize,
    pub still_pending: usize,
    /// Terminal failures. Their pending saves are kept until dropped, except
    /// `LoadFailed` after a confirmed write, which has nothing left to replay.
    pub failed: Vec<(RecordId, SyncError)>,
}

impl SweepReport {
    pub fn attempted(&self) -> usize {
        self.saved + self.still_pending + self.failed.len()
    }
}

/// Decode the pending candidate, if any.
pub fn pending_record<E: DeferredSavable + ?Sized>(entity: &E) -> Option<RemoteRecord> {
    let data = entity.pending_record_data()?;
    match RemoteRecord::from_bytes(data) {
        Ok(record) => Some(record),
        Err(err) => {
            tracing::warn!(
                "unreadable pending save for {}: {}",
                entity.record_name(),
                err
            );
            None
        }
    }
}

/// Store (or clear) the pending candidate, persisting the entity only when
/// the stored bytes actually change. Returns whether anything changed.
pub fn set_pending_record<E: DeferredSavable + ?Sized>(
    entity: &mut E,
    record: Option<&RemoteRecord>,
) -> Result<bool, SyncError> {
    let data = record.map(RemoteRecord::to_bytes).transpose()?;
    if entity.pending_record_data() == data.as_deref() {
        return Ok(false);
    }
    entity.set_pending_record_data(data);
    entity.persist()?;
    Ok(true)
}

/// Discard the pending save without replaying it.
pub fn drop_pending<E: DeferredSavable + ?Sized>(entity: &mut E) -> Result<bool, SyncError> {
    set_pending_record(entity, None)
}

/// Save the entity's current state, deferring on retryable failures.
pub async fn save_entity<E, S>(
    connection: &SyncConnection,
    store: &S,
    entity: &mut E,
    resolver: &dyn ConflictResolver,
    max_rounds: u32,
) -> Result<SaveOutcome, SyncError>
where
    E: DeferredSavable + ?Sized,
    S: RemoteStore + ?Sized,
{
    let candidate = build_record(entity);
    submit(connection, store, entity, candidate, resolver, max_rounds).await
}

/// Replay every pending save.
pub async fn sweep_pending<'a, E, S, I>(
    connection: &SyncConnection,
    store: &S,
    entities: I,
    resolver: &dyn ConflictResolver,
    max_rounds: u32,
) -> SweepReport
where
    E: DeferredSavable + ?Sized + 'a,
    S: RemoteStore + ?Sized,
    I: IntoIterator<Item = &'a mut E>,
{
    let mut report = SweepReport::default();
    for entity in entities {
        if entity.pending_record_data().is_none() {
            continue;
        }
        let id = record_id(entity);
        let Some(candidate) = pending_record(entity) else {
            report.failed.push((
                id.clone(),
                SyncError::LoadFailed { id },
            ));
            continue;
        };
        match submit(connection, store, entity, candidate, resolver, max_rounds).await {
            Ok(SaveOutcome::Saved(_)) => report.saved += 1,
            Ok(SaveOutcome::Deferred(_)) => report.still_pending += 1,
            Err(err) => {
                tracing::warn!("pending save of {} failed: {}", id, err);
                report.failed.push((id, err));
            }
        }
    }
    if report.attempted() > 0 {
        tracing::info!(
            "sweep: {} saved, {} still pending, {} failed",
            report.saved,
            report.still_pending,
            report.failed.len()
        );
    }
    report
}

async fn submit<E, S>(
    connection: &SyncConnection,
    store: &S,
    entity: &mut E,
    candidate: RemoteRecord,
    resolver: &dyn ConflictResolver,
    max_rounds: u32,
) -> Result<SaveOutcome, SyncError>
where
    E: DeferredSavable + ?Sized,
    S: RemoteStore + ?Sized,
{
    match save_record(connection, store, candidate.clone(), resolver, max_rounds).await {
        Ok(saved) => {
            let merged = saved.fields == candidate.fields || entity.load_from_remote(&saved);
            // The write is done either way: never replay it.
            set_cached_snapshot(entity, Some(&saved))?;
            entity.set_pending_record_data(None);
            entity.persist()?;
            if !merged {
                tracing::warn!("{} saved, but the entity refused the server copy", saved.id);
                return Err(SyncError::LoadFailed { id: saved.id });
            }
            Ok(SaveOutcome::Saved(saved))
        }
        Err(err) if err.is_deferrable() => {
            tracing::warn!("deferring save of {}: {}", candidate.id, err);
            set_pending_record(entity, Some(&candidate))?;
            Ok(SaveOutcome::Deferred(err))
        }
        Err(err) => Err(err),
    }
}
