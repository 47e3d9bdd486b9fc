//! Application-facing entry point.

use std::sync::Arc;

use tokio::sync::watch;

use cloudseed_core::{RecordId, RemoteRecord, SyncConfig};

use crate::connection::{ConnectionSnapshot, ConnectionStatus, SyncConnection};
use crate::deferred::{save_entity, sweep_pending, DeferredSavable, SaveOutcome, SweepReport};
use crate::document::SyncedDocument;
use crate::error::SyncError;
use crate::query::{fetch_by_ids, fetch_first, fetch_records_of_type, Query, QueryPager};
use crate::reload::{reload, ReloadOutcome};
use crate::remote::RemoteStore;
use crate::save::{save_record, ConflictResolver};
use crate::version::SyncedEntity;

/// One connection to a default remote store, plus the tunables that apply
/// to it. Cheap to clone.
#[derive(Clone)]
pub struct CloudSync {
    connection: SyncConnection,
    store: Arc<dyn RemoteStore>,
    config: Arc<SyncConfig>,
}

impl CloudSync {
    pub fn new(store: Arc<dyn RemoteStore>, config: SyncConfig) -> Self {
        Self::with_connection(SyncConnection::new(), store, config)
    }

    /// Share an existing connection (and its offline / cooldown state).
    pub fn with_connection(
        connection: SyncConnection,
        store: Arc<dyn RemoteStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            connection,
            store,
            config: Arc::new(config),
        }
    }

    pub fn connection(&self) -> &SyncConnection {
        &self.connection
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// A new document in the configured default zone.
    pub fn document(&self, record_type: impl Into<String>, name: impl Into<String>) -> SyncedDocument {
        SyncedDocument::new(record_type, name, self.config.default_zone.clone())
    }

    /// Id of record `name` in the configured default zone.
    pub fn record_id(&self, name: impl Into<String>) -> RecordId {
        RecordId::new(name, self.config.default_zone.clone())
    }

    /// Save an entity, deferring the write on connectivity failures.
    pub async fn save<E>(
        &self,
        entity: &mut E,
        resolver: &dyn ConflictResolver,
    ) -> Result<SaveOutcome, SyncError>
    where
        E: DeferredSavable + ?Sized,
    {
        save_entity(
            &self.connection,
            self.store.as_ref(),
            entity,
            resolver,
            self.config.max_conflict_rounds,
        )
        .await
    }

    /// Save a bare record. Nothing is deferred.
    pub async fn save_record(
        &self,
        candidate: RemoteRecord,
        resolver: &dyn ConflictResolver,
    ) -> Result<RemoteRecord, SyncError> {
        save_record(
            &self.connection,
            self.store.as_ref(),
            candidate,
            resolver,
            self.config.max_conflict_rounds,
        )
        .await
    }

    /// Reload from the default store.
    pub async fn reload<E>(&self, entity: &mut E, overwrite_local: bool) -> Result<ReloadOutcome, SyncError>
    where
        E: SyncedEntity + ?Sized,
    {
        reload(entity, self.store.as_ref(), overwrite_local).await
    }

    /// Reload from a specific store.
    pub async fn reload_from<E, S>(
        &self,
        entity: &mut E,
        store: &S,
        overwrite_local: bool,
    ) -> Result<ReloadOutcome, SyncError>
    where
        E: SyncedEntity + ?Sized,
        S: RemoteStore + ?Sized,
    {
        reload(entity, store, overwrite_local).await
    }

    /// Replay the pending saves of `entities`.
    pub async fn sweep<'a, E, I>(&self, entities: I, resolver: &dyn ConflictResolver) -> SweepReport
    where
        E: DeferredSavable + ?Sized + 'a,
        I: IntoIterator<Item = &'a mut E>,
    {
        sweep_pending(
            &self.connection,
            self.store.as_ref(),
            entities,
            resolver,
            self.config.max_conflict_rounds,
        )
        .await
    }

    /// Run a query to completion. A query without its own limit gets the
    /// configured one.
    pub async fn query(&self, query: Query) -> Result<Vec<RemoteRecord>, SyncError> {
        fetch_records_of_type(&self.connection, self.store.as_ref(), self.limited(query)).await
    }

    /// Walk a query page by page.
    pub fn pager(&self, query: Query) -> QueryPager<'_, dyn RemoteStore> {
        QueryPager::new(self.store.as_ref(), self.limited(query))
    }

    /// First record matching `query`. Misses on a zone-less query are
    /// reported against the configured default zone.
    pub async fn fetch_record(&self, query: Query) -> Result<RemoteRecord, SyncError> {
        fetch_first(self.store.as_ref(), query, &self.config.default_zone).await
    }

    pub async fn fetch(&self, ids: &[RecordId]) -> Result<Vec<RemoteRecord>, SyncError> {
        fetch_by_ids(self.store.as_ref(), ids).await
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.connection.status().await
    }

    pub async fn snapshot(&self) -> ConnectionSnapshot {
        self.connection.snapshot().await
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.subscribe()
    }

    /// Signal that connectivity is back.
    pub async fn set_online(&self) {
        self.connection.set_online().await
    }

    fn limited(&self, query: Query) -> Query {
        if query.limit == 0 && self.config.query_limit > 0 {
            query.limit(self.config.query_limit)
        } else {
            query
        }
    }
}
