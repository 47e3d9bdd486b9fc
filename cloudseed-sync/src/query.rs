//! Paginated queries.
//!
//! A [`QueryPager`] walks a query page by page and can be restarted from the
//! last [`QueryCursor`] it handed out. [`fetch_records_of_type`] drains a
//! query into memory, stopping when the store returns no cursor or the
//! query's limit is reached.

use serde::{Deserialize, Serialize};

use cloudseed_core::{FieldValue, RecordId, RemoteRecord, ZoneId};

use crate::classifier;
use crate::connection::SyncConnection;
use crate::error::SyncError;
use crate::remote::RemoteStore;

/// Opaque continuation token issued by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCursor(pub String);

/// Record filter. Stores interpret `Raw` in their own syntax.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    All,
    Equals { field: String, value: FieldValue },
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortDescriptor {
    pub key: String,
    pub ascending: bool,
}

impl SortDescriptor {
    pub fn ascending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ascending: true,
        }
    }

    pub fn descending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ascending: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub record_type: String,
    pub predicate: Predicate,
    pub sort: Vec<SortDescriptor>,
    pub zone: Option<ZoneId>,
    /// Restrict returned fields; `None` returns all of them.
    pub field_keys: Option<Vec<String>>,
    /// Maximum records to collect; `0` means no limit.
    pub limit: usize,
}

impl Query {
    pub fn new(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            predicate: Predicate::All,
            sort: Vec::new(),
            zone: None,
            field_keys: None,
            limit: 0,
        }
    }

    pub fn matching(mut self, predicate: Predicate) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn sorted_by(mut self, sort: SortDescriptor) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn in_zone(mut self, zone: impl Into<ZoneId>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn keys(mut self, keys: Vec<String>) -> Self {
        self.field_keys = Some(keys);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Restartable page-by-page walk over a query.
pub struct QueryPager<'a, S: RemoteStore + ?Sized> {
    store: &'a S,
    query: Query,
    cursor: Option<QueryCursor>,
    started: bool,
    finished: bool,
    collected: usize,
}

impl<'a, S: RemoteStore + ?Sized> QueryPager<'a, S> {
    pub fn new(store: &'a S, query: Query) -> Self {
        Self {
            store,
            query,
            cursor: None,
            started: false,
            finished: false,
            collected: 0,
        }
    }

    /// Pick up a previous walk from `cursor`.
    pub fn resume(store: &'a S, query: Query, cursor: QueryCursor) -> Self {
        Self {
            store,
            query,
            cursor: Some(cursor),
            started: true,
            finished: false,
            collected: 0,
        }
    }

    /// Cursor for the next page, if any. Persist it to resume later.
    pub fn cursor(&self) -> Option<&QueryCursor> {
        self.cursor.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Next page of successfully fetched records; `None` once exhausted.
    ///
    /// Per-item failures inside a page are skipped.
    pub async fn next_page(&mut self) -> Result<Option<Vec<RemoteRecord>>, SyncError> {
        if self.finished {
            return Ok(None);
        }
        if self.started && self.cursor.is_none() {
            self.finished = true;
            return Ok(None);
        }

        let page = self
            .store
            .query_page(&self.query, self.cursor.as_ref())
            .await
            .map_err(classifier::into_sync_error)?;
        self.started = true;

        let mut records: Vec<RemoteRecord> = page
            .results
            .into_iter()
            .filter_map(|(id, result)| match result {
                Ok(record) => Some(record),
                Err(err) => {
                    tracing::debug!("query skipped {}: {}", id, err);
                    None
                }
            })
            .collect();

        let limit = self.query.limit;
        if limit > 0 && self.collected + records.len() >= limit {
            records.truncate(limit - self.collected);
            self.finished = true;
        }
        self.collected += records.len();
        self.cursor = page.cursor;
        if self.cursor.is_none() {
            self.finished = true;
        }
        Ok(Some(records))
    }

    /// Drain every remaining page.
    pub async fn collect_all(mut self) -> Result<Vec<RemoteRecord>, SyncError> {
        let mut all = Vec::new();
        while let Some(page) = self.next_page().await? {
            all.extend(page);
        }
        Ok(all)
    }
}

/// Run `query` to completion. Refuses to start while the connection is
/// offline.
pub async fn fetch_records_of_type<S: RemoteStore + ?Sized>(
    connection: &SyncConnection,
    store: &S,
    query: Query,
) -> Result<Vec<RemoteRecord>, SyncError> {
    connection.ensure_online().await?;
    QueryPager::new(store, query).collect_all().await
}

/// First record matching `query`, or [`SyncError::RecordNotFound`].
pub async fn fetch_record<S: RemoteStore + ?Sized>(
    store: &S,
    query: Query,
) -> Result<RemoteRecord, SyncError> {
    fetch_first(store, query, &ZoneId::default_zone()).await
}

/// Like [`fetch_record`]; a query without a zone reports misses against
/// `fallback_zone`.
pub(crate) async fn fetch_first<S: RemoteStore + ?Sized>(
    store: &S,
    query: Query,
    fallback_zone: &ZoneId,
) -> Result<RemoteRecord, SyncError> {
    let zone = query.zone.clone().unwrap_or_else(|| fallback_zone.clone());
    let query = query.limit(1);
    let page = store
        .query_page(&query, None)
        .await
        .map_err(classifier::into_sync_error)?;
    match page.results.into_iter().next() {
        Some((_, Ok(record))) => Ok(record),
        Some((_, Err(err))) => Err(classifier::into_sync_error(err)),
        None => Err(SyncError::RecordNotFound {
            id: RecordId::new(format!("<{} query>", query.record_type), zone),
        }),
    }
}

/// Fetch the given ids, keeping only the records that came back.
pub async fn fetch_by_ids<S: RemoteStore + ?Sized>(
    store: &S,
    ids: &[RecordId],
) -> Result<Vec<RemoteRecord>, SyncError> {
    let results = store.fetch_records(ids).await.map_err(classifier::into_sync_error)?;
    Ok(results
        .into_iter()
        .filter_map(|(_, result)| result.ok())
        .collect())
}
