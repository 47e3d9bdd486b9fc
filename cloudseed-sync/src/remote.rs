//! The remote store collaborator.
//!
//! The sync engine never talks to a network itself; it drives whatever
//! implements [`RemoteStore`].

use async_trait::async_trait;

use cloudseed_core::{RecordId, RemoteError, RemoteRecord};

use crate::completion::WriteCompletion;
use crate::query::{Query, QueryCursor};

/// Per-item results of a fetch or query page, in the order the store
/// reported them.
pub type FetchResults = Vec<(RecordId, Result<RemoteRecord, RemoteError>)>;

/// One page of query results.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub results: FetchResults,
    /// Present when more results remain.
    pub cursor: Option<QueryCursor>,
}

/// Save / fetch / query primitives of a remote record store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Start writing a single record.
    ///
    /// The transport reports through `completion`: `record_saved` with the
    /// stored copy (carrying its new `modified_at`), and/or `finished` for the
    /// operation as a whole. It may do so synchronously or from any thread.
    fn write_record(&self, candidate: RemoteRecord, completion: WriteCompletion);

    /// Fetch records by id. Missing records show up as per-item errors or
    /// are simply absent from the result.
    async fn fetch_records(&self, ids: &[RecordId]) -> Result<FetchResults, RemoteError>;

    /// Fetch one page of a query, continuing from `cursor` when given.
    async fn query_page(
        &self,
        query: &Query,
        cursor: Option<&QueryCursor>,
    ) -> Result<QueryPage, RemoteError>;
}
