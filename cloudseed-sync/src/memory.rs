//! In-process [`RemoteStore`].
//!
//! Behaves like a single-writer remote store: it assigns a strictly
//! increasing `modified_at` on each write and rejects a candidate whose
//! `modified_at` does not match the stored copy with `ServerRecordChanged`.
//! Failures can be scripted ahead of time, and every contact is counted.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use cloudseed_core::{ErrorCode, FieldValue, RecordId, RemoteError, RemoteRecord};

use crate::completion::WriteCompletion;
use crate::query::{Predicate, Query, QueryCursor};
use crate::remote::{FetchResults, QueryPage, RemoteStore};

const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug)]
enum ScriptedWrite {
    Fail(RemoteError),
    Unconfirmed,
    Abandon,
}

#[derive(Debug)]
struct Inner {
    records: BTreeMap<RecordId, RemoteRecord>,
    writes: VecDeque<ScriptedWrite>,
    fetch_failures: HashMap<RecordId, RemoteError>,
    next_fetch_error: Option<RemoteError>,
    clock: DateTime<Utc>,
    page_size: usize,
    write_attempts: usize,
    fetch_calls: usize,
    query_calls: usize,
}

impl Inner {
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += Duration::seconds(1);
        self.clock
    }
}

#[derive(Debug)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        let epoch = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self {
            inner: Mutex::new(Inner {
                records: BTreeMap::new(),
                writes: VecDeque::new(),
                fetch_failures: HashMap::new(),
                next_fetch_error: None,
                clock: epoch,
                page_size: DEFAULT_PAGE_SIZE,
                write_attempts: 0,
                fetch_calls: 0,
                query_calls: 0,
            }),
        }
    }

    /// Records per query page.
    pub fn with_page_size(self, page_size: usize) -> Self {
        self.lock().page_size = page_size.max(1);
        self
    }

    /// Store `record` directly, as if another client had written it.
    /// Returns the stored copy with its assigned `modified_at`.
    pub fn insert(&self, record: RemoteRecord) -> RemoteRecord {
        let mut inner = self.lock();
        let mut stored = record;
        stored.modified_at = Some(inner.tick());
        inner.records.insert(stored.id.clone(), stored.clone());
        stored
    }

    pub fn get(&self, id: &RecordId) -> Option<RemoteRecord> {
        self.lock().records.get(id).cloned()
    }

    pub fn remove(&self, id: &RecordId) -> Option<RemoteRecord> {
        self.lock().records.remove(id)
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The next write fails with `error`.
    pub fn fail_next_write(&self, error: RemoteError) {
        self.lock().writes.push_back(ScriptedWrite::Fail(error));
    }

    /// The next write reports batch success without a per-record result.
    pub fn unconfirm_next_write(&self) {
        self.lock().writes.push_back(ScriptedWrite::Unconfirmed);
    }

    /// The next write drops its completion without reporting anything.
    pub fn abandon_next_write(&self) {
        self.lock().writes.push_back(ScriptedWrite::Abandon);
    }

    /// Every fetch of `id` reports `error` for that item.
    pub fn fail_fetch_of(&self, id: RecordId, error: RemoteError) {
        self.lock().fetch_failures.insert(id, error);
    }

    /// The next fetch fails as a whole.
    pub fn fail_next_fetch(&self, error: RemoteError) {
        self.lock().next_fetch_error = Some(error);
    }

    pub fn write_attempts(&self) -> usize {
        self.lock().write_attempts
    }

    pub fn fetch_calls(&self) -> usize {
        self.lock().fetch_calls
    }

    pub fn query_calls(&self) -> usize {
        self.lock().query_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    fn write_record(&self, candidate: RemoteRecord, completion: WriteCompletion) {
        let outcome = {
            let mut inner = self.lock();
            inner.write_attempts += 1;
            match inner.writes.pop_front() {
                Some(ScriptedWrite::Fail(err)) => Err(Some(err)),
                Some(ScriptedWrite::Unconfirmed) => Err(None),
                Some(ScriptedWrite::Abandon) => return,
                None => {
                    let current = inner
                        .records
                        .get(&candidate.id)
                        .filter(|current| current.modified_at != candidate.modified_at)
                        .cloned();
                    match current {
                        Some(current) => Err(Some(
                            RemoteError::new(
                                ErrorCode::ServerRecordChanged,
                                format!("record {} changed on the server", candidate.id),
                            )
                            .with_server_record(current),
                        )),
                        None => {
                            let mut stored = candidate;
                            stored.modified_at = Some(inner.tick());
                            inner.records.insert(stored.id.clone(), stored.clone());
                            Ok(stored)
                        }
                    }
                }
            }
        };

        match outcome {
            Ok(stored) => {
                completion.record_saved(Ok(stored));
                completion.finished(Ok(()));
            }
            Err(Some(err)) => {
                completion.finished(Err(err));
            }
            Err(None) => {
                completion.finished(Ok(()));
            }
        }
    }

    async fn fetch_records(&self, ids: &[RecordId]) -> Result<FetchResults, RemoteError> {
        let mut inner = self.lock();
        inner.fetch_calls += 1;
        if let Some(err) = inner.next_fetch_error.take() {
            return Err(err);
        }
        Ok(ids
            .iter()
            .map(|id| {
                let result = if let Some(err) = inner.fetch_failures.get(id) {
                    Err(err.clone())
                } else {
                    inner.records.get(id).cloned().ok_or_else(|| {
                        RemoteError::new(ErrorCode::UnknownItem, format!("no record {id}"))
                    })
                };
                (id.clone(), result)
            })
            .collect())
    }

    async fn query_page(
        &self,
        query: &Query,
        cursor: Option<&QueryCursor>,
    ) -> Result<QueryPage, RemoteError> {
        let mut inner = self.lock();
        inner.query_calls += 1;

        let offset = match cursor {
            None => 0,
            Some(QueryCursor(raw)) => raw.parse::<usize>().map_err(|_| {
                RemoteError::new(ErrorCode::InvalidArguments, format!("bad cursor {raw:?}"))
            })?,
        };

        let mut matches = Vec::new();
        for record in inner.records.values() {
            if record.record_type != query.record_type {
                continue;
            }
            if query.zone.as_ref().is_some_and(|zone| zone != record.zone()) {
                continue;
            }
            let keep = match &query.predicate {
                Predicate::All => true,
                Predicate::Equals { field, value } => record.get(field) == Some(value),
                Predicate::Raw(raw) => {
                    return Err(RemoteError::new(
                        ErrorCode::InvalidArguments,
                        format!("unsupported predicate {raw:?}"),
                    ))
                }
            };
            if keep {
                matches.push(record.clone());
            }
        }

        for sort in query.sort.iter().rev() {
            matches.sort_by(|a, b| {
                let ord = compare_fields(a.get(&sort.key), b.get(&sort.key));
                if sort.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }

        let end = offset.saturating_add(inner.page_size).min(matches.len());
        let cursor = (end < matches.len()).then(|| QueryCursor(end.to_string()));
        let results = matches
            .into_iter()
            .skip(offset)
            .take(end.saturating_sub(offset))
            .map(|mut record| {
                if let Some(keys) = &query.field_keys {
                    record.fields.retain(|key, _| keys.contains(key));
                }
                (record.id.clone(), Ok(record))
            })
            .collect();

        Ok(QueryPage { results, cursor })
    }
}

fn compare_fields(a: Option<&FieldValue>, b: Option<&FieldValue>) -> Ordering {
    match (a, b) {
        (Some(FieldValue::Int(a)), Some(FieldValue::Int(b))) => a.cmp(b),
        (Some(FieldValue::Double(a)), Some(FieldValue::Double(b))) => {
            a.partial_cmp(b).unwrap_or(Ordering::Equal)
        }
        (Some(FieldValue::String(a)), Some(FieldValue::String(b))) => a.cmp(b),
        (Some(FieldValue::Date(a)), Some(FieldValue::Date(b))) => a.cmp(b),
        (Some(FieldValue::Bool(a)), Some(FieldValue::Bool(b))) => a.cmp(b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::write_completion;

    fn note(name: &str) -> RemoteRecord {
        RemoteRecord::new("Note", RecordId::new(name, "Z"))
    }

    #[tokio::test]
    async fn timestamps_strictly_increase() {
        let store = InMemoryStore::new();
        let a = store.insert(note("a"));
        let b = store.insert(note("b"));
        assert!(b.modified_at > a.modified_at);
    }

    #[tokio::test]
    async fn stale_candidate_is_rejected_with_server_copy() {
        let store = InMemoryStore::new();
        let current = store.insert(note("a").with_field("t", "server"));

        let (completion, pending) = write_completion();
        store.write_record(note("a"), completion);
        match pending.wait().await {
            Err(crate::completion::WriteFailure::Remote(err)) => {
                assert_eq!(err.code, ErrorCode::ServerRecordChanged);
                assert_eq!(err.server_record.as_deref(), Some(&current));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_ids_are_unknown_items() {
        let store = InMemoryStore::new();
        let results = store
            .fetch_records(&[RecordId::new("nope", "Z")])
            .await
            .unwrap();
        let err = results[0].1.clone().unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownItem);
    }

    #[tokio::test]
    async fn pages_carry_cursors_until_exhausted() {
        let store = InMemoryStore::new().with_page_size(2);
        for name in ["a", "b", "c"] {
            store.insert(note(name));
        }
        let query = Query::new("Note");

        let first = store.query_page(&query, None).await.unwrap();
        assert_eq!(first.results.len(), 2);
        let cursor = first.cursor.expect("more results");

        let second = store.query_page(&query, Some(&cursor)).await.unwrap();
        assert_eq!(second.results.len(), 1);
        assert!(second.cursor.is_none());
    }

    #[tokio::test]
    async fn cursor_past_the_end_is_an_empty_last_page() {
        let store = InMemoryStore::new().with_page_size(2);
        store.insert(note("a"));
        let cursor = QueryCursor(usize::MAX.to_string());

        let page = store
            .query_page(&Query::new("Note"), Some(&cursor))
            .await
            .unwrap();
        assert!(page.results.is_empty());
        assert!(page.cursor.is_none());
    }

    #[tokio::test]
    async fn query_filters_sorts_and_projects() {
        let store = InMemoryStore::new();
        store.insert(note("a").with_field("rank", 2i64).with_field("kind", "x"));
        store.insert(note("b").with_field("rank", 1i64).with_field("kind", "x"));
        store.insert(note("c").with_field("rank", 3i64).with_field("kind", "y"));

        let query = Query::new("Note")
            .matching(Predicate::Equals {
                field: "kind".into(),
                value: "x".into(),
            })
            .sorted_by(crate::query::SortDescriptor::ascending("rank"))
            .keys(vec!["rank".into()]);
        let page = store.query_page(&query, None).await.unwrap();
        let names: Vec<_> = page
            .results
            .iter()
            .map(|(id, _)| id.name.as_str())
            .collect();
        assert_eq!(names, ["b", "a"]);
        let first = page.results[0].1.as_ref().unwrap();
        assert!(first.get("kind").is_none());
    }
}
