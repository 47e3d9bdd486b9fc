use std::sync::Arc;

use cloudseed_core::{ErrorCode, RecordId, RemoteError, RemoteRecord, SyncConfig, ZoneId};
use cloudseed_sync::query::{fetch_by_ids, fetch_record, fetch_records_of_type};
use cloudseed_sync::{
    CloudSync, InMemoryStore, Predicate, Query, QueryPager, SortDescriptor, SyncConnection,
    SyncError,
};

fn seeded(count: i64, page_size: usize) -> InMemoryStore {
    let store = InMemoryStore::new().with_page_size(page_size);
    for i in 0..count {
        store.insert(
            RemoteRecord::new("Task", RecordId::new(format!("task-{i:02}"), "Work"))
                .with_field("rank", i)
                .with_field("done", i % 2 == 0),
        );
    }
    store
}

#[tokio::test]
async fn follows_cursors_until_the_last_page() {
    let store = seeded(7, 3);
    let conn = SyncConnection::new();
    let records = fetch_records_of_type(&conn, &store, Query::new("Task"))
        .await
        .unwrap();
    assert_eq!(records.len(), 7);
    assert_eq!(store.query_calls(), 3);
}

#[tokio::test]
async fn stops_at_the_limit() {
    let store = seeded(10, 3);
    let conn = SyncConnection::new();
    let records = fetch_records_of_type(&conn, &store, Query::new("Task").limit(4))
        .await
        .unwrap();
    assert_eq!(records.len(), 4);
    assert_eq!(store.query_calls(), 2);
}

#[tokio::test]
async fn offline_connection_refuses_queries() {
    let store = seeded(3, 3);
    let conn = SyncConnection::new();
    conn.record_failure(RemoteError::new(ErrorCode::NetworkFailure, "down"))
        .await;

    let err = fetch_records_of_type(&conn, &store, Query::new("Task"))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Offline));
    assert_eq!(store.query_calls(), 0);
}

#[tokio::test]
async fn pager_resumes_from_a_saved_cursor() {
    let store = seeded(5, 2);
    let query = Query::new("Task").sorted_by(SortDescriptor::descending("rank"));

    let mut pager = QueryPager::new(&store, query.clone());
    let first = pager.next_page().await.unwrap().unwrap();
    let ranks: Vec<_> = first.iter().filter_map(|r| r.int("rank")).collect();
    assert_eq!(ranks, [4, 3]);
    let cursor = pager.cursor().cloned().expect("more pages");
    drop(pager);

    let rest = QueryPager::resume(&store, query, cursor)
        .collect_all()
        .await
        .unwrap();
    let ranks: Vec<_> = rest.iter().filter_map(|r| r.int("rank")).collect();
    assert_eq!(ranks, [2, 1, 0]);
}

#[tokio::test]
async fn filtered_single_fetch() {
    let store = seeded(4, 10);
    let found = fetch_record(
        &store,
        Query::new("Task").matching(Predicate::Equals {
            field: "rank".into(),
            value: 3i64.into(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(found.id.name, "task-03");

    let err = fetch_record(&store, Query::new("Nothing")).await.unwrap_err();
    assert!(matches!(err, SyncError::RecordNotFound { .. }));
}

#[tokio::test]
async fn fetch_by_ids_keeps_only_hits() {
    let store = seeded(2, 10);
    let ids = [
        RecordId::new("task-00", "Work"),
        RecordId::new("missing", "Work"),
        RecordId::new("task-01", "Work"),
    ];
    let records = fetch_by_ids(&store, &ids).await.unwrap();
    let names: Vec<_> = records.iter().map(|r| r.id.name.as_str()).collect();
    assert_eq!(names, ["task-00", "task-01"]);
}

#[tokio::test]
async fn unsupported_predicate_is_unrecoverable() {
    let store = seeded(1, 10);
    let conn = SyncConnection::new();
    let query = Query::new("Task").matching(Predicate::Raw("rank > 2".into()));
    let err = fetch_records_of_type(&conn, &store, query).await.unwrap_err();
    assert!(matches!(err, SyncError::Unrecoverable(_)));
}

#[tokio::test]
async fn client_applies_the_configured_limit() {
    let store = Arc::new(seeded(6, 2));
    let config = SyncConfig {
        query_limit: 3,
        ..SyncConfig::default()
    };
    let client = CloudSync::new(store.clone(), config);

    assert_eq!(client.query(Query::new("Task")).await.unwrap().len(), 3);
    assert_eq!(
        client.query(Query::new("Task").limit(5)).await.unwrap().len(),
        5
    );
}

#[tokio::test]
async fn client_uses_the_configured_default_zone() {
    let store = Arc::new(seeded(2, 10));
    let config = SyncConfig {
        default_zone: "Work".into(),
        ..SyncConfig::default()
    };
    let client = CloudSync::new(store.clone(), config);

    let doc = client.document("Task", "task-00");
    assert_eq!(doc.zone, ZoneId::from("Work"));
    assert_eq!(client.record_id("task-01"), RecordId::new("task-01", "Work"));

    let fetched = client.fetch(&[client.record_id("task-01")]).await.unwrap();
    assert_eq!(fetched.len(), 1);

    let err = client.fetch_record(Query::new("Nothing")).await.unwrap_err();
    match err {
        SyncError::RecordNotFound { id } => assert_eq!(id.zone, ZoneId::from("Work")),
        other => panic!("expected a miss, got {other:?}"),
    }
}
