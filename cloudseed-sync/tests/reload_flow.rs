use chrono::{DateTime, Utc};
use rstest::rstest;

use cloudseed_core::{ErrorCode, RecordId, RemoteError, RemoteRecord, ZoneId};
use cloudseed_sync::reload::reload;
use cloudseed_sync::version::{cached_snapshot, record_id, set_cached_snapshot};
use cloudseed_sync::{InMemoryStore, ReloadOutcome, SyncError, SyncedEntity};

/// Entity that counts merge callbacks and persists to nowhere.
struct Contact {
    name: String,
    zone: ZoneId,
    email: Option<String>,
    modified_at: Option<DateTime<Utc>>,
    cache: Option<Vec<u8>>,
    inserted: bool,
    accept_merges: bool,
    merges: usize,
    persists: usize,
}

impl Contact {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            zone: ZoneId::from("People"),
            email: None,
            modified_at: None,
            cache: None,
            inserted: true,
            accept_merges: true,
            merges: 0,
            persists: 0,
        }
    }
}

impl SyncedEntity for Contact {
    fn record_type(&self) -> &str {
        "Contact"
    }
    fn record_name(&self) -> &str {
        &self.name
    }
    fn zone_id(&self) -> &ZoneId {
        &self.zone
    }
    fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified_at
    }
    fn cached_record_data(&self) -> Option<&[u8]> {
        self.cache.as_deref()
    }
    fn set_cached_record_data(&mut self, data: Option<Vec<u8>>) {
        self.cache = data;
    }
    fn populate_record(&self, record: &mut RemoteRecord) {
        if let Some(email) = &self.email {
            record.set("email", email.as_str());
        }
    }
    fn load_from_remote(&mut self, record: &RemoteRecord) -> bool {
        self.merges += 1;
        if !self.accept_merges {
            return false;
        }
        self.email = record.string("email").map(str::to_string);
        true
    }
    fn is_inserted(&self) -> bool {
        self.inserted
    }
    fn persist(&mut self) -> Result<(), SyncError> {
        self.persists += 1;
        Ok(())
    }
}

fn contact_record(contact: &Contact, email: &str) -> RemoteRecord {
    RemoteRecord::new("Contact", record_id(contact)).with_field("email", email)
}

#[tokio::test]
async fn unchanged_remote_skips_the_merge() {
    let store = InMemoryStore::new();
    let mut contact = Contact::new("ada");
    let remote = store.insert(contact_record(&contact, "ada@example.com"));
    set_cached_snapshot(&mut contact, Some(&remote)).unwrap();

    let outcome = reload(&mut contact, &store, false).await.unwrap();
    assert_eq!(outcome, ReloadOutcome::Unchanged);
    assert_eq!(contact.merges, 0);
    assert_eq!(contact.persists, 0);
}

#[tokio::test]
async fn overwrite_local_merges_even_when_unchanged() {
    let store = InMemoryStore::new();
    let mut contact = Contact::new("ada");
    let remote = store.insert(contact_record(&contact, "ada@example.com"));
    set_cached_snapshot(&mut contact, Some(&remote)).unwrap();

    let outcome = reload(&mut contact, &store, true).await.unwrap();
    assert_eq!(outcome, ReloadOutcome::Merged);
    assert_eq!(contact.merges, 1);
    assert_eq!(contact.email.as_deref(), Some("ada@example.com"));
}

#[tokio::test]
async fn newer_remote_is_merged_and_cached() {
    let store = InMemoryStore::new();
    let mut contact = Contact::new("ada");
    let old = store.insert(contact_record(&contact, "old@example.com"));
    set_cached_snapshot(&mut contact, Some(&old)).unwrap();
    let new = store.insert(contact_record(&contact, "new@example.com"));

    let outcome = reload(&mut contact, &store, false).await.unwrap();
    assert_eq!(outcome, ReloadOutcome::Merged);
    assert_eq!(contact.email.as_deref(), Some("new@example.com"));
    assert_eq!(cached_snapshot(&contact), Some(new));
    assert_eq!(contact.persists, 1);
}

#[tokio::test]
async fn never_synced_and_absent_is_not_an_error() {
    let store = InMemoryStore::new();
    let mut contact = Contact::new("ghost");
    let outcome = reload(&mut contact, &store, false).await.unwrap();
    assert_eq!(outcome, ReloadOutcome::NeverSynced);
    assert_eq!(contact.merges, 0);
}

#[tokio::test]
async fn cached_but_absent_is_not_found() {
    let store = InMemoryStore::new();
    let mut contact = Contact::new("ada");
    let remote = store.insert(contact_record(&contact, "ada@example.com"));
    set_cached_snapshot(&mut contact, Some(&remote)).unwrap();
    store.remove(&remote.id);

    let err = reload(&mut contact, &store, false).await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound { .. }));
}

#[tokio::test]
async fn rejected_merge_is_load_failed() {
    let store = InMemoryStore::new();
    let mut contact = Contact::new("ada");
    contact.accept_merges = false;
    store.insert(contact_record(&contact, "ada@example.com"));

    let err = reload(&mut contact, &store, false).await.unwrap_err();
    assert!(matches!(err, SyncError::LoadFailed { .. }));
    assert!(contact.cache.is_none());
}

#[tokio::test]
async fn uninserted_entity_is_rejected_before_fetching() {
    let store = InMemoryStore::new();
    let mut contact = Contact::new("ada");
    contact.inserted = false;

    let err = reload(&mut contact, &store, false).await.unwrap_err();
    assert!(matches!(err, SyncError::NotInserted { .. }));
    assert_eq!(store.fetch_calls(), 0);
}

#[rstest]
#[case(ErrorCode::PermissionFailure, false)]
#[case(ErrorCode::ZoneNotFound, false)]
#[case(ErrorCode::ServiceUnavailable, true)]
#[tokio::test]
async fn per_item_errors_are_classified(#[case] code: ErrorCode, #[case] deferrable: bool) {
    let store = InMemoryStore::new();
    let mut contact = Contact::new("ada");
    store.fail_fetch_of(
        RecordId::new("ada", "People"),
        RemoteError::new(code, "item failed"),
    );

    let err = reload(&mut contact, &store, false).await.unwrap_err();
    assert_eq!(err.remote().map(|e| e.code), Some(code));
    assert_eq!(err.is_deferrable(), deferrable);
}

#[tokio::test]
async fn whole_fetch_failure_is_classified() {
    let store = InMemoryStore::new();
    store.fail_next_fetch(RemoteError::new(ErrorCode::NetworkFailure, "offline"));
    let mut contact = Contact::new("ada");

    let err = reload(&mut contact, &store, false).await.unwrap_err();
    assert!(matches!(err, SyncError::Disconnected(_)));
}
