//! Local entities and their cached remote snapshot.
//!
//! A [`SyncedEntity`] keeps the last record it round-tripped through the
//! store as an opaque blob. The helpers here decode it lazily and guard it
//! against being overwritten by an older snapshot.

use chrono::{DateTime, Utc};

use cloudseed_core::{RecordId, RemoteRecord, ZoneId, MODIFIED_AT_FIELD};

use crate::error::SyncError;

/// Owner-side unit of synchronization.
pub trait SyncedEntity: Send {
    /// Remote record type, e.g. `"Note"`.
    fn record_type(&self) -> &str;

    /// Stable for the entity's lifetime.
    fn record_name(&self) -> &str;

    fn zone_id(&self) -> &ZoneId;

    /// Time of the last local edit that still has to reach the store.
    fn modified_at(&self) -> Option<DateTime<Utc>>;

    fn cached_record_data(&self) -> Option<&[u8]>;

    fn set_cached_record_data(&mut self, data: Option<Vec<u8>>);

    /// Write the entity's current values into `record`.
    fn populate_record(&self, record: &mut RemoteRecord);

    /// Apply fetched remote fields. Return `false` if they cannot be applied.
    fn load_from_remote(&mut self, record: &RemoteRecord) -> bool;

    /// Whether the entity has a backing local store to merge into.
    fn is_inserted(&self) -> bool;

    /// Write the entity to its local store.
    fn persist(&mut self) -> Result<(), SyncError>;
}

/// Which side of a comparison holds the later edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewerRecord {
    LocalNewer,
    ServerNewer,
    /// The remote copy carries no timestamp.
    Unknown,
}

pub fn record_id<E: SyncedEntity + ?Sized>(entity: &E) -> RecordId {
    RecordId::new(entity.record_name(), entity.zone_id().clone())
}

/// Decode the cached snapshot. Missing or corrupt data reads as `None`.
pub fn cached_snapshot<E: SyncedEntity + ?Sized>(entity: &E) -> Option<RemoteRecord> {
    let data = entity.cached_record_data()?;
    match RemoteRecord::from_bytes(data) {
        Ok(record) => Some(record),
        Err(err) => {
            tracing::debug!(
                "ignoring unreadable cached snapshot for {}: {}",
                entity.record_name(),
                err
            );
            None
        }
    }
}

/// Replace the cached snapshot.
///
/// A snapshot older than the cached one is ignored and `Ok(false)` is
/// returned. `None` always clears the cache.
pub fn set_cached_snapshot<E: SyncedEntity + ?Sized>(
    entity: &mut E,
    snapshot: Option<&RemoteRecord>,
) -> Result<bool, SyncError> {
    let Some(snapshot) = snapshot else {
        entity.set_cached_record_data(None);
        return Ok(true);
    };

    let cached_at = cached_snapshot(entity).and_then(|cached| cached.modified_at);
    if let (Some(old), Some(new)) = (cached_at, snapshot.modified_at) {
        if old > new {
            tracing::debug!(
                "kept cached snapshot of {} ({} is newer than {})",
                snapshot.id,
                old,
                new
            );
            return Ok(false);
        }
    }

    entity.set_cached_record_data(Some(snapshot.to_bytes()?));
    Ok(true)
}

/// Compare a remote copy against the entity's last local edit.
pub fn newer_record<E: SyncedEntity + ?Sized>(entity: &E, candidate: &RemoteRecord) -> NewerRecord {
    let Some(remote_at) = candidate.modified_at else {
        return NewerRecord::Unknown;
    };
    match entity.modified_at() {
        Some(local_at) if local_at >= remote_at => NewerRecord::LocalNewer,
        _ => NewerRecord::ServerNewer,
    }
}

/// Build the candidate to save: the cached snapshot (or a fresh record)
/// refreshed with the entity's current values.
pub fn build_record<E: SyncedEntity + ?Sized>(entity: &E) -> RemoteRecord {
    let mut record = cached_snapshot(entity)
        .filter(|cached| cached.id == record_id(entity))
        .unwrap_or_else(|| RemoteRecord::new(entity.record_type(), record_id(entity)));
    entity.populate_record(&mut record);
    if let Some(at) = entity.modified_at() {
        record.set(MODIFIED_AT_FIELD, at);
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Default)]
    struct Entry {
        zone: ZoneId,
        title: String,
        modified_at: Option<DateTime<Utc>>,
        cache: Option<Vec<u8>>,
    }

    impl SyncedEntity for Entry {
        fn record_type(&self) -> &str {
            "Entry"
        }
        fn record_name(&self) -> &str {
            "entry-1"
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
            record.set("title", self.title.as_str());
        }
        fn load_from_remote(&mut self, record: &RemoteRecord) -> bool {
            match record.string("title") {
                Some(title) => {
                    self.title = title.to_string();
                    true
                }
                None => false,
            }
        }
        fn is_inserted(&self) -> bool {
            true
        }
        fn persist(&mut self) -> Result<(), SyncError> {
            Ok(())
        }
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    fn snapshot(entry: &Entry, day: u32) -> RemoteRecord {
        RemoteRecord::new("Entry", record_id(entry))
            .with_field("title", format!("day {day}"))
            .with_modified_at(at(day))
    }

    #[test]
    fn older_snapshot_is_ignored() {
        let mut entry = Entry::default();
        let t2 = snapshot(&entry, 2);
        assert!(set_cached_snapshot(&mut entry, Some(&t2)).unwrap());

        let t1 = snapshot(&entry, 1);
        assert!(!set_cached_snapshot(&mut entry, Some(&t1)).unwrap());
        assert_eq!(cached_snapshot(&entry), Some(t2));

        let t3 = snapshot(&entry, 3);
        assert!(set_cached_snapshot(&mut entry, Some(&t3)).unwrap());
        assert_eq!(cached_snapshot(&entry), Some(t3));
    }

    #[test]
    fn equal_timestamp_replaces() {
        let mut entry = Entry::default();
        let first = snapshot(&entry, 2);
        set_cached_snapshot(&mut entry, Some(&first)).unwrap();
        let second = first.clone().with_field("title", "again");
        assert!(set_cached_snapshot(&mut entry, Some(&second)).unwrap());
        assert_eq!(cached_snapshot(&entry), Some(second));
    }

    #[test]
    fn none_clears_unconditionally() {
        let mut entry = Entry::default();
        let snap = snapshot(&entry, 5);
        set_cached_snapshot(&mut entry, Some(&snap)).unwrap();
        assert!(set_cached_snapshot(&mut entry, None).unwrap());
        assert!(entry.cache.is_none());
    }

    #[test]
    fn corrupt_cache_is_a_miss() {
        let entry = Entry {
            cache: Some(b"not a record".to_vec()),
            ..Entry::default()
        };
        assert!(cached_snapshot(&entry).is_none());
    }

    #[test]
    fn newer_record_compares_against_local_edit() {
        let entry = Entry {
            modified_at: Some(at(10)),
            ..Entry::default()
        };
        assert_eq!(newer_record(&entry, &snapshot(&entry, 11)), NewerRecord::ServerNewer);
        assert_eq!(newer_record(&entry, &snapshot(&entry, 9)), NewerRecord::LocalNewer);
        assert_eq!(newer_record(&entry, &snapshot(&entry, 10)), NewerRecord::LocalNewer);

        let unsaved = RemoteRecord::new("Entry", record_id(&entry));
        assert_eq!(newer_record(&entry, &unsaved), NewerRecord::Unknown);
    }

    #[test]
    fn build_record_starts_from_cache_and_stamps_edit_time() {
        let mut entry = Entry {
            title: "draft".into(),
            modified_at: Some(at(20)),
            ..Entry::default()
        };
        let cached = snapshot(&entry, 4).with_field("extra", "kept");
        set_cached_snapshot(&mut entry, Some(&cached)).unwrap();

        let record = build_record(&entry);
        assert_eq!(record.modified_at, Some(at(4)));
        assert_eq!(record.string("title"), Some("draft"));
        assert_eq!(record.string("extra"), Some("kept"));
        assert_eq!(record.local_modified_at(), Some(at(20)));
    }

    #[test]
    fn build_record_without_cache_is_fresh() {
        let entry = Entry {
            title: "new".into(),
            ..Entry::default()
        };
        let record = build_record(&entry);
        assert_eq!(record.record_type, "Entry");
        assert!(record.modified_at.is_none());
        assert!(record.local_modified_at().is_none());
    }
}
