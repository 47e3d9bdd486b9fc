//! A schema-less synced entity.
//!
//! [`SyncedDocument`] stores arbitrary fields and mirrors them one-to-one
//! onto its remote record. Once inserted into a
//! [`DocumentStore`](crate::doc_store::DocumentStore) it persists itself to
//! a JSON file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cloudseed_core::{FieldValue, RemoteRecord, ZoneId, MODIFIED_AT_FIELD};

use crate::deferred::DeferredSavable;
use crate::doc_store::write_document;
use crate::error::SyncError;
use crate::version::{record_id, SyncedEntity};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncedDocument {
    pub record_type: String,
    pub name: String,
    #[serde(default)]
    pub zone: ZoneId,
    #[serde(default)]
    fields: BTreeMap<String, FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    modified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cached_record: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pending_record: Option<Vec<u8>>,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl SyncedDocument {
    pub fn new(
        record_type: impl Into<String>,
        name: impl Into<String>,
        zone: impl Into<ZoneId>,
    ) -> Self {
        Self {
            record_type: record_type.into(),
            name: name.into(),
            zone: zone.into(),
            fields: BTreeMap::new(),
            modified_at: None,
            cached_record: None,
            pending_record: None,
            path: None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Set a field. A change counts as a local edit and bumps `modified_at`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> bool {
        let key = key.into();
        let value = value.into();
        if self.fields.get(&key) == Some(&value) {
            return false;
        }
        self.fields.insert(key, value);
        self.touch();
        true
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        let removed = self.fields.remove(key);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    pub fn has_pending(&self) -> bool {
        self.pending_record.is_some()
    }

    /// File backing this document, once inserted.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn attach(&mut self, path: PathBuf) {
        self.path = Some(path);
    }

    fn touch(&mut self) {
        let now = Utc::now();
        // Keep edits strictly ordered even if the wall clock stalls.
        self.modified_at = Some(match self.modified_at {
            Some(prev) if prev >= now => prev + chrono::Duration::milliseconds(1),
            _ => now,
        });
    }
}

impl SyncedEntity for SyncedDocument {
    fn record_type(&self) -> &str {
        &self.record_type
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
        self.cached_record.as_deref()
    }

    fn set_cached_record_data(&mut self, data: Option<Vec<u8>>) {
        self.cached_record = data;
    }

    fn populate_record(&self, record: &mut RemoteRecord) {
        record
            .fields
            .retain(|key, _| key == MODIFIED_AT_FIELD || self.fields.contains_key(key));
        for (key, value) in &self.fields {
            record.set(key.clone(), value.clone());
        }
    }

    fn load_from_remote(&mut self, record: &RemoteRecord) -> bool {
        if record.record_type != self.record_type || record.id != record_id(self) {
            return false;
        }
        self.fields = record
            .fields
            .iter()
            .filter(|(key, _)| key.as_str() != MODIFIED_AT_FIELD)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        self.modified_at = record.local_modified_at().or(record.modified_at);
        true
    }

    fn is_inserted(&self) -> bool {
        self.path.is_some()
    }

    fn persist(&mut self) -> Result<(), SyncError> {
        match &self.path {
            Some(path) => write_document(path, self),
            None => Err(SyncError::NotInserted {
                id: record_id(self),
            }),
        }
    }
}

impl DeferredSavable for SyncedDocument {
    fn pending_record_data(&self) -> Option<&[u8]> {
        self.pending_record.as_deref()
    }

    fn set_pending_record_data(&mut self, data: Option<Vec<u8>>) {
        self.pending_record = data;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::build_record;

    #[test]
    fn edits_bump_modified_at() {
        let mut doc = SyncedDocument::new("Note", "n1", "Z");
        assert!(doc.modified_at().is_none());
        assert!(doc.set("title", "a"));
        let first = doc.modified_at().unwrap();
        assert!(!doc.set("title", "a"));
        assert_eq!(doc.modified_at(), Some(first));
        assert!(doc.set("title", "b"));
        assert!(doc.modified_at().unwrap() > first);
    }

    #[test]
    fn record_mirrors_fields() {
        let mut doc = SyncedDocument::new("Note", "n1", "Z");
        doc.set("title", "hello");
        doc.set("count", 3i64);
        let record = build_record(&doc);
        assert_eq!(record.string("title"), Some("hello"));
        assert_eq!(record.int("count"), Some(3));
        assert_eq!(record.local_modified_at(), doc.modified_at());
    }

    #[test]
    fn removed_fields_leave_the_record() {
        let mut doc = SyncedDocument::new("Note", "n1", "Z");
        let mut record = RemoteRecord::new("Note", record_id(&doc)).with_field("gone", "x");
        doc.set("kept", "y");
        doc.populate_record(&mut record);
        assert!(record.get("gone").is_none());
        assert_eq!(record.string("kept"), Some("y"));
    }

    #[test]
    fn load_rejects_other_record_types() {
        let mut doc = SyncedDocument::new("Note", "n1", "Z");
        let other = RemoteRecord::new("Task", record_id(&doc));
        assert!(!doc.load_from_remote(&other));
    }

    #[test]
    fn persist_requires_insertion() {
        let mut doc = SyncedDocument::new("Note", "n1", "Z");
        assert!(matches!(doc.persist(), Err(SyncError::NotInserted { .. })));
    }
}
