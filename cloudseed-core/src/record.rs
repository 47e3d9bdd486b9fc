//! Snapshots of remote records.
//!
//! A [`RemoteRecord`] is immutable once the store hands it back; local code
//! builds a new candidate by copying a snapshot's identity and refreshing its
//! fields. Snapshots travel as an opaque JSON blob when cached.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;
use crate::types::{RecordId, ZoneId};

/// Field that mirrors the owning entity's local modification time.
pub const MODIFIED_AT_FIELD: &str = "syncEngineModifiedAt";

/// A typed field value stored on a remote record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Double(#[serde(with = "lossless_f64")] f64),
    String(String),
    Date(DateTime<Utc>),
    Bytes(Vec<u8>),
    StringList(Vec<String>),
    DoubleList(#[serde(with = "lossless_f64::list")] Vec<f64>),
    DateList(Vec<DateTime<Utc>>),
    BytesList(Vec<Vec<u8>>),
}

/// JSON has no NaN or infinity; those travel as the strings `"NaN"`,
/// `"inf"` and `"-inf"`. Finite values stay plain numbers.
mod lossless_f64 {
    use super::*;

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Special(String),
    }

    fn encode(value: f64) -> Repr {
        if value.is_finite() {
            Repr::Number(value)
        } else if value.is_nan() {
            Repr::Special("NaN".to_owned())
        } else if value > 0.0 {
            Repr::Special("inf".to_owned())
        } else {
            Repr::Special("-inf".to_owned())
        }
    }

    fn decode<E: serde::de::Error>(repr: Repr) -> Result<f64, E> {
        match repr {
            Repr::Number(value) => Ok(value),
            Repr::Special(text) => match text.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(E::custom(format!("invalid double {other:?}"))),
            },
        }
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        encode(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        decode(Repr::deserialize(deserializer)?)
    }

    pub mod list {
        use super::*;

        pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(values.iter().map(|value| encode(*value)))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<f64>, D::Error> {
            Vec::<Repr>::deserialize(deserializer)?
                .into_iter()
                .map(decode)
                .collect()
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Double(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_owned())
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Date(v)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        FieldValue::Bytes(v)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(v: Vec<String>) -> Self {
        FieldValue::StringList(v)
    }
}

/// Point-in-time copy of one row in the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub record_type: String,
    pub id: RecordId,
    /// Assigned by the store on every successful write; `None` on a
    /// candidate that has never been saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl RemoteRecord {
    pub fn new(record_type: impl Into<String>, id: RecordId) -> Self {
        Self {
            record_type: record_type.into(),
            id,
            modified_at: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn zone(&self) -> &ZoneId {
        &self.id.zone
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Set a field, returning `true` if the stored value changed.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> bool {
        let key = key.into();
        let value = value.into();
        if self.fields.get(&key) == Some(&value) {
            return false;
        }
        self.fields.insert(key, value);
        true
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.fields.remove(key)
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn with_modified_at(mut self, at: DateTime<Utc>) -> Self {
        self.modified_at = Some(at);
        self
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(FieldValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.fields.get(key) {
            Some(FieldValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn date(&self, key: &str) -> Option<DateTime<Utc>> {
        match self.fields.get(key) {
            Some(FieldValue::Date(v)) => Some(*v),
            _ => None,
        }
    }

    /// Local modification time mirrored into [`MODIFIED_AT_FIELD`].
    pub fn local_modified_at(&self) -> Option<DateTime<Utc>> {
        self.date(MODIFIED_AT_FIELD)
    }

    /// Store a serde value as JSON bytes under `key`.
    pub fn set_codable<T: Serialize>(&mut self, key: &str, value: &T) -> Result<bool, CoreError> {
        let bytes = serde_json::to_vec(value).map_err(CoreError::Codec)?;
        Ok(self.set(key, FieldValue::Bytes(bytes)))
    }

    /// Decode a JSON-bytes field; missing or undecodable values read as `None`.
    pub fn codable<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.fields.get(key) {
            Some(FieldValue::Bytes(bytes)) => serde_json::from_slice(bytes).ok(),
            _ => None,
        }
    }

    /// A new candidate carrying this snapshot's identity, zone, and
    /// server timestamp, ready to have its fields refreshed.
    pub fn candidate(&self) -> RemoteRecord {
        self.clone()
    }

    /// Copy every field of `other` onto this record, keeping identity and
    /// server timestamp.
    pub fn merge_fields_from(&mut self, other: &RemoteRecord) {
        for (key, value) in &other.fields {
            self.fields.insert(key.clone(), value.clone());
        }
    }

    /// Encode as the opaque blob handed to the persistence layer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(self).map_err(CoreError::Codec)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        serde_json::from_slice(bytes).map_err(CoreError::Codec)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
