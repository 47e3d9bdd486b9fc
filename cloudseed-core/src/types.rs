//! Identity types for records held in the remote store.
//!
//! A record is addressed by its name *within* a zone; neither half is
//! globally unique on its own.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A partition of the remote keyspace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ZoneId(pub String);

impl ZoneId {
    /// Zone used when an entity does not name one.
    pub const DEFAULT_NAME: &'static str = "_defaultZone";

    pub fn default_zone() -> Self {
        Self(Self::DEFAULT_NAME.to_owned())
    }
}

impl Default for ZoneId {
    fn default() -> Self {
        Self::default_zone()
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ZoneId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ZoneId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Full address of a record: its name plus the zone it lives in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub name: String,
    pub zone: ZoneId,
}

impl RecordId {
    pub fn new(name: impl Into<String>, zone: impl Into<ZoneId>) -> Self {
        Self {
            name: name.into(),
            zone: zone.into(),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.zone, self.name)
    }
}

/// Key of one entry in a batch error's per-item map.
///
/// Batch operations may fail per record, per zone, or per some other
/// store-defined item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemId {
    Record(RecordId),
    Zone(ZoneId),
    Other(String),
}

impl ItemId {
    /// The zone this item belongs to, when it has one.
    pub fn zone(&self) -> Option<&ZoneId> {
        match self {
            ItemId::Record(id) => Some(&id.zone),
            ItemId::Zone(zone) => Some(zone),
            ItemId::Other(_) => None,
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Record(id) => id.fmt(f),
            ItemId::Zone(zone) => write!(f, "zone {zone}"),
            ItemId::Other(other) => other.fmt(f),
        }
    }
}

impl From<RecordId> for ItemId {
    fn from(id: RecordId) -> Self {
        ItemId::Record(id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
