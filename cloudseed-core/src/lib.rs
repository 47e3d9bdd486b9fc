//! cloudseed core library: record snapshots, remote errors, configuration.
//!
//! - [`types`]: record and zone identifiers
//! - [`record`]: [`RemoteRecord`] snapshots and field values
//! - [`remote_error`]: [`RemoteError`] as reported by the remote store
//! - [`config`]: [`SyncConfig`] load / save
//! - [`error`]: [`CoreError`]

pub mod config;
pub mod error;
pub mod record;
pub mod remote_error;
pub mod types;

pub use config::SyncConfig;
pub use error::CoreError;
pub use record::{FieldValue, RemoteRecord, MODIFIED_AT_FIELD};
pub use remote_error::{ErrorCode, RemoteError};
pub use types::{ItemId, RecordId, ZoneId};
